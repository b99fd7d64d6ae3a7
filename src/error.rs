//! Error types with fix suggestions

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// All error variants are part of the public API.
///
/// Parsing collects `Grammar` errors into the metadata error sink instead of
/// raising, so one pass over multi-statement input reports every statement's
/// problems. `Lexical` errors abort the remaining statements. Resolution
/// failures are not errors at all - they surface as "member unavailable"
/// (see `MemberPathLastMember`); `UnresolvedPath` exists only for diagnostics.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WeftError {
    // ─────────────────────────────────────────────────────────────
    // Parse errors (WEFT-010 to WEFT-012)
    // ─────────────────────────────────────────────────────────────
    #[error("WEFT-010: Lexical error at position {position}: {details}")]
    Lexical { position: usize, details: String },

    #[error("WEFT-011: Grammar error at position {position}: {details}")]
    Grammar { position: usize, details: String },

    #[error("WEFT-012: Invalid argument: {details}")]
    Argument { details: String },

    // ─────────────────────────────────────────────────────────────
    // Conversion errors (WEFT-020)
    // ─────────────────────────────────────────────────────────────
    #[error("WEFT-020: Expression node '{node}' is not supported by any converter")]
    ConversionNotSupported { node: String },

    // ─────────────────────────────────────────────────────────────
    // Member errors (WEFT-030 to WEFT-032)
    // ─────────────────────────────────────────────────────────────
    #[error("WEFT-030: Member '{member}' faulted: {details}")]
    MemberFault { member: String, details: String },

    #[error("WEFT-031: Path '{path}' could not be resolved")]
    UnresolvedPath { path: String },

    #[error("WEFT-032: Cannot traverse '{segment}' on {value_type} (expected object/array)")]
    InvalidTraversal { segment: String, value_type: String },

    // ─────────────────────────────────────────────────────────────
    // Request errors (WEFT-040 to WEFT-041)
    // ─────────────────────────────────────────────────────────────
    #[error("WEFT-040: Duplicate parameter '{name}' in binding expression")]
    DuplicateParameter { name: String },

    #[error("WEFT-041: Binding construction failed: {details}")]
    BindingCreation { details: String },
}

impl FixSuggestion for WeftError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            WeftError::Lexical { .. } => {
                Some("Check for unterminated strings or malformed numeric literals")
            }
            WeftError::Grammar { .. } => {
                Some("Check expression syntax: Target Source, Param=Value; ...")
            }
            WeftError::Argument { .. } => {
                Some("Position and limit must stay within [0, text length]")
            }
            WeftError::ConversionNotSupported { .. } => {
                Some("Use only member access, calls, lambdas, operators, and constants")
            }
            WeftError::MemberFault { .. } => {
                Some("The member's getter/setter raised - inspect the source object")
            }
            WeftError::UnresolvedPath { .. } => {
                Some("Verify every segment of the path exists on the bound object")
            }
            WeftError::InvalidTraversal { .. } => {
                Some("Check the path - you're trying to access a member on a scalar value")
            }
            WeftError::DuplicateParameter { .. } => {
                Some("Each named parameter may appear once per statement")
            }
            WeftError::BindingCreation { .. } => {
                Some("Check that target and source expressions compile and resolve")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_carry_stable_codes() {
        let err = WeftError::Lexical {
            position: 3,
            details: "unterminated string".into(),
        };
        assert!(err.to_string().contains("WEFT-010"));

        let err = WeftError::Grammar {
            position: 0,
            details: "no parser claimed position".into(),
        };
        assert!(err.to_string().contains("WEFT-011"));
    }

    #[test]
    fn every_variant_has_a_suggestion() {
        let samples = vec![
            WeftError::Lexical { position: 0, details: String::new() },
            WeftError::Grammar { position: 0, details: String::new() },
            WeftError::Argument { details: String::new() },
            WeftError::ConversionNotSupported { node: String::new() },
            WeftError::MemberFault { member: String::new(), details: String::new() },
            WeftError::UnresolvedPath { path: String::new() },
            WeftError::InvalidTraversal { segment: String::new(), value_type: String::new() },
            WeftError::DuplicateParameter { name: String::new() },
            WeftError::BindingCreation { details: String::new() },
        ];
        for err in samples {
            assert!(err.fix_suggestion().is_some(), "missing suggestion: {err}");
        }
    }

    #[test]
    fn errors_serialize_with_a_kind_tag() {
        let err = WeftError::MemberFault {
            member: "Name".into(),
            details: "getter threw".into(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "member_fault");
        assert_eq!(json["member"], "Name");

        let back: WeftError = serde_json::from_value(json).unwrap();
        assert!(matches!(back, WeftError::MemberFault { .. }));
    }
}
