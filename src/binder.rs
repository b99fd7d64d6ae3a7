//! High-level entry point: binding text in, live bindings out.
//!
//! `bind` is the convenience wrapper over the parse → resolve → wire chain.
//! Hosts with more specific needs (foreign-expression inputs, custom
//! components, custom parsers) assemble the pieces directly.

use std::sync::Arc;

use anyhow::Context;
use tracing::debug;

use crate::ast::{BinaryOp, Expr};
use crate::binding::mode::{OneTime, OneWay, OneWayToSource, TwoWay};
use crate::binding::{Binding, BindingComponent, BindingSource};
use crate::error::WeftError;
use crate::member::observer::MemberPathObserver;
use crate::metadata::Metadata;
use crate::object::ObjectRef;
use crate::parse::{default_expression_parser, BindingExpressionRequest, ExpressionParserResult};

/// Parse a (possibly multi-statement) binding expression and wire one live
/// binding per statement. The target leg of each statement is observed on
/// `target_root`, the source leg on `source_root`. A `Mode=...` parameter
/// selects the mode component; the default is one-way.
pub fn bind(
    expression: &str,
    target_root: &ObjectRef,
    source_root: &ObjectRef,
) -> anyhow::Result<Vec<Arc<Binding>>> {
    let metadata = Metadata::new();
    let request = BindingExpressionRequest::from_text(expression);
    let results = default_expression_parser()
        .try_parse(&request, &metadata)
        .with_context(|| format!("parsing binding expression {expression:?}"))?;

    let mut bindings = Vec::with_capacity(results.len());
    for result in &results {
        let binding = wire(result, target_root, source_root)
            .with_context(|| format!("wiring binding for {expression:?}"))?;
        bindings.push(binding);
    }
    Ok(bindings)
}

fn wire(
    result: &ExpressionParserResult,
    target_root: &ObjectRef,
    source_root: &ObjectRef,
) -> Result<Arc<Binding>, WeftError> {
    let target = MemberPathObserver::observe(target_root, &result.target).ok_or_else(|| {
        WeftError::BindingCreation {
            details: "target is not an observable member chain".into(),
        }
    })?;
    let source = BindingSource::for_expression(source_root, &result.source);
    let binding = Binding::new(target, source);
    let mode = mode_component(&result.parameters)?;
    debug!(mode = mode.name(), "binding wired");
    binding.attach_component(mode);
    Ok(binding)
}

/// Resolve the `Mode=...` parameter, defaulting to one-way
fn mode_component(parameters: &[Expr]) -> Result<Arc<dyn BindingComponent>, WeftError> {
    let Some(name) = parameter_value(parameters, "Mode") else {
        return Ok(Arc::new(OneWay));
    };
    match name {
        "OneWay" => Ok(Arc::new(OneWay)),
        "OneWayToSource" => Ok(Arc::new(OneWayToSource)),
        "TwoWay" => Ok(Arc::new(TwoWay::new())),
        "OneTime" => Ok(Arc::new(OneTime::new())),
        other => Err(WeftError::BindingCreation {
            details: format!("unknown binding mode {other:?}"),
        }),
    }
}

/// Named parameters arrive as `Name = Value` assignment nodes; the value is
/// returned as its bare identifier or string text
fn parameter_value<'a>(parameters: &'a [Expr], name: &str) -> Option<&'a str> {
    parameters.iter().find_map(|parameter| {
        let Expr::Binary {
            op: BinaryOp::Assign,
            left,
            right,
        } = parameter
        else {
            return None;
        };
        match left.as_ref() {
            Expr::Member {
                target: None,
                name: parameter_name,
            } if parameter_name == name => {}
            _ => return None,
        }
        match right.as_ref() {
            Expr::Member { target: None, name } => Some(name.as_str()),
            Expr::Constant(value) => value.as_str(),
            _ => None,
        }
    })
}

// ─────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObservableMap;
    use crate::value::Value;

    fn roots() -> (ObjectRef, ObjectRef) {
        let target = ObservableMap::new("View");
        target.set("Text", Value::str(""));
        target.set("Title", Value::str(""));
        let source = ObservableMap::new("Model");
        source.set("Name", Value::str("Ada"));
        source.set("Age", Value::Int(36));
        (target, source)
    }

    #[test]
    fn one_statement_wires_one_live_binding() {
        let (target, source) = roots();
        let bindings = bind("Text Name", &target, &source).unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(target.get("Text"), Some(Value::str("Ada")));

        source.set("Name", Value::str("Grace"));
        assert_eq!(target.get("Text"), Some(Value::str("Grace")));
    }

    #[test]
    fn statements_bind_independently() {
        let (target, source) = roots();
        let bindings = bind("Text Name; Title Age", &target, &source).unwrap();
        assert_eq!(bindings.len(), 2);
        assert_eq!(target.get("Text"), Some(Value::str("Ada")));
        assert_eq!(target.get("Title"), Some(Value::Int(36)));

        source.set("Age", Value::Int(37));
        assert_eq!(target.get("Title"), Some(Value::Int(37)));
        assert_eq!(target.get("Text"), Some(Value::str("Ada")));
    }

    #[test]
    fn computed_source_reevaluates_on_dependency_change() {
        let (target, source) = roots();
        bind("Text Name + \"!\"", &target, &source).unwrap();
        assert_eq!(target.get("Text"), Some(Value::str("Ada!")));

        source.set("Name", Value::str("Grace"));
        assert_eq!(target.get("Text"), Some(Value::str("Grace!")));
    }

    #[test]
    fn mode_parameter_selects_two_way() {
        let (target, source) = roots();
        bind("Text Name, Mode=TwoWay", &target, &source).unwrap();
        assert_eq!(target.get("Text"), Some(Value::str("Ada")));

        target.set("Text", Value::str("edited"));
        assert_eq!(source.get("Name"), Some(Value::str("edited")));
    }

    #[test]
    fn unknown_mode_is_a_creation_error() {
        let (target, source) = roots();
        let err = bind("Text Name, Mode=Sideways", &target, &source).unwrap_err();
        assert!(err.to_string().contains("wiring binding"));
    }

    #[test]
    fn non_member_target_is_a_creation_error() {
        let (target, source) = roots();
        assert!(bind("1 + 2 Name", &target, &source).is_err());
    }

    #[test]
    fn bindings_stop_after_dispose() {
        let (target, source) = roots();
        let bindings = bind("Text Name", &target, &source).unwrap();
        bindings[0].dispose();

        source.set("Name", Value::str("Grace"));
        assert_eq!(target.get("Text"), Some(Value::str("Ada")));
    }
}
