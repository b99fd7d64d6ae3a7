//! Expression text -> AST parsing
//!
//! - [`TokenParser`] components, consulted in descending priority order
//! - [`TokenContext`] scanner state with bounds-checked cursor and limit
//! - [`orchestrator`] statement-level parse (targets, sources, parameters)

pub mod call;
pub mod context;
pub mod literal;
pub mod member;
pub mod operator;
pub mod orchestrator;

use std::sync::Arc;

use crate::ast::Expr;
use crate::error::WeftError;

pub use call::{IndexerTokenParser, LambdaTokenParser, MethodCallTokenParser, ParenTokenParser};
pub use context::TokenContext;
pub use literal::{DigitTokenParser, KeywordTokenParser, NumericPolicy, StringTokenParser};
pub use member::MemberTokenParser;
pub use operator::{BinaryTokenParser, ConditionTokenParser, UnaryTokenParser};
pub use orchestrator::{
    default_expression_parser, BindingExpressionRequest, ExpressionInput, ExpressionParser,
    ExpressionParserResult,
};

/// Result of offering the current cursor position to one component
#[derive(Debug)]
pub enum ParseOutcome {
    /// The component consumed input and produced a node
    Matched(Expr),
    /// Not this component's token; the cursor is restored by the caller
    Declined,
    /// The component recognized its token but the input is malformed.
    /// Aborts the current expression parse.
    Fatal(WeftError),
}

/// One grammar component. Implementations are consulted highest priority
/// first, at primary position (`prev == None`) and again as postfix offers
/// (`prev == Some`). A component that declines must leave the cursor where
/// it found it; `TokenContext::try_parse` restores it regardless.
pub trait TokenParser: Send + Sync {
    fn name(&self) -> &'static str;

    fn priority(&self) -> i32;

    fn try_parse(&self, ctx: &mut TokenContext, prev: Option<&Expr>) -> ParseOutcome;
}

/// The standard component set, sorted by descending priority
pub fn default_parsers() -> Arc<[Arc<dyn TokenParser>]> {
    build_parsers(NumericPolicy::default())
}

/// Standard component set with an explicit numeric-literal widening policy
pub fn build_parsers(policy: NumericPolicy) -> Arc<[Arc<dyn TokenParser>]> {
    let mut parsers: Vec<Arc<dyn TokenParser>> = vec![
        Arc::new(LambdaTokenParser),
        Arc::new(ParenTokenParser),
        Arc::new(StringTokenParser),
        Arc::new(DigitTokenParser::new(policy)),
        Arc::new(KeywordTokenParser),
        Arc::new(MemberTokenParser),
        Arc::new(IndexerTokenParser),
        Arc::new(MethodCallTokenParser),
        Arc::new(UnaryTokenParser),
        Arc::new(BinaryTokenParser),
        Arc::new(ConditionTokenParser),
    ];
    parsers.sort_by_key(|p| std::cmp::Reverse(p.priority()));
    parsers.into()
}
