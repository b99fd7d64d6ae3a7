//! Expression parser orchestrator
//!
//! Accepts a binding expression request (raw text, AST nodes, or foreign
//! expression trees plus named parameters) and produces one parser result per
//! statement. Text input is split on top-level `;` before dispatch; grammar
//! errors are accumulated into the metadata error sink so a batch reports all
//! statement-level failures in one pass, while a lexical error aborts the
//! remaining statements.

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use tracing::{debug, trace};

use crate::ast::{BinaryOp, Expr};
use crate::convert::{ConverterContext, ForeignExpr};
use crate::error::WeftError;
use crate::metadata::Metadata;
use crate::parse::context::TokenContext;
use crate::parse::{default_parsers, TokenParser};

/// One leg of a binding expression request
#[derive(Debug, Clone)]
pub enum ExpressionInput {
    Text(String),
    Ast(Expr),
    Foreign(Arc<ForeignExpr>),
}

/// Immutable request: a target leg, an optional source leg, and zero or more
/// `(name, value)` parameter pairs. `from_text` puts a whole (possibly
/// multi-statement) binding string in the target leg.
#[derive(Debug, Clone)]
pub struct BindingExpressionRequest {
    pub target: ExpressionInput,
    pub source: Option<ExpressionInput>,
    pub parameters: Vec<(Option<String>, ExpressionInput)>,
}

impl BindingExpressionRequest {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            target: ExpressionInput::Text(text.into()),
            source: None,
            parameters: Vec::new(),
        }
    }

    pub fn new(
        target: ExpressionInput,
        source: ExpressionInput,
        parameters: Vec<(Option<String>, ExpressionInput)>,
    ) -> Self {
        Self {
            target,
            source: Some(source),
            parameters,
        }
    }
}

/// One parsed statement: target AST, source AST, parameter ASTs (named
/// parameters become `Assign` binaries)
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionParserResult {
    pub target: Expr,
    pub source: Expr,
    pub parameters: Vec<Expr>,
}

impl ExpressionParserResult {
    /// True when neither leg carries an expression
    pub fn is_empty(&self) -> bool {
        self.target.is_empty_member() && self.source.is_empty_member()
    }
}

/// Component-owning parser front end with a per-statement result cache
pub struct ExpressionParser {
    parsers: Arc<[Arc<dyn TokenParser>]>,
    cache: DashMap<String, ExpressionParserResult>,
}

static DEFAULT_PARSER: Lazy<ExpressionParser> = Lazy::new(ExpressionParser::new);

/// Process-wide parser with the standard component set
pub fn default_expression_parser() -> &'static ExpressionParser {
    &DEFAULT_PARSER
}

impl Default for ExpressionParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionParser {
    pub fn new() -> Self {
        Self::with_parsers(default_parsers())
    }

    pub fn with_parsers(parsers: Arc<[Arc<dyn TokenParser>]>) -> Self {
        Self {
            parsers,
            cache: DashMap::new(),
        }
    }

    /// Parse a request into one result per statement, in textual order.
    ///
    /// With an error sink on the metadata, grammar errors are accumulated and
    /// parsing continues; without one, the first error is returned. Lexical
    /// errors abort the remaining statements either way.
    pub fn try_parse(
        &self,
        request: &BindingExpressionRequest,
        metadata: &Metadata,
    ) -> Result<Vec<ExpressionParserResult>, WeftError> {
        match (&request.target, &request.source) {
            (ExpressionInput::Text(text), None) => self.parse_text(text, metadata),
            (target, source) => {
                let target = self.resolve_input(target, metadata)?;
                let source = match source {
                    Some(input) => self.resolve_input(input, metadata)?,
                    None => Expr::EmptyMember,
                };
                let source = collapse_self_reference(&target, source);
                let parameters = self.resolve_parameters(&request.parameters, metadata)?;
                Ok(vec![ExpressionParserResult {
                    target,
                    source,
                    parameters,
                }])
            }
        }
    }

    /// Multi-statement text parse
    pub fn parse_text(
        &self,
        text: &str,
        metadata: &Metadata,
    ) -> Result<Vec<ExpressionParserResult>, WeftError> {
        let statements = match split_statements(text) {
            Ok(statements) => statements,
            Err(err) => {
                // unterminated token: nothing after it can be trusted
                return match metadata.report(err) {
                    Some(err) => Err(err),
                    None => Ok(Vec::new()),
                };
            }
        };

        let mut results = Vec::with_capacity(statements.len());
        for statement in statements {
            if let Some(hit) = self.cache.get(&statement) {
                trace!(statement = %statement, "parse cache hit");
                results.push(hit.clone());
                continue;
            }
            match self.parse_statement(&statement, metadata) {
                Ok(result) => {
                    self.cache.insert(statement, result.clone());
                    results.push(result);
                }
                Err(err @ WeftError::Lexical { .. }) => {
                    debug!(statement = %statement, %err, "lexical error, aborting batch");
                    return match metadata.report(err) {
                        Some(err) => Err(err),
                        None => Ok(results),
                    };
                }
                Err(err) => {
                    debug!(statement = %statement, %err, "statement failed");
                    if let Some(err) = metadata.report(err) {
                        return Err(err);
                    }
                }
            }
        }
        Ok(results)
    }

    /// `target [source] (',' parameter)*`, or `@source` for action macros
    fn parse_statement(
        &self,
        statement: &str,
        metadata: &Metadata,
    ) -> Result<ExpressionParserResult, WeftError> {
        let (text, is_action) = match statement.trim_start().strip_prefix('@') {
            Some(rest) => (rest, true),
            None => (statement, false),
        };

        let mut ctx = TokenContext::new(Arc::clone(&self.parsers));
        ctx.initialize(text, metadata.clone());
        ctx.skip_whitespace();

        if ctx.is_eof() {
            return Ok(ExpressionParserResult {
                target: Expr::EmptyMember,
                source: Expr::EmptyMember,
                parameters: Vec::new(),
            });
        }

        let first = ctx.parse_full()?;
        ctx.skip_whitespace();

        // action macro: the single expression is the side-effect source
        let (target, source) = if is_action {
            (Expr::EmptyMember, first)
        } else if ctx.is_eof() || ctx.peek() == Some(',') {
            (first, Expr::EmptyMember)
        } else {
            let source = ctx.parse_full()?;
            let source = collapse_self_reference(&first, source);
            (first, source)
        };

        let mut parameters = Vec::new();
        let mut seen_names: Vec<String> = Vec::new();
        ctx.skip_whitespace();
        while ctx.eat(',') {
            let parameter = ctx.parse_full()?;
            if let Some(name) = assigned_parameter_name(&parameter) {
                if seen_names.iter().any(|n| n == name) {
                    return Err(WeftError::DuplicateParameter {
                        name: name.to_owned(),
                    });
                }
                seen_names.push(name.to_owned());
            }
            parameters.push(parameter);
            ctx.skip_whitespace();
        }

        ctx.skip_whitespace();
        if !ctx.is_eof() {
            return Err(WeftError::Grammar {
                position: ctx.position(),
                details: format!(
                    "unexpected trailing input '{}'",
                    ctx.get_value(ctx.position(), 12)
                ),
            });
        }

        Ok(ExpressionParserResult {
            target,
            source,
            parameters,
        })
    }

    /// Parse exactly one expression from text (no statement layout)
    pub fn parse_expression(&self, text: &str, metadata: &Metadata) -> Result<Expr, WeftError> {
        let mut ctx = TokenContext::new(Arc::clone(&self.parsers));
        ctx.initialize(text, metadata.clone());
        let expr = ctx.parse_full()?;
        ctx.skip_whitespace();
        if !ctx.is_eof() {
            return Err(WeftError::Grammar {
                position: ctx.position(),
                details: format!(
                    "unexpected trailing input '{}'",
                    ctx.get_value(ctx.position(), 12)
                ),
            });
        }
        Ok(expr)
    }

    fn resolve_input(
        &self,
        input: &ExpressionInput,
        metadata: &Metadata,
    ) -> Result<Expr, WeftError> {
        match input {
            ExpressionInput::Text(text) => self.parse_expression(text, metadata),
            ExpressionInput::Ast(expr) => Ok(expr.clone()),
            ExpressionInput::Foreign(node) => {
                let mut converter = ConverterContext::new(metadata.clone());
                converter.convert(node)
            }
        }
    }

    fn resolve_parameters(
        &self,
        parameters: &[(Option<String>, ExpressionInput)],
        metadata: &Metadata,
    ) -> Result<Vec<Expr>, WeftError> {
        let mut resolved = Vec::with_capacity(parameters.len());
        let mut seen_names: Vec<&str> = Vec::new();
        for (name, input) in parameters {
            let value = self.resolve_input(input, metadata)?;
            match name {
                Some(name) => {
                    if seen_names.contains(&name.as_str()) {
                        return Err(WeftError::DuplicateParameter { name: name.clone() });
                    }
                    seen_names.push(name);
                    resolved.push(Expr::binary(
                        BinaryOp::Assign,
                        Expr::member(name.clone()),
                        value,
                    ));
                }
                None => resolved.push(value),
            }
        }
        Ok(resolved)
    }
}

/// A source expression equal to its own target (or a bare root reference)
/// would observe itself forever; it collapses to a null constant instead
fn collapse_self_reference(target: &Expr, source: Expr) -> Expr {
    if source == *target {
        return Expr::null();
    }
    source
}

/// Named parameters parse as `name = value` assignments
fn assigned_parameter_name(parameter: &Expr) -> Option<&str> {
    match parameter {
        Expr::Binary {
            op: BinaryOp::Assign,
            left,
            ..
        } => match left.as_ref() {
            Expr::Member { target: None, name } => Some(name),
            _ => None,
        },
        _ => None,
    }
}

/// Split on top-level `;`, respecting string/char literals and bracket depth.
/// Empty statements are dropped. Unterminated literals are lexical errors.
fn split_statements(text: &str) -> Result<Vec<String>, WeftError> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for ch in text.chars() {
        if let Some(q) = quote {
            current.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => {
                quote = Some(ch);
                current.push(ch);
            }
            '(' | '[' | '{' => {
                depth += 1;
                current.push(ch);
            }
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ';' if depth == 0 => {
                let statement = current.trim();
                if !statement.is_empty() {
                    statements.push(statement.to_owned());
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if quote.is_some() {
        return Err(WeftError::Lexical {
            position: text.chars().count(),
            details: "unterminated string literal".into(),
        });
    }
    let statement = current.trim();
    if !statement.is_empty() {
        statements.push(statement.to_owned());
    }
    Ok(statements)
}

// ─────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────
