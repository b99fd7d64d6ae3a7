//! Structural token parsers: indexers, method calls, lambdas, parentheses

use crate::ast::Expr;
use crate::error::WeftError;
use crate::parse::context::TokenContext;
use crate::parse::{ParseOutcome, TokenParser};

/// `target[...]` and `target?[...]` indexer access
pub struct IndexerTokenParser;

impl TokenParser for IndexerTokenParser {
    fn name(&self) -> &'static str {
        "indexer"
    }

    fn priority(&self) -> i32 {
        650
    }

    fn try_parse(&self, ctx: &mut TokenContext, prev: Option<&Expr>) -> ParseOutcome {
        let Some(prev) = prev else {
            return ParseOutcome::Declined;
        };
        let null_conditional = if ctx.eat_str("?[") {
            true
        } else if ctx.eat('[') {
            false
        } else {
            return ParseOutcome::Declined;
        };
        let args = match parse_argument_list(ctx, ']') {
            Ok(args) => args,
            Err(err) => return ParseOutcome::Fatal(err),
        };
        let index = Expr::Index {
            target: Box::new(prev.clone()),
            args,
        };
        if null_conditional {
            ParseOutcome::Matched(Expr::NullConditional(Box::new(index)))
        } else {
            ParseOutcome::Matched(index)
        }
    }
}

/// Turns a parsed member followed by `(`/`<T>(` into a method call
pub struct MethodCallTokenParser;

impl TokenParser for MethodCallTokenParser {
    fn name(&self) -> &'static str {
        "method"
    }

    fn priority(&self) -> i32 {
        600
    }

    fn try_parse(&self, ctx: &mut TokenContext, prev: Option<&Expr>) -> ParseOutcome {
        // The callee shape this component understands: the member parser just
        // produced the method name (possibly under a ?. wrapper).
        let (target, name, null_conditional) = match prev {
            Some(Expr::Member { target, name }) => (target.clone(), name.clone(), false),
            Some(Expr::NullConditional(inner)) => match inner.as_ref() {
                Expr::Member { target, name } => (target.clone(), name.clone(), true),
                _ => return ParseOutcome::Declined,
            },
            _ => return ParseOutcome::Declined,
        };

        let start = ctx.position();
        let type_args = match parse_type_arguments(ctx) {
            Some(args) => args,
            None => {
                let _ = ctx.set_position(start);
                Vec::new()
            }
        };
        if !ctx.eat('(') {
            let _ = ctx.set_position(start);
            return ParseOutcome::Declined;
        }
        let args = match parse_argument_list(ctx, ')') {
            Ok(args) => args,
            Err(err) => return ParseOutcome::Fatal(err),
        };
        let call = Expr::MethodCall {
            target,
            name,
            args,
            type_args,
        };
        if null_conditional {
            ParseOutcome::Matched(Expr::NullConditional(Box::new(call)))
        } else {
            ParseOutcome::Matched(call)
        }
    }
}

/// `<T1, T2>` generic argument list; `None` means "not one, rewind"
fn parse_type_arguments(ctx: &mut TokenContext) -> Option<Vec<String>> {
    if !ctx.eat('<') {
        return None;
    }
    let mut names = Vec::new();
    loop {
        ctx.skip_whitespace();
        let name = ctx.read_identifier()?;
        names.push(name);
        ctx.skip_whitespace();
        if ctx.eat('>') {
            return Some(names);
        }
        if !ctx.eat(',') {
            return None;
        }
    }
}

/// Comma-separated expressions up to `close`; the empty list is allowed
fn parse_argument_list(ctx: &mut TokenContext, close: char) -> Result<Vec<Expr>, WeftError> {
    let mut args = Vec::new();
    ctx.skip_whitespace();
    if ctx.eat(close) {
        return Ok(args);
    }
    loop {
        args.push(ctx.parse_full()?);
        ctx.skip_whitespace();
        if ctx.eat(close) {
            return Ok(args);
        }
        if !ctx.eat(',') {
            return Err(WeftError::Grammar {
                position: ctx.position(),
                details: format!("expected ',' or '{close}' in argument list"),
            });
        }
    }
}

/// `x => body`, `(x, y) => body`, `() => body`
pub struct LambdaTokenParser;

impl TokenParser for LambdaTokenParser {
    fn name(&self) -> &'static str {
        "lambda"
    }

    fn priority(&self) -> i32 {
        1000
    }

    fn try_parse(&self, ctx: &mut TokenContext, prev: Option<&Expr>) -> ParseOutcome {
        if prev.is_some() {
            return ParseOutcome::Declined;
        }
        let start = ctx.position();
        let Some(parameters) = scan_parameter_list(ctx) else {
            let _ = ctx.set_position(start);
            return ParseOutcome::Declined;
        };
        let body = match ctx.parse_full() {
            Ok(body) => body,
            Err(err) => return ParseOutcome::Fatal(err),
        };
        let body = bind_parameters(body, &parameters);
        ParseOutcome::Matched(Expr::Lambda {
            body: Box::new(body),
            parameters,
        })
    }
}

/// Scan `ident =>` or `( [ident, ...] ) =>`; `None` means "not a lambda"
fn scan_parameter_list(ctx: &mut TokenContext) -> Option<Vec<String>> {
    let mut parameters = Vec::new();
    if ctx.eat('(') {
        ctx.skip_whitespace();
        if !ctx.eat(')') {
            loop {
                ctx.skip_whitespace();
                parameters.push(ctx.read_identifier()?);
                ctx.skip_whitespace();
                if ctx.eat(')') {
                    break;
                }
                if !ctx.eat(',') {
                    return None;
                }
            }
        }
    } else {
        parameters.push(ctx.read_identifier()?);
    }
    ctx.skip_whitespace();
    if ctx.eat_str("=>") {
        Some(parameters)
    } else {
        None
    }
}

/// Rewrite root-relative members that name a parameter into Parameter nodes,
/// respecting shadowing by nested lambdas
fn bind_parameters(expr: Expr, parameters: &[String]) -> Expr {
    match expr {
        Expr::Member { target: None, ref name } if parameters.contains(name) => {
            Expr::Parameter(name.clone())
        }
        Expr::Member { target: Some(target), name } => Expr::Member {
            target: Some(Box::new(bind_parameters(*target, parameters))),
            name,
        },
        Expr::Index { target, args } => Expr::Index {
            target: Box::new(bind_parameters(*target, parameters)),
            args: args
                .into_iter()
                .map(|a| bind_parameters(a, parameters))
                .collect(),
        },
        Expr::MethodCall {
            target,
            name,
            args,
            type_args,
        } => Expr::MethodCall {
            target: target.map(|t| Box::new(bind_parameters(*t, parameters))),
            name,
            args: args
                .into_iter()
                .map(|a| bind_parameters(a, parameters))
                .collect(),
            type_args,
        },
        Expr::Binary { op, left, right } => Expr::Binary {
            op,
            left: Box::new(bind_parameters(*left, parameters)),
            right: Box::new(bind_parameters(*right, parameters)),
        },
        Expr::Unary { op, operand } => Expr::Unary {
            op,
            operand: Box::new(bind_parameters(*operand, parameters)),
        },
        Expr::Condition {
            test,
            if_true,
            if_false,
        } => Expr::Condition {
            test: Box::new(bind_parameters(*test, parameters)),
            if_true: Box::new(bind_parameters(*if_true, parameters)),
            if_false: Box::new(bind_parameters(*if_false, parameters)),
        },
        Expr::Lambda { body, parameters: inner } => {
            let visible: Vec<String> = parameters
                .iter()
                .filter(|p| !inner.contains(p))
                .cloned()
                .collect();
            Expr::Lambda {
                body: Box::new(bind_parameters(*body, &visible)),
                parameters: inner,
            }
        }
        Expr::NullConditional(node) => {
            Expr::NullConditional(Box::new(bind_parameters(*node, parameters)))
        }
        other => other,
    }
}

/// `( expr )` grouping
pub struct ParenTokenParser;

impl TokenParser for ParenTokenParser {
    fn name(&self) -> &'static str {
        "paren"
    }

    fn priority(&self) -> i32 {
        950
    }

    fn try_parse(&self, ctx: &mut TokenContext, prev: Option<&Expr>) -> ParseOutcome {
        if prev.is_some() || !ctx.eat('(') {
            return ParseOutcome::Declined;
        }
        let inner = match ctx.parse_full() {
            Ok(inner) => inner,
            Err(err) => return ParseOutcome::Fatal(err),
        };
        ctx.skip_whitespace();
        if !ctx.eat(')') {
            return ParseOutcome::Fatal(WeftError::Grammar {
                position: ctx.position(),
                details: "expected ')'".into(),
            });
        }
        ParseOutcome::Matched(inner)
    }
}
