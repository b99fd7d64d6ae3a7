//! Literal token parsers: strings, chars, numbers, keyword constants

use crate::ast::Expr;
use crate::error::WeftError;
use crate::parse::context::TokenContext;
use crate::parse::{ParseOutcome, TokenParser};
use crate::value::Value;

/// Numeric literal type-inference policy.
///
/// The narrowest-fit rule mirrors the documented test fixtures; it is kept a
/// policy rather than a hard invariant so hosts can pin integer literals to
/// one width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NumericPolicy {
    /// i32 if it fits, else i64, else f64; `.`/exponent always means f64
    #[default]
    NarrowestFit,
    /// Every integral literal is an i64
    AlwaysLong,
}

/// `"..."` and `'c'` literals with escapes; unterminated input is a lexical
/// error that aborts the statement batch
pub struct StringTokenParser;

impl TokenParser for StringTokenParser {
    fn name(&self) -> &'static str {
        "string"
    }

    fn priority(&self) -> i32 {
        900
    }

    fn try_parse(&self, ctx: &mut TokenContext, prev: Option<&Expr>) -> ParseOutcome {
        if prev.is_some() {
            return ParseOutcome::Declined;
        }
        match ctx.peek() {
            Some('"') => parse_quoted(ctx, '"'),
            Some('\'') => parse_quoted(ctx, '\''),
            _ => ParseOutcome::Declined,
        }
    }
}

fn parse_quoted(ctx: &mut TokenContext, quote: char) -> ParseOutcome {
    let start = ctx.position();
    ctx.advance(1);
    let mut out = String::new();
    loop {
        match ctx.peek() {
            None => {
                return ParseOutcome::Fatal(WeftError::Lexical {
                    position: start,
                    details: format!("unterminated {} literal", if quote == '"' { "string" } else { "char" }),
                })
            }
            Some(c) if c == quote => {
                ctx.advance(1);
                break;
            }
            Some('\\') => {
                ctx.advance(1);
                let escaped = match ctx.peek() {
                    Some('n') => '\n',
                    Some('r') => '\r',
                    Some('t') => '\t',
                    Some('0') => '\0',
                    Some('\\') => '\\',
                    Some(c) if c == quote => quote,
                    other => {
                        return ParseOutcome::Fatal(WeftError::Lexical {
                            position: ctx.position(),
                            details: format!("unknown escape '\\{}'", other.unwrap_or(' ')),
                        })
                    }
                };
                out.push(escaped);
                ctx.advance(1);
            }
            Some(c) => {
                out.push(c);
                ctx.advance(1);
            }
        }
    }
    if quote == '\'' {
        let mut chars = out.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => ParseOutcome::Matched(Expr::Constant(Value::Char(c))),
            _ => ParseOutcome::Fatal(WeftError::Lexical {
                position: start,
                details: "char literal must contain exactly one character".into(),
            }),
        }
    } else {
        ParseOutcome::Matched(Expr::Constant(Value::from(out)))
    }
}

/// Suffix-free (or `l`/`L`, `f`/`F`, `d`/`D` suffixed) numeric literals
pub struct DigitTokenParser {
    policy: NumericPolicy,
}

impl DigitTokenParser {
    pub fn new(policy: NumericPolicy) -> Self {
        Self { policy }
    }
}

impl Default for DigitTokenParser {
    fn default() -> Self {
        Self::new(NumericPolicy::default())
    }
}

impl TokenParser for DigitTokenParser {
    fn name(&self) -> &'static str {
        "digit"
    }

    fn priority(&self) -> i32 {
        850
    }

    fn try_parse(&self, ctx: &mut TokenContext, prev: Option<&Expr>) -> ParseOutcome {
        if prev.is_some() || !ctx.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            return ParseOutcome::Declined;
        }
        let start = ctx.position();
        let mut is_float = false;

        while ctx.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            ctx.advance(1);
        }
        // A '.' only belongs to the number when a digit follows; `1.ToString()`
        // leaves the dot for the member parser.
        if ctx.peek() == Some('.') && ctx.peek_at(1).map(|c| c.is_ascii_digit()).unwrap_or(false) {
            is_float = true;
            ctx.advance(1);
            while ctx.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                ctx.advance(1);
            }
        }
        if matches!(ctx.peek(), Some('e') | Some('E')) {
            let mut lookahead = 1;
            if matches!(ctx.peek_at(1), Some('+') | Some('-')) {
                lookahead = 2;
            }
            if ctx.peek_at(lookahead).map(|c| c.is_ascii_digit()).unwrap_or(false) {
                is_float = true;
                ctx.advance(lookahead);
                while ctx.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                    ctx.advance(1);
                }
            }
        }

        let digits = ctx.get_value(start, ctx.position() - start);
        let suffix = match ctx.peek() {
            Some(c @ ('l' | 'L' | 'f' | 'F' | 'd' | 'D' | 'u' | 'U')) => {
                ctx.advance(1);
                Some(c.to_ascii_lowercase())
            }
            _ => None,
        };

        let value = match (is_float, suffix) {
            (_, Some('f')) | (_, Some('d')) | (true, _) => match digits.parse::<f64>() {
                Ok(d) => Value::Double(d),
                Err(e) => {
                    return ParseOutcome::Fatal(WeftError::Lexical {
                        position: start,
                        details: format!("malformed numeric literal '{digits}': {e}"),
                    })
                }
            },
            (false, Some('l')) => match digits.parse::<i64>() {
                Ok(l) => Value::Long(l),
                Err(e) => {
                    return ParseOutcome::Fatal(WeftError::Lexical {
                        position: start,
                        details: format!("malformed numeric literal '{digits}': {e}"),
                    })
                }
            },
            (false, _) => match self.policy {
                NumericPolicy::NarrowestFit => {
                    if let Ok(i) = digits.parse::<i32>() {
                        Value::Int(i)
                    } else if let Ok(l) = digits.parse::<i64>() {
                        Value::Long(l)
                    } else if let Ok(d) = digits.parse::<f64>() {
                        Value::Double(d)
                    } else {
                        return ParseOutcome::Fatal(WeftError::Lexical {
                            position: start,
                            details: format!("malformed numeric literal '{digits}'"),
                        });
                    }
                }
                NumericPolicy::AlwaysLong => match digits.parse::<i64>() {
                    Ok(l) => Value::Long(l),
                    Err(e) => {
                        return ParseOutcome::Fatal(WeftError::Lexical {
                            position: start,
                            details: format!("malformed numeric literal '{digits}': {e}"),
                        })
                    }
                },
            },
        };
        ParseOutcome::Matched(Expr::Constant(value))
    }
}

/// `true` / `false` / `null` keyword constants
pub struct KeywordTokenParser;

impl TokenParser for KeywordTokenParser {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn priority(&self) -> i32 {
        800
    }

    fn try_parse(&self, ctx: &mut TokenContext, prev: Option<&Expr>) -> ParseOutcome {
        if prev.is_some() {
            return ParseOutcome::Declined;
        }
        let start = ctx.position();
        let Some(word) = ctx.read_identifier() else {
            return ParseOutcome::Declined;
        };
        let value = match word.as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            "null" => Value::Null,
            _ => {
                // Not a keyword; leave the identifier for the member parser
                let _ = ctx.set_position(start);
                return ParseOutcome::Declined;
            }
        };
        ParseOutcome::Matched(Expr::Constant(value))
    }
}
