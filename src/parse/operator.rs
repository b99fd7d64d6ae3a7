//! Operator token parsers: unary, binary (precedence climbing), conditional

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::parse::context::TokenContext;
use crate::parse::{ParseOutcome, TokenParser};

/// Components masked out while parsing an operand, so operator chains are
/// collected flat and reduced against the binding-power table here
const OPERAND_EXCLUSIONS: &[&str] = &["binary", "condition"];

/// Prefix `-`, `!`, `~`
pub struct UnaryTokenParser;

impl TokenParser for UnaryTokenParser {
    fn name(&self) -> &'static str {
        "unary"
    }

    fn priority(&self) -> i32 {
        550
    }

    fn try_parse(&self, ctx: &mut TokenContext, prev: Option<&Expr>) -> ParseOutcome {
        if prev.is_some() {
            return ParseOutcome::Declined;
        }
        let op = match ctx.peek() {
            Some('-') => UnaryOp::Neg,
            Some('!') if ctx.peek_at(1) != Some('=') => UnaryOp::Not,
            Some('~') => UnaryOp::BitNot,
            _ => return ParseOutcome::Declined,
        };
        ctx.advance(1);
        match ctx.parse_excluding(OPERAND_EXCLUSIONS) {
            Ok(operand) => ParseOutcome::Matched(Expr::unary(op, operand)),
            Err(err) => ParseOutcome::Fatal(err),
        }
    }
}

/// Binary operators (incl. null-coalescing and assignment).
///
/// Collects the operator/operand chain flat, then reduces it by precedence
/// climbing over the `BinaryOp` binding-power table.
pub struct BinaryTokenParser;

impl TokenParser for BinaryTokenParser {
    fn name(&self) -> &'static str {
        "binary"
    }

    fn priority(&self) -> i32 {
        500
    }

    fn try_parse(&self, ctx: &mut TokenContext, prev: Option<&Expr>) -> ParseOutcome {
        let Some(prev) = prev else {
            return ParseOutcome::Declined;
        };
        let Some(first_op) = scan_operator(ctx) else {
            return ParseOutcome::Declined;
        };

        let mut pairs = Vec::new();
        let first_operand = match ctx.parse_excluding(OPERAND_EXCLUSIONS) {
            Ok(operand) => operand,
            Err(err) => return ParseOutcome::Fatal(err),
        };
        pairs.push((first_op, first_operand));

        loop {
            let mark = ctx.position();
            ctx.skip_whitespace();
            let Some(op) = scan_operator(ctx) else {
                let _ = ctx.set_position(mark);
                break;
            };
            match ctx.parse_excluding(OPERAND_EXCLUSIONS) {
                Ok(operand) => pairs.push((op, operand)),
                Err(err) => return ParseOutcome::Fatal(err),
            }
        }

        let mut iter = pairs.into_iter().peekable();
        ParseOutcome::Matched(climb(prev.clone(), &mut iter, 0))
    }
}

/// Maximal-munch operator scan; consumes the token on success
fn scan_operator(ctx: &mut TokenContext) -> Option<BinaryOp> {
    for (symbol, op) in BinaryOp::scan_table() {
        if ctx.looking_at(symbol) {
            // `=` must not swallow the lambda arrow
            if *symbol == "=" && matches!(ctx.peek_at(1), Some('>') | Some('=')) {
                continue;
            }
            ctx.advance(symbol.chars().count());
            return Some(*op);
        }
    }
    None
}

type OpPairs = std::iter::Peekable<std::vec::IntoIter<(BinaryOp, Expr)>>;

/// Precedence climbing over a flat (op, operand) chain
fn climb(mut left: Expr, pairs: &mut OpPairs, min_bp: u8) -> Expr {
    while let Some((op, _)) = pairs.peek() {
        let bp = op.binding_power();
        if bp < min_bp {
            break;
        }
        let (op, mut right) = pairs.next().expect("peeked pair");
        while let Some((next, _)) = pairs.peek() {
            let next_bp = next.binding_power();
            if next_bp > bp || (next_bp == bp && next.is_right_associative()) {
                right = climb(right, pairs, if next_bp == bp { bp } else { bp + 1 });
            } else {
                break;
            }
        }
        left = Expr::binary(op, left, right);
    }
    left
}

/// Ternary `test ? ifTrue : ifFalse`
pub struct ConditionTokenParser;

impl TokenParser for ConditionTokenParser {
    fn name(&self) -> &'static str {
        "condition"
    }

    fn priority(&self) -> i32 {
        450
    }

    fn try_parse(&self, ctx: &mut TokenContext, prev: Option<&Expr>) -> ParseOutcome {
        let Some(prev) = prev else {
            return ParseOutcome::Declined;
        };
        // '?.' / '?[' / '??' belong to other components
        if ctx.peek() != Some('?') || matches!(ctx.peek_at(1), Some('.') | Some('[') | Some('?')) {
            return ParseOutcome::Declined;
        }
        ctx.advance(1);
        let if_true = match ctx.parse_full() {
            Ok(node) => node,
            Err(err) => return ParseOutcome::Fatal(err),
        };
        ctx.skip_whitespace();
        if !ctx.eat(':') {
            return ParseOutcome::Fatal(crate::error::WeftError::Grammar {
                position: ctx.position(),
                details: "expected ':' in conditional expression".into(),
            });
        }
        let if_false = match ctx.parse_full() {
            Ok(node) => node,
            Err(err) => return ParseOutcome::Fatal(err),
        };
        ParseOutcome::Matched(Expr::Condition {
            test: Box::new(prev.clone()),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
        })
    }
}
