//! Member access and type-access token parsers

use crate::ast::{Expr, KNOWN_TYPES};
use crate::parse::context::TokenContext;
use crate::parse::{ParseOutcome, TokenParser};

/// Identifiers at primary position, plus `.member` / `?.member` postfix
/// access on a previous node.
///
/// A known type name heading a dotted chain becomes a `TypeAccess` node so
/// expressions like `string.Format(...)` resolve statically.
pub struct MemberTokenParser;

impl TokenParser for MemberTokenParser {
    fn name(&self) -> &'static str {
        "member"
    }

    fn priority(&self) -> i32 {
        700
    }

    fn try_parse(&self, ctx: &mut TokenContext, prev: Option<&Expr>) -> ParseOutcome {
        match prev {
            None => self.parse_primary(ctx),
            Some(prev) => self.parse_postfix(ctx, prev),
        }
    }
}

impl MemberTokenParser {
    fn parse_primary(&self, ctx: &mut TokenContext) -> ParseOutcome {
        let Some(name) = ctx.read_identifier() else {
            return ParseOutcome::Declined;
        };
        if KNOWN_TYPES.contains(&name.as_str()) {
            let mark = ctx.position();
            ctx.skip_whitespace();
            let dotted = ctx.peek() == Some('.') && ctx.peek_at(1) != Some('.');
            let _ = ctx.set_position(mark);
            if dotted {
                return ParseOutcome::Matched(Expr::TypeAccess(name));
            }
        }
        ParseOutcome::Matched(Expr::member(name))
    }

    fn parse_postfix(&self, ctx: &mut TokenContext, prev: &Expr) -> ParseOutcome {
        let null_conditional = if ctx.eat_str("?.") {
            true
        } else if ctx.peek() == Some('.') && !ctx.looking_at("..") {
            ctx.advance(1);
            false
        } else {
            return ParseOutcome::Declined;
        };
        ctx.skip_whitespace();
        let Some(name) = ctx.read_identifier() else {
            return ParseOutcome::Declined;
        };
        let member = Expr::member_of(prev.clone(), name);
        if null_conditional {
            ParseOutcome::Matched(Expr::NullConditional(Box::new(member)))
        } else {
            ParseOutcome::Matched(member)
        }
    }
}
