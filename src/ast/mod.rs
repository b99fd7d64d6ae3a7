//! Expression AST
//!
//! The immutable, language-neutral node set produced by the token parsers and
//! the foreign-expression converters. Nodes are pure data: two structurally
//! identical expressions compare equal regardless of where they came from,
//! which is what makes parse caching and golden tests possible.

mod op;
mod render;

pub use op::{BinaryOp, UnaryOp};
pub use render::render;

use crate::value::Value;

/// Type names the member parser treats as static-type references when they
/// appear as the head of a dotted chain (e.g. `string.Format`).
pub const KNOWN_TYPES: &[&str] = &["string", "int", "long", "double", "bool", "char", "object"];

/// Expression node (closed variant set, immutable)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    /// Literal with its parsed type
    Constant(Value),
    /// Property/field-like access; `target == None` resolves against the
    /// active evaluation root
    Member {
        target: Option<Box<Expr>>,
        name: String,
    },
    /// Indexer access
    Index { target: Box<Expr>, args: Vec<Expr> },
    /// Instance/static call; generic type arguments stay as names - no live
    /// type binding happens at parse time
    MethodCall {
        target: Option<Box<Expr>>,
        name: String,
        args: Vec<Expr>,
        type_args: Vec<String>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Condition {
        test: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
    },
    Lambda {
        body: Box<Expr>,
        parameters: Vec<String>,
    },
    /// Lambda parameter reference inside a lambda body
    Parameter(String),
    /// Wraps a Member/Index/MethodCall so evaluation short-circuits to
    /// "no value" when the receiver is absent
    NullConditional(Box<Expr>),
    /// Static-type reference (e.g. `string` in `string.Format`)
    TypeAccess(String),
    /// Sentinel for action-macro targets and empty parse slots
    EmptyMember,
}

impl Expr {
    pub fn constant(value: impl Into<Value>) -> Expr {
        Expr::Constant(value.into())
    }

    pub fn null() -> Expr {
        Expr::Constant(Value::Null)
    }

    /// Root-relative member access
    pub fn member(name: impl Into<String>) -> Expr {
        Expr::Member {
            target: None,
            name: name.into(),
        }
    }

    pub fn member_of(target: Expr, name: impl Into<String>) -> Expr {
        Expr::Member {
            target: Some(Box::new(target)),
            name: name.into(),
        }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn is_empty_member(&self) -> bool {
        matches!(self, Expr::EmptyMember)
    }

    /// The receiver of an access node, if this node is one
    pub fn access_target(&self) -> Option<&Expr> {
        match self {
            Expr::Member { target, .. } | Expr::MethodCall { target, .. } => target.as_deref(),
            Expr::Index { target, .. } => Some(target),
            Expr::NullConditional(inner) => inner.access_target(),
            _ => None,
        }
    }

    /// True when the expression is a pure dotted/indexed member chain rooted
    /// at the evaluation root (the shape a `MemberPathObserver` can watch)
    pub fn is_member_chain(&self) -> bool {
        match self {
            Expr::Member { target: None, .. } => true,
            Expr::Member {
                target: Some(target),
                ..
            } => target.is_member_chain(),
            Expr::Index { target, args } => {
                target.is_member_chain() && args.iter().all(|a| matches!(a, Expr::Constant(_)))
            }
            Expr::NullConditional(inner) => inner.is_member_chain(),
            _ => false,
        }
    }
}
