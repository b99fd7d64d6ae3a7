//! Weft - binding-expression compiler and live binding runtime

pub mod ast;
pub mod binder;
pub mod binding;
pub mod convert;
pub mod error;
pub mod eval;
pub mod member;
pub mod metadata;
pub mod object;
pub mod parse;
pub mod value;

pub use ast::{BinaryOp, Expr, UnaryOp};
pub use binder::bind;
pub use binding::{Binding, BindingComponent, BindingSource, BindingState, UpdateResult};
pub use convert::{ConverterContext, ExpressionConverter, ForeignExpr};
pub use error::{FixSuggestion, WeftError};
pub use eval::{evaluate, EvalOutcome, EvalServices};
pub use member::observer::MemberPathObserver;
pub use member::{MemberManager, PathSegment};
pub use metadata::{ErrorSink, Metadata};
pub use object::{ObjectRef, ObservableMap, Subscription, WeakObjectRef};
pub use parse::{BindingExpressionRequest, ExpressionParser, ExpressionParserResult};
pub use value::Value;
