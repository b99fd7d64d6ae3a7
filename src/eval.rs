//! Expression evaluation against live object graphs
//!
//! Evaluation is tri-state: a value, `Unset` (the path currently resolves to
//! nothing - also produced by null-conditional short-circuits), or `Fault`
//! (a getter/method threw). Resolution failures never panic and never throw
//! through the runtime.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::error::WeftError;
use crate::member::reflect::{
    CachingDelegateProvider, DelegateProvider, MapDelegateProvider,
};
use crate::member::{
    member_path, read_hop, write_hop, ChainCursor, MemberDescriptor, MemberFlags, MemberKind,
    PathSegment,
};
use crate::object::ObjectRef;
use crate::value::{LambdaValue, Value};

/// Tri-state evaluation result
#[derive(Debug, Clone, PartialEq)]
pub enum EvalOutcome {
    Value(Value),
    /// The expression currently has no value (unresolved path, dead root,
    /// null-conditional short-circuit)
    Unset,
    /// A resolved member's getter/setter/method threw
    Fault(WeftError),
}

impl EvalOutcome {
    pub fn value(self) -> Option<Value> {
        match self {
            EvalOutcome::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, EvalOutcome::Unset)
    }
}

impl From<Result<Option<Value>, WeftError>> for EvalOutcome {
    fn from(result: Result<Option<Value>, WeftError>) -> Self {
        match result {
            Ok(Some(value)) => EvalOutcome::Value(value),
            Ok(None) => EvalOutcome::Unset,
            Err(error) => EvalOutcome::Fault(error),
        }
    }
}

/// Shared evaluation collaborators (member delegates, cached)
#[derive(Clone)]
pub struct EvalServices {
    provider: Arc<dyn DelegateProvider>,
}

impl Default for EvalServices {
    fn default() -> Self {
        Self {
            provider: Arc::new(CachingDelegateProvider::new(MapDelegateProvider::new())),
        }
    }
}

impl EvalServices {
    pub fn new(provider: Arc<dyn DelegateProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<dyn DelegateProvider> {
        &self.provider
    }
}

/// Evaluates `expr` with root-relative members resolved against `root`
pub fn evaluate(expr: &Expr, root: &ObjectRef, services: &EvalServices) -> EvalOutcome {
    let scope = FxHashMap::default();
    eval_scoped(expr, root, services, &scope)
}

/// Invokes a lambda value with bound argument values
pub fn invoke_lambda(
    lambda: &LambdaValue,
    args: &[Value],
    root: &ObjectRef,
    services: &EvalServices,
) -> EvalOutcome {
    let mut scope = FxHashMap::default();
    for (parameter, value) in lambda.parameters.iter().zip(args) {
        scope.insert(parameter.clone(), value.clone());
    }
    eval_scoped(&lambda.body, root, services, &scope)
}

type Scope = FxHashMap<String, Value>;

fn eval_scoped(expr: &Expr, root: &ObjectRef, services: &EvalServices, scope: &Scope) -> EvalOutcome {
    match expr {
        Expr::Constant(value) => EvalOutcome::Value(value.clone()),
        Expr::Parameter(name) => match scope.get(name) {
            Some(value) => EvalOutcome::Value(value.clone()),
            None => EvalOutcome::Unset,
        },
        Expr::EmptyMember | Expr::TypeAccess(_) => EvalOutcome::Unset,
        Expr::Member { target, name } => {
            let receiver = match eval_receiver(target.as_deref(), root, services, scope) {
                Ok(receiver) => receiver,
                Err(outcome) => return outcome,
            };
            read_member(&receiver, name, services)
        }
        Expr::Index { target, args } => {
            let receiver = match eval_receiver(Some(target), root, services, scope) {
                Ok(receiver) => receiver,
                Err(outcome) => return outcome,
            };
            let args = match eval_args(args, root, services, scope) {
                Ok(args) => args,
                Err(outcome) => return outcome,
            };
            let cursor = match ChainCursor::from_value(receiver) {
                Some(cursor) => cursor,
                None => return EvalOutcome::Unset,
            };
            read_hop(&cursor, &PathSegment::Index(args)).into()
        }
        Expr::MethodCall {
            target, name, args, ..
        } => {
            let args = match eval_args(args, root, services, scope) {
                Ok(args) => args,
                Err(outcome) => return outcome,
            };
            let receiver = match target {
                // root-relative calls dispatch on the active root
                None => Value::Object(Arc::clone(root)),
                Some(target) => match eval_scoped(target, root, services, scope) {
                    EvalOutcome::Value(value) => value,
                    other => return other,
                },
            };
            invoke_member(&receiver, name, &args, root, services)
        }
        Expr::NullConditional(inner) => match eval_scoped(inner, root, services, scope) {
            EvalOutcome::Fault(error) => EvalOutcome::Fault(error),
            other => other,
        },
        Expr::Lambda { body, parameters } => EvalOutcome::Value(Value::Lambda(Arc::new(
            LambdaValue {
                parameters: parameters.clone(),
                body: (**body).clone(),
            },
        ))),
        Expr::Unary { op, operand } => match eval_scoped(operand, root, services, scope) {
            EvalOutcome::Value(value) => eval_unary(*op, value),
            other => other,
        },
        Expr::Condition {
            test,
            if_true,
            if_false,
        } => match eval_scoped(test, root, services, scope) {
            EvalOutcome::Value(value) => match value.as_bool() {
                Some(true) => eval_scoped(if_true, root, services, scope),
                Some(false) => eval_scoped(if_false, root, services, scope),
                None => type_fault("condition test", &value),
            },
            other => other,
        },
        Expr::Binary { op, left, right } => eval_binary(*op, left, right, root, services, scope),
    }
}

/// Evaluates an access receiver. `Err` carries the outcome to propagate:
/// faults pass through, and an absent receiver short-circuits to `Unset`.
fn eval_receiver(
    target: Option<&Expr>,
    root: &ObjectRef,
    services: &EvalServices,
    scope: &Scope,
) -> Result<Value, EvalOutcome> {
    match target {
        None => Ok(Value::Object(Arc::clone(root))),
        Some(target) => match eval_scoped(target, root, services, scope) {
            EvalOutcome::Value(Value::Null) => Err(EvalOutcome::Unset),
            EvalOutcome::Value(value) => Ok(value),
            EvalOutcome::Unset => Err(EvalOutcome::Unset),
            fault @ EvalOutcome::Fault(_) => Err(fault),
        },
    }
}

fn eval_args(
    args: &[Expr],
    root: &ObjectRef,
    services: &EvalServices,
    scope: &Scope,
) -> Result<Vec<Value>, EvalOutcome> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        match eval_scoped(arg, root, services, scope) {
            EvalOutcome::Value(value) => values.push(value),
            EvalOutcome::Unset => values.push(Value::Null),
            fault @ EvalOutcome::Fault(_) => return Err(fault),
        }
    }
    Ok(values)
}

fn read_member(receiver: &Value, name: &str, services: &EvalServices) -> EvalOutcome {
    match receiver {
        Value::Object(object) => {
            let member = MemberDescriptor::new(
                name,
                MemberKind::Accessor,
                MemberFlags::INSTANCE | MemberFlags::DYNAMIC,
                object.type_name(),
            );
            match services.provider.try_get_getter(&member) {
                Some(getter) => getter(object).into(),
                None => EvalOutcome::Unset,
            }
        }
        // built-in pseudo-members on plain values
        Value::Str(s) if name == "Length" => EvalOutcome::Value(Value::Int(s.chars().count() as i32)),
        Value::Array(items) if name == "Length" || name == "Count" => {
            EvalOutcome::Value(Value::Int(items.len() as i32))
        }
        _ => EvalOutcome::Unset,
    }
}

fn invoke_member(
    receiver: &Value,
    name: &str,
    args: &[Value],
    root: &ObjectRef,
    services: &EvalServices,
) -> EvalOutcome {
    match receiver {
        Value::Object(object) if object.has_method(name) => {
            let member = MemberDescriptor::new(
                name,
                MemberKind::Method,
                MemberFlags::INSTANCE,
                object.type_name(),
            );
            match services.provider.try_get_invoker(&member) {
                Some(invoker) => match invoker(object, args) {
                    Ok(value) => EvalOutcome::Value(value),
                    Err(error) => EvalOutcome::Fault(error),
                },
                None => EvalOutcome::Unset,
            }
        }
        Value::Lambda(lambda) if name == "Invoke" => invoke_lambda(lambda, args, root, services),
        _ if name == "ToString" => EvalOutcome::Value(Value::str(receiver.to_string())),
        _ => EvalOutcome::Unset,
    }
}

fn eval_binary(
    op: BinaryOp,
    left: &Expr,
    right: &Expr,
    root: &ObjectRef,
    services: &EvalServices,
    scope: &Scope,
) -> EvalOutcome {
    // short-circuit forms first
    match op {
        BinaryOp::And | BinaryOp::Or => {
            let lhs = match eval_scoped(left, root, services, scope) {
                EvalOutcome::Value(value) => value,
                other => return other,
            };
            let Some(lhs) = lhs.as_bool() else {
                return type_fault("logical operand", &lhs);
            };
            if (op == BinaryOp::And && !lhs) || (op == BinaryOp::Or && lhs) {
                return EvalOutcome::Value(Value::Bool(lhs));
            }
            return match eval_scoped(right, root, services, scope) {
                EvalOutcome::Value(value) => match value.as_bool() {
                    Some(rhs) => EvalOutcome::Value(Value::Bool(rhs)),
                    None => type_fault("logical operand", &value),
                },
                other => other,
            };
        }
        BinaryOp::Coalesce => {
            return match eval_scoped(left, root, services, scope) {
                EvalOutcome::Value(value) if !value.is_null() => EvalOutcome::Value(value),
                EvalOutcome::Fault(error) => EvalOutcome::Fault(error),
                _ => eval_scoped(right, root, services, scope),
            };
        }
        BinaryOp::Assign => {
            let value = match eval_scoped(right, root, services, scope) {
                EvalOutcome::Value(value) => value,
                EvalOutcome::Unset => Value::Null,
                fault @ EvalOutcome::Fault(_) => return fault,
            };
            return assign(left, value, root);
        }
        _ => {}
    }

    let lhs = match eval_scoped(left, root, services, scope) {
        EvalOutcome::Value(value) => value,
        other => return other,
    };
    let rhs = match eval_scoped(right, root, services, scope) {
        EvalOutcome::Value(value) => value,
        other => return other,
    };
    apply_binary(op, lhs, rhs)
}

/// Writes through a member-chain left-hand side
fn assign(left: &Expr, value: Value, root: &ObjectRef) -> EvalOutcome {
    let Some(segments) = member_path(left) else {
        return EvalOutcome::Fault(WeftError::MemberFault {
            member: crate::ast::render(left),
            details: "assignment target is not a member chain".into(),
        });
    };
    let mut cursor = ChainCursor::Object(Arc::clone(root));
    for segment in &segments[..segments.len() - 1] {
        match read_hop(&cursor, segment) {
            Ok(Some(next)) => match ChainCursor::from_value(next) {
                Some(next) => cursor = next,
                None => return EvalOutcome::Unset,
            },
            Ok(None) => return EvalOutcome::Unset,
            Err(error) => return EvalOutcome::Fault(error),
        }
    }
    let tail = segments.last().expect("non-empty chain");
    match write_hop(&cursor, tail, value.clone()) {
        Ok(()) => {
            trace!(target = %crate::ast::render(left), "assigned value");
            EvalOutcome::Value(value)
        }
        Err(error) => EvalOutcome::Fault(error),
    }
}

fn eval_unary(op: UnaryOp, value: Value) -> EvalOutcome {
    match op {
        UnaryOp::Neg => match value {
            Value::Int(v) => EvalOutcome::Value(Value::Int(-v)),
            Value::Long(v) => EvalOutcome::Value(Value::Long(-v)),
            Value::Double(v) => EvalOutcome::Value(Value::Double(-v)),
            other => type_fault("negation operand", &other),
        },
        UnaryOp::Not => match value.as_bool() {
            Some(v) => EvalOutcome::Value(Value::Bool(!v)),
            None => type_fault("logical-not operand", &value),
        },
        UnaryOp::BitNot => match value {
            Value::Int(v) => EvalOutcome::Value(Value::Int(!v)),
            Value::Long(v) => EvalOutcome::Value(Value::Long(!v)),
            other => type_fault("bitwise-not operand", &other),
        },
    }
}

fn apply_binary(op: BinaryOp, lhs: Value, rhs: Value) -> EvalOutcome {
    use BinaryOp::*;
    match op {
        Add => {
            // string concatenation when either side is a string
            if matches!(lhs, Value::Str(_)) || matches!(rhs, Value::Str(_)) {
                return EvalOutcome::Value(Value::str(format!("{lhs}{rhs}")));
            }
            numeric_op(lhs, rhs, "+", |a, b| a + b, i64::checked_add)
        }
        Sub => numeric_op(lhs, rhs, "-", |a, b| a - b, i64::checked_sub),
        Mul => numeric_op(lhs, rhs, "*", |a, b| a * b, i64::checked_mul),
        Div => {
            if rhs.is_numeric() && rhs.as_f64() == Some(0.0) && !matches!(lhs, Value::Double(_)) && !matches!(rhs, Value::Double(_)) {
                return EvalOutcome::Fault(WeftError::MemberFault {
                    member: "/".into(),
                    details: "integer division by zero".into(),
                });
            }
            numeric_op(lhs, rhs, "/", |a, b| a / b, i64::checked_div)
        }
        Rem => {
            if rhs.is_numeric() && rhs.as_f64() == Some(0.0) && !matches!(lhs, Value::Double(_)) && !matches!(rhs, Value::Double(_)) {
                return EvalOutcome::Fault(WeftError::MemberFault {
                    member: "%".into(),
                    details: "integer remainder by zero".into(),
                });
            }
            numeric_op(lhs, rhs, "%", |a, b| a % b, i64::checked_rem)
        }
        Shl | Shr | BitAnd | BitXor | BitOr => integral_op(op, lhs, rhs),
        Lt | Le | Gt | Ge => compare(op, lhs, rhs),
        Eq => EvalOutcome::Value(Value::Bool(values_equal(&lhs, &rhs))),
        Ne => EvalOutcome::Value(Value::Bool(!values_equal(&lhs, &rhs))),
        And | Or | Coalesce | Assign => unreachable!("handled before operand evaluation"),
    }
}

/// Arithmetic with int -> long -> double promotion
fn numeric_op(
    lhs: Value,
    rhs: Value,
    symbol: &str,
    float_op: impl Fn(f64, f64) -> f64,
    int_op: impl Fn(i64, i64) -> Option<i64>,
) -> EvalOutcome {
    if !lhs.is_numeric() || !rhs.is_numeric() {
        return type_fault(&format!("'{symbol}' operand"), if lhs.is_numeric() { &rhs } else { &lhs });
    }
    if matches!(lhs, Value::Double(_)) || matches!(rhs, Value::Double(_)) {
        let (a, b) = (lhs.as_f64().unwrap_or(0.0), rhs.as_f64().unwrap_or(0.0));
        return EvalOutcome::Value(Value::Double(float_op(a, b)));
    }
    let (a, b) = (lhs.as_i64().unwrap_or(0), rhs.as_i64().unwrap_or(0));
    match int_op(a, b) {
        Some(result) => {
            let widen = matches!(lhs, Value::Long(_))
                || matches!(rhs, Value::Long(_))
                || i32::try_from(result).is_err();
            if widen {
                EvalOutcome::Value(Value::Long(result))
            } else {
                EvalOutcome::Value(Value::Int(result as i32))
            }
        }
        None => EvalOutcome::Fault(WeftError::MemberFault {
            member: symbol.to_owned(),
            details: "arithmetic overflow".into(),
        }),
    }
}

fn integral_op(op: BinaryOp, lhs: Value, rhs: Value) -> EvalOutcome {
    let (Some(a), Some(b)) = (lhs.as_i64(), rhs.as_i64()) else {
        return type_fault("integral operand", if lhs.as_i64().is_some() { &rhs } else { &lhs });
    };
    let result = match op {
        BinaryOp::Shl => a.wrapping_shl(b as u32),
        BinaryOp::Shr => a.wrapping_shr(b as u32),
        BinaryOp::BitAnd => a & b,
        BinaryOp::BitXor => a ^ b,
        BinaryOp::BitOr => a | b,
        _ => unreachable!(),
    };
    let widen = matches!(lhs, Value::Long(_)) || matches!(rhs, Value::Long(_));
    if widen || i32::try_from(result).is_err() {
        EvalOutcome::Value(Value::Long(result))
    } else {
        EvalOutcome::Value(Value::Int(result as i32))
    }
}

fn compare(op: BinaryOp, lhs: Value, rhs: Value) -> EvalOutcome {
    let ordering = if lhs.is_numeric() && rhs.is_numeric() {
        lhs.as_f64()
            .unwrap_or(0.0)
            .partial_cmp(&rhs.as_f64().unwrap_or(0.0))
    } else if let (Value::Str(a), Value::Str(b)) = (&lhs, &rhs) {
        Some(a.as_ref().cmp(b.as_ref()))
    } else {
        None
    };
    let Some(ordering) = ordering else {
        return type_fault("comparison operand", &lhs);
    };
    let result = match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Le => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        BinaryOp::Ge => ordering.is_ge(),
        _ => unreachable!(),
    };
    EvalOutcome::Value(Value::Bool(result))
}

/// Equality with numeric cross-width comparison
fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    if lhs.is_numeric() && rhs.is_numeric() {
        return lhs.as_f64() == rhs.as_f64();
    }
    lhs == rhs
}

fn type_fault(what: &str, value: &Value) -> EvalOutcome {
    EvalOutcome::Fault(WeftError::MemberFault {
        member: what.to_owned(),
        details: format!("unsupported operand type '{}'", value.type_name()),
    })
}

// ─────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Metadata;
    use crate::object::ObservableMap;
    use crate::parse::ExpressionParser;

    fn eval_text(text: &str, root: &ObjectRef) -> EvalOutcome {
        let parser = ExpressionParser::new();
        let expr = parser.parse_expression(text, &Metadata::new()).unwrap();
        evaluate(&expr, root, &EvalServices::default())
    }

    fn root() -> ObjectRef {
        let address = ObservableMap::new("Address");
        address.set("City", Value::str("Oslo"));
        let person = ObservableMap::new("Person");
        person.set("Name", Value::str("Ada"));
        person.set("Age", Value::Int(36));
        person.set("Address", Value::Object(address));
        let root = ObservableMap::new("Root");
        root.set("Person", Value::Object(person));
        root.set("Factor", Value::Double(1.5));
        root
    }

    #[test]
    fn arithmetic_promotes_int_to_double() {
        let root = root();
        assert_eq!(eval_text("1 + 2 * 3", &root), EvalOutcome::Value(Value::Int(7)));
        assert_eq!(
            eval_text("2 * Factor", &root),
            EvalOutcome::Value(Value::Double(3.0))
        );
        assert_eq!(
            eval_text("1 + 2L", &root),
            EvalOutcome::Value(Value::Long(3))
        );
    }

    #[test]
    fn integer_division_and_remainder_by_zero_fault() {
        let root = root();
        for text in ["1 / 0", "1 % 0"] {
            match eval_text(text, &root) {
                EvalOutcome::Fault(WeftError::MemberFault { details, .. }) => {
                    assert!(details.contains("by zero"), "{text}: {details}");
                    assert!(!details.contains("overflow"), "{text}: {details}");
                }
                other => panic!("{text}: expected fault, got {other:?}"),
            }
        }
    }

    #[test]
    fn string_concatenation() {
        let root = root();
        assert_eq!(
            eval_text("Person.Name + \"!\"", &root),
            EvalOutcome::Value(Value::str("Ada!"))
        );
    }

    #[test]
    fn member_chain_reads_nested_values() {
        let root = root();
        assert_eq!(
            eval_text("Person.Address.City", &root),
            EvalOutcome::Value(Value::str("Oslo"))
        );
    }

    #[test]
    fn unresolved_member_is_unset() {
        let root = root();
        assert!(eval_text("Person.Missing.City", &root).is_unset());
    }

    #[test]
    fn null_conditional_short_circuits_without_touching_the_rest() {
        let root = root();
        let person = root.get("Person").unwrap();
        let person = person.as_object().unwrap();
        person.set("Address", Value::Null);
        // the tail getter would fault if it were reached
        person.set_failing("Poison", "must not be read");
        assert!(eval_text("Person.Address?.City", &root).is_unset());
        assert!(eval_text("Person.Address?.City.Length", &root).is_unset());
    }

    #[test]
    fn getter_fault_propagates_as_fault() {
        let root = root();
        let person = root.get("Person").unwrap();
        person.as_object().unwrap().set_failing("Name", "boom");
        assert!(matches!(
            eval_text("Person.Name", &root),
            EvalOutcome::Fault(WeftError::MemberFault { .. })
        ));
    }

    #[test]
    fn logical_operators_short_circuit() {
        let root = root();
        // rhs is unresolved and would poison the result if evaluated
        assert_eq!(
            eval_text("false && Person.Age.Bogus", &root),
            EvalOutcome::Value(Value::Bool(false))
        );
        assert_eq!(
            eval_text("Person.Age > 18 || false", &root),
            EvalOutcome::Value(Value::Bool(true))
        );
    }

    #[test]
    fn coalesce_covers_null_and_unset() {
        let root = root();
        assert_eq!(
            eval_text("Person.Missing ?? \"fallback\"", &root),
            EvalOutcome::Value(Value::str("fallback"))
        );
        assert_eq!(
            eval_text("Person.Name ?? \"fallback\"", &root),
            EvalOutcome::Value(Value::str("Ada"))
        );
    }

    #[test]
    fn conditional_branches() {
        let root = root();
        assert_eq!(
            eval_text("Person.Age >= 18 ? \"adult\" : \"minor\"", &root),
            EvalOutcome::Value(Value::str("adult"))
        );
    }

    #[test]
    fn assignment_writes_through_member_chain() {
        let root = root();
        assert_eq!(
            eval_text("Person.Address.City = \"Bergen\"", &root),
            EvalOutcome::Value(Value::str("Bergen"))
        );
        assert_eq!(
            eval_text("Person.Address.City", &root),
            EvalOutcome::Value(Value::str("Bergen"))
        );
    }

    #[test]
    fn registered_methods_invoke() {
        let root = root();
        let person = root.get("Person").unwrap();
        person.as_object().unwrap().register_method(
            "Greet",
            Arc::new(|target, _args| {
                let name = target.get("Name").unwrap_or_default();
                Ok(Value::str(format!("hi {name}")))
            }),
        );
        assert_eq!(
            eval_text("Person.Greet()", &root),
            EvalOutcome::Value(Value::str("hi Ada"))
        );
    }

    #[test]
    fn lambdas_capture_parameters_on_invoke() {
        let root = root();
        let parser = ExpressionParser::new();
        let expr = parser
            .parse_expression("x => x * 2 + 1", &Metadata::new())
            .unwrap();
        let services = EvalServices::default();
        let lambda = evaluate(&expr, &root, &services).value().unwrap();
        let Value::Lambda(lambda) = lambda else {
            panic!("lambda value expected")
        };
        assert_eq!(
            invoke_lambda(&lambda, &[Value::Int(20)], &root, &services),
            EvalOutcome::Value(Value::Int(41))
        );
    }

    #[test]
    fn builtin_length_members() {
        let root = root();
        assert_eq!(
            eval_text("Person.Name.Length", &root),
            EvalOutcome::Value(Value::Int(3))
        );
        assert_eq!(
            eval_text("Person.Name.ToString()", &root),
            EvalOutcome::Value(Value::str("Ada"))
        );
    }
}
