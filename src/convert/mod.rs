//! Foreign expression tree conversion
//!
//! A host runtime hands over a typed lambda as a [`ForeignExpr`] tree; the
//! [`ConverterContext`] turns it node-by-node into the same AST the text
//! parser produces. Conversion is memoized per context by node identity, so
//! diamond-shared sub-expressions convert exactly once. Nodes no component
//! claims fail with a conversion error rather than panicking.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::error::WeftError;
use crate::metadata::Metadata;
use crate::value::Value;

/// The reachable subset of a host-language expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum ForeignExpr {
    Constant(Value),
    Member {
        target: Option<Arc<ForeignExpr>>,
        name: String,
    },
    Call {
        target: Option<Arc<ForeignExpr>>,
        name: String,
        args: Vec<Arc<ForeignExpr>>,
        type_args: Vec<String>,
    },
    Index {
        target: Arc<ForeignExpr>,
        args: Vec<Arc<ForeignExpr>>,
    },
    Lambda {
        body: Arc<ForeignExpr>,
        parameters: Vec<String>,
    },
    Parameter(String),
    Binary {
        op: BinaryOp,
        left: Arc<ForeignExpr>,
        right: Arc<ForeignExpr>,
    },
    Unary {
        op: UnaryOp,
        operand: Arc<ForeignExpr>,
    },
    Conditional {
        test: Arc<ForeignExpr>,
        if_true: Arc<ForeignExpr>,
        if_false: Arc<ForeignExpr>,
    },
    /// Array construction with element initializers
    NewArray(Vec<Arc<ForeignExpr>>),
    /// `default(T)` for a named primitive type
    Default(String),
}

impl ForeignExpr {
    fn kind_name(&self) -> &'static str {
        match self {
            ForeignExpr::Constant(_) => "constant",
            ForeignExpr::Member { .. } => "member",
            ForeignExpr::Call { .. } => "call",
            ForeignExpr::Index { .. } => "index",
            ForeignExpr::Lambda { .. } => "lambda",
            ForeignExpr::Parameter(_) => "parameter",
            ForeignExpr::Binary { .. } => "binary",
            ForeignExpr::Unary { .. } => "unary",
            ForeignExpr::Conditional { .. } => "conditional",
            ForeignExpr::NewArray(_) => "new-array",
            ForeignExpr::Default(_) => "default",
        }
    }
}

/// One conversion rule. Components are consulted in registration order;
/// `Ok(None)` means "not my node shape".
pub trait ExpressionConverter: Send + Sync {
    fn name(&self) -> &'static str;

    fn try_convert(
        &self,
        ctx: &mut ConverterContext,
        node: &Arc<ForeignExpr>,
    ) -> Result<Option<Expr>, WeftError>;
}

/// Per-conversion state: the component list and a node-identity memo
pub struct ConverterContext {
    metadata: Metadata,
    converters: Arc<[Arc<dyn ExpressionConverter>]>,
    memo: FxHashMap<usize, Expr>,
    conversions: usize,
}

impl ConverterContext {
    pub fn new(metadata: Metadata) -> Self {
        Self::with_converters(metadata, default_converters())
    }

    pub fn with_converters(
        metadata: Metadata,
        converters: Arc<[Arc<dyn ExpressionConverter>]>,
    ) -> Self {
        Self {
            metadata,
            converters,
            memo: FxHashMap::default(),
            conversions: 0,
        }
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Nodes converted by a component (memo hits excluded)
    pub fn conversion_count(&self) -> usize {
        self.conversions
    }

    /// Drops the memo; the next `convert` re-walks the tree
    pub fn clear(&mut self) {
        self.memo.clear();
    }

    pub fn try_get(&self, node: &Arc<ForeignExpr>) -> Option<&Expr> {
        self.memo.get(&(Arc::as_ptr(node) as usize))
    }

    pub fn set(&mut self, node: &Arc<ForeignExpr>, expr: Expr) {
        self.memo.insert(Arc::as_ptr(node) as usize, expr);
    }

    /// Convert one node, memoized by node identity
    pub fn convert(&mut self, node: &Arc<ForeignExpr>) -> Result<Expr, WeftError> {
        if let Some(hit) = self.try_get(node) {
            trace!(kind = node.kind_name(), "conversion memo hit");
            return Ok(hit.clone());
        }
        let converters = Arc::clone(&self.converters);
        for converter in converters.iter() {
            if let Some(expr) = converter.try_convert(self, node)? {
                self.conversions += 1;
                self.set(node, expr.clone());
                return Ok(expr);
            }
        }
        Err(WeftError::ConversionNotSupported {
            node: node.kind_name().to_owned(),
        })
    }

    fn convert_all(&mut self, nodes: &[Arc<ForeignExpr>]) -> Result<Vec<Expr>, WeftError> {
        nodes.iter().map(|node| self.convert(node)).collect()
    }
}

/// The standard conversion rule set, in consultation order
pub fn default_converters() -> Arc<[Arc<dyn ExpressionConverter>]> {
    vec![
        Arc::new(ConstantConverter) as Arc<dyn ExpressionConverter>,
        Arc::new(AccessConverter),
        Arc::new(LambdaConverter),
        Arc::new(OperatorConverter),
        Arc::new(ArrayConverter),
    ]
    .into()
}

/// Constants and `default(T)` for the known primitive types
struct ConstantConverter;

impl ExpressionConverter for ConstantConverter {
    fn name(&self) -> &'static str {
        "constant"
    }

    fn try_convert(
        &self,
        _ctx: &mut ConverterContext,
        node: &Arc<ForeignExpr>,
    ) -> Result<Option<Expr>, WeftError> {
        match node.as_ref() {
            ForeignExpr::Constant(value) => Ok(Some(Expr::Constant(value.clone()))),
            ForeignExpr::Default(type_name) => {
                let value = match type_name.as_str() {
                    "int" => Value::Int(0),
                    "long" => Value::Long(0),
                    "double" => Value::Double(0.0),
                    "bool" => Value::Bool(false),
                    "char" => Value::Char('\0'),
                    _ => Value::Null,
                };
                Ok(Some(Expr::Constant(value)))
            }
            _ => Ok(None),
        }
    }
}

/// Member access, indexers, and method calls
struct AccessConverter;

impl ExpressionConverter for AccessConverter {
    fn name(&self) -> &'static str {
        "access"
    }

    fn try_convert(
        &self,
        ctx: &mut ConverterContext,
        node: &Arc<ForeignExpr>,
    ) -> Result<Option<Expr>, WeftError> {
        match node.as_ref() {
            ForeignExpr::Member { target, name } => {
                let target = target
                    .as_ref()
                    .map(|t| ctx.convert(t))
                    .transpose()?
                    .map(Box::new);
                Ok(Some(Expr::Member {
                    target,
                    name: name.clone(),
                }))
            }
            ForeignExpr::Index { target, args } => Ok(Some(Expr::Index {
                target: Box::new(ctx.convert(target)?),
                args: ctx.convert_all(args)?,
            })),
            ForeignExpr::Call {
                target,
                name,
                args,
                type_args,
            } => {
                let target = target
                    .as_ref()
                    .map(|t| ctx.convert(t))
                    .transpose()?
                    .map(Box::new);
                Ok(Some(Expr::MethodCall {
                    target,
                    name: name.clone(),
                    args: ctx.convert_all(args)?,
                    type_args: type_args.clone(),
                }))
            }
            _ => Ok(None),
        }
    }
}

/// Lambdas and parameter references
struct LambdaConverter;

impl ExpressionConverter for LambdaConverter {
    fn name(&self) -> &'static str {
        "lambda"
    }

    fn try_convert(
        &self,
        ctx: &mut ConverterContext,
        node: &Arc<ForeignExpr>,
    ) -> Result<Option<Expr>, WeftError> {
        match node.as_ref() {
            ForeignExpr::Lambda { body, parameters } => Ok(Some(Expr::Lambda {
                body: Box::new(ctx.convert(body)?),
                parameters: parameters.clone(),
            })),
            ForeignExpr::Parameter(name) => Ok(Some(Expr::Parameter(name.clone()))),
            _ => Ok(None),
        }
    }
}

/// Binary, unary, and conditional operators
struct OperatorConverter;

impl ExpressionConverter for OperatorConverter {
    fn name(&self) -> &'static str {
        "operator"
    }

    fn try_convert(
        &self,
        ctx: &mut ConverterContext,
        node: &Arc<ForeignExpr>,
    ) -> Result<Option<Expr>, WeftError> {
        match node.as_ref() {
            ForeignExpr::Binary { op, left, right } => Ok(Some(Expr::Binary {
                op: *op,
                left: Box::new(ctx.convert(left)?),
                right: Box::new(ctx.convert(right)?),
            })),
            ForeignExpr::Unary { op, operand } => Ok(Some(Expr::Unary {
                op: *op,
                operand: Box::new(ctx.convert(operand)?),
            })),
            ForeignExpr::Conditional {
                test,
                if_true,
                if_false,
            } => Ok(Some(Expr::Condition {
                test: Box::new(ctx.convert(test)?),
                if_true: Box::new(ctx.convert(if_true)?),
                if_false: Box::new(ctx.convert(if_false)?),
            })),
            _ => Ok(None),
        }
    }
}

/// Array construction from constant initializers
struct ArrayConverter;

impl ExpressionConverter for ArrayConverter {
    fn name(&self) -> &'static str {
        "array"
    }

    fn try_convert(
        &self,
        ctx: &mut ConverterContext,
        node: &Arc<ForeignExpr>,
    ) -> Result<Option<Expr>, WeftError> {
        let ForeignExpr::NewArray(elements) = node.as_ref() else {
            return Ok(None);
        };
        let converted = ctx.convert_all(elements)?;
        let mut values = Vec::with_capacity(converted.len());
        for element in converted {
            match element {
                Expr::Constant(value) => values.push(value),
                _ => {
                    return Err(WeftError::ConversionNotSupported {
                        node: "new-array with non-constant element".to_owned(),
                    })
                }
            }
        }
        Ok(Some(Expr::Constant(Value::Array(Arc::new(values)))))
    }
}

// ─────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::default_expression_parser;

    fn convert(node: &Arc<ForeignExpr>) -> Expr {
        ConverterContext::new(Metadata::new()).convert(node).unwrap()
    }

    fn root_member(name: &str) -> Arc<ForeignExpr> {
        Arc::new(ForeignExpr::Member {
            target: None,
            name: name.into(),
        })
    }

    fn int(value: i32) -> Arc<ForeignExpr> {
        Arc::new(ForeignExpr::Constant(Value::Int(value)))
    }

    /// Every convertible node kind must land on the same AST the text parser
    /// produces for the equivalent source text.
    #[test]
    fn conversion_matches_the_text_parser_node_for_node() {
        let cases: Vec<(Arc<ForeignExpr>, &str)> = vec![
            (int(42), "42"),
            (Arc::new(ForeignExpr::Default("bool".into())), "false"),
            (
                Arc::new(ForeignExpr::Member {
                    target: Some(root_member("Person")),
                    name: "Name".into(),
                }),
                "Person.Name",
            ),
            (
                Arc::new(ForeignExpr::Call {
                    target: None,
                    name: "Format".into(),
                    args: vec![root_member("Name"), int(1)],
                    type_args: vec![],
                }),
                "Format(Name, 1)",
            ),
            (
                Arc::new(ForeignExpr::Call {
                    target: Some(root_member("Items")),
                    name: "Count".into(),
                    args: vec![],
                    type_args: vec![],
                }),
                "Items.Count()",
            ),
            (
                Arc::new(ForeignExpr::Index {
                    target: root_member("Items"),
                    args: vec![int(0)],
                }),
                "Items[0]",
            ),
            (
                Arc::new(ForeignExpr::Unary {
                    op: UnaryOp::Not,
                    operand: root_member("Flag"),
                }),
                "!Flag",
            ),
            (
                Arc::new(ForeignExpr::Binary {
                    op: BinaryOp::Add,
                    left: root_member("A"),
                    right: int(1),
                }),
                "A + 1",
            ),
            (
                Arc::new(ForeignExpr::Conditional {
                    test: root_member("Flag"),
                    if_true: int(1),
                    if_false: int(2),
                }),
                "Flag ? 1 : 2",
            ),
            (
                Arc::new(ForeignExpr::Lambda {
                    body: Arc::new(ForeignExpr::Binary {
                        op: BinaryOp::Gt,
                        left: Arc::new(ForeignExpr::Parameter("x".into())),
                        right: int(0),
                    }),
                    parameters: vec!["x".into()],
                }),
                "(x) => x > 0",
            ),
        ];

        let metadata = Metadata::new();
        for (node, text) in cases {
            let converted = ConverterContext::new(metadata.clone())
                .convert(&node)
                .unwrap();
            let parsed = default_expression_parser()
                .parse_expression(text, &metadata)
                .unwrap();
            assert_eq!(converted, parsed, "conversion diverged from {text:?}");
        }
    }

    #[test]
    fn converts_member_chain() {
        let node = Arc::new(ForeignExpr::Member {
            target: Some(Arc::new(ForeignExpr::Member {
                target: None,
                name: "Person".into(),
            })),
            name: "Name".into(),
        });
        assert_eq!(
            convert(&node),
            Expr::member_of(Expr::member("Person"), "Name")
        );
    }

    #[test]
    fn converts_lambda_with_parameters() {
        let node = Arc::new(ForeignExpr::Lambda {
            body: Arc::new(ForeignExpr::Binary {
                op: BinaryOp::Add,
                left: Arc::new(ForeignExpr::Parameter("x".into())),
                right: Arc::new(ForeignExpr::Constant(Value::Int(1))),
            }),
            parameters: vec!["x".into()],
        });
        assert_eq!(
            convert(&node),
            Expr::Lambda {
                body: Box::new(Expr::binary(
                    BinaryOp::Add,
                    Expr::Parameter("x".into()),
                    Expr::constant(1),
                )),
                parameters: vec!["x".into()],
            }
        );
    }

    #[test]
    fn shared_subtree_converts_once() {
        let shared = Arc::new(ForeignExpr::Member {
            target: None,
            name: "Base".into(),
        });
        let diamond = Arc::new(ForeignExpr::Binary {
            op: BinaryOp::Add,
            left: Arc::clone(&shared),
            right: Arc::clone(&shared),
        });
        let mut ctx = ConverterContext::new(Metadata::new());
        ctx.convert(&diamond).unwrap();
        // binary node + one shared member, not three
        assert_eq!(ctx.conversion_count(), 2);
    }

    #[test]
    fn default_of_known_type_is_typed_zero() {
        let node = Arc::new(ForeignExpr::Default("int".into()));
        assert_eq!(convert(&node), Expr::constant(0));
        let node = Arc::new(ForeignExpr::Default("Widget".into()));
        assert_eq!(convert(&node), Expr::null());
    }

    #[test]
    fn constant_array_folds_to_value() {
        let node = Arc::new(ForeignExpr::NewArray(vec![
            Arc::new(ForeignExpr::Constant(Value::Int(1))),
            Arc::new(ForeignExpr::Constant(Value::Int(2))),
        ]));
        assert_eq!(
            convert(&node),
            Expr::Constant(Value::Array(Arc::new(vec![Value::Int(1), Value::Int(2)])))
        );
    }

    #[test]
    fn unsupported_array_element_fails_conversion() {
        let node = Arc::new(ForeignExpr::NewArray(vec![Arc::new(ForeignExpr::Member {
            target: None,
            name: "x".into(),
        })]));
        let err = ConverterContext::new(Metadata::new())
            .convert(&node)
            .unwrap_err();
        assert!(matches!(err, WeftError::ConversionNotSupported { .. }));
    }
}
