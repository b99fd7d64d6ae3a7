//! # Parser Integration Tests
//!
//! End-to-end coverage of the tokenizer/parser pipeline:
//! - precedence and associativity goldens
//! - render/parse round-trips
//! - multi-statement binding strings with error accumulation
//! - the parse cache and deterministic structural equality

use weft::ast::render;
use weft::parse::{default_expression_parser, ExpressionInput};
use weft::{
    BinaryOp, BindingExpressionRequest, Expr, ExpressionParser, Metadata, UnaryOp, Value,
    WeftError,
};

// ============================================================================
// TEST HELPERS
// ============================================================================

/// Route crate tracing through the test harness; `RUST_LOG` selects levels
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn parse(text: &str) -> Expr {
    init_tracing();
    default_expression_parser()
        .parse_expression(text, &Metadata::new())
        .unwrap()
}

fn parse_statements(text: &str) -> Vec<weft::ExpressionParserResult> {
    init_tracing();
    default_expression_parser()
        .try_parse(&BindingExpressionRequest::from_text(text), &Metadata::new())
        .unwrap()
}

// ============================================================================
// PRECEDENCE AND ASSOCIATIVITY
// ============================================================================

#[test]
fn multiplication_binds_tighter_than_addition() {
    let expected = Expr::binary(
        BinaryOp::Add,
        Expr::member("A"),
        Expr::binary(BinaryOp::Mul, Expr::member("B"), Expr::member("C")),
    );
    assert_eq!(parse("A + B * C"), expected);
}

#[test]
fn logical_and_binds_tighter_than_or_then_coalesce() {
    // a || b && c ?? d  ==  (a || (b && c)) ?? d
    let expected = Expr::binary(
        BinaryOp::Coalesce,
        Expr::binary(
            BinaryOp::Or,
            Expr::member("a"),
            Expr::binary(BinaryOp::And, Expr::member("b"), Expr::member("c")),
        ),
        Expr::member("d"),
    );
    assert_eq!(parse("a || b && c ?? d"), expected);
}

#[test]
fn subtraction_is_left_associative() {
    let expected = Expr::binary(
        BinaryOp::Sub,
        Expr::binary(
            BinaryOp::Sub,
            Expr::constant(Value::Int(1)),
            Expr::constant(Value::Int(2)),
        ),
        Expr::constant(Value::Int(3)),
    );
    assert_eq!(parse("1 - 2 - 3"), expected);
}

#[test]
fn assignment_is_right_associative() {
    let expected = Expr::binary(
        BinaryOp::Assign,
        Expr::member("A"),
        Expr::binary(BinaryOp::Assign, Expr::member("B"), Expr::member("C")),
    );
    assert_eq!(parse("A = B = C"), expected);
}

#[test]
fn unary_applies_to_the_whole_postfix_chain() {
    let expected = Expr::unary(
        UnaryOp::Neg,
        Expr::member_of(Expr::member("Point"), "X"),
    );
    assert_eq!(parse("-Point.X"), expected);
}

#[test]
fn ternary_branches_take_full_expressions() {
    let expected = Expr::Condition {
        test: Box::new(Expr::binary(
            BinaryOp::Gt,
            Expr::member("A"),
            Expr::constant(Value::Int(0)),
        )),
        if_true: Box::new(Expr::binary(
            BinaryOp::Add,
            Expr::member("B"),
            Expr::constant(Value::Int(1)),
        )),
        if_false: Box::new(Expr::member("C")),
    };
    assert_eq!(parse("A > 0 ? B + 1 : C"), expected);
}

// ============================================================================
// STRUCTURE
// ============================================================================

#[test]
fn parse_is_deterministic_and_structural() {
    assert_eq!(parse("Person.Name ?? \"anon\""), parse("Person.Name??\"anon\""));
}

#[test]
fn null_conditional_wraps_the_access() {
    match parse("Person?.Name") {
        Expr::NullConditional(inner) => match *inner {
            Expr::Member { name, .. } => assert_eq!(name, "Name"),
            other => panic!("unexpected inner node {other:?}"),
        },
        other => panic!("unexpected node {other:?}"),
    }
}

#[test]
fn lambda_with_parameters_and_call() {
    match parse("Items.Where((x) => x.Active)") {
        Expr::MethodCall { name, args, .. } => {
            assert_eq!(name, "Where");
            assert!(matches!(&args[0], Expr::Lambda { parameters, .. } if parameters == &["x"]));
        }
        other => panic!("unexpected node {other:?}"),
    }
}

#[test]
fn known_type_heads_become_type_access() {
    match parse("string.Format(Template, Name)") {
        Expr::MethodCall { target, .. } => {
            assert_eq!(target.as_deref(), Some(&Expr::TypeAccess("string".into())));
        }
        other => panic!("unexpected node {other:?}"),
    }
}

// ============================================================================
// RENDER ROUND-TRIPS
// ============================================================================

#[test]
fn render_then_parse_preserves_structure() {
    for text in [
        "A + B * C",
        "a || b && c ?? d",
        "-Point.X",
        "Person?.Name ?? \"anon\"",
        "A > 0 ? B + 1 : C",
        "Items[0].Name",
        "Format(Name, 42, true)",
        "!(Flag)",
    ] {
        let first = parse(text);
        let second = parse(&render(&first));
        assert_eq!(first, second, "round-trip diverged for {text:?}");
    }
}

// ============================================================================
// MULTI-STATEMENT REQUESTS
// ============================================================================

#[test]
fn statements_split_on_semicolons_outside_strings() {
    let results = parse_statements("A \"x;y\"; B 2");
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].source, Expr::constant(Value::str("x;y")));
    assert_eq!(results[1].target, Expr::member("B"));
}

#[test]
fn grammar_error_skips_one_statement_with_a_sink() {
    let sink = weft::ErrorSink::new();
    let metadata = Metadata::with_error_sink(sink.clone());
    let results = default_expression_parser()
        .try_parse(
            &BindingExpressionRequest::from_text("A 1; B ~~; C 3"),
            &metadata,
        )
        .unwrap();
    assert_eq!(results.len(), 2);
    let errors = sink.take();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], WeftError::Grammar { .. }));
}

#[test]
fn unterminated_string_aborts_the_whole_batch() {
    let sink = weft::ErrorSink::new();
    let metadata = Metadata::with_error_sink(sink.clone());
    let results = default_expression_parser()
        .try_parse(
            &BindingExpressionRequest::from_text("A 1; B \"unterminated; C 3"),
            &metadata,
        )
        .unwrap();
    assert!(results.is_empty());
    let errors = sink.take();
    assert!(matches!(errors[0], WeftError::Lexical { .. }));
}

#[test]
fn duplicate_named_parameter_is_rejected() {
    let err = default_expression_parser()
        .try_parse(
            &BindingExpressionRequest::from_text("A B, Mode=TwoWay, Mode=OneWay"),
            &Metadata::new(),
        )
        .unwrap_err();
    assert!(matches!(err, WeftError::DuplicateParameter { .. }));
}

#[test]
fn ast_inputs_bypass_tokenization() {
    let request = BindingExpressionRequest::new(
        ExpressionInput::Ast(Expr::member("Text")),
        ExpressionInput::Ast(Expr::member("Name")),
        Vec::new(),
    );
    let results = default_expression_parser()
        .try_parse(&request, &Metadata::new())
        .unwrap();
    assert_eq!(results[0].target, Expr::member("Text"));
    assert_eq!(results[0].source, Expr::member("Name"));
}

#[test]
fn statement_cache_returns_equal_results() {
    let parser = ExpressionParser::new();
    let first = parser
        .try_parse(&BindingExpressionRequest::from_text("A B"), &Metadata::new())
        .unwrap();
    let second = parser
        .try_parse(&BindingExpressionRequest::from_text("A B"), &Metadata::new())
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn custom_component_set_still_parses() {
    let parser = ExpressionParser::with_parsers(weft::parse::build_parsers(
        weft::parse::NumericPolicy::AlwaysLong,
    ));
    let results = parser
        .try_parse(&BindingExpressionRequest::from_text("A 1"), &Metadata::new())
        .unwrap();
    assert_eq!(results[0].source, Expr::constant(Value::Long(1)));
}
