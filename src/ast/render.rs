//! AST re-rendering
//!
//! Turns an AST back into expression text such that `parse(render(x)) == x`
//! for parser-producible shapes. This exists for golden tests and
//! diagnostics; production code never needs it.

use std::fmt::Write;

use super::Expr;
use crate::value::Value;

/// Render an expression back to text
pub fn render(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr);
    out
}

fn write_expr(out: &mut String, expr: &Expr) {
    match expr {
        Expr::Constant(value) => write_constant(out, value),
        Expr::Member { target, name } => {
            if let Some(target) = target {
                write_receiver(out, target);
                out.push('.');
            }
            out.push_str(name);
        }
        Expr::Index { target, args } => {
            write_receiver(out, target);
            out.push('[');
            write_list(out, args);
            out.push(']');
        }
        Expr::MethodCall {
            target,
            name,
            args,
            type_args,
        } => {
            if let Some(target) = target {
                write_receiver(out, target);
                out.push('.');
            }
            out.push_str(name);
            if !type_args.is_empty() {
                out.push('<');
                out.push_str(&type_args.join(", "));
                out.push('>');
            }
            out.push('(');
            write_list(out, args);
            out.push(')');
        }
        Expr::Binary { op, left, right } => {
            write_operand(out, left);
            let _ = write!(out, " {op} ");
            write_operand(out, right);
        }
        Expr::Unary { op, operand } => {
            let _ = write!(out, "{op}");
            write_operand(out, operand);
        }
        Expr::Condition {
            test,
            if_true,
            if_false,
        } => {
            write_operand(out, test);
            out.push_str(" ? ");
            write_branch(out, if_true);
            out.push_str(" : ");
            write_branch(out, if_false);
        }
        Expr::Lambda { body, parameters } => {
            out.push('(');
            out.push_str(&parameters.join(", "));
            out.push_str(") => ");
            write_expr(out, body);
        }
        Expr::Parameter(name) => out.push_str(name),
        Expr::NullConditional(inner) => write_null_conditional(out, inner),
        Expr::TypeAccess(name) => out.push_str(name),
        Expr::EmptyMember => {}
    }
}

fn write_null_conditional(out: &mut String, inner: &Expr) {
    match inner {
        Expr::Member {
            target: Some(target),
            name,
        } => {
            write_receiver(out, target);
            out.push_str("?.");
            out.push_str(name);
        }
        Expr::Index { target, args } => {
            write_receiver(out, target);
            out.push_str("?[");
            write_list(out, args);
            out.push(']');
        }
        Expr::MethodCall {
            target: Some(target),
            name,
            args,
            ..
        } => {
            write_receiver(out, target);
            out.push_str("?.");
            out.push_str(name);
            out.push('(');
            write_list(out, args);
            out.push(')');
        }
        // Shapes the parser never wraps; render the inner node as-is
        other => write_expr(out, other),
    }
}

fn write_list(out: &mut String, args: &[Expr]) {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_expr(out, arg);
    }
}

/// Receivers of `.`/`[` need parentheses around operator nodes
fn write_receiver(out: &mut String, expr: &Expr) {
    match expr {
        Expr::Binary { .. } | Expr::Condition { .. } | Expr::Lambda { .. } | Expr::Unary { .. } => {
            out.push('(');
            write_expr(out, expr);
            out.push(')');
        }
        _ => write_expr(out, expr),
    }
}

/// Operator operands re-render fully parenthesized so the reparse rebuilds
/// the exact tree regardless of the original precedence
fn write_operand(out: &mut String, expr: &Expr) {
    match expr {
        Expr::Binary { .. } | Expr::Condition { .. } | Expr::Lambda { .. } => {
            out.push('(');
            write_expr(out, expr);
            out.push(')');
        }
        _ => write_expr(out, expr),
    }
}

fn write_branch(out: &mut String, expr: &Expr) {
    match expr {
        Expr::Condition { .. } | Expr::Lambda { .. } => {
            out.push('(');
            write_expr(out, expr);
            out.push(')');
        }
        _ => write_expr(out, expr),
    }
}

fn write_constant(out: &mut String, value: &Value) {
    match value {
        Value::Str(s) => {
            out.push('"');
            for ch in s.chars() {
                write_escaped(out, ch, '"');
            }
            out.push('"');
        }
        Value::Char(c) => {
            out.push('\'');
            write_escaped(out, *c, '\'');
            out.push('\'');
        }
        // Longs carry the suffix so the reparse keeps the type
        Value::Long(l) => {
            let _ = write!(out, "{l}L");
        }
        other => {
            let _ = write!(out, "{other}");
        }
    }
}

fn write_escaped(out: &mut String, ch: char, quote: char) {
    match ch {
        '\\' => out.push_str("\\\\"),
        '\n' => out.push_str("\\n"),
        '\r' => out.push_str("\\r"),
        '\t' => out.push_str("\\t"),
        '\0' => out.push_str("\\0"),
        c if c == quote => {
            out.push('\\');
            out.push(c);
        }
        c => out.push(c),
    }
}
