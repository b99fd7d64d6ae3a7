//! Operator token types and the binding-power table
//!
//! Precedence (highest to lowest): multiplicative, additive, shift,
//! relational, equality, bitwise AND/XOR/OR, logical AND, logical OR,
//! null-coalescing, conditional, assignment. Binary parsing climbs this
//! table; assignment is right-associative.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    And,
    Or,
    Coalesce,
    Assign,
}

impl BinaryOp {
    /// Numeric binding power; higher binds tighter
    pub fn binding_power(self) -> u8 {
        match self {
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 110,
            BinaryOp::Add | BinaryOp::Sub => 100,
            BinaryOp::Shl | BinaryOp::Shr => 90,
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => 80,
            BinaryOp::Eq | BinaryOp::Ne => 70,
            BinaryOp::BitAnd => 60,
            BinaryOp::BitXor => 55,
            BinaryOp::BitOr => 50,
            BinaryOp::And => 40,
            BinaryOp::Or => 30,
            BinaryOp::Coalesce => 20,
            BinaryOp::Assign => 10,
        }
    }

    pub fn is_right_associative(self) -> bool {
        matches!(self, BinaryOp::Assign)
    }

    pub fn token(self) -> &'static str {
        match self {
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitXor => "^",
            BinaryOp::BitOr => "|",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Coalesce => "??",
            BinaryOp::Assign => "=",
        }
    }

    /// Operator tokens ordered longest-first for maximal-munch scanning
    pub fn scan_table() -> &'static [(&'static str, BinaryOp)] {
        &[
            ("<<", BinaryOp::Shl),
            (">>", BinaryOp::Shr),
            ("<=", BinaryOp::Le),
            (">=", BinaryOp::Ge),
            ("==", BinaryOp::Eq),
            ("!=", BinaryOp::Ne),
            ("&&", BinaryOp::And),
            ("||", BinaryOp::Or),
            ("??", BinaryOp::Coalesce),
            ("*", BinaryOp::Mul),
            ("/", BinaryOp::Div),
            ("%", BinaryOp::Rem),
            ("+", BinaryOp::Add),
            ("-", BinaryOp::Sub),
            ("<", BinaryOp::Lt),
            (">", BinaryOp::Gt),
            ("&", BinaryOp::BitAnd),
            ("^", BinaryOp::BitXor),
            ("|", BinaryOp::BitOr),
            ("=", BinaryOp::Assign),
        ]
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Arithmetic negation `-`
    Neg,
    /// Logical not `!`
    Not,
    /// Bitwise complement `~`
    BitNot,
}

impl UnaryOp {
    pub fn token(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_table_matches_conventional_precedence() {
        assert!(BinaryOp::Mul.binding_power() > BinaryOp::Add.binding_power());
        assert!(BinaryOp::Add.binding_power() > BinaryOp::Shl.binding_power());
        assert!(BinaryOp::Lt.binding_power() > BinaryOp::Eq.binding_power());
        assert!(BinaryOp::BitAnd.binding_power() > BinaryOp::BitXor.binding_power());
        assert!(BinaryOp::BitXor.binding_power() > BinaryOp::BitOr.binding_power());
        assert!(BinaryOp::And.binding_power() > BinaryOp::Or.binding_power());
        assert!(BinaryOp::Or.binding_power() > BinaryOp::Coalesce.binding_power());
        assert!(BinaryOp::Coalesce.binding_power() > BinaryOp::Assign.binding_power());
    }

    #[test]
    fn scan_table_is_longest_first() {
        let table = BinaryOp::scan_table();
        let first_single = table.iter().position(|(s, _)| s.len() == 1).unwrap();
        assert!(table[..first_single].iter().all(|(s, _)| s.len() == 2));
        assert!(table[first_single..].iter().all(|(s, _)| s.len() == 1));
    }

    #[test]
    fn only_assignment_is_right_associative() {
        assert!(BinaryOp::Assign.is_right_associative());
        assert!(!BinaryOp::Add.is_right_associative());
    }
}
