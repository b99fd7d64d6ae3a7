//! Token scanner / parser context
//!
//! Holds the source text, a cursor, and an optional length limit, and
//! dispatches parsing to the registered token-parser components in
//! descending priority order. Accessors index from position 0 (not the
//! cursor); `limit` shrinks the effective length for speculative lookahead
//! parses without touching the text.

use std::sync::Arc;

use crate::ast::Expr;
use crate::error::WeftError;
use crate::metadata::Metadata;
use crate::parse::{ParseOutcome, TokenParser};

pub struct TokenContext {
    chars: Vec<char>,
    position: usize,
    limit: usize,
    parsers: Arc<[Arc<dyn TokenParser>]>,
    metadata: Metadata,
}

impl TokenContext {
    pub fn new(parsers: Arc<[Arc<dyn TokenParser>]>) -> Self {
        Self {
            chars: Vec::new(),
            position: 0,
            limit: 0,
            parsers,
            metadata: Metadata::new(),
        }
    }

    /// Reset the context onto new source text
    pub fn initialize(&mut self, text: &str, metadata: Metadata) {
        self.chars = text.chars().collect();
        self.position = 0;
        self.limit = self.chars.len();
        self.metadata = metadata;
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn length(&self) -> usize {
        self.chars.len()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn set_position(&mut self, position: usize) -> Result<(), WeftError> {
        if position > self.chars.len() {
            return Err(WeftError::Argument {
                details: format!(
                    "position {position} outside [0, {}]",
                    self.chars.len()
                ),
            });
        }
        self.position = position;
        Ok(())
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Shrink (or restore) the effective length for a speculative parse
    pub fn set_limit(&mut self, limit: usize) -> Result<(), WeftError> {
        if limit > self.chars.len() {
            return Err(WeftError::Argument {
                details: format!("limit {limit} outside [0, {}]", self.chars.len()),
            });
        }
        self.limit = limit;
        Ok(())
    }

    /// Character at an absolute index, bounds-checked against the limit
    pub fn token_at(&self, index: usize) -> Option<char> {
        if index < self.limit {
            self.chars.get(index).copied()
        } else {
            None
        }
    }

    /// Substring by absolute range, clamped to the limit
    pub fn get_value(&self, start: usize, len: usize) -> String {
        let end = (start + len).min(self.limit);
        if start >= end {
            return String::new();
        }
        self.chars[start..end].iter().collect()
    }

    pub fn is_eof(&self) -> bool {
        self.position >= self.limit
    }

    pub fn peek(&self) -> Option<char> {
        self.token_at(self.position)
    }

    pub fn peek_at(&self, offset: usize) -> Option<char> {
        self.token_at(self.position + offset)
    }

    pub fn advance(&mut self, count: usize) {
        self.position = (self.position + count).min(self.limit);
    }

    pub fn skip_whitespace(&mut self) {
        while self.peek().map(char::is_whitespace).unwrap_or(false) {
            self.position += 1;
        }
    }

    /// Consume `expected` at the cursor if present
    pub fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    /// Consume the literal string `expected` at the cursor if present
    pub fn eat_str(&mut self, expected: &str) -> bool {
        if self.looking_at(expected) {
            self.position += expected.chars().count();
            true
        } else {
            false
        }
    }

    pub fn looking_at(&self, expected: &str) -> bool {
        expected
            .chars()
            .enumerate()
            .all(|(i, c)| self.peek_at(i) == Some(c))
    }

    /// Read an identifier (`[A-Za-z_][A-Za-z0-9_]*`) at the cursor
    pub fn read_identifier(&mut self) -> Option<String> {
        let first = self.peek()?;
        if !first.is_alphabetic() && first != '_' {
            return None;
        }
        let start = self.position;
        while self
            .peek()
            .map(|c| c.is_alphanumeric() || c == '_')
            .unwrap_or(false)
        {
            self.position += 1;
        }
        Some(self.get_value(start, self.position - start))
    }

    /// Dispatch to the token parsers in descending priority order.
    ///
    /// Skips components the predicate rejects. Returns `Ok(None)` when every
    /// component declines ("no match"); the cursor is restored in that case.
    /// A component that declines must not have consumed input - enforced
    /// here by restoring the saved position after each `Declined`.
    pub fn try_parse(
        &mut self,
        prev: Option<&Expr>,
        predicate: Option<&dyn Fn(&dyn TokenParser) -> bool>,
    ) -> Result<Option<Expr>, WeftError> {
        let entry = self.position;
        self.skip_whitespace();
        let start = self.position;
        let parsers = Arc::clone(&self.parsers);
        for parser in parsers.iter() {
            if let Some(pred) = predicate {
                if !pred(parser.as_ref()) {
                    continue;
                }
            }
            match parser.try_parse(self, prev) {
                ParseOutcome::Matched(node) => return Ok(Some(node)),
                ParseOutcome::Declined => {
                    self.position = start;
                }
                ParseOutcome::Fatal(err) => return Err(err),
            }
        }
        self.position = entry;
        Ok(None)
    }

    /// Parse one full expression: a primary node followed by postfix/operator
    /// offers until every component declines
    pub fn parse_full(&mut self) -> Result<Expr, WeftError> {
        self.parse_with(None)
    }

    /// Full expression parse, with some components masked out by name
    /// (used by operand parsing inside the operator components)
    pub fn parse_excluding(&mut self, excluded: &'static [&'static str]) -> Result<Expr, WeftError> {
        self.parse_with(Some(excluded))
    }

    fn parse_with(&mut self, excluded: Option<&'static [&'static str]>) -> Result<Expr, WeftError> {
        let predicate = excluded.map(|names| {
            move |p: &dyn TokenParser| !names.contains(&p.name())
        });
        let predicate_ref: Option<&dyn Fn(&dyn TokenParser) -> bool> = match &predicate {
            Some(p) => Some(p),
            None => None,
        };

        let mut node = match self.try_parse(None, predicate_ref)? {
            Some(node) => node,
            None => {
                return Err(WeftError::Grammar {
                    position: self.position,
                    details: format!(
                        "no parser component claimed '{}'",
                        self.get_value(self.position, 12)
                    ),
                })
            }
        };
        loop {
            match self.try_parse(Some(&node), predicate_ref)? {
                Some(next) => node = next,
                None => break,
            }
        }
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::default_parsers;

    fn ctx(text: &str) -> TokenContext {
        let mut ctx = TokenContext::new(default_parsers());
        ctx.initialize(text, Metadata::new());
        ctx
    }

    #[test]
    fn position_and_limit_are_bounds_checked() {
        let mut c = ctx("abc");
        assert!(c.set_position(3).is_ok());
        assert!(c.set_position(4).is_err());
        assert!(c.set_limit(2).is_ok());
        assert!(c.set_limit(4).is_err());
    }

    #[test]
    fn limit_hides_the_tail_without_mutating_text() {
        let mut c = ctx("abcdef");
        c.set_limit(3).unwrap();
        assert_eq!(c.token_at(2), Some('c'));
        assert_eq!(c.token_at(3), None);
        assert_eq!(c.get_value(0, 6), "abc");
        c.set_limit(6).unwrap();
        assert_eq!(c.get_value(0, 6), "abcdef");
    }

    #[test]
    fn read_identifier_stops_at_boundaries() {
        let mut c = ctx("foo_1.bar");
        assert_eq!(c.read_identifier(), Some("foo_1".to_string()));
        assert_eq!(c.peek(), Some('.'));
        assert_eq!(c.read_identifier(), None);
    }

    #[test]
    fn eat_str_consumes_only_on_full_match() {
        let mut c = ctx("?.x");
        assert!(!c.eat_str("??"));
        assert_eq!(c.position(), 0);
        assert!(c.eat_str("?."));
        assert_eq!(c.position(), 2);
    }

    #[test]
    fn try_parse_restores_cursor_when_all_decline() {
        let mut c = ctx("   )");
        let before = c.position();
        let result = c.try_parse(None, None).unwrap();
        assert!(result.is_none());
        assert_eq!(c.position(), before);
    }
}
