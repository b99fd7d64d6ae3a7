//! Ambient metadata carrier
//!
//! Every entry point takes a `Metadata` argument instead of reading
//! process-wide mutable state: cancellation hints, locale, diagnostic tags,
//! and the parse-error sink all travel in the same bag.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::error::WeftError;
use crate::value::Value;

/// Shared accumulator for non-fatal parse errors.
///
/// Grammar errors attach to their statement and are collected here so one
/// pass over multi-statement input reports every problem.
#[derive(Clone, Default)]
pub struct ErrorSink {
    errors: Arc<Mutex<Vec<WeftError>>>,
}

impl ErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, error: WeftError) {
        self.errors.lock().push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.lock().len()
    }

    /// Drain the accumulated errors
    pub fn take(&self) -> Vec<WeftError> {
        std::mem::take(&mut *self.errors.lock())
    }
}

impl std::fmt::Debug for ErrorSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorSink").field("len", &self.len()).finish()
    }
}

/// Ambient key-value context threaded through parsing, resolution, and the
/// binding runtime
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    values: FxHashMap<String, Value>,
    error_sink: Option<ErrorSink>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_error_sink(sink: ErrorSink) -> Self {
        Self {
            values: FxHashMap::default(),
            error_sink: Some(sink),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn error_sink(&self) -> Option<&ErrorSink> {
        self.error_sink.as_ref()
    }

    /// Report a non-fatal error: collected when a sink is attached,
    /// otherwise returned to the caller as hard failure material
    pub fn report(&self, error: WeftError) -> Option<WeftError> {
        match &self.error_sink {
            Some(sink) => {
                sink.push(error);
                None
            }
            None => Some(error),
        }
    }

    /// Clear ambient values (per-parse state), keeping the sink attached
    pub fn reset_values(&mut self) {
        self.values.clear();
    }
}
