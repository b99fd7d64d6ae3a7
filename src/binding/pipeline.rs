//! Value pipeline components
//!
//! Interceptors that transform, substitute, defer, or consume values in
//! transit between the binding's two sides: converters, fallback/null
//! substitution, delay (debounce) via a host dispatcher, and command
//! adapters.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::binding::{Binding, BindingComponent, Intercept, UpdateDirection};
use crate::value::Value;

pub type ConvertFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Applies a conversion in each direction the closure is present for
pub struct ConverterComponent {
    to_target: Option<ConvertFn>,
    to_source: Option<ConvertFn>,
}

impl ConverterComponent {
    pub fn new(to_target: Option<ConvertFn>, to_source: Option<ConvertFn>) -> Self {
        Self {
            to_target,
            to_source,
        }
    }

    pub fn to_target(convert: ConvertFn) -> Self {
        Self::new(Some(convert), None)
    }
}

impl BindingComponent for ConverterComponent {
    fn name(&self) -> &'static str {
        "converter"
    }

    fn intercept(
        &self,
        _binding: &Arc<Binding>,
        direction: UpdateDirection,
        value: Value,
    ) -> Intercept {
        let convert = match direction {
            UpdateDirection::ToTarget => &self.to_target,
            UpdateDirection::ToSource => &self.to_source,
        };
        match convert {
            Some(convert) => Intercept::Continue(convert(value)),
            None => Intercept::Continue(value),
        }
    }
}

/// Substitutes a fallback when the source path is unresolved, and a
/// target-null-value when the source produced null
pub struct FallbackComponent {
    fallback: Option<Value>,
    target_null_value: Option<Value>,
}

impl FallbackComponent {
    pub fn new(fallback: Option<Value>, target_null_value: Option<Value>) -> Self {
        Self {
            fallback,
            target_null_value,
        }
    }

    pub fn fallback(value: Value) -> Self {
        Self::new(Some(value), None)
    }
}

impl BindingComponent for FallbackComponent {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn intercept(
        &self,
        _binding: &Arc<Binding>,
        direction: UpdateDirection,
        value: Value,
    ) -> Intercept {
        if direction == UpdateDirection::ToTarget && value.is_null() {
            if let Some(substitute) = &self.target_null_value {
                trace!("substituting target null value");
                return Intercept::Continue(substitute.clone());
            }
        }
        Intercept::Continue(value)
    }

    fn on_update_canceled(&self, binding: &Arc<Binding>, direction: UpdateDirection) {
        // a canceled target update means the source had nothing to offer
        if direction != UpdateDirection::ToTarget {
            return;
        }
        if let Some(fallback) = &self.fallback {
            trace!("writing fallback for unresolved source");
            if let Err(error) = binding.target().set_value(fallback.clone()) {
                debug!(%error, "fallback write failed");
            }
        }
    }
}

/// How a deferred callback should be scheduled on the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Immediate,
    Deferred(Duration),
}

/// Host scheduling abstraction; the binding runtime never blocks or spins
pub trait Dispatcher: Send + Sync {
    fn execute(&self, mode: ExecutionMode, callback: Box<dyn FnOnce() + Send>);
}

/// Runs callbacks synchronously; useful in tests and single-threaded hosts
pub struct InlineDispatcher;

impl Dispatcher for InlineDispatcher {
    fn execute(&self, _mode: ExecutionMode, callback: Box<dyn FnOnce() + Send>) {
        callback();
    }
}

/// Captures callbacks for manual draining
#[derive(Default)]
pub struct QueuedDispatcher {
    queue: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl QueuedDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn drain(&self) {
        let callbacks: Vec<_> = self.queue.lock().drain(..).collect();
        for callback in callbacks {
            callback();
        }
    }
}

impl Dispatcher for QueuedDispatcher {
    fn execute(&self, _mode: ExecutionMode, callback: Box<dyn FnOnce() + Send>) {
        self.queue.lock().push(callback);
    }
}

#[derive(Default)]
struct DelayState {
    pending_to_target: AtomicBool,
    pending_to_source: AtomicBool,
    flushing_to_target: AtomicBool,
    flushing_to_source: AtomicBool,
}

impl DelayState {
    fn pending(&self, direction: UpdateDirection) -> &AtomicBool {
        match direction {
            UpdateDirection::ToTarget => &self.pending_to_target,
            UpdateDirection::ToSource => &self.pending_to_source,
        }
    }

    fn flushing(&self, direction: UpdateDirection) -> &AtomicBool {
        match direction {
            UpdateDirection::ToTarget => &self.flushing_to_target,
            UpdateDirection::ToSource => &self.flushing_to_source,
        }
    }
}

/// Debounce: consumes updates and schedules a deferred re-run on the
/// dispatcher. At most one deferred update is pending per direction; a newer
/// change coalesces into the pending one, which reads the latest value when
/// it finally runs.
pub struct DelayComponent {
    dispatcher: Arc<dyn Dispatcher>,
    delay: Duration,
    state: Arc<DelayState>,
}

impl DelayComponent {
    pub fn new(dispatcher: Arc<dyn Dispatcher>, delay: Duration) -> Self {
        Self {
            dispatcher,
            delay,
            state: Arc::new(DelayState::default()),
        }
    }
}

impl BindingComponent for DelayComponent {
    fn name(&self) -> &'static str {
        "delay"
    }

    fn intercept(
        &self,
        binding: &Arc<Binding>,
        direction: UpdateDirection,
        value: Value,
    ) -> Intercept {
        // the deferred re-run passes through untouched
        if self.state.flushing(direction).load(Ordering::SeqCst) {
            return Intercept::Continue(value);
        }
        if self
            .state
            .pending(direction)
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            trace!(?direction, "coalescing into pending deferred update");
            return Intercept::Consume;
        }

        let state = Arc::clone(&self.state);
        let weak: Weak<Binding> = Arc::downgrade(binding);
        self.dispatcher.execute(
            ExecutionMode::Deferred(self.delay),
            Box::new(move || {
                state.pending(direction).store(false, Ordering::SeqCst);
                let Some(binding) = weak.upgrade() else {
                    return;
                };
                state.flushing(direction).store(true, Ordering::SeqCst);
                match direction {
                    UpdateDirection::ToTarget => binding.update_target(),
                    UpdateDirection::ToSource => binding.update_source(),
                };
                state.flushing(direction).store(false, Ordering::SeqCst);
            }),
        );
        Intercept::Consume
    }
}

/// Host command abstraction consumed by [`CommandComponent`]
pub trait Command: Send + Sync {
    fn execute(&self, parameter: &Value);

    fn can_execute(&self, parameter: &Value) -> bool {
        let _ = parameter;
        true
    }
}

/// Routes source-side values into a command instead of a target member.
/// Claims the target write, so the pipeline terminates here.
pub struct CommandComponent {
    command: Arc<dyn Command>,
    last_can_execute: AtomicBool,
}

impl CommandComponent {
    pub fn new(command: Arc<dyn Command>) -> Self {
        Self {
            command,
            last_can_execute: AtomicBool::new(true),
        }
    }

    /// Result of the most recent `can_execute` probe
    pub fn can_execute(&self) -> bool {
        self.last_can_execute.load(Ordering::SeqCst)
    }
}

impl BindingComponent for CommandComponent {
    fn name(&self) -> &'static str {
        "command"
    }

    fn try_set(&self, _binding: &Arc<Binding>, direction: UpdateDirection, value: &Value) -> bool {
        if direction != UpdateDirection::ToTarget {
            return false;
        }
        let allowed = self.command.can_execute(value);
        self.last_can_execute.store(allowed, Ordering::SeqCst);
        if allowed {
            self.command.execute(value);
        } else {
            trace!("command rejected execution");
        }
        true
    }
}

// ─────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────
