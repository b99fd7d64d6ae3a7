//! Binding runtime
//!
//! A [`Binding`] links one target member path to a source (a member path, a
//! computed expression with observed dependencies, or a plain object) through
//! an ordered component collection. Components gate their own membership
//! (`on_attaching` may veto), receive redispatched observer events for the
//! side they care about, and may intercept or claim values in transit.
//! `Valid -> Disposed` is the only state transition; a binding that failed to
//! construct is represented by the terminal [`InvalidBinding`].

pub mod mode;
pub mod pipeline;

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::ast::Expr;
use crate::error::WeftError;
use crate::eval::{evaluate, EvalOutcome, EvalServices};
use crate::member::observer::{ListenerHandle, MemberPathObserver, ObserverListener};
use crate::object::{ObjectRef, WeakObjectRef};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    Valid,
    Invalid,
    Disposed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateDirection {
    /// Source value flowing into the target member
    ToTarget,
    /// Target value flowing back into the source member
    ToSource,
}

/// Outcome of one update pass
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateResult {
    Updated(Value),
    /// The opposite path is unresolved; nothing was touched
    Canceled,
    /// A getter/setter threw; nothing was written
    Failed(WeftError),
    /// An interceptor consumed the value (e.g. deferred it)
    Intercepted,
}

/// What an interceptor does with a value in transit
pub enum Intercept {
    /// Pass this (possibly substituted) value along
    Continue(Value),
    /// Consume the value; the update pass stops without events
    Consume,
}

/// One unit of binding behavior. All hooks default to no-ops so components
/// implement only the events they care about.
#[allow(unused_variables)]
pub trait BindingComponent: Send + Sync {
    fn name(&self) -> &'static str;

    /// Return false to veto attachment
    fn on_attaching(&self, binding: &Arc<Binding>) -> bool {
        true
    }

    fn on_attached(&self, binding: &Arc<Binding>) {}

    fn on_detached(&self, binding: &Arc<Binding>) {}

    fn on_source_last_member_changed(&self, binding: &Arc<Binding>) {}

    fn on_source_path_members_changed(&self, binding: &Arc<Binding>) {}

    fn on_source_error(&self, binding: &Arc<Binding>, error: &WeftError) {}

    fn on_target_last_member_changed(&self, binding: &Arc<Binding>) {}

    fn on_target_path_members_changed(&self, binding: &Arc<Binding>) {}

    fn on_target_error(&self, binding: &Arc<Binding>, error: &WeftError) {}

    fn on_updated(&self, binding: &Arc<Binding>, direction: UpdateDirection, value: &Value) {}

    fn on_update_canceled(&self, binding: &Arc<Binding>, direction: UpdateDirection) {}

    fn on_update_failed(
        &self,
        binding: &Arc<Binding>,
        direction: UpdateDirection,
        error: &WeftError,
    ) {
    }

    /// Value pipeline hook, called in component order
    fn intercept(
        &self,
        binding: &Arc<Binding>,
        direction: UpdateDirection,
        value: Value,
    ) -> Intercept {
        Intercept::Continue(value)
    }

    /// Claim the final write; first component returning true wins
    fn try_set(&self, binding: &Arc<Binding>, direction: UpdateDirection, value: &Value) -> bool {
        false
    }
}

/// Where a binding's source values come from
pub enum BindingSource {
    /// A single observed member path
    Observer(Arc<MemberPathObserver>),
    /// A computed expression over a weakly-held root, with each contained
    /// member chain observed as a dependency
    Computed {
        root: WeakObjectRef,
        expr: Expr,
        dependencies: Vec<Arc<MemberPathObserver>>,
    },
    /// A fixed plain object; the object itself is the value
    Object(ObjectRef),
}

impl BindingSource {
    /// Builds a source for an expression: a plain chain becomes an observer,
    /// anything else is computed with its chains observed as dependencies
    pub fn for_expression(root: &ObjectRef, expr: &Expr) -> BindingSource {
        if let Some(observer) = MemberPathObserver::observe(root, expr) {
            return BindingSource::Observer(observer);
        }
        let dependencies = collect_chains(expr)
            .iter()
            .filter_map(|chain| MemberPathObserver::observe(root, chain))
            .collect();
        BindingSource::Computed {
            root: Arc::downgrade(root),
            expr: expr.clone(),
            dependencies,
        }
    }

    fn observers(&self) -> Vec<Arc<MemberPathObserver>> {
        match self {
            BindingSource::Observer(observer) => vec![Arc::clone(observer)],
            BindingSource::Computed { dependencies, .. } => dependencies.clone(),
            BindingSource::Object(_) => Vec::new(),
        }
    }
}

/// Member chains nested anywhere inside an expression
fn collect_chains(expr: &Expr) -> Vec<Expr> {
    fn walk(expr: &Expr, out: &mut Vec<Expr>) {
        if expr.is_member_chain() {
            out.push(expr.clone());
            return;
        }
        match expr {
            Expr::Binary { left, right, .. } => {
                walk(left, out);
                walk(right, out);
            }
            Expr::Unary { operand, .. } => walk(operand, out),
            Expr::Condition {
                test,
                if_true,
                if_false,
            } => {
                walk(test, out);
                walk(if_true, out);
                walk(if_false, out);
            }
            Expr::MethodCall { target, args, .. } => {
                if let Some(target) = target {
                    walk(target, out);
                }
                for arg in args {
                    walk(arg, out);
                }
            }
            Expr::Index { target, args } => {
                walk(target, out);
                for arg in args {
                    walk(arg, out);
                }
            }
            Expr::NullConditional(inner) => walk(inner, out),
            Expr::Lambda { body, .. } => walk(body, out),
            _ => {}
        }
    }
    let mut chains = Vec::new();
    walk(expr, &mut chains);
    chains
}

enum Side {
    Target,
    Source,
}

enum ObserverEvent {
    LastMember,
    PathMembers,
    Error(WeftError),
}

/// Redirects one observer's events into the binding's component collection.
/// Exactly one listener is registered per side; detaching it severs the
/// redirect so no events reach a disposed binding.
struct SideListener {
    binding: Weak<Binding>,
    side: Side,
}

impl ObserverListener for SideListener {
    fn on_last_member_changed(&self) {
        if let Some(binding) = self.binding.upgrade() {
            binding.redispatch(&self.side, ObserverEvent::LastMember);
        }
    }

    fn on_path_members_changed(&self) {
        if let Some(binding) = self.binding.upgrade() {
            binding.redispatch(&self.side, ObserverEvent::PathMembers);
        }
    }

    fn on_error(&self, error: &WeftError) {
        if let Some(binding) = self.binding.upgrade() {
            binding.redispatch(&self.side, ObserverEvent::Error(error.clone()));
        }
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding").finish_non_exhaustive()
    }
}

pub struct Binding {
    target: Arc<MemberPathObserver>,
    source: BindingSource,
    services: EvalServices,
    components: RwLock<Vec<Arc<dyn BindingComponent>>>,
    state: Mutex<BindingState>,
    target_listener: Mutex<Option<ListenerHandle>>,
    source_listeners: Mutex<Vec<(Arc<MemberPathObserver>, ListenerHandle)>>,
}

impl Binding {
    pub fn new(target: Arc<MemberPathObserver>, source: BindingSource) -> Arc<Binding> {
        Self::with_services(target, source, EvalServices::default())
    }

    pub fn with_services(
        target: Arc<MemberPathObserver>,
        source: BindingSource,
        services: EvalServices,
    ) -> Arc<Binding> {
        let binding = Arc::new(Binding {
            target,
            source,
            services,
            components: RwLock::new(Vec::new()),
            state: Mutex::new(BindingState::Valid),
            target_listener: Mutex::new(None),
            source_listeners: Mutex::new(Vec::new()),
        });
        binding.wire_listeners();
        binding
    }

    fn wire_listeners(self: &Arc<Self>) {
        let target_listener = Arc::new(SideListener {
            binding: Arc::downgrade(self),
            side: Side::Target,
        });
        *self.target_listener.lock() = Some(self.target.add_listener(target_listener));

        let mut source_listeners = self.source_listeners.lock();
        for observer in self.source.observers() {
            let listener = Arc::new(SideListener {
                binding: Arc::downgrade(self),
                side: Side::Source,
            });
            let handle = observer.add_listener(listener);
            source_listeners.push((observer, handle));
        }
    }

    pub fn state(&self) -> BindingState {
        *self.state.lock()
    }

    pub fn target(&self) -> &Arc<MemberPathObserver> {
        &self.target
    }

    pub fn source(&self) -> &BindingSource {
        &self.source
    }

    pub fn services(&self) -> &EvalServices {
        &self.services
    }

    fn snapshot(&self) -> Vec<Arc<dyn BindingComponent>> {
        self.components.read().clone()
    }

    /// Attach a component; `on_attaching` may veto. No-op on a disposed
    /// binding.
    pub fn attach_component(self: &Arc<Self>, component: Arc<dyn BindingComponent>) -> bool {
        if self.state() != BindingState::Valid {
            return false;
        }
        if !component.on_attaching(self) {
            trace!(component = component.name(), "attachment vetoed");
            return false;
        }
        self.components.write().push(Arc::clone(&component));
        component.on_attached(self);
        true
    }

    /// Detach the first component with the given name
    pub fn detach_component(self: &Arc<Self>, name: &str) -> bool {
        let removed = {
            let mut components = self.components.write();
            match components.iter().position(|c| c.name() == name) {
                Some(index) => Some(components.remove(index)),
                None => None,
            }
        };
        match removed {
            Some(component) => {
                component.on_detached(self);
                true
            }
            None => false,
        }
    }

    fn redispatch(self: &Arc<Self>, side: &Side, event: ObserverEvent) {
        if self.state() != BindingState::Valid {
            return;
        }
        for component in self.snapshot() {
            match (side, &event) {
                (Side::Source, ObserverEvent::LastMember) => {
                    component.on_source_last_member_changed(self)
                }
                (Side::Source, ObserverEvent::PathMembers) => {
                    component.on_source_path_members_changed(self)
                }
                (Side::Source, ObserverEvent::Error(error)) => {
                    component.on_source_error(self, error)
                }
                (Side::Target, ObserverEvent::LastMember) => {
                    component.on_target_last_member_changed(self)
                }
                (Side::Target, ObserverEvent::PathMembers) => {
                    component.on_target_path_members_changed(self)
                }
                (Side::Target, ObserverEvent::Error(error)) => {
                    component.on_target_error(self, error)
                }
            }
        }
    }

    /// Reads the current source-side value
    fn read_source(&self) -> EvalOutcome {
        match &self.source {
            BindingSource::Observer(observer) => {
                let last = observer.get_last_member(false);
                if let Some(error) = last.error {
                    return EvalOutcome::Fault(error);
                }
                if !last.is_available() {
                    return EvalOutcome::Unset;
                }
                match observer.get_value(false) {
                    Ok(Some(value)) => EvalOutcome::Value(value),
                    Ok(None) => EvalOutcome::Unset,
                    Err(error) => EvalOutcome::Fault(error),
                }
            }
            BindingSource::Computed { root, expr, .. } => match root.upgrade() {
                Some(root) => evaluate(expr, &root, &self.services),
                None => EvalOutcome::Unset,
            },
            BindingSource::Object(object) => EvalOutcome::Value(Value::Object(Arc::clone(object))),
        }
    }

    /// Push the source value into the target member
    pub fn update_target(self: &Arc<Self>) -> UpdateResult {
        self.run_update(UpdateDirection::ToTarget)
    }

    /// Push the target value back into the source member
    pub fn update_source(self: &Arc<Self>) -> UpdateResult {
        self.run_update(UpdateDirection::ToSource)
    }

    fn run_update(self: &Arc<Self>, direction: UpdateDirection) -> UpdateResult {
        if self.state() != BindingState::Valid {
            trace!(?direction, "update on non-valid binding ignored");
            return UpdateResult::Canceled;
        }

        let outcome = match direction {
            UpdateDirection::ToTarget => self.read_source(),
            UpdateDirection::ToSource => {
                let last = self.target.get_last_member(false);
                if let Some(error) = last.error {
                    EvalOutcome::Fault(error)
                } else if !last.is_available() {
                    EvalOutcome::Unset
                } else {
                    match self.target.get_value(false) {
                        Ok(Some(value)) => EvalOutcome::Value(value),
                        Ok(None) => EvalOutcome::Unset,
                        Err(error) => EvalOutcome::Fault(error),
                    }
                }
            }
        };

        let mut value = match outcome {
            EvalOutcome::Value(value) => value,
            EvalOutcome::Unset => {
                trace!(?direction, "update canceled, opposite path unresolved");
                self.notify_canceled(direction);
                return UpdateResult::Canceled;
            }
            EvalOutcome::Fault(error) => {
                debug!(?direction, %error, "update failed while reading");
                self.notify_failed(direction, &error);
                return UpdateResult::Failed(error);
            }
        };

        let components = self.snapshot();
        for component in &components {
            match component.intercept(self, direction, value) {
                Intercept::Continue(next) => value = next,
                Intercept::Consume => return UpdateResult::Intercepted,
            }
        }

        let handled = components
            .iter()
            .any(|component| component.try_set(self, direction, &value));
        if !handled {
            let write = match direction {
                UpdateDirection::ToTarget => self.target.set_value(value.clone()),
                UpdateDirection::ToSource => match &self.source {
                    BindingSource::Observer(observer) => observer.set_value(value.clone()),
                    // computed and plain-object sources have no writable member
                    _ => Ok(false),
                },
            };
            match write {
                Ok(true) => {}
                Ok(false) => {
                    self.notify_canceled(direction);
                    return UpdateResult::Canceled;
                }
                Err(error) => {
                    debug!(?direction, %error, "update failed while writing");
                    self.notify_failed(direction, &error);
                    return UpdateResult::Failed(error);
                }
            }
        }

        trace!(?direction, %value, "update applied");
        for component in &components {
            component.on_updated(self, direction, &value);
        }
        UpdateResult::Updated(value)
    }

    fn notify_canceled(self: &Arc<Self>, direction: UpdateDirection) {
        for component in self.snapshot() {
            component.on_update_canceled(self, direction);
        }
    }

    fn notify_failed(self: &Arc<Self>, direction: UpdateDirection, error: &WeftError) {
        for component in self.snapshot() {
            component.on_update_failed(self, direction, error);
        }
    }

    /// Idempotent and safe from any thread. Observers are disposed before
    /// the component collection is cleared, so `on_detached` callbacks still
    /// see a coherent binding.
    pub fn dispose(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if *state == BindingState::Disposed {
                return;
            }
            *state = BindingState::Disposed;
        }
        debug!("disposing binding");

        if let Some(handle) = self.target_listener.lock().take() {
            self.target.remove_listener(handle);
        }
        for (observer, handle) in self.source_listeners.lock().drain(..) {
            observer.remove_listener(handle);
            observer.dispose();
        }
        self.target.dispose();

        let components = std::mem::take(&mut *self.components.write());
        for component in components {
            component.on_detached(self);
        }
    }
}

/// Terminal stand-in for a binding that failed to construct. Updates always
/// report the creation failure and never touch a graph.
pub struct InvalidBinding {
    error: WeftError,
}

impl InvalidBinding {
    pub fn new(error: WeftError) -> Self {
        Self { error }
    }

    pub fn state(&self) -> BindingState {
        BindingState::Invalid
    }

    pub fn error(&self) -> &WeftError {
        &self.error
    }

    pub fn update_target(&self) -> UpdateResult {
        UpdateResult::Failed(self.error.clone())
    }

    pub fn update_source(&self) -> UpdateResult {
        UpdateResult::Failed(self.error.clone())
    }

    pub fn dispose(&self) {}
}

// ─────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::PathSegment;
    use crate::object::ObservableMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn observer(root: &ObjectRef, names: &[&str]) -> Arc<MemberPathObserver> {
        let segments = names.iter().map(|n| PathSegment::property(n)).collect();
        MemberPathObserver::new(root, segments)
    }

    fn graph() -> (ObjectRef, ObjectRef) {
        let target = ObservableMap::new("View");
        target.set("Text", Value::str(""));
        let source = ObservableMap::new("Model");
        source.set("Name", Value::str("Ada"));
        (target, source)
    }

    #[derive(Default)]
    struct RecordingComponent {
        updated: AtomicUsize,
        canceled: AtomicUsize,
        failed: AtomicUsize,
    }

    impl BindingComponent for RecordingComponent {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn on_updated(&self, _: &Arc<Binding>, _: UpdateDirection, _: &Value) {
            self.updated.fetch_add(1, Ordering::SeqCst);
        }

        fn on_update_canceled(&self, _: &Arc<Binding>, _: UpdateDirection) {
            self.canceled.fetch_add(1, Ordering::SeqCst);
        }

        fn on_update_failed(&self, _: &Arc<Binding>, _: UpdateDirection, _: &WeftError) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn update_target_copies_source_value() {
        let (target, source) = graph();
        let binding = Binding::new(
            observer(&target, &["Text"]),
            BindingSource::Observer(observer(&source, &["Name"])),
        );
        assert_eq!(
            binding.update_target(),
            UpdateResult::Updated(Value::str("Ada"))
        );
        assert_eq!(target.get("Text"), Some(Value::str("Ada")));
    }

    #[test]
    fn unresolved_source_cancels_without_touching_target() {
        let (target, source) = graph();
        let binding = Binding::new(
            observer(&target, &["Text"]),
            BindingSource::Observer(observer(&source, &["Missing", "Tail"])),
        );
        let recorder = Arc::new(RecordingComponent::default());
        binding.attach_component(recorder.clone());
        assert_eq!(binding.update_target(), UpdateResult::Canceled);
        assert_eq!(target.get("Text"), Some(Value::str("")));
        assert_eq!(recorder.canceled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn getter_fault_fails_update() {
        let (target, source) = graph();
        source.set_failing("Name", "offline");
        let binding = Binding::new(
            observer(&target, &["Text"]),
            BindingSource::Observer(observer(&source, &["Name"])),
        );
        let recorder = Arc::new(RecordingComponent::default());
        binding.attach_component(recorder.clone());
        assert!(matches!(binding.update_target(), UpdateResult::Failed(_)));
        assert_eq!(recorder.failed.load(Ordering::SeqCst), 1);
        assert_eq!(target.get("Text"), Some(Value::str("")));
    }

    #[test]
    fn interceptor_substitutes_value() {
        struct Upper;
        impl BindingComponent for Upper {
            fn name(&self) -> &'static str {
                "upper"
            }
            fn intercept(&self, _: &Arc<Binding>, _: UpdateDirection, value: Value) -> Intercept {
                match value {
                    Value::Str(s) => Intercept::Continue(Value::str(s.to_uppercase())),
                    other => Intercept::Continue(other),
                }
            }
        }
        let (target, source) = graph();
        let binding = Binding::new(
            observer(&target, &["Text"]),
            BindingSource::Observer(observer(&source, &["Name"])),
        );
        binding.attach_component(Arc::new(Upper));
        binding.update_target();
        assert_eq!(target.get("Text"), Some(Value::str("ADA")));
    }

    #[test]
    fn setter_component_claims_the_write() {
        struct Claim {
            seen: Mutex<Option<Value>>,
        }
        impl BindingComponent for Claim {
            fn name(&self) -> &'static str {
                "claim"
            }
            fn try_set(&self, _: &Arc<Binding>, _: UpdateDirection, value: &Value) -> bool {
                *self.seen.lock() = Some(value.clone());
                true
            }
        }
        let (target, source) = graph();
        let binding = Binding::new(
            observer(&target, &["Text"]),
            BindingSource::Observer(observer(&source, &["Name"])),
        );
        let claim = Arc::new(Claim {
            seen: Mutex::new(None),
        });
        binding.attach_component(claim.clone());
        assert!(matches!(binding.update_target(), UpdateResult::Updated(_)));
        // the claimed write never reached the target member
        assert_eq!(target.get("Text"), Some(Value::str("")));
        assert_eq!(*claim.seen.lock(), Some(Value::str("Ada")));
    }

    #[test]
    fn computed_source_evaluates_expression() {
        let (target, source) = graph();
        source.set("Greeting", Value::str("hi "));
        let expr = Expr::binary(
            crate::ast::BinaryOp::Add,
            Expr::member("Greeting"),
            Expr::member("Name"),
        );
        let binding = Binding::new(
            observer(&target, &["Text"]),
            BindingSource::for_expression(&source, &expr),
        );
        assert_eq!(
            binding.update_target(),
            UpdateResult::Updated(Value::str("hi Ada"))
        );
    }

    #[test]
    fn dispose_is_idempotent_and_updates_become_noops() {
        let (target, source) = graph();
        let binding = Binding::new(
            observer(&target, &["Text"]),
            BindingSource::Observer(observer(&source, &["Name"])),
        );
        binding.dispose();
        binding.dispose();
        assert_eq!(binding.state(), BindingState::Disposed);
        assert_eq!(binding.update_target(), UpdateResult::Canceled);
        assert_eq!(target.get("Text"), Some(Value::str("")));
    }

    #[test]
    fn disposed_binding_receives_no_observer_events() {
        let (target, source) = graph();
        let binding = Binding::new(
            observer(&target, &["Text"]),
            BindingSource::Observer(observer(&source, &["Name"])),
        );
        let recorder = Arc::new(RecordingComponent::default());
        binding.attach_component(recorder.clone());
        binding.dispose();
        source.set("Name", Value::str("Grace"));
        assert_eq!(recorder.updated.load(Ordering::SeqCst), 0);
        assert_eq!(recorder.canceled.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn invalid_binding_always_reports_its_creation_error() {
        let invalid = InvalidBinding::new(WeftError::BindingCreation {
            details: "no source".into(),
        });
        assert_eq!(invalid.state(), BindingState::Invalid);
        assert!(matches!(invalid.update_target(), UpdateResult::Failed(_)));
        assert!(matches!(invalid.update_source(), UpdateResult::Failed(_)));
    }

    #[test]
    fn attach_component_veto_keeps_collection_unchanged() {
        struct Veto;
        impl BindingComponent for Veto {
            fn name(&self) -> &'static str {
                "veto"
            }
            fn on_attaching(&self, _: &Arc<Binding>) -> bool {
                false
            }
        }
        let (target, source) = graph();
        let binding = Binding::new(
            observer(&target, &["Text"]),
            BindingSource::Observer(observer(&source, &["Name"])),
        );
        assert!(!binding.attach_component(Arc::new(Veto)));
        assert!(binding.components.read().is_empty());
    }
}
