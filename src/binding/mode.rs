//! Binding mode components
//!
//! Modes decide when automatic propagation runs. Each mode attaches as a
//! plain [`BindingComponent`] and reacts to the redispatched observer events
//! for the side it watches. An error event never triggers an update.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::trace;

use crate::binding::{Binding, BindingComponent, UpdateResult};

/// Source-to-target propagation: once on attach, then on every source change
pub struct OneWay;

impl BindingComponent for OneWay {
    fn name(&self) -> &'static str {
        "one-way"
    }

    fn on_attached(&self, binding: &Arc<Binding>) {
        binding.update_target();
    }

    fn on_source_last_member_changed(&self, binding: &Arc<Binding>) {
        binding.update_target();
    }

    fn on_source_path_members_changed(&self, binding: &Arc<Binding>) {
        binding.update_target();
    }
}

/// Target-to-source propagation, the mirror of [`OneWay`]
pub struct OneWayToSource;

impl BindingComponent for OneWayToSource {
    fn name(&self) -> &'static str {
        "one-way-to-source"
    }

    fn on_attached(&self, binding: &Arc<Binding>) {
        binding.update_source();
    }

    fn on_target_last_member_changed(&self, binding: &Arc<Binding>) {
        binding.update_source();
    }

    fn on_target_path_members_changed(&self, binding: &Arc<Binding>) {
        binding.update_source();
    }
}

/// Bidirectional propagation with an echo guard: a change caused by the
/// binding's own write must not bounce back to the side it came from
#[derive(Default)]
pub struct TwoWay {
    propagating: AtomicBool,
}

impl TwoWay {
    pub fn new() -> Self {
        Self::default()
    }

    fn guarded(&self, update: impl FnOnce() -> UpdateResult) {
        if self
            .propagating
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            trace!("suppressing two-way echo");
            return;
        }
        update();
        self.propagating.store(false, Ordering::SeqCst);
    }
}

impl BindingComponent for TwoWay {
    fn name(&self) -> &'static str {
        "two-way"
    }

    fn on_attached(&self, binding: &Arc<Binding>) {
        self.guarded(|| binding.update_target());
    }

    fn on_source_last_member_changed(&self, binding: &Arc<Binding>) {
        self.guarded(|| binding.update_target());
    }

    fn on_source_path_members_changed(&self, binding: &Arc<Binding>) {
        self.guarded(|| binding.update_target());
    }

    fn on_target_last_member_changed(&self, binding: &Arc<Binding>) {
        self.guarded(|| binding.update_source());
    }

    fn on_target_path_members_changed(&self, binding: &Arc<Binding>) {
        self.guarded(|| binding.update_source());
    }
}

/// Updates the target once, then detaches itself. If the source is not yet
/// resolvable on attach, the first availability triggers the one update.
pub struct OneTime {
    done: AtomicBool,
    dispose_binding: bool,
}

impl OneTime {
    pub fn new() -> Self {
        Self {
            done: AtomicBool::new(false),
            dispose_binding: false,
        }
    }

    /// Dispose the whole binding after the single update has run
    pub fn disposing() -> Self {
        Self {
            done: AtomicBool::new(false),
            dispose_binding: true,
        }
    }

    fn try_once(&self, binding: &Arc<Binding>) {
        if self.done.load(Ordering::SeqCst) {
            return;
        }
        if let UpdateResult::Updated(_) = binding.update_target() {
            self.done.store(true, Ordering::SeqCst);
            binding.detach_component(self.name());
            if self.dispose_binding {
                binding.dispose();
            }
        }
    }
}

impl Default for OneTime {
    fn default() -> Self {
        Self::new()
    }
}

impl BindingComponent for OneTime {
    fn name(&self) -> &'static str {
        "one-time"
    }

    fn on_attached(&self, binding: &Arc<Binding>) {
        self.try_once(binding);
    }

    fn on_source_last_member_changed(&self, binding: &Arc<Binding>) {
        self.try_once(binding);
    }

    fn on_source_path_members_changed(&self, binding: &Arc<Binding>) {
        self.try_once(binding);
    }
}

// ─────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────
