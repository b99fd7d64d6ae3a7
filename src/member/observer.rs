//! Member path observation
//!
//! A [`MemberPathObserver`] watches one member chain (`Person.Address.City`)
//! on a weakly-held root. Resolution is lazy; listeners are only wired to
//! live objects while at least one observer listener is attached, and every
//! hop subscription is torn down when the last listener leaves - no
//! listener, no subscription. Re-resolution always tears the old chain down
//! fully before subscribing the new one, and subscribe/teardown is atomic
//! with respect to notification delivery.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::WeftError;
use crate::member::{
    member_path, read_hop, write_hop, ChainCursor, MemberDescriptor, MemberFlags, MemberKind,
    PathSegment,
};
use crate::object::{ObjectRef, Subscription, WeakObjectRef};
use crate::value::Value;

/// The resolved tail of a member path. `error` set (and the others `None`)
/// means resolution itself threw; everything `None` means the path currently
/// has no value - a state, not an error.
#[derive(Clone, Default)]
pub struct MemberPathLastMember {
    pub target: Option<ObjectRef>,
    pub member: Option<MemberDescriptor>,
    pub error: Option<WeftError>,
}

impl MemberPathLastMember {
    pub fn is_available(&self) -> bool {
        self.target.is_some() && self.member.is_some()
    }
}

/// Structured observer events
pub trait ObserverListener: Send + Sync {
    /// The tail member's value changed; consumers re-read and push
    fn on_last_member_changed(&self);

    /// An intermediate link changed; the chain has been re-resolved
    fn on_path_members_changed(&self);

    /// A getter threw during resolution
    fn on_error(&self, error: &WeftError);
}

pub type ListenerHandle = u64;

struct ObserverState {
    /// RAII hop subscriptions; dropping unsubscribes
    hops: Vec<Subscription>,
    /// Tail cursor + segment, for value reads/writes
    tail: Option<(ChainCursor, PathSegment)>,
    last: Option<MemberPathLastMember>,
}

pub struct MemberPathObserver {
    root: WeakObjectRef,
    segments: Vec<PathSegment>,
    state: Mutex<ObserverState>,
    listeners: Mutex<Vec<(ListenerHandle, Arc<dyn ObserverListener>)>>,
    next_listener: AtomicU64,
    disposed: AtomicBool,
}

enum ChangeEvent {
    LastMember,
    PathMembers,
    Error(WeftError),
}

impl MemberPathObserver {
    pub fn new(root: &ObjectRef, segments: Vec<PathSegment>) -> Arc<Self> {
        Arc::new(Self {
            root: Arc::downgrade(root),
            segments,
            state: Mutex::new(ObserverState {
                hops: Vec::new(),
                tail: None,
                last: None,
            }),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
            disposed: AtomicBool::new(false),
        })
    }

    /// Observer for a root-relative member-chain expression; `None` when the
    /// expression is not a watchable chain
    pub fn observe(root: &ObjectRef, path: &crate::ast::Expr) -> Option<Arc<Self>> {
        let segments = member_path(path)?;
        Some(Self::new(root, segments))
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn root(&self) -> Option<ObjectRef> {
        self.root.upgrade()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Resolved tail of the path. `force` drops the cached resolution first.
    pub fn get_last_member(self: &Arc<Self>, force: bool) -> MemberPathLastMember {
        if self.is_disposed() {
            return MemberPathLastMember::default();
        }
        let mut state = self.state.lock();
        if force || state.last.is_none() {
            let has_listeners = !self.listeners.lock().is_empty();
            self.resolve_locked(&mut state, has_listeners);
        }
        state.last.clone().unwrap_or_default()
    }

    /// Reads the tail value; `Ok(None)` when the path is unresolved
    pub fn get_value(self: &Arc<Self>, force: bool) -> Result<Option<Value>, WeftError> {
        let last = self.get_last_member(force);
        if let Some(error) = last.error {
            return Err(error);
        }
        let state = self.state.lock();
        match &state.tail {
            Some((cursor, segment)) => read_hop(cursor, segment),
            None => Ok(None),
        }
    }

    /// Writes through the tail member; `Ok(false)` when the path is
    /// unresolved (the write is canceled, not an error)
    pub fn set_value(self: &Arc<Self>, value: Value) -> Result<bool, WeftError> {
        let last = self.get_last_member(false);
        if let Some(error) = last.error {
            return Err(error);
        }
        if !last.is_available() {
            return Ok(false);
        }
        let state = self.state.lock();
        match &state.tail {
            Some((cursor, segment)) => {
                write_hop(cursor, segment, value)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Attaches a listener. The first listener wires every notifying hop.
    pub fn add_listener(
        self: &Arc<Self>,
        listener: Arc<dyn ObserverListener>,
    ) -> ListenerHandle {
        let handle = self.next_listener.fetch_add(1, Ordering::SeqCst);
        let mut listeners = self.listeners.lock();
        let first = listeners.is_empty();
        listeners.push((handle, listener));
        drop(listeners);
        if first && !self.is_disposed() {
            let mut state = self.state.lock();
            self.resolve_locked(&mut state, true);
        }
        handle
    }

    /// Detaches a listener. The last one out tears down every hop
    /// subscription.
    pub fn remove_listener(self: &Arc<Self>, handle: ListenerHandle) {
        let mut listeners = self.listeners.lock();
        listeners.retain(|(id, _)| *id != handle);
        let empty = listeners.is_empty();
        drop(listeners);
        if empty {
            trace!("last listener removed, tearing down hop subscriptions");
            self.state.lock().hops.clear();
        }
    }

    /// Idempotent; releases all hop subscriptions and listeners
    pub fn dispose(self: &Arc<Self>) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(hops = self.segments.len(), "disposing member path observer");
        let mut state = self.state.lock();
        state.hops.clear();
        state.tail = None;
        state.last = None;
        drop(state);
        self.listeners.lock().clear();
    }

    /// Re-resolves the chain under the state lock. With `subscribe` set, the
    /// old hop subscriptions are dropped first and the new chain is wired
    /// before the lock is released.
    fn resolve_locked(self: &Arc<Self>, state: &mut ObserverState, subscribe: bool) {
        // full teardown before any resubscription
        state.hops.clear();
        state.tail = None;

        let Some(root) = self.root.upgrade() else {
            state.last = Some(MemberPathLastMember::default());
            return;
        };
        if self.segments.is_empty() {
            state.last = Some(MemberPathLastMember::default());
            return;
        }

        let mut cursor = ChainCursor::Object(root);
        for (index, segment) in self.segments.iter().enumerate() {
            if subscribe {
                if let (ChainCursor::Object(object), PathSegment::Property(name)) =
                    (&cursor, segment)
                {
                    state
                        .hops
                        .push(object.subscribe(name.as_ref(), self.hop_callback(index)));
                }
            }
            if index + 1 == self.segments.len() {
                let member = MemberDescriptor::new(
                    &segment_name(segment),
                    MemberKind::Accessor,
                    MemberFlags::INSTANCE | MemberFlags::DYNAMIC,
                    cursor
                        .as_object()
                        .map(|o| o.type_name().to_owned())
                        .unwrap_or_else(|| "Array".to_owned())
                        .as_str(),
                );
                state.tail = Some((cursor.clone(), segment.clone()));
                state.last = Some(MemberPathLastMember {
                    target: cursor.as_object().cloned(),
                    member: Some(member),
                    error: None,
                });
                return;
            }
            match read_hop(&cursor, segment) {
                Ok(Some(value)) => match ChainCursor::from_value(value) {
                    Some(next) => cursor = next,
                    None => {
                        state.last = Some(MemberPathLastMember::default());
                        return;
                    }
                },
                Ok(None) => {
                    state.last = Some(MemberPathLastMember::default());
                    return;
                }
                Err(error) => {
                    state.last = Some(MemberPathLastMember {
                        target: None,
                        member: None,
                        error: Some(error),
                    });
                    return;
                }
            }
        }
    }

    fn hop_callback(self: &Arc<Self>, hop_index: usize) -> crate::object::ChangeCallback {
        let weak: Weak<MemberPathObserver> = Arc::downgrade(self);
        Arc::new(move |_name, _value| {
            if let Some(observer) = weak.upgrade() {
                observer.handle_hop_change(hop_index);
            }
        })
    }

    fn handle_hop_change(self: &Arc<Self>, hop_index: usize) {
        if self.is_disposed() {
            return;
        }
        let event = {
            let mut state = self.state.lock();
            if hop_index + 1 == self.segments.len() {
                ChangeEvent::LastMember
            } else {
                // intermediate link replaced: rebuild the chain
                self.resolve_locked(&mut state, true);
                match state.last.as_ref().and_then(|l| l.error.clone()) {
                    Some(error) => ChangeEvent::Error(error),
                    None => ChangeEvent::PathMembers,
                }
            }
        };
        self.notify(event);
    }

    fn notify(&self, event: ChangeEvent) {
        let listeners: Vec<Arc<dyn ObserverListener>> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            match &event {
                ChangeEvent::LastMember => listener.on_last_member_changed(),
                ChangeEvent::PathMembers => listener.on_path_members_changed(),
                ChangeEvent::Error(error) => listener.on_error(error),
            }
        }
    }
}

fn segment_name(segment: &PathSegment) -> String {
    match segment {
        PathSegment::Property(name) => name.to_string(),
        PathSegment::Index(_) => "Item".to_owned(),
    }
}

// ─────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObservableMap;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingListener {
        last_member: AtomicUsize,
        path_members: AtomicUsize,
        errors: AtomicUsize,
    }

    impl ObserverListener for CountingListener {
        fn on_last_member_changed(&self) {
            self.last_member.fetch_add(1, Ordering::SeqCst);
        }

        fn on_path_members_changed(&self) {
            self.path_members.fetch_add(1, Ordering::SeqCst);
        }

        fn on_error(&self, _error: &WeftError) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn person_with_address(city: &str) -> ObjectRef {
        let address = ObservableMap::new("Address");
        address.set("City", Value::str(city));
        let person = ObservableMap::new("Person");
        person.set("Address", Value::Object(address));
        person
    }

    fn path(names: &[&str]) -> Vec<PathSegment> {
        names.iter().map(|n| PathSegment::property(n)).collect()
    }

    #[test]
    fn resolves_tail_value() {
        let person = person_with_address("Oslo");
        let observer = MemberPathObserver::new(&person, path(&["Address", "City"]));
        let last = observer.get_last_member(false);
        assert!(last.is_available());
        assert_eq!(last.member.unwrap().name.as_ref(), "City");
        assert_eq!(observer.get_value(false).unwrap(), Some(Value::str("Oslo")));
    }

    #[test]
    fn resolution_is_stable_without_intervening_changes() {
        let person = person_with_address("Oslo");
        let observer = MemberPathObserver::new(&person, path(&["Address", "City"]));
        let first = observer.get_last_member(false);
        let second = observer.get_last_member(false);
        assert!(Arc::ptr_eq(
            first.target.as_ref().unwrap(),
            second.target.as_ref().unwrap()
        ));
        assert_eq!(first.member.unwrap(), second.member.unwrap());
        assert!(first.error.is_none() && second.error.is_none());
        assert_eq!(
            observer.get_value(false).unwrap(),
            observer.get_value(false).unwrap()
        );
    }

    #[test]
    fn unresolved_path_is_unavailable_not_an_error() {
        let person = person_with_address("Oslo");
        let observer = MemberPathObserver::new(&person, path(&["Missing", "City"]));
        let last = observer.get_last_member(false);
        assert!(!last.is_available());
        assert!(last.error.is_none());
        assert_eq!(observer.get_value(false).unwrap(), None);
    }

    #[test]
    fn getter_fault_surfaces_as_error() {
        let person = person_with_address("Oslo");
        person.set_failing("Address", "database offline");
        let observer = MemberPathObserver::new(&person, path(&["Address", "City"]));
        let last = observer.get_last_member(true);
        assert!(last.error.is_some());
        assert!(!last.is_available());
    }

    #[test]
    fn dead_root_resolves_to_unavailable() {
        let observer = {
            let person = person_with_address("Oslo");
            MemberPathObserver::new(&person, path(&["Address", "City"]))
        };
        let last = observer.get_last_member(true);
        assert!(!last.is_available());
        assert!(last.error.is_none());
    }

    #[test]
    fn last_member_change_notifies_listener() {
        let person = person_with_address("Oslo");
        let observer = MemberPathObserver::new(&person, path(&["Address", "City"]));
        let listener = Arc::new(CountingListener::default());
        observer.add_listener(listener.clone());

        let address = person.get("Address").unwrap();
        address.as_object().unwrap().set("City", Value::str("Bergen"));

        assert_eq!(listener.last_member.load(Ordering::SeqCst), 1);
        assert_eq!(listener.path_members.load(Ordering::SeqCst), 0);
        assert_eq!(observer.get_value(true).unwrap(), Some(Value::str("Bergen")));
    }

    #[test]
    fn intermediate_change_rebuilds_chain() {
        let person = person_with_address("Oslo");
        let observer = MemberPathObserver::new(&person, path(&["Address", "City"]));
        let listener = Arc::new(CountingListener::default());
        observer.add_listener(listener.clone());

        let replacement = ObservableMap::new("Address");
        replacement.set("City", Value::str("Tromso"));
        person.set("Address", Value::Object(replacement));

        assert_eq!(listener.path_members.load(Ordering::SeqCst), 1);
        assert_eq!(
            observer.get_value(false).unwrap(),
            Some(Value::str("Tromso"))
        );

        // the rebuilt chain watches the replacement object
        let address = person.get("Address").unwrap();
        address.as_object().unwrap().set("City", Value::str("Narvik"));
        assert_eq!(listener.last_member.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn removing_last_listener_unhooks_every_subscription() {
        let person = person_with_address("Oslo");
        let observer = MemberPathObserver::new(&person, path(&["Address", "City"]));
        let listener = Arc::new(CountingListener::default());
        let handle = observer.add_listener(listener.clone());
        observer.remove_listener(handle);

        let address = person.get("Address").unwrap();
        address.as_object().unwrap().set("City", Value::str("Bergen"));
        person.set("Address", Value::Null);

        assert_eq!(listener.last_member.load(Ordering::SeqCst), 0);
        assert_eq!(listener.path_members.load(Ordering::SeqCst), 0);
        assert_eq!(listener.errors.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dispose_is_idempotent_and_silences_changes() {
        let person = person_with_address("Oslo");
        let observer = MemberPathObserver::new(&person, path(&["Address", "City"]));
        let listener = Arc::new(CountingListener::default());
        observer.add_listener(listener.clone());

        observer.dispose();
        observer.dispose();

        let address = person.get("Address").unwrap();
        address.as_object().unwrap().set("City", Value::str("Bergen"));
        assert_eq!(listener.last_member.load(Ordering::SeqCst), 0);
        assert!(!observer.get_last_member(true).is_available());
    }

    #[test]
    fn set_value_writes_through_tail() {
        let person = person_with_address("Oslo");
        let observer = MemberPathObserver::new(&person, path(&["Address", "City"]));
        assert!(observer.set_value(Value::str("Bergen")).unwrap());
        assert_eq!(
            observer.get_value(true).unwrap(),
            Some(Value::str("Bergen"))
        );

        let broken = MemberPathObserver::new(&person, path(&["Missing", "City"]));
        assert!(!broken.set_value(Value::str("x")).unwrap());
    }
}
