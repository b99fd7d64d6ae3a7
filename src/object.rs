//! Live observable object graph
//!
//! `ObservableMap` is the object shape member paths resolve against: a
//! property bag with change notification, registered methods, named events,
//! and per-object attached members. Subscriptions are RAII tokens - dropping
//! (or explicitly releasing) a token removes the callback before the next
//! notification cycle, and release is idempotent.
//!
//! Roots are held weakly by observers (`WeakObjectRef`), so a binding never
//! extends the lifetime of the graph it watches.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde_json::Value as Json;

use crate::error::WeftError;
use crate::value::Value;

/// Shared handle to a live object
pub type ObjectRef = Arc<ObservableMap>;

/// Non-owning handle; observers query it for liveness
pub type WeakObjectRef = Weak<ObservableMap>;

/// Property-change callback: (property name, new value)
pub type ChangeCallback = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// Method body: (receiver, arguments) -> value or fault
pub type MethodBody = Arc<dyn Fn(&ObjectRef, &[Value]) -> Result<Value, WeftError> + Send + Sync>;

enum SubKind {
    Property,
    Event,
}

struct Subscriber {
    id: u64,
    /// Property or event name filter; empty matches all properties
    name: String,
    callback: ChangeCallback,
}

/// A live object: property bag + methods + events + attached members
pub struct ObservableMap {
    type_name: Arc<str>,
    props: RwLock<HashMap<String, Value>>,
    /// Attached (synthetic) members, declared from outside the object
    attached: RwLock<HashMap<String, Value>>,
    methods: RwLock<HashMap<String, MethodBody>>,
    /// Properties whose getter faults with the stored message
    failing: RwLock<HashMap<String, String>>,
    prop_subs: Mutex<Vec<Subscriber>>,
    event_subs: Mutex<Vec<Subscriber>>,
    next_sub_id: AtomicU64,
    self_weak: Weak<ObservableMap>,
}

impl ObservableMap {
    pub fn new(type_name: impl AsRef<str>) -> ObjectRef {
        Arc::new_cyclic(|weak| ObservableMap {
            type_name: Arc::from(type_name.as_ref()),
            props: RwLock::new(HashMap::new()),
            attached: RwLock::new(HashMap::new()),
            methods: RwLock::new(HashMap::new()),
            failing: RwLock::new(HashMap::new()),
            prop_subs: Mutex::new(Vec::new()),
            event_subs: Mutex::new(Vec::new()),
            next_sub_id: AtomicU64::new(0),
            self_weak: weak.clone(),
        })
    }

    /// Build a live object graph from a JSON object (nested objects become
    /// nested `ObservableMap`s)
    pub fn from_json(json: &Json) -> ObjectRef {
        let obj = Self::new("object");
        if let Json::Object(map) = json {
            for (key, value) in map {
                obj.set(key, Value::from_json(value));
            }
        }
        obj
    }

    pub fn to_json(&self) -> Json {
        let props = self.props.read();
        let mut map = serde_json::Map::with_capacity(props.len());
        for (key, value) in props.iter() {
            map.insert(key.clone(), value.to_json());
        }
        Json::Object(map)
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Read a property; `None` when the property does not exist
    pub fn get(&self, name: &str) -> Option<Value> {
        self.props.read().get(name).cloned()
    }

    /// Read a property, surfacing getter faults
    pub fn get_checked(&self, name: &str) -> Result<Option<Value>, WeftError> {
        if let Some(details) = self.failing.read().get(name) {
            return Err(WeftError::MemberFault {
                member: name.to_string(),
                details: details.clone(),
            });
        }
        Ok(self.get(name))
    }

    /// Write a property and notify subscribers.
    ///
    /// Writing a value equal to the current one is a no-op (no notification).
    pub fn set(&self, name: impl AsRef<str>, value: Value) {
        let name = name.as_ref();
        {
            let mut props = self.props.write();
            if props.get(name) == Some(&value) {
                return;
            }
            props.insert(name.to_string(), value.clone());
        }
        self.notify(SubKind::Property, name, &value);
    }

    pub fn has(&self, name: &str) -> bool {
        self.props.read().contains_key(name)
    }

    /// Declare a property whose getter faults with `details`
    pub fn set_failing(&self, name: impl Into<String>, details: impl Into<String>) {
        self.failing.write().insert(name.into(), details.into());
    }

    pub fn get_attached(&self, name: &str) -> Option<Value> {
        self.attached.read().get(name).cloned()
    }

    /// Attached values live inside the object itself, so they expire with it
    pub fn set_attached(&self, name: impl Into<String>, value: Value) {
        self.attached.write().insert(name.into(), value);
    }

    pub fn register_method(&self, name: impl Into<String>, body: MethodBody) {
        self.methods.write().insert(name.into(), body);
    }

    pub fn invoke(&self, name: &str, args: &[Value]) -> Result<Value, WeftError> {
        let body = self.methods.read().get(name).cloned();
        match body {
            Some(body) => match self.self_weak.upgrade() {
                Some(receiver) => body(&receiver, args),
                None => Err(WeftError::MemberFault {
                    member: name.to_string(),
                    details: "receiver is being dropped".into(),
                }),
            },
            None => Err(WeftError::UnresolvedPath {
                path: format!("{}.{}()", self.type_name, name),
            }),
        }
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.read().contains_key(name)
    }

    /// Subscribe to property changes. An empty `name` matches every property.
    pub fn subscribe(&self, name: impl Into<String>, callback: ChangeCallback) -> Subscription {
        self.add_subscriber(SubKind::Property, name.into(), callback)
    }

    /// Subscribe to a named event raised via [`raise_event`](Self::raise_event)
    pub fn subscribe_event(&self, name: impl Into<String>, callback: ChangeCallback) -> Subscription {
        self.add_subscriber(SubKind::Event, name.into(), callback)
    }

    pub fn raise_event(&self, name: &str, payload: &Value) {
        self.notify(SubKind::Event, name, payload);
    }

    fn add_subscriber(&self, kind: SubKind, name: String, callback: ChangeCallback) -> Subscription {
        let id = self.next_sub_id.fetch_add(1, Ordering::Relaxed);
        let sub = Subscriber { id, name, callback };
        match kind {
            SubKind::Property => self.prop_subs.lock().push(sub),
            SubKind::Event => self.event_subs.lock().push(sub),
        }
        Subscription {
            owner: self.self_weak.clone(),
            id,
            kind,
            released: AtomicBool::new(false),
        }
    }

    fn notify(&self, kind: SubKind, name: &str, value: &Value) {
        // Snapshot callbacks so delivery happens outside the lock; a callback
        // may re-enter set()/subscribe() on this object.
        let callbacks: Vec<ChangeCallback> = {
            let subs = match kind {
                SubKind::Property => self.prop_subs.lock(),
                SubKind::Event => self.event_subs.lock(),
            };
            subs.iter()
                .filter(|s| s.name.is_empty() || s.name == name)
                .map(|s| Arc::clone(&s.callback))
                .collect()
        };
        for callback in callbacks {
            callback(name, value);
        }
    }

    fn remove_subscriber(&self, kind: &SubKind, id: u64) {
        let mut subs = match kind {
            SubKind::Property => self.prop_subs.lock(),
            SubKind::Event => self.event_subs.lock(),
        };
        subs.retain(|s| s.id != id);
    }
}

impl std::fmt::Debug for ObservableMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservableMap")
            .field("type_name", &self.type_name)
            .field("props", &self.props.read().len())
            .finish()
    }
}

/// RAII change-subscription token (release-on-drop, idempotent)
pub struct Subscription {
    owner: WeakObjectRef,
    id: u64,
    kind: SubKind,
    released: AtomicBool,
}

impl Subscription {
    /// Remove the callback now; further calls (and the drop) are no-ops
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(owner) = self.owner.upgrade() {
            owner.remove_subscriber(&self.kind, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
