//! Member delegate provider and cache
//!
//! A [`DelegateProvider`] turns member metadata into callable delegates
//! (getter, setter, invoker, activator). [`CachingDelegateProvider`] wraps
//! any provider and memoizes by `(member identity, delegate shape)`;
//! `try_invalidate_cache` drops type-scoped or all entries when metadata
//! changes externally. Lookups racing an invalidation see either the old or
//! the new delegate, never a torn entry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::error::WeftError;
use crate::member::{MemberDescriptor, MemberKind};
use crate::metadata::Metadata;
use crate::object::{ObjectRef, ObservableMap};
use crate::value::Value;

pub type Getter = Arc<dyn Fn(&ObjectRef) -> Result<Option<Value>, WeftError> + Send + Sync>;
pub type Setter = Arc<dyn Fn(&ObjectRef, Value) -> Result<(), WeftError> + Send + Sync>;
pub type Invoker = Arc<dyn Fn(&ObjectRef, &[Value]) -> Result<Value, WeftError> + Send + Sync>;
pub type Activator = Arc<dyn Fn() -> ObjectRef + Send + Sync>;

/// Produces delegates from member metadata; `None` when the member shape
/// does not fit the requested delegate
pub trait DelegateProvider: Send + Sync {
    fn try_get_getter(&self, member: &MemberDescriptor) -> Option<Getter>;

    fn try_get_setter(&self, member: &MemberDescriptor) -> Option<Setter>;

    fn try_get_invoker(&self, member: &MemberDescriptor) -> Option<Invoker>;

    fn try_get_activator(&self, type_name: &str) -> Option<Activator>;
}

/// Delegate shapes, used as part of the cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DelegateShape {
    Getter,
    Setter,
    Invoker,
    Activator,
}

/// The standard provider over the dynamic object model. Counts underlying
/// production calls so cache behavior is observable.
#[derive(Default)]
pub struct MapDelegateProvider {
    calls: AtomicUsize,
}

impl MapDelegateProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delegates actually produced (cache hits not included when wrapped)
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl DelegateProvider for MapDelegateProvider {
    fn try_get_getter(&self, member: &MemberDescriptor) -> Option<Getter> {
        if member.kind != MemberKind::Accessor {
            return None;
        }
        self.count();
        let name = Arc::clone(&member.name);
        Some(Arc::new(move |target: &ObjectRef| {
            target.get_checked(&name)
        }))
    }

    fn try_get_setter(&self, member: &MemberDescriptor) -> Option<Setter> {
        if member.kind != MemberKind::Accessor {
            return None;
        }
        self.count();
        let name = Arc::clone(&member.name);
        Some(Arc::new(move |target: &ObjectRef, value: Value| {
            target.set(name.as_ref(), value);
            Ok(())
        }))
    }

    fn try_get_invoker(&self, member: &MemberDescriptor) -> Option<Invoker> {
        if member.kind != MemberKind::Method {
            return None;
        }
        self.count();
        let name = Arc::clone(&member.name);
        Some(Arc::new(move |target: &ObjectRef, args: &[Value]| {
            target.invoke(&name, args)
        }))
    }

    fn try_get_activator(&self, type_name: &str) -> Option<Activator> {
        self.count();
        let type_name = type_name.to_owned();
        Some(Arc::new(move || ObservableMap::new(&type_name)))
    }
}

#[derive(Clone)]
enum CachedDelegate {
    Getter(Getter),
    Setter(Setter),
    Invoker(Invoker),
    Activator(Activator),
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    declaring_type: Arc<str>,
    member: Arc<str>,
    shape: DelegateShape,
}

/// Memoizing decorator around any [`DelegateProvider`]
pub struct CachingDelegateProvider<P> {
    inner: P,
    cache: DashMap<CacheKey, CachedDelegate>,
}

impl<P: DelegateProvider> CachingDelegateProvider<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            cache: DashMap::new(),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Drops cached delegates for one declaring type, or all of them
    pub fn try_invalidate_cache(&self, type_name: Option<&str>, _metadata: &Metadata) -> bool {
        match type_name {
            Some(type_name) => {
                debug!(%type_name, "invalidating delegate cache for type");
                self.cache
                    .retain(|key, _| key.declaring_type.as_ref() != type_name);
            }
            None => {
                debug!("invalidating entire delegate cache");
                self.cache.clear();
            }
        }
        true
    }

    fn key(member: &MemberDescriptor, shape: DelegateShape) -> CacheKey {
        CacheKey {
            declaring_type: Arc::clone(&member.declaring_type),
            member: Arc::clone(&member.name),
            shape,
        }
    }

    fn lookup<T: Clone>(
        &self,
        key: CacheKey,
        produce: impl FnOnce() -> Option<CachedDelegate>,
        unwrap: impl Fn(&CachedDelegate) -> Option<T>,
    ) -> Option<T> {
        if let Some(hit) = self.cache.get(&key) {
            return unwrap(hit.value());
        }
        let produced = produce()?;
        let result = unwrap(&produced);
        self.cache.insert(key, produced);
        result
    }
}

impl<P: DelegateProvider> DelegateProvider for CachingDelegateProvider<P> {
    fn try_get_getter(&self, member: &MemberDescriptor) -> Option<Getter> {
        self.lookup(
            Self::key(member, DelegateShape::Getter),
            || self.inner.try_get_getter(member).map(CachedDelegate::Getter),
            |cached| match cached {
                CachedDelegate::Getter(getter) => Some(Arc::clone(getter)),
                _ => None,
            },
        )
    }

    fn try_get_setter(&self, member: &MemberDescriptor) -> Option<Setter> {
        self.lookup(
            Self::key(member, DelegateShape::Setter),
            || self.inner.try_get_setter(member).map(CachedDelegate::Setter),
            |cached| match cached {
                CachedDelegate::Setter(setter) => Some(Arc::clone(setter)),
                _ => None,
            },
        )
    }

    fn try_get_invoker(&self, member: &MemberDescriptor) -> Option<Invoker> {
        self.lookup(
            Self::key(member, DelegateShape::Invoker),
            || {
                self.inner
                    .try_get_invoker(member)
                    .map(CachedDelegate::Invoker)
            },
            |cached| match cached {
                CachedDelegate::Invoker(invoker) => Some(Arc::clone(invoker)),
                _ => None,
            },
        )
    }

    fn try_get_activator(&self, type_name: &str) -> Option<Activator> {
        let key = CacheKey {
            declaring_type: crate::member::intern(type_name),
            member: crate::member::intern(""),
            shape: DelegateShape::Activator,
        };
        self.lookup(
            key,
            || {
                self.inner
                    .try_get_activator(type_name)
                    .map(CachedDelegate::Activator)
            },
            |cached| match cached {
                CachedDelegate::Activator(activator) => Some(Arc::clone(activator)),
                _ => None,
            },
        )
    }
}

// ─────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::MemberFlags;

    fn accessor(name: &str, declaring: &str) -> MemberDescriptor {
        MemberDescriptor::new(name, MemberKind::Accessor, MemberFlags::INSTANCE, declaring)
    }

    #[test]
    fn getter_reads_live_values() {
        let provider = MapDelegateProvider::new();
        let member = accessor("Name", "Person");
        let getter = provider.try_get_getter(&member).unwrap();
        let person = ObservableMap::new("Person");
        person.set("Name", Value::str("Ada"));
        assert_eq!(getter(&person).unwrap(), Some(Value::str("Ada")));
    }

    #[test]
    fn identical_lookups_hit_the_provider_once() {
        let cached = CachingDelegateProvider::new(MapDelegateProvider::new());
        let member = accessor("Name", "Person");
        let first = cached.try_get_getter(&member).unwrap();
        let second = cached.try_get_getter(&member).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cached.inner().call_count(), 1);
    }

    #[test]
    fn different_shapes_cache_separately() {
        let cached = CachingDelegateProvider::new(MapDelegateProvider::new());
        let member = accessor("Name", "Person");
        cached.try_get_getter(&member).unwrap();
        cached.try_get_setter(&member).unwrap();
        assert_eq!(cached.inner().call_count(), 2);
    }

    #[test]
    fn invalidation_forces_one_reproduction() {
        let cached = CachingDelegateProvider::new(MapDelegateProvider::new());
        let member = accessor("Name", "Person");
        cached.try_get_getter(&member).unwrap();
        cached.try_invalidate_cache(None, &Metadata::new());
        cached.try_get_getter(&member).unwrap();
        cached.try_get_getter(&member).unwrap();
        assert_eq!(cached.inner().call_count(), 2);
    }

    #[test]
    fn type_scoped_invalidation_spares_other_types() {
        let cached = CachingDelegateProvider::new(MapDelegateProvider::new());
        let person = accessor("Name", "Person");
        let address = accessor("City", "Address");
        cached.try_get_getter(&person).unwrap();
        cached.try_get_getter(&address).unwrap();
        cached.try_invalidate_cache(Some("Person"), &Metadata::new());
        cached.try_get_getter(&person).unwrap();
        cached.try_get_getter(&address).unwrap();
        assert_eq!(cached.inner().call_count(), 3);
    }

    #[test]
    fn invoker_dispatches_registered_methods() {
        let provider = MapDelegateProvider::new();
        let member =
            MemberDescriptor::new("Add", MemberKind::Method, MemberFlags::INSTANCE, "Calc");
        let invoker = provider.try_get_invoker(&member).unwrap();
        let calc = ObservableMap::new("Calc");
        calc.register_method(
            "Add",
            Arc::new(|_target, args| {
                let sum = args.iter().filter_map(|a| a.as_i64()).sum::<i64>();
                Ok(Value::Long(sum))
            }),
        );
        assert_eq!(invoker(&calc, &[Value::Int(1), Value::Int(2)]).unwrap(), Value::Long(3));
    }
}
