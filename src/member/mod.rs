//! Member descriptors and path resolution
//!
//! - [`MemberDescriptor`] — interned name, kind, flags, declaring type
//! - [`MemberManager`] — walks an AST member chain left-to-right through
//!   ordered [`MemberResolver`] components, returning the resolved prefix
//!   plus the unresolved suffix
//! - [`PathSegment`] — one hop of a watchable member chain

pub mod observer;
pub mod reflect;

use std::ops::BitOr;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use tracing::trace;

use crate::ast::Expr;
use crate::error::WeftError;
use crate::metadata::Metadata;
use crate::object::ObjectRef;
use crate::value::Value;

/// Member names repeat across every object of a type; intern them once
static NAME_POOL: Lazy<DashMap<String, Arc<str>>> = Lazy::new(DashMap::new);

pub fn intern(name: &str) -> Arc<str> {
    if let Some(hit) = NAME_POOL.get(name) {
        return Arc::clone(hit.value());
    }
    let interned: Arc<str> = Arc::from(name);
    NAME_POOL.insert(name.to_owned(), Arc::clone(&interned));
    interned
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Accessor,
    Method,
    Event,
}

/// Bit set describing how a member is declared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MemberFlags(u8);

impl MemberFlags {
    pub const INSTANCE: MemberFlags = MemberFlags(1);
    pub const STATIC: MemberFlags = MemberFlags(1 << 1);
    pub const ATTACHED: MemberFlags = MemberFlags(1 << 2);
    pub const DYNAMIC: MemberFlags = MemberFlags(1 << 3);

    pub const fn empty() -> Self {
        MemberFlags(0)
    }

    pub const fn all() -> Self {
        MemberFlags(0b1111)
    }

    pub const fn contains(self, other: MemberFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: MemberFlags) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for MemberFlags {
    type Output = MemberFlags;

    fn bitor(self, rhs: MemberFlags) -> MemberFlags {
        MemberFlags(self.0 | rhs.0)
    }
}

/// Resolved member metadata; cheap to clone and hashable, so it doubles as a
/// delegate-cache key component
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberDescriptor {
    pub name: Arc<str>,
    pub kind: MemberKind,
    pub flags: MemberFlags,
    pub declaring_type: Arc<str>,
}

impl MemberDescriptor {
    pub fn new(
        name: &str,
        kind: MemberKind,
        flags: MemberFlags,
        declaring_type: &str,
    ) -> Self {
        Self {
            name: intern(name),
            kind,
            flags,
            declaring_type: intern(declaring_type),
        }
    }
}

/// One hop of a member chain
#[derive(Debug, Clone, PartialEq)]
pub enum PathSegment {
    Property(Arc<str>),
    /// Constant-argument indexer access
    Index(Vec<Value>),
}

impl PathSegment {
    pub fn property(name: &str) -> Self {
        PathSegment::Property(intern(name))
    }
}

/// Flattens a root-relative member/indexer chain into ordered segments.
/// Returns `None` for expressions that are not plain chains (operators,
/// calls, non-constant index arguments) - those evaluate, but cannot be
/// observed hop-by-hop.
pub fn member_path(expr: &Expr) -> Option<Vec<PathSegment>> {
    fn walk(expr: &Expr, out: &mut Vec<PathSegment>) -> bool {
        match expr {
            Expr::Member { target: None, name } => {
                out.push(PathSegment::property(name));
                true
            }
            Expr::Member {
                target: Some(target),
                name,
            } => {
                if !walk(target, out) {
                    return false;
                }
                out.push(PathSegment::property(name));
                true
            }
            Expr::Index { target, args } => {
                if !walk(target, out) {
                    return false;
                }
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    match arg {
                        Expr::Constant(value) => values.push(value.clone()),
                        _ => return false,
                    }
                }
                out.push(PathSegment::Index(values));
                true
            }
            Expr::NullConditional(inner) => walk(inner, out),
            _ => false,
        }
    }
    let mut segments = Vec::new();
    walk(expr, &mut segments).then_some(segments)
}

/// Live position while walking a chain: an object, or an immutable array
/// snapshot an index segment selects into
#[derive(Clone)]
pub enum ChainCursor {
    Object(ObjectRef),
    Items(Arc<Vec<Value>>),
}

impl ChainCursor {
    /// The cursor a hop's value moves to, if the value can be walked into
    pub fn from_value(value: Value) -> Option<ChainCursor> {
        match value {
            Value::Object(object) => Some(ChainCursor::Object(object)),
            Value::Array(items) => Some(ChainCursor::Items(items)),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            ChainCursor::Object(object) => Some(object),
            ChainCursor::Items(_) => None,
        }
    }
}

/// Reads the value one segment selects at a cursor.
/// `Ok(None)` means the hop currently holds nothing (or does not exist - a
/// resolution failure, not an error); `Err` means a getter threw.
pub fn read_hop(cursor: &ChainCursor, segment: &PathSegment) -> Result<Option<Value>, WeftError> {
    match (cursor, segment) {
        (ChainCursor::Object(object), PathSegment::Property(name)) => object.get_checked(name),
        (ChainCursor::Object(object), PathSegment::Index(args)) => {
            let Some(key) = args.first() else {
                return Ok(None);
            };
            object.get_checked(&key.to_string())
        }
        (ChainCursor::Items(items), PathSegment::Index(args)) => {
            let index = args.first().and_then(|v| v.as_i64()).unwrap_or(-1);
            if index < 0 {
                return Ok(None);
            }
            Ok(items.get(index as usize).cloned())
        }
        (ChainCursor::Items(_), PathSegment::Property(_)) => Ok(None),
    }
}

/// Writes through one segment. Indexed writes are rejected as faults; array
/// values are immutable snapshots.
pub fn write_hop(
    cursor: &ChainCursor,
    segment: &PathSegment,
    value: Value,
) -> Result<(), WeftError> {
    match (cursor, segment) {
        (ChainCursor::Object(object), PathSegment::Property(name)) => {
            object.set(name.as_ref(), value);
            Ok(())
        }
        _ => Err(WeftError::MemberFault {
            member: segment_label(segment).into_owned(),
            details: "indexed elements are read-only".into(),
        }),
    }
}

fn segment_label(segment: &PathSegment) -> std::borrow::Cow<'static, str> {
    match segment {
        PathSegment::Property(name) => name.to_string().into(),
        PathSegment::Index(_) => "Item".into(),
    }
}

/// One resolution rule; consulted in registration order
pub trait MemberResolver: Send + Sync {
    fn name(&self) -> &'static str;

    fn try_resolve(
        &self,
        target: &ObjectRef,
        segment: &PathSegment,
        kind: MemberKind,
        flags: MemberFlags,
    ) -> Option<MemberDescriptor>;
}

/// Properties and methods declared directly on the object
pub struct InstanceMemberResolver;

impl MemberResolver for InstanceMemberResolver {
    fn name(&self) -> &'static str {
        "instance"
    }

    fn try_resolve(
        &self,
        target: &ObjectRef,
        segment: &PathSegment,
        kind: MemberKind,
        flags: MemberFlags,
    ) -> Option<MemberDescriptor> {
        if !flags.intersects(MemberFlags::INSTANCE | MemberFlags::DYNAMIC) {
            return None;
        }
        let PathSegment::Property(name) = segment else {
            return None;
        };
        match kind {
            MemberKind::Accessor if target.has(name) => Some(MemberDescriptor::new(
                name,
                MemberKind::Accessor,
                MemberFlags::INSTANCE | MemberFlags::DYNAMIC,
                target.type_name(),
            )),
            MemberKind::Method if target.has_method(name) => Some(MemberDescriptor::new(
                name,
                MemberKind::Method,
                MemberFlags::INSTANCE,
                target.type_name(),
            )),
            // dynamic objects accept any event name
            MemberKind::Event => Some(MemberDescriptor::new(
                name,
                MemberKind::Event,
                MemberFlags::INSTANCE | MemberFlags::DYNAMIC,
                target.type_name(),
            )),
            _ => None,
        }
    }
}

/// Indexed element access (`Items[0]`)
pub struct IndexedMemberResolver;

impl MemberResolver for IndexedMemberResolver {
    fn name(&self) -> &'static str {
        "indexed"
    }

    fn try_resolve(
        &self,
        target: &ObjectRef,
        segment: &PathSegment,
        kind: MemberKind,
        _flags: MemberFlags,
    ) -> Option<MemberDescriptor> {
        if kind != MemberKind::Accessor || !matches!(segment, PathSegment::Index(_)) {
            return None;
        }
        Some(MemberDescriptor::new(
            "Item",
            MemberKind::Accessor,
            MemberFlags::INSTANCE,
            target.type_name(),
        ))
    }
}

/// Attached (externally registered) members
pub struct AttachedMemberResolver;

impl MemberResolver for AttachedMemberResolver {
    fn name(&self) -> &'static str {
        "attached"
    }

    fn try_resolve(
        &self,
        target: &ObjectRef,
        segment: &PathSegment,
        kind: MemberKind,
        flags: MemberFlags,
    ) -> Option<MemberDescriptor> {
        if kind != MemberKind::Accessor || !flags.intersects(MemberFlags::ATTACHED) {
            return None;
        }
        let PathSegment::Property(name) = segment else {
            return None;
        };
        target.get_attached(name)?;
        Some(MemberDescriptor::new(
            name,
            MemberKind::Accessor,
            MemberFlags::ATTACHED,
            target.type_name(),
        ))
    }
}

/// Result of a chain walk: the hops that resolved (with their live cursors)
/// and the segments that did not
#[derive(Clone)]
pub struct MemberResolution {
    pub resolved: Vec<(ChainCursor, MemberDescriptor)>,
    pub unresolved: Vec<PathSegment>,
}

impl MemberResolution {
    pub fn is_fully_resolved(&self) -> bool {
        self.unresolved.is_empty()
    }

    pub fn last(&self) -> Option<&(ChainCursor, MemberDescriptor)> {
        self.resolved.last()
    }
}

/// Component owner for member resolution
pub struct MemberManager {
    resolvers: Arc<[Arc<dyn MemberResolver>]>,
}

impl Default for MemberManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MemberManager {
    pub fn new() -> Self {
        Self::with_resolvers(default_resolvers())
    }

    pub fn with_resolvers(resolvers: Arc<[Arc<dyn MemberResolver>]>) -> Self {
        Self { resolvers }
    }

    fn resolve_one(
        &self,
        target: &ObjectRef,
        segment: &PathSegment,
        kind: MemberKind,
        flags: MemberFlags,
    ) -> Option<MemberDescriptor> {
        self.resolvers
            .iter()
            .find_map(|r| r.try_resolve(target, segment, kind, flags))
    }

    /// Walks `path` from `root`, stopping at the first unresolved hop.
    /// Getter faults while advancing are returned; "member not there" is not
    /// an error, just an unresolved suffix.
    pub fn try_get_members(
        &self,
        root: &ObjectRef,
        kind: MemberKind,
        flags: MemberFlags,
        path: &[PathSegment],
        _metadata: &Metadata,
    ) -> Result<MemberResolution, WeftError> {
        let mut resolved = Vec::with_capacity(path.len());
        let mut cursor = ChainCursor::Object(Arc::clone(root));
        for (index, segment) in path.iter().enumerate() {
            // intermediate hops are accessor reads regardless of the final kind
            let hop_kind = if index + 1 == path.len() {
                kind
            } else {
                MemberKind::Accessor
            };
            let descriptor = match (&cursor, segment) {
                // array snapshots only answer index hops
                (ChainCursor::Items(_), PathSegment::Index(_))
                    if hop_kind == MemberKind::Accessor =>
                {
                    Some(MemberDescriptor::new(
                        "Item",
                        MemberKind::Accessor,
                        MemberFlags::INSTANCE,
                        "Array",
                    ))
                }
                (ChainCursor::Items(_), _) => None,
                (ChainCursor::Object(object), _) => {
                    self.resolve_one(object, segment, hop_kind, flags)
                }
            };
            let Some(descriptor) = descriptor else {
                trace!(hop = index, "member chain stopped at unresolved hop");
                return Ok(MemberResolution {
                    resolved,
                    unresolved: path[index..].to_vec(),
                });
            };
            resolved.push((cursor.clone(), descriptor));
            if index + 1 == path.len() {
                break;
            }
            match read_hop(&cursor, segment)?.and_then(ChainCursor::from_value) {
                Some(next) => cursor = next,
                None => {
                    return Ok(MemberResolution {
                        resolved,
                        unresolved: path[index + 1..].to_vec(),
                    })
                }
            }
        }
        Ok(MemberResolution {
            resolved,
            unresolved: Vec::new(),
        })
    }
}

/// The standard resolver set, in consultation order
pub fn default_resolvers() -> Arc<[Arc<dyn MemberResolver>]> {
    vec![
        Arc::new(InstanceMemberResolver) as Arc<dyn MemberResolver>,
        Arc::new(IndexedMemberResolver),
        Arc::new(AttachedMemberResolver),
    ]
    .into()
}

// ─────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────
