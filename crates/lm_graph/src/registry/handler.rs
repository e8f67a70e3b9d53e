use alloc::borrow::Cow;
use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::error::HandlerError;
use crate::info::TypeInfo;
use crate::registry::TypeRegistry;
use crate::value::{ObjRef, Reflect, Value};

// -----------------------------------------------------------------------------
// SerializeObject

/// Custom serialization for a type, replacing member-wise reflection.
///
/// The handler reduces an object to a flat list of values on write, and
/// rebuilds it from that list on read. Values in the list are written as
/// ordinary graph entries, so they may share or refer back to objects
/// elsewhere in the graph.
///
/// A handler is registered either for one exact type with
/// [`TypeRegistry::register_handler`] or for a family of types with
/// [`TypeRegistry::register_subtype_handler`]. An exact registration
/// always wins.
///
/// # Examples
///
/// ```
/// use lm_graph::HandlerError;
/// use lm_graph::registry::{DeserializeCx, Materialized, SerializeCx, SerializeObject};
/// use lm_graph::value::{ObjRef, Value};
///
/// // Writes nothing and rebuilds every instance as null.
/// struct Forget;
///
/// impl SerializeObject for Forget {
///     fn serialize(&self, _: &ObjRef, _: &mut SerializeCx<'_>) -> Result<Vec<Value>, HandlerError> {
///         Ok(Vec::new())
///     }
///
///     fn deserialize(
///         &self,
///         _: Vec<Value>,
///         _: Option<ObjRef>,
///         _: &mut DeserializeCx<'_>,
///     ) -> Result<Materialized, HandlerError> {
///         Ok(Materialized::Ready(Value::Null))
///     }
/// }
/// ```
pub trait SerializeObject: Send + Sync + 'static {
    fn serialize(&self, obj: &ObjRef, cx: &mut SerializeCx<'_>) -> Result<Vec<Value>, HandlerError>;

    /// Rebuilds an object from the values produced by [`serialize`](Self::serialize).
    ///
    /// `instance` is the existing object when deserializing into one.
    fn deserialize(
        &self,
        data: Vec<Value>,
        instance: Option<ObjRef>,
        cx: &mut DeserializeCx<'_>,
    ) -> Result<Materialized, HandlerError>;

    /// Lets a handler decline a type or instance; declined objects fall
    /// back to member-wise reflection. `instance` is `None` on read.
    #[inline]
    fn can_serialize(&self, _info: &TypeInfo, _instance: Option<&ObjRef>) -> bool {
        true
    }

    /// Writes the payload as a self-contained nested stream.
    ///
    /// Identity inside the payload is then independent of the enclosing
    /// graph: ids restart at zero and objects outside are not shared.
    #[inline]
    fn isolated(&self) -> bool {
        false
    }
}

/// The result of [`SerializeObject::deserialize`].
pub enum Materialized {
    Ready(Value),
    /// Resolved while draining deferred work.
    Later(Box<dyn LateValue>),
}

/// A value produced after deferred work has run.
///
/// Polled between fixup passes until it returns `Some`.
pub trait LateValue {
    fn resolve(&mut self) -> Option<Value>;
}

impl<F: FnMut() -> Option<Value>> LateValue for F {
    #[inline]
    fn resolve(&mut self) -> Option<Value> {
        self()
    }
}

// -----------------------------------------------------------------------------
// Contexts

/// Context passed to [`SerializeObject::serialize`].
pub struct SerializeCx<'a> {
    registry: &'a TypeRegistry,
    depth: usize,
}

impl<'a> SerializeCx<'a> {
    #[inline]
    pub(crate) fn new(registry: &'a TypeRegistry, depth: usize) -> Self {
        Self { registry, depth }
    }

    #[inline]
    pub fn registry(&self) -> &'a TypeRegistry {
        self.registry
    }

    /// Number of open scopes, the top-level scope included.
    #[inline]
    pub fn scope_depth(&self) -> usize {
        self.depth
    }
}

/// An action run once every deferred fixup of a deserialize call has drained.
pub type FinalAction = Box<dyn FnOnce() -> Result<(), HandlerError>>;

/// Context passed to [`SerializeObject::deserialize`].
pub struct DeserializeCx<'a> {
    registry: &'a TypeRegistry,
    finals: &'a mut Vec<FinalAction>,
}

impl<'a> DeserializeCx<'a> {
    #[inline]
    pub(crate) fn new(registry: &'a TypeRegistry, finals: &'a mut Vec<FinalAction>) -> Self {
        Self { registry, finals }
    }

    #[inline]
    pub fn registry(&self) -> &'a TypeRegistry {
        self.registry
    }

    /// Queues work for after the graph is fully linked.
    pub fn defer(&mut self, action: impl FnOnce() -> Result<(), HandlerError> + 'static) {
        self.finals.push(Box::new(action));
    }
}

// -----------------------------------------------------------------------------
// Specialist

/// A per-member value transform, applied around the storage codec.
///
/// Attached to members by name with
/// [`MemberInfo::with_specialist`](crate::info::MemberInfo::with_specialist).
pub trait Specialist: Send + Sync + 'static {
    fn to_stream(&self, value: Value) -> Result<Value, HandlerError>;

    fn from_stream(&self, value: Value) -> Result<Value, HandlerError>;
}

// -----------------------------------------------------------------------------
// Factories

/// Constructs instances of one registered type.
pub trait Factory: Send + Sync + 'static {
    fn create(&self, info: &TypeInfo, registry: &TypeRegistry) -> Result<Box<dyn Reflect>, HandlerError>;
}

impl<F> Factory for F
where
    F: Fn(&TypeInfo, &TypeRegistry) -> Result<Box<dyn Reflect>, HandlerError> + Send + Sync + 'static,
{
    #[inline]
    fn create(&self, info: &TypeInfo, registry: &TypeRegistry) -> Result<Box<dyn Reflect>, HandlerError> {
        self(info, registry)
    }
}

/// A host-supplied constructor consulted for every type before defaults.
///
/// Unlike [`Factory`], this is owned by one engine and does not need to be
/// thread safe. Returning `None` passes to the next strategy.
pub trait ObjectFactory {
    fn create(&self, info: &TypeInfo, registry: &TypeRegistry) -> Option<Box<dyn Reflect>>;
}

// -----------------------------------------------------------------------------
// MemberPolicy

/// Member name filters attached to a type.
///
/// A policy applies to the type it is attached to and to every type that
/// derives from it or implements it.
///
/// # Examples
///
/// ```
/// use lm_graph::registry::MemberPolicy;
///
/// let policy = MemberPolicy::new().allow(["id", "name"]).deny(["name"]);
/// assert!(policy.permits("id"));
/// assert!(!policy.permits("name"));
/// assert!(!policy.permits("cache"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemberPolicy {
    allow: Option<Vec<Cow<'static, str>>>,
    deny: Vec<Cow<'static, str>>,
    scan_private: bool,
}

impl MemberPolicy {
    #[inline]
    pub const fn new() -> Self {
        Self {
            allow: None,
            deny: Vec::new(),
            scan_private: false,
        }
    }

    /// Restricts serialization to the named members.
    pub fn allow<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Cow<'static, str>>,
    {
        self.allow
            .get_or_insert_with(Vec::new)
            .extend(names.into_iter().map(Into::into));
        self
    }

    pub fn deny<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Cow<'static, str>>,
    {
        self.deny.extend(names.into_iter().map(Into::into));
        self
    }

    /// Includes private members without requiring an explicit opt-in.
    #[inline]
    pub fn scan_private(mut self, enabled: bool) -> Self {
        self.scan_private = enabled;
        self
    }

    pub fn permits(&self, name: &str) -> bool {
        if self.deny.iter().any(|n| n == name) {
            return false;
        }
        match &self.allow {
            Some(allow) => allow.iter().any(|n| n == name),
            None => true,
        }
    }

    #[inline]
    pub fn scans_private(&self) -> bool {
        self.scan_private
    }
}
