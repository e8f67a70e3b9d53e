use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use log::{debug, warn};

use crate::access::AccessMode;
use crate::de::{DrainReport, Rehydrator, Slot};
use crate::error::GraphError;
use crate::info::TypeKey;
use crate::registry::{ObjectFactory, TypeRegistry};
use crate::scope::ReadScope;
use crate::ser::{VanillaCache, Walker};
use crate::settings::{Codec, Settings};
use crate::statics::Statics;
use crate::tables::PrewarmIndex;
use crate::value::{ObjRef, Value};

// -----------------------------------------------------------------------------
// Serializer

/// Writes object graphs to bytes and rebuilds them.
///
/// A serializer owns the storage for static members and a cache of
/// default instances, so it is not shared across threads. The registry
/// is shared and read-only.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use lm_graph::Serializer;
/// use lm_graph::info::{MemberInfo, StructInfo};
/// use lm_graph::registry::TypeRegistry;
/// use lm_graph::value::{DynamicObject, ObjRef, Struct, Value};
///
/// let mut registry = TypeRegistry::new();
/// let node = registry.register(
///     StructInfo::new("demo.Node")
///         .with_member(MemberInfo::field("label", "string"))
///         .with_member(MemberInfo::field("next", "demo.Node")),
/// );
/// let serializer = Serializer::new(Arc::new(registry));
///
/// let a = ObjRef::new(DynamicObject::new(node, vec![Value::from("a"), Value::Null]));
/// let cycle = Value::Object(a.clone());
/// a.downcast_mut::<DynamicObject>().unwrap().set_member(1, cycle).unwrap();
///
/// let bytes = serializer.serialize(&Value::Object(a)).unwrap();
/// let copy = serializer.deserialize(&bytes).unwrap();
///
/// let copy = copy.as_object().unwrap();
/// let node = copy.downcast_ref::<DynamicObject>().unwrap();
/// assert_eq!(node.slots()[0], Value::from("a"));
/// assert!(node.slots()[1].as_object().unwrap().ptr_eq(copy));
/// ```
pub struct Serializer {
    registry: Arc<TypeRegistry>,
    settings: Settings,
    prewarm: PrewarmIndex,
    factory: Option<Box<dyn ObjectFactory>>,
    statics: Statics,
    vanilla: VanillaCache,
}

impl Serializer {
    /// Creates a serializer with default [`Settings`].
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            settings: Settings::default(),
            prewarm: PrewarmIndex::default(),
            factory: None,
            statics: Statics::new(),
            vanilla: VanillaCache::default(),
        }
    }

    /// Replaces the settings, rebuilding the prewarm tables.
    pub fn with_settings(mut self, settings: Settings) -> Result<Self, GraphError> {
        self.prewarm = PrewarmIndex::new(&settings.prewarm)?;
        self.settings = settings;
        Ok(self)
    }

    /// Installs a factory consulted after per-type factories.
    pub fn with_factory(mut self, factory: impl ObjectFactory + 'static) -> Self {
        self.factory = Some(Box::new(factory));
        self
    }

    #[inline]
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    #[inline]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Static member values, shared by every stream of this serializer.
    #[inline]
    pub fn statics(&self) -> &Statics {
        &self.statics
    }

    fn walker(&self, codec: Codec, mode: AccessMode) -> Walker<'_> {
        Walker {
            registry: &self.registry,
            statics: &self.statics,
            prewarm: &self.prewarm,
            factory: self.factory.as_deref(),
            vanilla: &self.vanilla,
            codec,
            verbose: self.settings.verbose,
            skip_default_properties: self.settings.skip_default_properties,
            mode,
        }
    }

    fn rehydrator(&self) -> Rehydrator<'_> {
        Rehydrator {
            registry: &self.registry,
            statics: &self.statics,
            prewarm: &self.prewarm,
            factory: self.factory.as_deref(),
            fixup_passes: self.settings.fixup_passes,
        }
    }

    // -------------------------------------------------------------------------
    // Serialize

    /// Writes a graph. The root is declared as `object`, so its type is
    /// always tagged.
    #[inline]
    pub fn serialize(&self, root: &Value) -> Result<Vec<u8>, GraphError> {
        self.serialize_with(root, TypeKey::OBJECT)
    }

    /// Writes a graph whose root is declared as `declared`. Read it back
    /// with [`deserialize_as`](Self::deserialize_as) and the same type.
    pub fn serialize_with(&self, root: &Value, declared: TypeKey) -> Result<Vec<u8>, GraphError> {
        let bytes = self
            .walker(self.settings.codec, AccessMode::Normal)
            .write_root(root, declared)?;
        debug!("serialized graph into {} bytes", bytes.len());
        Ok(bytes)
    }

    // -------------------------------------------------------------------------
    // Deserialize

    /// Rebuilds a graph written with [`serialize`](Self::serialize).
    #[inline]
    pub fn deserialize(&self, bytes: &[u8]) -> Result<Value, GraphError> {
        self.deserialize_as(bytes, TypeKey::OBJECT)
    }

    /// Rebuilds a graph written with
    /// [`serialize_with`](Self::serialize_with).
    pub fn deserialize_as(&self, bytes: &[u8], declared: TypeKey) -> Result<Value, GraphError> {
        self.stage(bytes, declared, None)?.complete()
    }

    /// Reads a graph into an existing root object instead of creating one.
    ///
    /// Members present in the stream overwrite those of `target`; the
    /// others keep their values. With
    /// [`skip_default_properties`](Settings::skip_default_properties) on,
    /// properties equal to their default are not written, so `target` keeps
    /// its own value for them and will not equal the source. Write the
    /// stream with that setting off to overwrite every member.
    pub fn deserialize_into(&self, bytes: &[u8], target: &ObjRef) -> Result<(), GraphError> {
        self.stage(bytes, target.type_key(), Some(target))?
            .complete()
            .map(drop)
    }

    /// Runs the structural pass only, leaving fixups to the caller.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    ///
    /// use lm_graph::Serializer;
    /// use lm_graph::registry::TypeRegistry;
    /// use lm_graph::value::Value;
    ///
    /// let serializer = Serializer::new(Arc::new(TypeRegistry::new()));
    /// let bytes = serializer.serialize(&Value::I32(7)).unwrap();
    ///
    /// let mut staged = serializer.begin_deserialize(&bytes).unwrap();
    /// assert_eq!(staged.pending(), 0);
    /// assert_eq!(staged.process_fixups(1).unwrap().remaining, 0);
    /// assert_eq!(staged.complete().unwrap(), Value::I32(7));
    /// ```
    pub fn begin_deserialize(&self, bytes: &[u8]) -> Result<Staged<'_>, GraphError> {
        self.stage(bytes, TypeKey::OBJECT, None)
    }

    fn stage(&self, bytes: &[u8], declared: TypeKey, into: Option<&ObjRef>) -> Result<Staged<'_>, GraphError> {
        let (scope, root) = self.rehydrator().read_root(bytes, declared, into)?;
        Ok(Staged {
            serializer: self,
            scope,
            root,
        })
    }

    // -------------------------------------------------------------------------
    // Derived operations

    /// A digest of the graph's checksum-relevant content.
    ///
    /// Members flagged [`NO_CHECKSUM`](crate::info::MemberFlags::NO_CHECKSUM)
    /// are left out. Equal graphs give equal checksums within one registry
    /// and prewarm setup.
    pub fn checksum(&self, root: &Value) -> Result<Checksum, GraphError> {
        let bytes = self
            .walker(Codec::Binary, AccessMode::Checksum)
            .write_root(root, TypeKey::OBJECT)?;
        Ok(Checksum::fold(&bytes))
    }

    /// Copies a graph by writing and reading it back.
    pub fn deep_clone(&self, root: &Value) -> Result<Value, GraphError> {
        let bytes = self
            .walker(Codec::Binary, AccessMode::Normal)
            .write_root(root, TypeKey::OBJECT)?;
        self.deserialize(&bytes)
    }
}

impl fmt::Debug for Serializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Serializer")
            .field("settings", &self.settings)
            .field("has_factory", &self.factory.is_some())
            .field("statics", &self.statics.len())
            .finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// Staged

/// A deserialization whose structural pass is done.
///
/// Values that were not available during the pass wait in a fixup queue.
/// [`complete`](Self::complete) drains it and runs the post-link callbacks.
pub struct Staged<'s> {
    serializer: &'s Serializer,
    scope: ReadScope<'s>,
    root: Slot,
}

impl Staged<'_> {
    /// Number of queued fixups.
    #[inline]
    pub fn pending(&self) -> usize {
        self.scope.fixups.len()
    }

    /// Runs up to `passes` fixup passes.
    pub fn process_fixups(&mut self, passes: usize) -> Result<DrainReport, GraphError> {
        self.serializer.rehydrator().drain(&mut self.scope, passes)
    }

    /// Drains the remaining fixups, runs deferred actions and callbacks,
    /// and returns the root.
    ///
    /// Members whose fixups never resolve keep their previous values.
    pub fn complete(mut self) -> Result<Value, GraphError> {
        let serializer = self.serializer;
        let registry = &*serializer.registry;
        let report = serializer
            .rehydrator()
            .settle(&mut self.scope, serializer.settings.fixup_passes)
            .map_err(|err| self.scope.stack.annotate(err, registry))?;
        if report.remaining > 0 && !report.stuck {
            warn!(
                "{} fixups left after {} passes",
                report.remaining, report.passes_run
            );
        }

        let root = self.root.poll(&self.scope.ids).ok_or_else(|| {
            self.scope
                .stack
                .annotate(GraphError::corrupt("the root object was never produced"), registry)
        })?;
        for listener in registry.deserialized_listeners() {
            listener(&root);
        }
        Ok(root)
    }
}

impl fmt::Debug for Staged<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Staged")
            .field("objects", &self.scope.ids.len())
            .field("pending", &self.pending())
            .field("root", &self.root)
            .finish()
    }
}

// -----------------------------------------------------------------------------
// Checksum

/// A 128-bit digest from [`Serializer::checksum`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checksum([u8; Checksum::LEN]);

impl Checksum {
    pub const LEN: usize = 16;

    fn fold(bytes: &[u8]) -> Self {
        let mut digest = [0u8; Self::LEN];
        for (i, byte) in bytes.iter().enumerate() {
            digest[i % Self::LEN] ^= byte;
        }
        Self(digest)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|byte| write!(f, "{byte:02x}"))
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({self})")
    }
}
