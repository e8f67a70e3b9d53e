use alloc::borrow::Cow;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use std::sync::{PoisonError, RwLock};

use lm_utils::hash::{HashMap, NoOpHashState};
use log::{debug, warn};

use crate::access::{AccessKey, AccessMode, Accessor, AccessorCache};
use crate::error::GraphError;
use crate::info::{ArrayInfo, CollectionPath, ListInfo, MapInfo, MemberInfo, MemberKind};
use crate::info::{ObjectInfo, PrimitiveInfo, PrimitiveKind, TypeInfo, TypeKey};
use crate::registry::hooks::Hooks;
use crate::registry::{CreateTypeHook, DeserializedListener, Factory, FromType, MemberPolicy};
use crate::registry::{SerializeObject, Specialist, TypeMeta, TypeTrait};
use crate::registry::{TypeTraitFactory, TypeTraitHandler, TypeTraitMemberPolicy, TypeTraitOnDeserialized};
use crate::value::{EnumValue, ObjRef, Reflect, Value};

// -----------------------------------------------------------------------------
// TypeRegistry

struct SubtypeHandler {
    target: TypeKey,
    interfaces_only: bool,
    handler: Arc<dyn SerializeObject>,
}

/// The process-wide table of type descriptors and serialization capabilities.
///
/// A registry is built with `&mut` access and then shared, usually behind an
/// [`Arc`], by any number of [`Serializer`](crate::Serializer)s. Handler
/// resolution and member layouts are memoized on first use; registering
/// anything clears those caches, and the borrow rules ensure that cannot
/// happen while a serializer holds the registry.
///
/// # Examples
///
/// ```
/// use lm_graph::info::{MemberInfo, StructInfo, TypeKey};
/// use lm_graph::registry::TypeRegistry;
///
/// let mut registry = TypeRegistry::new();
/// let base = registry.register(
///     StructInfo::new("demo::Actor").with_member(MemberInfo::field("id", "i32")),
/// );
/// let player = registry.register(
///     StructInfo::new("demo::Player")
///         .with_base("demo::Actor")
///         .with_member(MemberInfo::field("name", "string")),
/// );
///
/// let layout = registry.get_type_info(player).unwrap().as_struct().unwrap();
/// assert_eq!(layout.member_len(), 2);
/// assert_eq!(layout.member_at(0).unwrap().declaring_type(), base);
///
/// assert!(registry.is_assignable(player, base));
/// assert!(registry.is_assignable(player, TypeKey::OBJECT));
/// assert!(!registry.is_assignable(base, player));
/// ```
pub struct TypeRegistry {
    metas: Vec<TypeMeta>,
    path_to_key: HashMap<Cow<'static, str>, TypeKey>,
    // Collection member types whose components are not registered yet.
    pending_paths: Vec<Cow<'static, str>>,
    subtype_handlers: Vec<SubtypeHandler>,
    specialists: HashMap<Cow<'static, str>, Arc<dyn Specialist>>,
    hooks: Hooks,
    handler_cache: RwLock<HashMap<TypeKey, Option<Arc<dyn SerializeObject>>, NoOpHashState>>,
    accessors: AccessorCache,
}

impl Default for TypeRegistry {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// Creates a registry holding `object`, the primitives and `List<object>`.
    pub fn new() -> Self {
        let mut registry = Self {
            metas: Vec::new(),
            path_to_key: HashMap::default(),
            pending_paths: Vec::new(),
            subtype_handlers: Vec::new(),
            specialists: HashMap::default(),
            hooks: Hooks::default(),
            handler_cache: RwLock::new(HashMap::default()),
            accessors: AccessorCache::new(),
        };
        registry.insert_meta(TypeInfo::Object(ObjectInfo::new()));
        for kind in PrimitiveKind::ALL {
            registry.insert_meta(TypeInfo::Primitive(PrimitiveInfo::new(kind)));
        }
        let list = registry.list_of(TypeKey::OBJECT);
        debug_assert_eq!(list, TypeKey::OBJECT_LIST);
        registry
    }

    fn insert_meta(&mut self, mut info: TypeInfo) -> TypeKey {
        let key = TypeKey::new(self.metas.len() as u32);
        info.ty_mut().set_key(key);
        self.path_to_key.insert(info.ty().path_cow().clone(), key);
        self.metas.push(TypeMeta::new(info));
        key
    }

    fn invalidate_caches(&mut self) {
        self.handler_cache
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.accessors.clear();
    }

    /// Registers a type and returns its key.
    ///
    /// Registering a path twice returns the existing key and keeps the
    /// first description. Struct layouts are flattened here: the base
    /// type's members come first, so the base must already be registered.
    /// Collection member types such as `List<demo::Node>` are interned as
    /// soon as their component types are known.
    ///
    /// # Panics
    ///
    /// Panics if a struct names a base type that is not a registered struct.
    pub fn register(&mut self, info: impl Into<TypeInfo>) -> TypeKey {
        let mut info = info.into();
        if let Some(&key) = self.path_to_key.get(info.path()) {
            debug!("type `{}` is already registered as {key}", info.path());
            return key;
        }

        let next = TypeKey::new(self.metas.len() as u32);
        if let TypeInfo::Struct(layout) = &mut info {
            let base = layout.ty().base().map(String::from);
            let mut members = match base {
                Some(base) => self.inherited_members(&base, layout.ty().path()),
                None => Vec::new(),
            };
            for mut member in core::mem::take(layout.members_mut()) {
                member.set_declaring_type(next);
                members.push(member);
            }
            for member in &members {
                if CollectionPath::parse(member.type_path()).is_some() {
                    self.pending_paths.push(Cow::Owned(member.type_path().into()));
                }
            }
            *layout.members_mut() = members;
        }

        let key = self.insert_meta(info);
        self.intern_pending();
        self.invalidate_caches();
        key
    }

    fn inherited_members(&self, base: &str, path: &str) -> Vec<MemberInfo> {
        match self.get_with_path(base).map(TypeMeta::type_info) {
            Some(TypeInfo::Struct(layout)) => layout.members().to_vec(),
            Some(TypeInfo::Opaque(_)) => Vec::new(),
            Some(other) => panic!(
                "base type `{base}` of `{path}` is a {} type, expected a struct",
                other.kind()
            ),
            None => panic!("base type `{base}` of `{path}` must be registered before `{path}`"),
        }
    }

    fn intern_pending(&mut self) {
        for path in core::mem::take(&mut self.pending_paths) {
            if self.intern_path(&path).is_none() {
                self.pending_paths.push(path);
            }
        }
    }

    fn intern_collection(&mut self, path: String, make: impl FnOnce(String) -> TypeInfo) -> TypeKey {
        if let Some(&key) = self.path_to_key.get(path.as_str()) {
            return key;
        }
        let key = self.insert_meta(make(path));
        self.invalidate_caches();
        key
    }

    /// Interns `List<item>`.
    ///
    /// # Panics
    ///
    /// Panics if `item` is not registered.
    pub fn list_of(&mut self, item: TypeKey) -> TypeKey {
        let path = CollectionPath::list(self.path_of(item));
        self.intern_collection(path, |path| TypeInfo::List(ListInfo::new(path, item)))
    }

    /// Interns `Map<key,value>`.
    ///
    /// # Panics
    ///
    /// Panics if either type is not registered.
    pub fn map_of(&mut self, key: TypeKey, value: TypeKey) -> TypeKey {
        let path = CollectionPath::map(self.path_of(key), self.path_of(value));
        self.intern_collection(path, |path| TypeInfo::Map(MapInfo::new(path, key, value)))
    }

    /// Interns `Array<item;rank>`.
    ///
    /// # Panics
    ///
    /// Panics if `item` is not registered or `rank` is zero.
    pub fn array_of(&mut self, item: TypeKey, rank: u8) -> TypeKey {
        assert!(rank > 0, "array rank must be at least 1");
        let path = CollectionPath::array(self.path_of(item), rank);
        self.intern_collection(path, |path| TypeInfo::Array(ArrayInfo::new(path, item, rank)))
    }

    /// Resolves a path, interning collection paths whose components are
    /// registered.
    pub fn intern_path(&mut self, path: &str) -> Option<TypeKey> {
        if let Some(&key) = self.path_to_key.get(path) {
            return Some(key);
        }
        match CollectionPath::parse(path)? {
            CollectionPath::List(item) => {
                let item = self.intern_path(item)?;
                Some(self.list_of(item))
            }
            CollectionPath::Map(key, value) => {
                let key = self.intern_path(key)?;
                let value = self.intern_path(value)?;
                Some(self.map_of(key, value))
            }
            CollectionPath::Array(item, rank) => {
                let item = self.intern_path(item)?;
                Some(self.array_of(item, rank))
            }
        }
    }

    fn path_of(&self, key: TypeKey) -> &str {
        match self.metas.get(key.index()) {
            Some(meta) => meta.path(),
            None => panic!("type {key} is not registered"),
        }
    }

    // -------------------------------------------------------------------------
    // Queries

    /// Number of registered types.
    #[inline]
    pub fn len(&self) -> usize {
        self.metas.len()
    }

    #[inline]
    pub fn get(&self, key: TypeKey) -> Option<&TypeMeta> {
        self.metas.get(key.index())
    }

    #[inline]
    pub fn get_mut(&mut self, key: TypeKey) -> Option<&mut TypeMeta> {
        self.metas.get_mut(key.index())
    }

    #[inline]
    pub fn get_type_info(&self, key: TypeKey) -> Option<&TypeInfo> {
        self.get(key).map(TypeMeta::type_info)
    }

    /// Looks up a registered path. Collection paths must have been interned.
    #[inline]
    pub fn resolve_path(&self, path: &str) -> Option<TypeKey> {
        self.path_to_key.get(path).copied()
    }

    pub fn get_with_path(&self, path: &str) -> Option<&TypeMeta> {
        match self.resolve_path(path) {
            Some(key) => self.get(key),
            None => None,
        }
    }

    #[inline]
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &TypeMeta> {
        self.metas.iter()
    }

    pub fn get_type_trait<T: TypeTrait>(&self, key: TypeKey) -> Option<&T> {
        match self.get(key) {
            Some(meta) => meta.get_trait::<T>(),
            None => None,
        }
    }

    pub fn iter_with_trait<T: TypeTrait>(&self) -> impl Iterator<Item = (&TypeMeta, &T)> {
        self.metas
            .iter()
            .filter_map(|meta| meta.get_trait::<T>().map(|t| (meta, t)))
    }

    /// Layout index of a struct member.
    pub fn member_index(&self, key: TypeKey, name: &str) -> Option<usize> {
        self.get_type_info(key)?.as_struct().ok()?.index_of(name)
    }

    /// The type itself, its base chain and every implemented interface.
    pub fn supertypes(&self, key: TypeKey) -> Vec<TypeKey> {
        let mut found = Vec::from([key]);
        let mut cursor = 0;
        while let Some(&current) = found.get(cursor) {
            cursor += 1;
            let Some(info) = self.get_type_info(current) else {
                continue;
            };
            let ty = info.ty();
            for path in ty.base().into_iter().chain(ty.interfaces()) {
                if let Some(parent) = self.resolve_path(path)
                    && !found.contains(&parent)
                {
                    found.push(parent);
                }
            }
        }
        found
    }

    /// Whether a value of type `from` can be stored where `to` is declared.
    pub fn is_assignable(&self, from: TypeKey, to: TypeKey) -> bool {
        from == to || to == TypeKey::OBJECT || self.supertypes(from).contains(&to)
    }

    /// The zero value stored in fresh members of the given type.
    pub fn default_value_of(&self, key: TypeKey) -> Value {
        match self.get_type_info(key) {
            Some(TypeInfo::Primitive(info)) => Value::zero(info.kind()),
            Some(TypeInfo::Enum(_)) => Value::Enum(EnumValue {
                ty: key,
                discriminant: 0,
            }),
            _ => Value::Null,
        }
    }

    /// Like [`default_value_of`](Self::default_value_of), by path.
    pub fn default_value(&self, path: &str) -> Value {
        match self.resolve_path(path) {
            Some(key) => self.default_value_of(key),
            None => Value::Null,
        }
    }

    // -------------------------------------------------------------------------
    // Capabilities

    fn meta_mut(&mut self, key: TypeKey, caller: &str) -> &mut TypeMeta {
        let len = self.metas.len();
        match self.metas.get_mut(key.index()) {
            Some(meta) => meta,
            None => panic!(
                "called `TypeRegistry::{caller}` with type {key}, but only {len} types are registered"
            ),
        }
    }

    /// Attaches a type trait value to a registered type.
    ///
    /// # Panics
    ///
    /// Panics if `key` is not registered.
    pub fn insert_type_trait<T: TypeTrait>(&mut self, key: TypeKey, data: T) {
        self.meta_mut(key, "insert_type_trait").insert_trait(data);
        self.invalidate_caches();
    }

    /// Attaches `D` built for the host type `T`.
    ///
    /// # Panics
    ///
    /// Panics if `key` is not registered.
    #[inline]
    pub fn register_type_trait<T, D: TypeTrait + FromType<T>>(&mut self, key: TypeKey) {
        self.insert_type_trait(key, D::from_type());
    }

    /// Registers the exact-type handler of `key`.
    pub fn register_handler(&mut self, key: TypeKey, handler: impl SerializeObject) {
        self.insert_type_trait(key, TypeTraitHandler::new(Arc::new(handler)));
    }

    /// Registers a handler for every type assignable to `target`.
    ///
    /// Subtype handlers are consulted in registration order after exact
    /// handlers. With `interfaces_only`, `target` must be an interface and
    /// only its implementors match.
    pub fn register_subtype_handler(
        &mut self,
        target: TypeKey,
        interfaces_only: bool,
        handler: impl SerializeObject,
    ) {
        self.insert_subtype_handler(target, interfaces_only, Arc::new(handler));
    }

    pub(crate) fn insert_subtype_handler(
        &mut self,
        target: TypeKey,
        interfaces_only: bool,
        handler: Arc<dyn SerializeObject>,
    ) {
        if interfaces_only
            && !matches!(self.get_type_info(target), Some(TypeInfo::Interface(_)))
        {
            warn!(
                "interfaces-only handler registered for `{}`, which is not an interface; it will never match",
                self.path_of(target)
            );
        }
        self.subtype_handlers.push(SubtypeHandler {
            target,
            interfaces_only,
            handler,
        });
        self.invalidate_caches();
    }

    /// Registers a named [`Specialist`], replacing any previous one.
    pub fn register_specialist(&mut self, name: impl Into<Cow<'static, str>>, specialist: impl Specialist) {
        self.insert_specialist(name.into(), Arc::new(specialist));
    }

    pub(crate) fn insert_specialist(&mut self, name: Cow<'static, str>, specialist: Arc<dyn Specialist>) {
        self.specialists.insert(name, specialist);
        self.invalidate_caches();
    }

    pub fn register_factory(&mut self, key: TypeKey, factory: impl Factory) {
        self.insert_type_trait(key, TypeTraitFactory::new(Arc::new(factory)));
    }

    pub fn set_member_policy(&mut self, key: TypeKey, policy: MemberPolicy) {
        self.insert_type_trait(key, TypeTraitMemberPolicy::new(policy));
    }

    /// Runs `callback` on each rebuilt instance of `key` after linking.
    pub fn register_on_deserialized(&mut self, key: TypeKey, callback: fn(&ObjRef)) {
        self.insert_type_trait(key, TypeTraitOnDeserialized::new(callback));
    }

    /// Adds a predicate that excludes member types from serialization.
    pub fn add_type_veto(&mut self, veto: impl Fn(&TypeInfo) -> bool + Send + Sync + 'static) {
        self.hooks.vetoes.push(Arc::new(veto));
        self.invalidate_caches();
    }

    /// Adds a constructor of last resort.
    pub fn on_create_type(
        &mut self,
        hook: impl Fn(&TypeInfo) -> Option<alloc::boxed::Box<dyn Reflect>> + Send + Sync + 'static,
    ) {
        self.hooks.create_type.push(Arc::new(hook));
    }

    /// Adds a resolver for type paths missing from the registry.
    pub fn on_type_mapping(
        &mut self,
        hook: impl Fn(&str, &TypeRegistry) -> Option<TypeKey> + Send + Sync + 'static,
    ) {
        self.hooks.type_mapping.push(Arc::new(hook));
    }

    /// Adds a listener notified with the root of each completed deserialize.
    pub fn on_deserialized(&mut self, listener: impl Fn(&Value) + Send + Sync + 'static) {
        self.hooks.deserialized.push(Arc::new(listener));
    }

    // -------------------------------------------------------------------------
    // Resolution

    /// Resolves the handler for a type: the exact handler first, then the
    /// first matching subtype handler. A handler that declines the type
    /// through [`SerializeObject::can_serialize`] is not returned.
    pub fn lookup_handler(
        &self,
        key: TypeKey,
        instance: Option<&ObjRef>,
    ) -> Option<Arc<dyn SerializeObject>> {
        let handler = self.handler_for(key)?;
        handler
            .can_serialize(self.get_type_info(key)?, instance)
            .then_some(handler)
    }

    /// The handler registered for a type, exact first, without asking it
    /// whether it accepts an instance. Used on read, where the stream
    /// already records that the handler wrote the object.
    pub fn handler_for(&self, key: TypeKey) -> Option<Arc<dyn SerializeObject>> {
        let meta = self.get(key)?;
        match meta.get_trait::<TypeTraitHandler>() {
            Some(exact) => Some(Arc::clone(exact.handler())),
            None => self.subtype_handler(key),
        }
    }

    fn subtype_handler(&self, key: TypeKey) -> Option<Arc<dyn SerializeObject>> {
        if let Some(hit) = self
            .handler_cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return hit.clone();
        }

        let found = self
            .subtype_handlers
            .iter()
            .find(|entry| {
                if entry.interfaces_only
                    && !matches!(self.get_type_info(entry.target), Some(TypeInfo::Interface(_)))
                {
                    return false;
                }
                self.is_assignable(key, entry.target)
            })
            .map(|entry| Arc::clone(&entry.handler));

        self.handler_cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, found.clone());
        found
    }

    pub fn specialist(&self, name: &str) -> Option<Arc<dyn Specialist>> {
        self.specialists.get(name).cloned()
    }

    /// Whether any veto predicate rejects the type.
    pub fn is_vetoed(&self, key: TypeKey) -> bool {
        match self.get_type_info(key) {
            Some(info) => self.hooks.vetoes.iter().any(|veto| veto(info)),
            None => false,
        }
    }

    /// Resolves a stream type path, consulting mapping hooks when the path
    /// is not registered.
    pub fn resolve_stream_path(&self, path: &str) -> Option<TypeKey> {
        if let Some(key) = self.resolve_path(path) {
            return Some(key);
        }
        let mapped = self.hooks.type_mapping.iter().find_map(|hook| hook(path, self));
        if let Some(key) = mapped {
            debug!("type `{path}` mapped to `{}`", self.path_of(key));
        }
        mapped
    }

    /// Every member policy that applies to `key`.
    pub fn member_policies(&self, key: TypeKey) -> Vec<&MemberPolicy> {
        self.supertypes(key)
            .into_iter()
            .filter_map(|ty| self.get_type_trait::<TypeTraitMemberPolicy>(ty))
            .map(TypeTraitMemberPolicy::policy)
            .collect()
    }

    #[inline]
    pub(crate) fn create_type_hooks(&self) -> &[CreateTypeHook] {
        &self.hooks.create_type
    }

    #[inline]
    pub(crate) fn deserialized_listeners(&self) -> &[DeserializedListener] {
        &self.hooks.deserialized
    }

    // -------------------------------------------------------------------------
    // Accessors

    /// The serializable fields of a struct type, in write order.
    ///
    /// `seen_before` drops static members, which are written only with the
    /// first instance of a type in a stream.
    #[inline]
    pub fn fields(
        &self,
        key: TypeKey,
        mode: AccessMode,
        seen_before: bool,
    ) -> Result<Arc<[Accessor]>, GraphError> {
        self.accessors
            .get_or_build(self, AccessKey::new(key, MemberKind::Field, mode, seen_before))
    }

    /// The serializable properties of a struct type, in write order.
    #[inline]
    pub fn properties(
        &self,
        key: TypeKey,
        mode: AccessMode,
        seen_before: bool,
    ) -> Result<Arc<[Accessor]>, GraphError> {
        self.accessors
            .get_or_build(self, AccessKey::new(key, MemberKind::Property, mode, seen_before))
    }
}

impl core::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list()
            .entries(self.metas.iter().map(TypeMeta::path))
            .finish()
    }
}
