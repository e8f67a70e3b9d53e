use alloc::borrow::Cow;
use alloc::vec::Vec;
use core::fmt;

use bitflags::bitflags;
use thiserror::Error;

use crate::info::{MemberInfo, PrimitiveKind};

// -----------------------------------------------------------------------------
// TypeKey

/// A dense handle to a registered type.
///
/// Keys are only meaningful for the registry that issued them. The root
/// `object` type, the primitives and `List<object>` are registered first,
/// under the constants below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeKey(u32);

impl TypeKey {
    pub const OBJECT: Self = Self(0);
    pub const BOOL: Self = PrimitiveKind::Bool.type_key();
    pub const CHAR: Self = PrimitiveKind::Char.type_key();
    pub const I8: Self = PrimitiveKind::I8.type_key();
    pub const I16: Self = PrimitiveKind::I16.type_key();
    pub const I32: Self = PrimitiveKind::I32.type_key();
    pub const I64: Self = PrimitiveKind::I64.type_key();
    pub const U8: Self = PrimitiveKind::U8.type_key();
    pub const U16: Self = PrimitiveKind::U16.type_key();
    pub const U32: Self = PrimitiveKind::U32.type_key();
    pub const U64: Self = PrimitiveKind::U64.type_key();
    pub const F32: Self = PrimitiveKind::F32.type_key();
    pub const F64: Self = PrimitiveKind::F64.type_key();
    pub const DECIMAL: Self = PrimitiveKind::Decimal.type_key();
    pub const STRING: Self = PrimitiveKind::String.type_key();
    pub const GUID: Self = PrimitiveKind::Guid.type_key();
    pub const DATETIME: Self = PrimitiveKind::DateTime.type_key();
    pub const TIMESPAN: Self = PrimitiveKind::TimeSpan.type_key();
    /// `List<object>`, the declared type of handler payloads.
    pub const OBJECT_LIST: Self = Self(18);

    #[inline(always)]
    pub(crate) const fn new(index: u32) -> Self {
        Self(index)
    }

    #[inline(always)]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// -----------------------------------------------------------------------------
// TypeFlags

bitflags! {
    /// Type-level serialization attributes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TypeFlags: u8 {
        /// Instances have no identity: they are never shared or back-referenced.
        const VALUE_TYPE = 1 << 0;
        /// Members declared by, or typed as, this type are never written.
        const DO_NOT_SERIALIZE = 1 << 1;
        /// Only members marked [`SERIALIZE`](crate::info::MemberFlags::SERIALIZE) are written.
        const OPT_IN = 1 << 2;
        /// Cannot be instantiated directly.
        const ABSTRACT = 1 << 3;
    }
}

// -----------------------------------------------------------------------------
// TypeKind

/// A fast discriminator for [`TypeInfo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Object,
    Primitive,
    Enum,
    Struct,
    Interface,
    Opaque,
    List,
    Map,
    Array,
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object => f.pad("Object"),
            Self::Primitive => f.pad("Primitive"),
            Self::Enum => f.pad("Enum"),
            Self::Struct => f.pad("Struct"),
            Self::Interface => f.pad("Interface"),
            Self::Opaque => f.pad("Opaque"),
            Self::List => f.pad("List"),
            Self::Map => f.pad("Map"),
            Self::Array => f.pad("Array"),
        }
    }
}

/// Returned when a [`TypeInfo`] is not the expected [`TypeKind`].
#[derive(Debug, Error)]
#[error("expected {expected} type info, found {received}")]
pub struct TypeKindError {
    pub expected: TypeKind,
    pub received: TypeKind,
}

// -----------------------------------------------------------------------------
// Type

/// The header shared by every [`TypeInfo`] variant.
#[derive(Debug, Clone)]
pub struct Type {
    key: TypeKey,
    path: Cow<'static, str>,
    flags: TypeFlags,
    base: Option<Cow<'static, str>>,
    interfaces: Vec<Cow<'static, str>>,
}

impl Type {
    fn new(path: impl Into<Cow<'static, str>>) -> Self {
        Self {
            key: TypeKey::OBJECT,
            path: path.into(),
            flags: TypeFlags::empty(),
            base: None,
            interfaces: Vec::new(),
        }
    }

    /// The key assigned at registration.
    #[inline]
    pub fn key(&self) -> TypeKey {
        self.key
    }

    /// The full path, e.g. `"demo::Player"`. Unique within a registry.
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The last path segment, e.g. `"Player"`.
    pub fn name(&self) -> &str {
        if self.path.contains('<') {
            return &self.path;
        }
        self.path.rsplit("::").next().unwrap_or(&self.path)
    }

    #[inline]
    pub fn flags(&self) -> TypeFlags {
        self.flags
    }

    /// Path of the base type, if any.
    #[inline]
    pub fn base(&self) -> Option<&str> {
        self.base.as_deref()
    }

    /// Paths of directly implemented interfaces.
    #[inline]
    pub fn interfaces(&self) -> impl ExactSizeIterator<Item = &str> {
        self.interfaces.iter().map(|path| &**path)
    }

    #[inline]
    pub fn is_value_type(&self) -> bool {
        self.flags.contains(TypeFlags::VALUE_TYPE)
    }

    #[inline]
    pub(crate) fn path_cow(&self) -> &Cow<'static, str> {
        &self.path
    }

    #[inline]
    pub(crate) fn set_key(&mut self, key: TypeKey) {
        self.key = key;
    }
}

// Builder methods shared by infos that users describe by hand.
macro_rules! impl_ty_builder {
    ($info:ident) => {
        impl $info {
            /// Adds type-level flags.
            #[inline]
            pub fn with_flags(mut self, flags: TypeFlags) -> Self {
                self.ty.flags |= flags;
                self
            }

            /// Sets the base type. The base must be registered first.
            #[inline]
            pub fn with_base(mut self, path: impl Into<Cow<'static, str>>) -> Self {
                self.ty.base = Some(path.into());
                self
            }

            /// Declares an implemented interface.
            #[inline]
            pub fn with_interface(mut self, path: impl Into<Cow<'static, str>>) -> Self {
                self.ty.interfaces.push(path.into());
                self
            }

            #[inline]
            pub fn ty(&self) -> &Type {
                &self.ty
            }
        }
    };
}

macro_rules! impl_ty_getter {
    ($info:ident) => {
        impl $info {
            #[inline]
            pub fn ty(&self) -> &Type {
                &self.ty
            }
        }
    };
}

// -----------------------------------------------------------------------------
// Infos

/// The root `object` type. Every type is assignable to it.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    ty: Type,
}

impl ObjectInfo {
    pub(crate) fn new() -> Self {
        Self {
            ty: Type::new("object"),
        }
    }
}

impl_ty_getter!(ObjectInfo);

/// A type written directly by the storage codec.
#[derive(Debug, Clone)]
pub struct PrimitiveInfo {
    ty: Type,
    kind: PrimitiveKind,
}

impl PrimitiveInfo {
    pub(crate) fn new(kind: PrimitiveKind) -> Self {
        let mut ty = Type::new(kind.path());
        ty.flags = TypeFlags::VALUE_TYPE;
        Self { ty, kind }
    }

    #[inline]
    pub fn kind(&self) -> PrimitiveKind {
        self.kind
    }
}

impl_ty_getter!(PrimitiveInfo);

/// An enumeration, written as its underlying integer.
///
/// # Examples
///
/// ```
/// use lm_graph::info::EnumInfo;
///
/// let info = EnumInfo::new("demo::Color")
///     .with_variant("Red", 0)
///     .with_variant("Green", 1);
///
/// assert_eq!(info.discriminant_of("Green"), Some(1));
/// assert_eq!(info.variant_name(0), Some("Red"));
/// ```
#[derive(Debug, Clone)]
pub struct EnumInfo {
    ty: Type,
    repr: PrimitiveKind,
    variants: Vec<(Cow<'static, str>, i64)>,
}

impl EnumInfo {
    pub fn new(path: impl Into<Cow<'static, str>>) -> Self {
        let mut ty = Type::new(path);
        ty.flags = TypeFlags::VALUE_TYPE;
        Self {
            ty,
            repr: PrimitiveKind::I32,
            variants: Vec::new(),
        }
    }

    #[inline]
    pub fn with_variant(mut self, name: impl Into<Cow<'static, str>>, discriminant: i64) -> Self {
        self.variants.push((name.into(), discriminant));
        self
    }

    /// Sets the underlying integer kind. Defaults to [`PrimitiveKind::I32`].
    ///
    /// # Panics
    ///
    /// Panics if `repr` is not an integer kind.
    pub fn with_repr(mut self, repr: PrimitiveKind) -> Self {
        assert!(repr.is_integer(), "enum repr must be an integer kind, got {repr}");
        self.repr = repr;
        self
    }

    #[inline]
    pub fn repr(&self) -> PrimitiveKind {
        self.repr
    }

    pub fn discriminant_of(&self, name: &str) -> Option<i64> {
        self.variants.iter().find(|(n, _)| n == name).map(|(_, d)| *d)
    }

    pub fn variant_name(&self, discriminant: i64) -> Option<&str> {
        self.variants
            .iter()
            .find(|(_, d)| *d == discriminant)
            .map(|(n, _)| &**n)
    }

    pub fn variants(&self) -> impl ExactSizeIterator<Item = (&str, i64)> {
        self.variants.iter().map(|(n, d)| (&**n, *d))
    }

    #[inline]
    pub fn with_flags(mut self, flags: TypeFlags) -> Self {
        self.ty.flags |= flags;
        self
    }
}

impl_ty_getter!(EnumInfo);

/// A type with a member layout.
///
/// After registration, [`members`](Self::members) holds the flattened
/// layout: inherited members first, in base-to-derived order.
///
/// # Examples
///
/// ```
/// use lm_graph::info::{MemberInfo, StructInfo, TypeFlags};
///
/// let info = StructInfo::new("demo::Point")
///     .with_flags(TypeFlags::VALUE_TYPE)
///     .with_member(MemberInfo::field("x", "f32"))
///     .with_member(MemberInfo::field("y", "f32"));
///
/// assert_eq!(info.index_of("y"), Some(1));
/// assert!(info.ty().is_value_type());
/// ```
#[derive(Debug, Clone)]
pub struct StructInfo {
    ty: Type,
    members: Vec<MemberInfo>,
}

impl StructInfo {
    pub fn new(path: impl Into<Cow<'static, str>>) -> Self {
        Self {
            ty: Type::new(path),
            members: Vec::new(),
        }
    }

    #[inline]
    pub fn with_member(mut self, member: MemberInfo) -> Self {
        self.members.push(member);
        self
    }

    #[inline]
    pub fn members(&self) -> &[MemberInfo] {
        &self.members
    }

    #[inline]
    pub fn member_at(&self, index: usize) -> Option<&MemberInfo> {
        self.members.get(index)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|m| m.name() == name)
    }

    #[inline]
    pub fn member_len(&self) -> usize {
        self.members.len()
    }

    #[inline]
    pub(crate) fn members_mut(&mut self) -> &mut Vec<MemberInfo> {
        &mut self.members
    }
}

impl_ty_builder!(StructInfo);

/// An interface: never instantiated, only implemented.
#[derive(Debug, Clone)]
pub struct InterfaceInfo {
    ty: Type,
}

impl InterfaceInfo {
    pub fn new(path: impl Into<Cow<'static, str>>) -> Self {
        let mut ty = Type::new(path);
        ty.flags = TypeFlags::ABSTRACT;
        Self { ty }
    }
}

impl_ty_builder!(InterfaceInfo);

/// A type without a reflected layout.
///
/// Opaque types are written through a
/// [`SerializeObject`](crate::registry::SerializeObject) handler.
#[derive(Debug, Clone)]
pub struct OpaqueInfo {
    ty: Type,
}

impl OpaqueInfo {
    pub fn new(path: impl Into<Cow<'static, str>>) -> Self {
        Self { ty: Type::new(path) }
    }
}

impl_ty_builder!(OpaqueInfo);

/// A growable sequence.
#[derive(Debug, Clone)]
pub struct ListInfo {
    ty: Type,
    item: TypeKey,
}

impl ListInfo {
    pub(crate) fn new(path: impl Into<Cow<'static, str>>, item: TypeKey) -> Self {
        Self {
            ty: Type::new(path),
            item,
        }
    }

    #[inline]
    pub fn item(&self) -> TypeKey {
        self.item
    }
}

impl_ty_getter!(ListInfo);

/// A dictionary.
#[derive(Debug, Clone)]
pub struct MapInfo {
    ty: Type,
    key: TypeKey,
    value: TypeKey,
}

impl MapInfo {
    pub(crate) fn new(path: impl Into<Cow<'static, str>>, key: TypeKey, value: TypeKey) -> Self {
        Self {
            ty: Type::new(path),
            key,
            value,
        }
    }

    #[inline]
    pub fn key(&self) -> TypeKey {
        self.key
    }

    #[inline]
    pub fn value(&self) -> TypeKey {
        self.value
    }
}

impl_ty_getter!(MapInfo);

/// A fixed-shape array of any rank.
#[derive(Debug, Clone)]
pub struct ArrayInfo {
    ty: Type,
    item: TypeKey,
    rank: u8,
}

impl ArrayInfo {
    pub(crate) fn new(path: impl Into<Cow<'static, str>>, item: TypeKey, rank: u8) -> Self {
        Self {
            ty: Type::new(path),
            item,
            rank,
        }
    }

    #[inline]
    pub fn item(&self) -> TypeKey {
        self.item
    }

    #[inline]
    pub fn rank(&self) -> u8 {
        self.rank
    }
}

impl_ty_getter!(ArrayInfo);

// -----------------------------------------------------------------------------
// TypeInfo

/// A registered type description.
#[derive(Debug, Clone)]
pub enum TypeInfo {
    Object(ObjectInfo),
    Primitive(PrimitiveInfo),
    Enum(EnumInfo),
    Struct(StructInfo),
    Interface(InterfaceInfo),
    Opaque(OpaqueInfo),
    List(ListInfo),
    Map(MapInfo),
    Array(ArrayInfo),
}

macro_rules! impl_cast_method {
    ($name:ident : $kind:ident => $info:ident) => {
        /// Converts to the specific info, or reports the actual kind.
        pub const fn $name(&self) -> Result<&$info, TypeKindError> {
            match self {
                Self::$kind(info) => Ok(info),
                _ => Err(TypeKindError {
                    expected: TypeKind::$kind,
                    received: self.kind(),
                }),
            }
        }
    };
}

macro_rules! impl_from_info {
    ($($kind:ident => $info:ident),* $(,)?) => {
        $(
            impl From<$info> for TypeInfo {
                #[inline]
                fn from(value: $info) -> Self {
                    Self::$kind(value)
                }
            }
        )*
    };
}

impl_from_info!(
    Enum => EnumInfo,
    Struct => StructInfo,
    Interface => InterfaceInfo,
    Opaque => OpaqueInfo,
);

impl TypeInfo {
    impl_cast_method!(as_primitive: Primitive => PrimitiveInfo);
    impl_cast_method!(as_enum: Enum => EnumInfo);
    impl_cast_method!(as_struct: Struct => StructInfo);
    impl_cast_method!(as_list: List => ListInfo);
    impl_cast_method!(as_map: Map => MapInfo);
    impl_cast_method!(as_array: Array => ArrayInfo);

    pub const fn ty(&self) -> &Type {
        match self {
            Self::Object(info) => &info.ty,
            Self::Primitive(info) => &info.ty,
            Self::Enum(info) => &info.ty,
            Self::Struct(info) => &info.ty,
            Self::Interface(info) => &info.ty,
            Self::Opaque(info) => &info.ty,
            Self::List(info) => &info.ty,
            Self::Map(info) => &info.ty,
            Self::Array(info) => &info.ty,
        }
    }

    pub(crate) fn ty_mut(&mut self) -> &mut Type {
        match self {
            Self::Object(info) => &mut info.ty,
            Self::Primitive(info) => &mut info.ty,
            Self::Enum(info) => &mut info.ty,
            Self::Struct(info) => &mut info.ty,
            Self::Interface(info) => &mut info.ty,
            Self::Opaque(info) => &mut info.ty,
            Self::List(info) => &mut info.ty,
            Self::Map(info) => &mut info.ty,
            Self::Array(info) => &mut info.ty,
        }
    }

    pub const fn kind(&self) -> TypeKind {
        match self {
            Self::Object(_) => TypeKind::Object,
            Self::Primitive(_) => TypeKind::Primitive,
            Self::Enum(_) => TypeKind::Enum,
            Self::Struct(_) => TypeKind::Struct,
            Self::Interface(_) => TypeKind::Interface,
            Self::Opaque(_) => TypeKind::Opaque,
            Self::List(_) => TypeKind::List,
            Self::Map(_) => TypeKind::Map,
            Self::Array(_) => TypeKind::Array,
        }
    }

    #[inline]
    pub fn key(&self) -> TypeKey {
        self.ty().key()
    }

    #[inline]
    pub fn path(&self) -> &str {
        self.ty().path()
    }

    #[inline]
    pub fn flags(&self) -> TypeFlags {
        self.ty().flags()
    }

    /// Primitives and enums: written inline, never identity tracked.
    #[inline]
    pub fn is_primitive_like(&self) -> bool {
        matches!(self, Self::Primitive(_) | Self::Enum(_))
    }

    /// Whether instances of this type are identity tracked.
    #[inline]
    pub fn is_reference_type(&self) -> bool {
        !self.is_primitive_like() && !self.ty().is_value_type()
    }

    /// Interfaces, the root `object` type and `ABSTRACT` types.
    #[inline]
    pub fn is_abstract(&self) -> bool {
        matches!(self, Self::Interface(_) | Self::Object(_))
            || self.flags().contains(TypeFlags::ABSTRACT)
    }

    /// The wire kind of primitives and enums.
    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        match self {
            Self::Primitive(info) => Some(info.kind),
            Self::Enum(info) => Some(info.repr),
            _ => None,
        }
    }
}
