//! Runtime values and graph nodes.
//!
//! A [`Value`] is either a primitive, an enum, null, or an [`ObjRef`]
//! pointing at a shared [`Reflect`] node. Nodes are compared by identity;
//! everything else by value.

// -----------------------------------------------------------------------------
// Modules

mod array;
mod compare;
mod decimal;
mod dynamic;
mod list;
mod map;
mod object;

// -----------------------------------------------------------------------------
// Exports

pub use array::Array;
pub use compare::deep_eq;
pub use decimal::Decimal;
pub use dynamic::DynamicObject;
pub use list::List;
pub use map::Map;
pub use object::{ObjRef, Reflect, ReflectMut, ReflectRef, Struct};

pub use chrono::{DateTime, TimeDelta, Utc};
pub use uuid::Uuid;

use alloc::string::String;
use core::hash::{Hash, Hasher};

use crate::info::{PrimitiveKind, TypeKey};

// -----------------------------------------------------------------------------
// EnumValue

/// A value of a registered enum type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumValue {
    pub ty: TypeKey,
    pub discriminant: i64,
}

// -----------------------------------------------------------------------------
// Value

/// A member, element, or root of a graph.
///
/// Floats compare by bit pattern, so `NaN` equals itself and `0.0` does not
/// equal `-0.0`. Objects compare by identity.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Char(char),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    String(String),
    Guid(Uuid),
    DateTime(DateTime<Utc>),
    TimeSpan(TimeDelta),
    Enum(EnumValue),
    Object(ObjRef),
}

impl Value {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[inline]
    pub fn as_object(&self) -> Option<&ObjRef> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The primitive kind of inline values. `None` for null, enums and objects.
    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        Some(match self {
            Self::Bool(_) => PrimitiveKind::Bool,
            Self::Char(_) => PrimitiveKind::Char,
            Self::I8(_) => PrimitiveKind::I8,
            Self::I16(_) => PrimitiveKind::I16,
            Self::I32(_) => PrimitiveKind::I32,
            Self::I64(_) => PrimitiveKind::I64,
            Self::U8(_) => PrimitiveKind::U8,
            Self::U16(_) => PrimitiveKind::U16,
            Self::U32(_) => PrimitiveKind::U32,
            Self::U64(_) => PrimitiveKind::U64,
            Self::F32(_) => PrimitiveKind::F32,
            Self::F64(_) => PrimitiveKind::F64,
            Self::Decimal(_) => PrimitiveKind::Decimal,
            Self::String(_) => PrimitiveKind::String,
            Self::Guid(_) => PrimitiveKind::Guid,
            Self::DateTime(_) => PrimitiveKind::DateTime,
            Self::TimeSpan(_) => PrimitiveKind::TimeSpan,
            Self::Null | Self::Enum(_) | Self::Object(_) => return None,
        })
    }

    /// The runtime type of the value, `None` for null.
    pub fn runtime_type(&self) -> Option<TypeKey> {
        match self {
            Self::Null => None,
            Self::Enum(e) => Some(e.ty),
            Self::Object(obj) => Some(obj.type_key()),
            other => other.primitive_kind().map(PrimitiveKind::type_key),
        }
    }

    /// Integer payloads, widened. Enums yield their discriminant.
    pub fn as_i128(&self) -> Option<i128> {
        Some(match *self {
            Self::I8(v) => v as i128,
            Self::I16(v) => v as i128,
            Self::I32(v) => v as i128,
            Self::I64(v) => v as i128,
            Self::U8(v) => v as i128,
            Self::U16(v) => v as i128,
            Self::U32(v) => v as i128,
            Self::U64(v) => v as i128,
            Self::Enum(e) => e.discriminant as i128,
            _ => return None,
        })
    }

    /// Builds an integer value of `kind`, or `None` if it does not fit.
    pub fn from_i128(kind: PrimitiveKind, v: i128) -> Option<Self> {
        Some(match kind {
            PrimitiveKind::I8 => Self::I8(i8::try_from(v).ok()?),
            PrimitiveKind::I16 => Self::I16(i16::try_from(v).ok()?),
            PrimitiveKind::I32 => Self::I32(i32::try_from(v).ok()?),
            PrimitiveKind::I64 => Self::I64(i64::try_from(v).ok()?),
            PrimitiveKind::U8 => Self::U8(u8::try_from(v).ok()?),
            PrimitiveKind::U16 => Self::U16(u16::try_from(v).ok()?),
            PrimitiveKind::U32 => Self::U32(u32::try_from(v).ok()?),
            PrimitiveKind::U64 => Self::U64(u64::try_from(v).ok()?),
            _ => return None,
        })
    }

    /// The zero value of a primitive kind.
    pub fn zero(kind: PrimitiveKind) -> Self {
        match kind {
            PrimitiveKind::Bool => Self::Bool(false),
            PrimitiveKind::Char => Self::Char('\0'),
            PrimitiveKind::I8 => Self::I8(0),
            PrimitiveKind::I16 => Self::I16(0),
            PrimitiveKind::I32 => Self::I32(0),
            PrimitiveKind::I64 => Self::I64(0),
            PrimitiveKind::U8 => Self::U8(0),
            PrimitiveKind::U16 => Self::U16(0),
            PrimitiveKind::U32 => Self::U32(0),
            PrimitiveKind::U64 => Self::U64(0),
            PrimitiveKind::F32 => Self::F32(0.0),
            PrimitiveKind::F64 => Self::F64(0.0),
            PrimitiveKind::Decimal => Self::Decimal(Decimal::default()),
            PrimitiveKind::String => Self::Null,
            PrimitiveKind::Guid => Self::Guid(Uuid::nil()),
            PrimitiveKind::DateTime => Self::DateTime(DateTime::<Utc>::UNIX_EPOCH),
            PrimitiveKind::TimeSpan => Self::TimeSpan(TimeDelta::zero()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Char(a), Self::Char(b)) => a == b,
            (Self::I8(a), Self::I8(b)) => a == b,
            (Self::I16(a), Self::I16(b)) => a == b,
            (Self::I32(a), Self::I32(b)) => a == b,
            (Self::I64(a), Self::I64(b)) => a == b,
            (Self::U8(a), Self::U8(b)) => a == b,
            (Self::U16(a), Self::U16(b)) => a == b,
            (Self::U32(a), Self::U32(b)) => a == b,
            (Self::U64(a), Self::U64(b)) => a == b,
            (Self::F32(a), Self::F32(b)) => a.to_bits() == b.to_bits(),
            (Self::F64(a), Self::F64(b)) => a.to_bits() == b.to_bits(),
            (Self::Decimal(a), Self::Decimal(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Guid(a), Self::Guid(b)) => a == b,
            (Self::DateTime(a), Self::DateTime(b)) => a == b,
            (Self::TimeSpan(a), Self::TimeSpan(b)) => a == b,
            (Self::Enum(a), Self::Enum(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(v) => v.hash(state),
            Self::Char(v) => v.hash(state),
            Self::I8(v) => v.hash(state),
            Self::I16(v) => v.hash(state),
            Self::I32(v) => v.hash(state),
            Self::I64(v) => v.hash(state),
            Self::U8(v) => v.hash(state),
            Self::U16(v) => v.hash(state),
            Self::U32(v) => v.hash(state),
            Self::U64(v) => v.hash(state),
            Self::F32(v) => v.to_bits().hash(state),
            Self::F64(v) => v.to_bits().hash(state),
            Self::Decimal(v) => v.hash(state),
            Self::String(v) => v.hash(state),
            Self::Guid(v) => v.hash(state),
            Self::DateTime(v) => v.hash(state),
            Self::TimeSpan(v) => v.hash(state),
            Self::Enum(v) => v.hash(state),
            Self::Object(v) => v.addr().hash(state),
        }
    }
}

// -----------------------------------------------------------------------------
// Conversions

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                #[inline]
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

impl_from_value!(
    bool => Bool,
    char => Char,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    Decimal => Decimal,
    String => String,
    Uuid => Guid,
    DateTime<Utc> => DateTime,
    TimeDelta => TimeSpan,
    EnumValue => Enum,
    ObjRef => Object,
);

impl From<&str> for Value {
    #[inline]
    fn from(value: &str) -> Self {
        Self::String(String::from(value))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    #[inline]
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}
