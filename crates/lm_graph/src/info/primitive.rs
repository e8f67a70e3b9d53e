use core::fmt;

use crate::info::TypeKey;

/// The primitive value kinds written directly by storage codecs.
///
/// Each kind is pre-registered under a fixed [`TypeKey`], in declaration
/// order starting at [`TypeKey::BOOL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PrimitiveKind {
    Bool,
    Char,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Decimal,
    String,
    Guid,
    DateTime,
    TimeSpan,
}

impl PrimitiveKind {
    pub const ALL: [PrimitiveKind; 17] = [
        Self::Bool,
        Self::Char,
        Self::I8,
        Self::I16,
        Self::I32,
        Self::I64,
        Self::U8,
        Self::U16,
        Self::U32,
        Self::U64,
        Self::F32,
        Self::F64,
        Self::Decimal,
        Self::String,
        Self::Guid,
        Self::DateTime,
        Self::TimeSpan,
    ];

    /// The registered path, e.g. `"i32"`.
    pub const fn path(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Char => "char",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Decimal => "decimal",
            Self::String => "string",
            Self::Guid => "guid",
            Self::DateTime => "datetime",
            Self::TimeSpan => "timespan",
        }
    }

    #[inline]
    pub const fn type_key(self) -> TypeKey {
        TypeKey::new(self as u32 + 1)
    }

    /// Byte width of kinds that arrays store as a packed blob.
    ///
    /// Returns `None` for kinds that are written element by element.
    pub const fn packed_width(self) -> Option<usize> {
        match self {
            Self::Bool | Self::I8 | Self::U8 => Some(1),
            Self::I16 | Self::U16 => Some(2),
            Self::Char | Self::I32 | Self::U32 | Self::F32 => Some(4),
            Self::I64 | Self::U64 | Self::F64 => Some(8),
            _ => None,
        }
    }

    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            Self::I8 | Self::I16 | Self::I32 | Self::I64 | Self::U8 | Self::U16 | Self::U32 | Self::U64
        )
    }

    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.path())
    }
}
