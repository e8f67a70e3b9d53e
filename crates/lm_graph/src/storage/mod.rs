//! Storage codecs.
//!
//! The graph walker talks to a [`StorageWriter`] and the rehydrator to a
//! [`StorageReader`]. Both describe the same token grammar: optional member
//! names, type tokens, primitives, object markers, and count-prefixed
//! bracketed sections for members and collections. Two codecs implement
//! it: a compact little-endian [`binary`] format and a whitespace separated
//! [`text`] format. Both buffer the payload and emit the stream header,
//! which carries the type and name tables, when the writer finishes.

// -----------------------------------------------------------------------------
// Modules

pub mod binary;
pub mod text;

// -----------------------------------------------------------------------------
// Tokens

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

use crate::error::GraphError;
use crate::info::PrimitiveKind;
use crate::value::Value;

/// The stream format version written in every header.
pub const STREAM_VERSION: u32 = 11;

/// Leading bytes of every stream.
pub const MAGIC: [u8; 4] = *b"SerV";

/// Type ids at or above this value index the prewarm table.
pub const PREWARM_BASE: u16 = 50_000;

const FLAG_VERBOSE: u8 = 0b01;
const FLAG_SPLIT: u8 = 0b10;

const RAW_DECLARED: u16 = 0xFFFF;
const RAW_NULL: u16 = 0xFFFE;

/// The type token written before every entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeToken {
    /// The runtime type equals the declared type.
    Declared,
    Null,
    /// An index into the stream type table, or the prewarm table.
    Id(u16),
}

impl TypeToken {
    #[inline]
    pub fn to_raw(self) -> u16 {
        match self {
            Self::Declared => RAW_DECLARED,
            Self::Null => RAW_NULL,
            Self::Id(id) => id,
        }
    }

    #[inline]
    pub fn from_raw(raw: u16) -> Self {
        match raw {
            RAW_DECLARED => Self::Declared,
            RAW_NULL => Self::Null,
            id => Self::Id(id),
        }
    }
}

/// Distinguishes a new object from a back-reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectMarker {
    /// A new object follows; it takes the next sequential id.
    Fresh,
    /// A new object whose body is a handler payload.
    Custom,
    Reference(u32),
}

/// The stream preamble.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamHeader {
    pub version: u32,
    /// Every entry carries an explicit type tag.
    pub verbose: bool,
    /// The stream is a nested handler payload. Its root is a list wrapper
    /// that takes no object id.
    pub split: bool,
    /// Type paths, indexed by type id.
    pub types: Vec<String>,
    /// Member names, indexed by name id.
    pub names: Vec<String>,
}

impl StreamHeader {
    #[inline]
    pub(crate) fn flags(&self) -> u8 {
        (self.verbose as u8 * FLAG_VERBOSE) | (self.split as u8 * FLAG_SPLIT)
    }

    #[inline]
    pub(crate) fn set_flags(&mut self, flags: u8) -> Result<(), GraphError> {
        if flags & !(FLAG_VERBOSE | FLAG_SPLIT) != 0 {
            return Err(GraphError::corrupt("unknown header flags"));
        }
        self.verbose = flags & FLAG_VERBOSE != 0;
        self.split = flags & FLAG_SPLIT != 0;
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Traits

/// The write half of a codec.
pub trait StorageWriter {
    fn write_name(&mut self, id: u16);

    fn write_type(&mut self, token: TypeToken);

    /// Writes an inline value. Null, enums and objects are rejected.
    fn write_primitive(&mut self, value: &Value) -> Result<(), GraphError>;

    fn write_reference(&mut self, id: u32);

    fn begin_object(&mut self);

    /// Like [`begin_object`](Self::begin_object) for handler payloads.
    fn begin_custom(&mut self);

    fn end_object(&mut self);

    fn begin_fields(&mut self, count: usize);

    fn end_fields(&mut self);

    fn begin_properties(&mut self, count: usize);

    fn end_properties(&mut self);

    fn begin_list(&mut self, count: usize);

    fn end_list(&mut self);

    fn begin_map(&mut self, count: usize);

    fn begin_map_keys(&mut self);

    fn end_map_keys(&mut self);

    fn begin_map_values(&mut self, count: usize);

    fn end_map_values(&mut self);

    fn end_map(&mut self);

    /// Starts an array; the rank is the number of lengths.
    fn begin_array(&mut self, lengths: &[usize]);

    fn end_array(&mut self);

    fn write_blob(&mut self, bytes: &[u8]);

    /// Emits the header followed by the buffered payload.
    fn finish(self: Box<Self>, header: &StreamHeader) -> Vec<u8>;
}

/// The read half of a codec.
///
/// Every method fails with [`GraphError::CorruptStream`] when the input
/// does not hold the expected token.
pub trait StorageReader {
    fn header(&self) -> &StreamHeader;

    fn read_name(&mut self) -> Result<u16, GraphError>;

    fn read_type(&mut self) -> Result<TypeToken, GraphError>;

    fn read_primitive(&mut self, kind: PrimitiveKind) -> Result<Value, GraphError>;

    fn read_marker(&mut self) -> Result<ObjectMarker, GraphError>;

    fn end_object(&mut self) -> Result<(), GraphError>;

    fn begin_fields(&mut self) -> Result<usize, GraphError>;

    fn end_fields(&mut self) -> Result<(), GraphError>;

    fn begin_properties(&mut self) -> Result<usize, GraphError>;

    fn end_properties(&mut self) -> Result<(), GraphError>;

    fn begin_list(&mut self) -> Result<usize, GraphError>;

    fn end_list(&mut self) -> Result<(), GraphError>;

    fn begin_map(&mut self) -> Result<usize, GraphError>;

    fn begin_map_keys(&mut self) -> Result<(), GraphError>;

    fn end_map_keys(&mut self) -> Result<(), GraphError>;

    fn begin_map_values(&mut self) -> Result<usize, GraphError>;

    fn end_map_values(&mut self) -> Result<(), GraphError>;

    fn end_map(&mut self) -> Result<(), GraphError>;

    fn begin_array(&mut self) -> Result<Vec<usize>, GraphError>;

    fn end_array(&mut self) -> Result<(), GraphError>;

    fn read_blob(&mut self) -> Result<Vec<u8>, GraphError>;

    /// Whether payload tokens remain.
    fn has_more(&self) -> bool;

    /// Fails if payload bytes remain unread.
    fn finish(&mut self) -> Result<(), GraphError>;
}

/// Opens a stream of either codec, detected from its leading bytes.
pub fn open_reader(bytes: &[u8]) -> Result<Box<dyn StorageReader + '_>, GraphError> {
    if text::is_text(bytes) {
        Ok(Box::new(text::TextReader::open(bytes)?))
    } else if bytes.starts_with(&MAGIC) {
        Ok(Box::new(binary::BinaryReader::open(bytes)?))
    } else {
        Err(GraphError::corrupt("missing stream header"))
    }
}

// -----------------------------------------------------------------------------
// Packed arrays

/// Packs primitive array elements little-endian.
///
/// Returns `None` if `kind` is not packable or an element has another kind.
pub(crate) fn pack(kind: PrimitiveKind, items: &[Value]) -> Option<Vec<u8>> {
    let width = kind.packed_width()?;
    let mut out = Vec::with_capacity(items.len() * width);
    for item in items {
        match (kind, item) {
            (PrimitiveKind::Bool, Value::Bool(v)) => out.push(*v as u8),
            (PrimitiveKind::Char, Value::Char(v)) => out.extend_from_slice(&(*v as u32).to_le_bytes()),
            (PrimitiveKind::I8, Value::I8(v)) => out.extend_from_slice(&v.to_le_bytes()),
            (PrimitiveKind::I16, Value::I16(v)) => out.extend_from_slice(&v.to_le_bytes()),
            (PrimitiveKind::I32, Value::I32(v)) => out.extend_from_slice(&v.to_le_bytes()),
            (PrimitiveKind::I64, Value::I64(v)) => out.extend_from_slice(&v.to_le_bytes()),
            (PrimitiveKind::U8, Value::U8(v)) => out.push(*v),
            (PrimitiveKind::U16, Value::U16(v)) => out.extend_from_slice(&v.to_le_bytes()),
            (PrimitiveKind::U32, Value::U32(v)) => out.extend_from_slice(&v.to_le_bytes()),
            (PrimitiveKind::U64, Value::U64(v)) => out.extend_from_slice(&v.to_le_bytes()),
            (PrimitiveKind::F32, Value::F32(v)) => out.extend_from_slice(&v.to_le_bytes()),
            (PrimitiveKind::F64, Value::F64(v)) => out.extend_from_slice(&v.to_le_bytes()),
            _ => return None,
        }
    }
    Some(out)
}

/// Reverses [`pack`].
pub(crate) fn unpack(kind: PrimitiveKind, bytes: &[u8], count: usize) -> Result<Vec<Value>, GraphError> {
    let width = kind
        .packed_width()
        .ok_or_else(|| GraphError::corrupt("packed array of unpackable kind"))?;
    if bytes.len() != width * count {
        return Err(GraphError::corrupt("packed array length does not match its shape"));
    }

    macro_rules! chunk {
        ($chunk:ident, $ty:ty) => {
            <$ty>::from_le_bytes(
                $chunk
                    .try_into()
                    .map_err(|_| GraphError::corrupt("misaligned packed array"))?,
            )
        };
    }

    let mut out = Vec::with_capacity(count);
    for chunk in bytes.chunks_exact(width) {
        out.push(match kind {
            PrimitiveKind::Bool => Value::Bool(chunk[0] != 0),
            PrimitiveKind::Char => Value::Char(
                char::from_u32(chunk!(chunk, u32))
                    .ok_or_else(|| GraphError::corrupt("invalid char in packed array"))?,
            ),
            PrimitiveKind::I8 => Value::I8(chunk!(chunk, i8)),
            PrimitiveKind::I16 => Value::I16(chunk!(chunk, i16)),
            PrimitiveKind::I32 => Value::I32(chunk!(chunk, i32)),
            PrimitiveKind::I64 => Value::I64(chunk!(chunk, i64)),
            PrimitiveKind::U8 => Value::U8(chunk[0]),
            PrimitiveKind::U16 => Value::U16(chunk!(chunk, u16)),
            PrimitiveKind::U32 => Value::U32(chunk!(chunk, u32)),
            PrimitiveKind::U64 => Value::U64(chunk!(chunk, u64)),
            PrimitiveKind::F32 => Value::F32(chunk!(chunk, f32)),
            PrimitiveKind::F64 => Value::F64(chunk!(chunk, f64)),
            _ => return Err(GraphError::corrupt("packed array of unpackable kind")),
        });
    }
    Ok(out)
}

// Split used by both codecs for date-time and time-span payloads.
pub(crate) fn split_delta(delta: chrono::TimeDelta) -> (i64, i32) {
    (delta.num_seconds(), delta.subsec_nanos())
}

pub(crate) fn join_delta(secs: i64, nanos: i32) -> Option<chrono::TimeDelta> {
    chrono::TimeDelta::try_seconds(secs)?.checked_add(&chrono::TimeDelta::nanoseconds(nanos as i64))
}
