//! The compact little-endian codec.
//!
//! Layout: the magic bytes, a `u32` version, a flags byte, the type and
//! name tables as `u32` counts of `u32`-length-prefixed UTF-8 strings, a
//! `u64` payload length, then the payload. Sections in the payload are
//! opened and closed with one-byte tags so a reader can detect drift.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{
    MAGIC, ObjectMarker, STREAM_VERSION, StorageReader, StorageWriter, StreamHeader, TypeToken,
};
use super::{join_delta, split_delta};
use crate::error::GraphError;
use crate::info::PrimitiveKind;
use crate::value::{Decimal, Value};

// -----------------------------------------------------------------------------
// Tags

const FRESH: u8 = 0x01;
const REFERENCE: u8 = 0x02;
const END_OBJECT: u8 = 0x03;
const CUSTOM: u8 = 0x04;
const FIELDS: u8 = 0x10;
const END_FIELDS: u8 = 0x11;
const PROPERTIES: u8 = 0x12;
const END_PROPERTIES: u8 = 0x13;
const LIST: u8 = 0x14;
const END_LIST: u8 = 0x15;
const MAP: u8 = 0x16;
const MAP_KEYS: u8 = 0x17;
const END_MAP_KEYS: u8 = 0x18;
const MAP_VALUES: u8 = 0x19;
const END_MAP_VALUES: u8 = 0x1A;
const END_MAP: u8 = 0x1B;
const ARRAY: u8 = 0x1C;
const END_ARRAY: u8 = 0x1D;

// -----------------------------------------------------------------------------
// BinaryWriter

/// Writes the binary codec.
#[derive(Debug, Default)]
pub struct BinaryWriter {
    payload: Vec<u8>,
}

impl BinaryWriter {
    #[inline]
    pub const fn new() -> Self {
        Self {
            payload: Vec::new(),
        }
    }

    #[inline]
    fn count(&mut self, tag: u8, count: usize) {
        self.payload.push(tag);
        self.payload.extend_from_slice(&(count as u32).to_le_bytes());
    }

    fn string(out: &mut Vec<u8>, s: &str) {
        out.extend_from_slice(&(s.len() as u32).to_le_bytes());
        out.extend_from_slice(s.as_bytes());
    }
}

impl StorageWriter for BinaryWriter {
    fn write_name(&mut self, id: u16) {
        self.payload.extend_from_slice(&id.to_le_bytes());
    }

    fn write_type(&mut self, token: TypeToken) {
        self.payload.extend_from_slice(&token.to_raw().to_le_bytes());
    }

    fn write_primitive(&mut self, value: &Value) -> Result<(), GraphError> {
        let out = &mut self.payload;
        match value {
            Value::Bool(v) => out.push(*v as u8),
            Value::Char(v) => out.extend_from_slice(&(*v as u32).to_le_bytes()),
            Value::I8(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::I16(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::I32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::I64(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::U8(v) => out.push(*v),
            Value::U16(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::U32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::U64(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::F32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::F64(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::Decimal(v) => {
                out.extend_from_slice(&v.mantissa().to_le_bytes());
                out.push(v.scale());
            }
            Value::String(v) => Self::string(out, v),
            Value::Guid(v) => out.extend_from_slice(v.as_bytes()),
            Value::DateTime(v) => {
                out.extend_from_slice(&v.timestamp().to_le_bytes());
                out.extend_from_slice(&v.timestamp_subsec_nanos().to_le_bytes());
            }
            Value::TimeSpan(v) => {
                let (secs, nanos) = split_delta(*v);
                out.extend_from_slice(&secs.to_le_bytes());
                out.extend_from_slice(&nanos.to_le_bytes());
            }
            Value::Null | Value::Enum(_) | Value::Object(_) => {
                return Err(GraphError::unsupported("not an inline primitive"));
            }
        }
        Ok(())
    }

    fn write_reference(&mut self, id: u32) {
        self.payload.push(REFERENCE);
        self.payload.extend_from_slice(&id.to_le_bytes());
    }

    fn begin_object(&mut self) {
        self.payload.push(FRESH);
    }

    fn begin_custom(&mut self) {
        self.payload.push(CUSTOM);
    }

    fn end_object(&mut self) {
        self.payload.push(END_OBJECT);
    }

    fn begin_fields(&mut self, count: usize) {
        self.count(FIELDS, count);
    }

    fn end_fields(&mut self) {
        self.payload.push(END_FIELDS);
    }

    fn begin_properties(&mut self, count: usize) {
        self.count(PROPERTIES, count);
    }

    fn end_properties(&mut self) {
        self.payload.push(END_PROPERTIES);
    }

    fn begin_list(&mut self, count: usize) {
        self.count(LIST, count);
    }

    fn end_list(&mut self) {
        self.payload.push(END_LIST);
    }

    fn begin_map(&mut self, count: usize) {
        self.count(MAP, count);
    }

    fn begin_map_keys(&mut self) {
        self.payload.push(MAP_KEYS);
    }

    fn end_map_keys(&mut self) {
        self.payload.push(END_MAP_KEYS);
    }

    fn begin_map_values(&mut self, count: usize) {
        self.count(MAP_VALUES, count);
    }

    fn end_map_values(&mut self) {
        self.payload.push(END_MAP_VALUES);
    }

    fn end_map(&mut self) {
        self.payload.push(END_MAP);
    }

    fn begin_array(&mut self, lengths: &[usize]) {
        self.payload.push(ARRAY);
        self.payload.push(lengths.len() as u8);
        for len in lengths {
            self.payload.extend_from_slice(&(*len as u32).to_le_bytes());
        }
    }

    fn end_array(&mut self) {
        self.payload.push(END_ARRAY);
    }

    fn write_blob(&mut self, bytes: &[u8]) {
        self.payload.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        self.payload.extend_from_slice(bytes);
    }

    fn finish(self: Box<Self>, header: &StreamHeader) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.payload.len() + 64);
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&header.version.to_le_bytes());
        out.push(header.flags());
        for table in [&header.types, &header.names] {
            out.extend_from_slice(&(table.len() as u32).to_le_bytes());
            for entry in table {
                Self::string(&mut out, entry);
            }
        }
        out.extend_from_slice(&(self.payload.len() as u64).to_le_bytes());
        out.extend_from_slice(&self.payload);
        out
    }
}

// -----------------------------------------------------------------------------
// Cursor

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], GraphError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| GraphError::corrupt("unexpected end of stream"))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], GraphError> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N)?);
        Ok(buf)
    }

    fn u8(&mut self) -> Result<u8, GraphError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, GraphError> {
        self.array().map(u16::from_le_bytes)
    }

    fn u32(&mut self) -> Result<u32, GraphError> {
        self.array().map(u32::from_le_bytes)
    }

    fn u64(&mut self) -> Result<u64, GraphError> {
        self.array().map(u64::from_le_bytes)
    }

    fn count(&mut self) -> Result<usize, GraphError> {
        let len = self.u32()? as usize;
        // Every counted item occupies at least one byte.
        if len > self.bytes.len() - self.pos {
            return Err(GraphError::corrupt("count exceeds remaining stream"));
        }
        Ok(len)
    }

    fn string(&mut self) -> Result<String, GraphError> {
        let len = self.count()?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| GraphError::corrupt("invalid utf-8 string"))
    }

    fn tag(&mut self, expected: u8, what: &'static str) -> Result<(), GraphError> {
        if self.u8()? == expected {
            Ok(())
        } else {
            Err(GraphError::corrupt(what))
        }
    }
}

// -----------------------------------------------------------------------------
// BinaryReader

/// Reads the binary codec.
pub struct BinaryReader<'a> {
    header: StreamHeader,
    cursor: Cursor<'a>,
}

impl<'a> BinaryReader<'a> {
    /// Parses the header and positions the reader at the payload.
    pub fn open(bytes: &'a [u8]) -> Result<Self, GraphError> {
        let mut cursor = Cursor { bytes, pos: 0 };
        if cursor.array::<4>()? != MAGIC {
            return Err(GraphError::corrupt("missing stream header"));
        }
        let version = cursor.u32()?;
        if version != STREAM_VERSION {
            return Err(GraphError::corrupt(alloc::format!(
                "unsupported stream version {version}"
            )));
        }
        let mut header = StreamHeader {
            version,
            ..StreamHeader::default()
        };
        header.set_flags(cursor.u8()?)?;
        let mut tables = [Vec::new(), Vec::new()];
        for table in &mut tables {
            let count = cursor.count()?;
            table.reserve(count);
            for _ in 0..count {
                table.push(cursor.string()?);
            }
        }
        [header.types, header.names] = tables;

        let payload_len = usize::try_from(cursor.u64()?)
            .map_err(|_| GraphError::corrupt("payload length overflows"))?;
        let payload = cursor.take(payload_len)?;
        if cursor.pos != bytes.len() {
            return Err(GraphError::corrupt("trailing bytes after payload"));
        }

        Ok(Self {
            header,
            cursor: Cursor {
                bytes: payload,
                pos: 0,
            },
        })
    }
}

impl StorageReader for BinaryReader<'_> {
    fn header(&self) -> &StreamHeader {
        &self.header
    }

    fn read_name(&mut self) -> Result<u16, GraphError> {
        self.cursor.u16()
    }

    fn read_type(&mut self) -> Result<TypeToken, GraphError> {
        self.cursor.u16().map(TypeToken::from_raw)
    }

    fn read_primitive(&mut self, kind: PrimitiveKind) -> Result<Value, GraphError> {
        let c = &mut self.cursor;
        Ok(match kind {
            PrimitiveKind::Bool => match c.u8()? {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                _ => return Err(GraphError::corrupt("invalid bool")),
            },
            PrimitiveKind::Char => Value::Char(
                char::from_u32(c.u32()?).ok_or_else(|| GraphError::corrupt("invalid char"))?,
            ),
            PrimitiveKind::I8 => Value::I8(c.u8()? as i8),
            PrimitiveKind::I16 => Value::I16(c.array().map(i16::from_le_bytes)?),
            PrimitiveKind::I32 => Value::I32(c.array().map(i32::from_le_bytes)?),
            PrimitiveKind::I64 => Value::I64(c.array().map(i64::from_le_bytes)?),
            PrimitiveKind::U8 => Value::U8(c.u8()?),
            PrimitiveKind::U16 => Value::U16(c.u16()?),
            PrimitiveKind::U32 => Value::U32(c.u32()?),
            PrimitiveKind::U64 => Value::U64(c.u64()?),
            PrimitiveKind::F32 => Value::F32(c.array().map(f32::from_le_bytes)?),
            PrimitiveKind::F64 => Value::F64(c.array().map(f64::from_le_bytes)?),
            PrimitiveKind::Decimal => {
                let mantissa = c.array().map(i128::from_le_bytes)?;
                Value::Decimal(Decimal::new(mantissa, c.u8()?))
            }
            PrimitiveKind::String => Value::String(c.string()?),
            PrimitiveKind::Guid => Value::Guid(Uuid::from_bytes(c.array()?)),
            PrimitiveKind::DateTime => {
                let secs = c.array().map(i64::from_le_bytes)?;
                let nanos = c.u32()?;
                Value::DateTime(
                    DateTime::<Utc>::from_timestamp(secs, nanos)
                        .ok_or_else(|| GraphError::corrupt("date-time out of range"))?,
                )
            }
            PrimitiveKind::TimeSpan => {
                let secs = c.array().map(i64::from_le_bytes)?;
                let nanos = c.array().map(i32::from_le_bytes)?;
                Value::TimeSpan(
                    join_delta(secs, nanos)
                        .ok_or_else(|| GraphError::corrupt("time span out of range"))?,
                )
            }
        })
    }

    fn read_marker(&mut self) -> Result<ObjectMarker, GraphError> {
        match self.cursor.u8()? {
            FRESH => Ok(ObjectMarker::Fresh),
            CUSTOM => Ok(ObjectMarker::Custom),
            REFERENCE => Ok(ObjectMarker::Reference(self.cursor.u32()?)),
            _ => Err(GraphError::corrupt("expected object marker")),
        }
    }

    fn end_object(&mut self) -> Result<(), GraphError> {
        self.cursor.tag(END_OBJECT, "expected end of object")
    }

    fn begin_fields(&mut self) -> Result<usize, GraphError> {
        self.cursor.tag(FIELDS, "expected fields")?;
        self.cursor.count()
    }

    fn end_fields(&mut self) -> Result<(), GraphError> {
        self.cursor.tag(END_FIELDS, "expected end of fields")
    }

    fn begin_properties(&mut self) -> Result<usize, GraphError> {
        self.cursor.tag(PROPERTIES, "expected properties")?;
        self.cursor.count()
    }

    fn end_properties(&mut self) -> Result<(), GraphError> {
        self.cursor.tag(END_PROPERTIES, "expected end of properties")
    }

    fn begin_list(&mut self) -> Result<usize, GraphError> {
        self.cursor.tag(LIST, "expected list")?;
        self.cursor.count()
    }

    fn end_list(&mut self) -> Result<(), GraphError> {
        self.cursor.tag(END_LIST, "expected end of list")
    }

    fn begin_map(&mut self) -> Result<usize, GraphError> {
        self.cursor.tag(MAP, "expected map")?;
        self.cursor.count()
    }

    fn begin_map_keys(&mut self) -> Result<(), GraphError> {
        self.cursor.tag(MAP_KEYS, "expected map keys")
    }

    fn end_map_keys(&mut self) -> Result<(), GraphError> {
        self.cursor.tag(END_MAP_KEYS, "expected end of map keys")
    }

    fn begin_map_values(&mut self) -> Result<usize, GraphError> {
        self.cursor.tag(MAP_VALUES, "expected map values")?;
        self.cursor.count()
    }

    fn end_map_values(&mut self) -> Result<(), GraphError> {
        self.cursor.tag(END_MAP_VALUES, "expected end of map values")
    }

    fn end_map(&mut self) -> Result<(), GraphError> {
        self.cursor.tag(END_MAP, "expected end of map")
    }

    fn begin_array(&mut self) -> Result<Vec<usize>, GraphError> {
        self.cursor.tag(ARRAY, "expected array")?;
        let rank = self.cursor.u8()?;
        if rank == 0 {
            return Err(GraphError::corrupt("array of rank zero"));
        }
        (0..rank).map(|_| self.cursor.u32().map(|len| len as usize)).collect()
    }

    fn end_array(&mut self) -> Result<(), GraphError> {
        self.cursor.tag(END_ARRAY, "expected end of array")
    }

    fn read_blob(&mut self) -> Result<Vec<u8>, GraphError> {
        let len = self.cursor.count()?;
        self.cursor.take(len).map(<[u8]>::to_vec)
    }

    fn has_more(&self) -> bool {
        self.cursor.pos < self.cursor.bytes.len()
    }

    fn finish(&mut self) -> Result<(), GraphError> {
        if !self.has_more() {
            Ok(())
        } else {
            Err(GraphError::corrupt("unread bytes after root"))
        }
    }
}
