//! The human-readable codec.
//!
//! A text stream starts with `SerV <version> <flags>` followed by the
//! `types` and `names` tables as counted lists of quoted strings and the
//! word `payload`. Payload tokens are separated by single spaces:
//!
//! | token            | meaning                                  |
//! |------------------|------------------------------------------|
//! | `#3`             | member name id                           |
//! | `@d` `@n` `@7`   | declared type, null, type id             |
//! | `{` `{*` `&4`    | fresh object, handler object, reference  |
//! | `}`              | end of object                            |
//! | `F2 … /F`        | fields                                   |
//! | `P2 … /P`        | properties                               |
//! | `L2 … /L`        | list items                               |
//! | `M2 K … /K V2 … /V /M` | map keys then values               |
//! | `A2,3 … /A`      | array with lengths                       |
//! | `x0aff`          | blob                                     |
//!
//! Strings are double quoted. Decimals are written `mantissa_scale`,
//! date-times and time spans as `seconds.nanoseconds` with the nanosecond
//! part always non-negative.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::{self, Write};
use core::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

use super::{ObjectMarker, STREAM_VERSION, StorageReader, StorageWriter, StreamHeader, TypeToken};
use super::{join_delta, split_delta};
use crate::error::GraphError;
use crate::info::PrimitiveKind;
use crate::value::{Decimal, Value};

const TEXT_MAGIC: &[u8] = b"SerV ";

/// Returns `true` if `bytes` begin like a text stream.
#[inline]
pub fn is_text(bytes: &[u8]) -> bool {
    bytes.starts_with(TEXT_MAGIC)
}

fn floor_delta(delta: TimeDelta) -> (i64, u32) {
    let (secs, nanos) = split_delta(delta);
    if nanos < 0 {
        (secs - 1, (nanos + 1_000_000_000) as u32)
    } else {
        (secs, nanos as u32)
    }
}

fn quote(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{{{:x}}}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

// -----------------------------------------------------------------------------
// TextWriter

/// Writes the text codec.
#[derive(Debug, Default)]
pub struct TextWriter {
    payload: String,
}

impl TextWriter {
    #[inline]
    pub const fn new() -> Self {
        Self {
            payload: String::new(),
        }
    }

    fn separate(&mut self) {
        if !self.payload.is_empty() {
            self.payload.push(' ');
        }
    }

    fn token(&mut self, args: fmt::Arguments<'_>) {
        self.separate();
        let _ = self.payload.write_fmt(args);
    }
}

impl StorageWriter for TextWriter {
    fn write_name(&mut self, id: u16) {
        self.token(format_args!("#{id}"));
    }

    fn write_type(&mut self, token: TypeToken) {
        match token {
            TypeToken::Declared => self.token(format_args!("@d")),
            TypeToken::Null => self.token(format_args!("@n")),
            TypeToken::Id(id) => self.token(format_args!("@{id}")),
        }
    }

    fn write_primitive(&mut self, value: &Value) -> Result<(), GraphError> {
        match value {
            Value::Bool(v) => self.token(format_args!("{v}")),
            Value::Char(v) => {
                self.separate();
                let mut buf = [0u8; 4];
                quote(&mut self.payload, v.encode_utf8(&mut buf));
            }
            Value::I8(v) => self.token(format_args!("{v}")),
            Value::I16(v) => self.token(format_args!("{v}")),
            Value::I32(v) => self.token(format_args!("{v}")),
            Value::I64(v) => self.token(format_args!("{v}")),
            Value::U8(v) => self.token(format_args!("{v}")),
            Value::U16(v) => self.token(format_args!("{v}")),
            Value::U32(v) => self.token(format_args!("{v}")),
            Value::U64(v) => self.token(format_args!("{v}")),
            Value::F32(v) => self.token(format_args!("{v:?}")),
            Value::F64(v) => self.token(format_args!("{v:?}")),
            Value::Decimal(v) => self.token(format_args!("{}_{}", v.mantissa(), v.scale())),
            Value::String(v) => {
                self.separate();
                quote(&mut self.payload, v);
            }
            Value::Guid(v) => self.token(format_args!("{}", v.hyphenated())),
            Value::DateTime(v) => {
                self.token(format_args!("{}.{:09}", v.timestamp(), v.timestamp_subsec_nanos()));
            }
            Value::TimeSpan(v) => {
                let (secs, nanos) = floor_delta(*v);
                self.token(format_args!("{secs}.{nanos:09}"));
            }
            Value::Null | Value::Enum(_) | Value::Object(_) => {
                return Err(GraphError::unsupported("not an inline primitive"));
            }
        }
        Ok(())
    }

    fn write_reference(&mut self, id: u32) {
        self.token(format_args!("&{id}"));
    }

    fn begin_object(&mut self) {
        self.token(format_args!("{{"));
    }

    fn begin_custom(&mut self) {
        self.token(format_args!("{{*"));
    }

    fn end_object(&mut self) {
        self.token(format_args!("}}"));
    }

    fn begin_fields(&mut self, count: usize) {
        self.token(format_args!("F{count}"));
    }

    fn end_fields(&mut self) {
        self.token(format_args!("/F"));
    }

    fn begin_properties(&mut self, count: usize) {
        self.token(format_args!("P{count}"));
    }

    fn end_properties(&mut self) {
        self.token(format_args!("/P"));
    }

    fn begin_list(&mut self, count: usize) {
        self.token(format_args!("L{count}"));
    }

    fn end_list(&mut self) {
        self.token(format_args!("/L"));
    }

    fn begin_map(&mut self, count: usize) {
        self.token(format_args!("M{count}"));
    }

    fn begin_map_keys(&mut self) {
        self.token(format_args!("K"));
    }

    fn end_map_keys(&mut self) {
        self.token(format_args!("/K"));
    }

    fn begin_map_values(&mut self, count: usize) {
        self.token(format_args!("V{count}"));
    }

    fn end_map_values(&mut self) {
        self.token(format_args!("/V"));
    }

    fn end_map(&mut self) {
        self.token(format_args!("/M"));
    }

    fn begin_array(&mut self, lengths: &[usize]) {
        self.token(format_args!("A"));
        for (i, len) in lengths.iter().enumerate() {
            if i > 0 {
                self.payload.push(',');
            }
            let _ = write!(self.payload, "{len}");
        }
    }

    fn end_array(&mut self) {
        self.token(format_args!("/A"));
    }

    fn write_blob(&mut self, bytes: &[u8]) {
        self.token(format_args!("x"));
        for byte in bytes {
            let _ = write!(self.payload, "{byte:02x}");
        }
    }

    fn finish(self: Box<Self>, header: &StreamHeader) -> Vec<u8> {
        let mut out = String::with_capacity(self.payload.len() + 64);
        let _ = write!(out, "SerV {} {}", header.version, header.flags());
        for (label, table) in [("types", &header.types), ("names", &header.names)] {
            let _ = write!(out, "\n{label} {}", table.len());
            for entry in table {
                out.push(' ');
                quote(&mut out, entry);
            }
        }
        out.push_str("\npayload\n");
        out.push_str(&self.payload);
        out.push('\n');
        out.into_bytes()
    }
}

// -----------------------------------------------------------------------------
// TextReader

enum Token<'a> {
    Word(&'a str),
    Quoted(String),
}

/// Reads the text codec.
pub struct TextReader<'a> {
    header: StreamHeader,
    src: &'a str,
    pos: usize,
}

impl<'a> TextReader<'a> {
    /// Parses the header and positions the reader at the payload.
    pub fn open(bytes: &'a [u8]) -> Result<Self, GraphError> {
        let src =
            core::str::from_utf8(bytes).map_err(|_| GraphError::corrupt("text stream is not utf-8"))?;
        let mut reader = Self {
            header: StreamHeader::default(),
            src,
            pos: 0,
        };

        reader.exact("SerV", "missing stream header")?;
        let version: u32 = reader.parsed("stream version")?;
        if version != STREAM_VERSION {
            return Err(GraphError::corrupt(alloc::format!(
                "unsupported stream version {version}"
            )));
        }
        let flags: u8 = reader.parsed("header flags")?;
        reader.header.version = version;
        reader.header.set_flags(flags)?;
        reader.exact("types", "expected type table")?;
        reader.header.types = reader.table()?;
        reader.exact("names", "expected name table")?;
        reader.header.names = reader.table()?;
        reader.exact("payload", "expected payload")?;
        Ok(reader)
    }

    fn table(&mut self) -> Result<Vec<String>, GraphError> {
        let count: usize = self.parsed("table length")?;
        let mut table = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            table.push(self.quoted("table entry")?);
        }
        Ok(table)
    }

    fn next(&mut self) -> Result<Token<'a>, GraphError> {
        let rest = &self.src[self.pos..];
        let trimmed = rest.trim_start();
        self.pos += rest.len() - trimmed.len();
        if trimmed.is_empty() {
            return Err(GraphError::corrupt("unexpected end of stream"));
        }
        if trimmed.starts_with('"') {
            return self.unquote().map(Token::Quoted);
        }
        let end = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
        self.pos += end;
        Ok(Token::Word(&trimmed[..end]))
    }

    fn unquote(&mut self) -> Result<String, GraphError> {
        let body = &self.src[self.pos + 1..];
        let mut out = String::new();
        let mut chars = body.char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos += i + 2;
                    return Ok(out);
                }
                '\\' => match chars.next().map(|(_, c)| c) {
                    Some('"') => out.push('"'),
                    Some('\\') => out.push('\\'),
                    Some('n') => out.push('\n'),
                    Some('r') => out.push('\r'),
                    Some('t') => out.push('\t'),
                    Some('u') => {
                        let rest = &body[i + 2..];
                        let close = rest
                            .find('}')
                            .filter(|_| rest.starts_with('{'))
                            .ok_or_else(|| GraphError::corrupt("malformed unicode escape"))?;
                        let c = u32::from_str_radix(&rest[1..close], 16)
                            .ok()
                            .and_then(char::from_u32)
                            .ok_or_else(|| GraphError::corrupt("malformed unicode escape"))?;
                        out.push(c);
                        for _ in 0..=close {
                            chars.next();
                        }
                    }
                    _ => return Err(GraphError::corrupt("unknown string escape")),
                },
                c => out.push(c),
            }
        }
        Err(GraphError::corrupt("unterminated string"))
    }

    fn word(&mut self, what: &'static str) -> Result<&'a str, GraphError> {
        match self.next()? {
            Token::Word(word) => Ok(word),
            Token::Quoted(_) => Err(GraphError::corrupt(what)),
        }
    }

    fn quoted(&mut self, what: &'static str) -> Result<String, GraphError> {
        match self.next()? {
            Token::Quoted(s) => Ok(s),
            Token::Word(_) => Err(GraphError::corrupt(what)),
        }
    }

    fn exact(&mut self, lit: &str, what: &'static str) -> Result<(), GraphError> {
        if self.word(what)? == lit {
            Ok(())
        } else {
            Err(GraphError::corrupt(what))
        }
    }

    fn prefixed(&mut self, prefix: char, what: &'static str) -> Result<&'a str, GraphError> {
        self.word(what)?
            .strip_prefix(prefix)
            .ok_or_else(|| GraphError::corrupt(what))
    }

    fn parsed<T: FromStr>(&mut self, what: &'static str) -> Result<T, GraphError> {
        parse(self.word(what)?, what)
    }

    fn count(&mut self, prefix: char, what: &'static str) -> Result<usize, GraphError> {
        let count: usize = parse(self.prefixed(prefix, what)?, what)?;
        // Every counted item needs at least one more token.
        if count > self.src.len() - self.pos {
            return Err(GraphError::corrupt("count exceeds remaining stream"));
        }
        Ok(count)
    }

    fn seconds(&mut self, what: &'static str) -> Result<(i64, u32), GraphError> {
        let word = self.word(what)?;
        let (secs, nanos) = word.split_once('.').ok_or_else(|| GraphError::corrupt(what))?;
        let nanos: u32 = parse(nanos, what)?;
        if nanos >= 1_000_000_000 {
            return Err(GraphError::corrupt(what));
        }
        Ok((parse(secs, what)?, nanos))
    }
}

fn parse<T: FromStr>(word: &str, what: &'static str) -> Result<T, GraphError> {
    word.parse().map_err(|_| GraphError::corrupt(what))
}

impl StorageReader for TextReader<'_> {
    fn header(&self) -> &StreamHeader {
        &self.header
    }

    fn read_name(&mut self) -> Result<u16, GraphError> {
        parse(self.prefixed('#', "expected member name")?, "member name id")
    }

    fn read_type(&mut self) -> Result<TypeToken, GraphError> {
        match self.prefixed('@', "expected type token")? {
            "d" => Ok(TypeToken::Declared),
            "n" => Ok(TypeToken::Null),
            id => parse(id, "type id").map(TypeToken::Id),
        }
    }

    fn read_primitive(&mut self, kind: PrimitiveKind) -> Result<Value, GraphError> {
        const WHAT: &str = "malformed primitive";
        Ok(match kind {
            PrimitiveKind::Bool => Value::Bool(self.parsed(WHAT)?),
            PrimitiveKind::Char => {
                let s = self.quoted(WHAT)?;
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Value::Char(c),
                    _ => return Err(GraphError::corrupt("char literal of wrong length")),
                }
            }
            PrimitiveKind::I8 => Value::I8(self.parsed(WHAT)?),
            PrimitiveKind::I16 => Value::I16(self.parsed(WHAT)?),
            PrimitiveKind::I32 => Value::I32(self.parsed(WHAT)?),
            PrimitiveKind::I64 => Value::I64(self.parsed(WHAT)?),
            PrimitiveKind::U8 => Value::U8(self.parsed(WHAT)?),
            PrimitiveKind::U16 => Value::U16(self.parsed(WHAT)?),
            PrimitiveKind::U32 => Value::U32(self.parsed(WHAT)?),
            PrimitiveKind::U64 => Value::U64(self.parsed(WHAT)?),
            PrimitiveKind::F32 => Value::F32(self.parsed(WHAT)?),
            PrimitiveKind::F64 => Value::F64(self.parsed(WHAT)?),
            PrimitiveKind::Decimal => {
                let word = self.word(WHAT)?;
                let (mantissa, scale) = word.rsplit_once('_').ok_or_else(|| GraphError::corrupt(WHAT))?;
                Value::Decimal(Decimal::new(parse(mantissa, WHAT)?, parse(scale, WHAT)?))
            }
            PrimitiveKind::String => Value::String(self.quoted(WHAT)?),
            PrimitiveKind::Guid => Value::Guid(
                Uuid::parse_str(self.word(WHAT)?).map_err(|_| GraphError::corrupt(WHAT))?,
            ),
            PrimitiveKind::DateTime => {
                let (secs, nanos) = self.seconds(WHAT)?;
                Value::DateTime(
                    DateTime::<Utc>::from_timestamp(secs, nanos)
                        .ok_or_else(|| GraphError::corrupt("date-time out of range"))?,
                )
            }
            PrimitiveKind::TimeSpan => {
                let (secs, nanos) = self.seconds(WHAT)?;
                Value::TimeSpan(
                    join_delta(secs, nanos as i32)
                        .ok_or_else(|| GraphError::corrupt("time span out of range"))?,
                )
            }
        })
    }

    fn read_marker(&mut self) -> Result<ObjectMarker, GraphError> {
        let word = self.word("expected object marker")?;
        match word {
            "{" => return Ok(ObjectMarker::Fresh),
            "{*" => return Ok(ObjectMarker::Custom),
            _ => {}
        }
        let id = word
            .strip_prefix('&')
            .ok_or_else(|| GraphError::corrupt("expected object marker"))?;
        parse(id, "reference id").map(ObjectMarker::Reference)
    }

    fn end_object(&mut self) -> Result<(), GraphError> {
        self.exact("}", "expected end of object")
    }

    fn begin_fields(&mut self) -> Result<usize, GraphError> {
        self.count('F', "expected fields")
    }

    fn end_fields(&mut self) -> Result<(), GraphError> {
        self.exact("/F", "expected end of fields")
    }

    fn begin_properties(&mut self) -> Result<usize, GraphError> {
        self.count('P', "expected properties")
    }

    fn end_properties(&mut self) -> Result<(), GraphError> {
        self.exact("/P", "expected end of properties")
    }

    fn begin_list(&mut self) -> Result<usize, GraphError> {
        self.count('L', "expected list")
    }

    fn end_list(&mut self) -> Result<(), GraphError> {
        self.exact("/L", "expected end of list")
    }

    fn begin_map(&mut self) -> Result<usize, GraphError> {
        self.count('M', "expected map")
    }

    fn begin_map_keys(&mut self) -> Result<(), GraphError> {
        self.exact("K", "expected map keys")
    }

    fn end_map_keys(&mut self) -> Result<(), GraphError> {
        self.exact("/K", "expected end of map keys")
    }

    fn begin_map_values(&mut self) -> Result<usize, GraphError> {
        self.count('V', "expected map values")
    }

    fn end_map_values(&mut self) -> Result<(), GraphError> {
        self.exact("/V", "expected end of map values")
    }

    fn end_map(&mut self) -> Result<(), GraphError> {
        self.exact("/M", "expected end of map")
    }

    fn begin_array(&mut self) -> Result<Vec<usize>, GraphError> {
        let lengths = self.prefixed('A', "expected array")?;
        if lengths.is_empty() {
            return Err(GraphError::corrupt("array of rank zero"));
        }
        lengths
            .split(',')
            .map(|len| parse(len, "array length"))
            .collect()
    }

    fn end_array(&mut self) -> Result<(), GraphError> {
        self.exact("/A", "expected end of array")
    }

    fn read_blob(&mut self) -> Result<Vec<u8>, GraphError> {
        let hex = self.prefixed('x', "expected blob")?;
        if hex.len() % 2 != 0 {
            return Err(GraphError::corrupt("odd blob length"));
        }
        (0..hex.len())
            .step_by(2)
            .map(|i| {
                hex.get(i..i + 2)
                    .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                    .ok_or_else(|| GraphError::corrupt("malformed blob"))
            })
            .collect()
    }

    fn has_more(&self) -> bool {
        !self.src[self.pos..].trim().is_empty()
    }

    fn finish(&mut self) -> Result<(), GraphError> {
        if !self.has_more() {
            Ok(())
        } else {
            Err(GraphError::corrupt("unread tokens after root"))
        }
    }
}

impl fmt::Debug for TextReader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextReader")
            .field("header", &self.header)
            .field("pos", &self.pos)
            .finish()
    }
}
