//! Binary type codec.
//!
//! Every value is written as a one-byte [`TypeCode`] followed by its
//! little-endian body. Decoding is total over the closed type code set: an
//! unknown code is an error carrying the offending byte and its position.

use crate::error::ProtocolError;
use crate::object;
use crate::types::{CollectionKind, MapKind, TypeCode, TypeHint};
use crate::value::{ComplexObject, Value};
use crate::MAX_NESTING_DEPTH;
use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use std::borrow::Cow;
use uuid::Uuid;

/// Component type id written in front of `Object[]` arrays.
const OBJECT_ARRAY_COMPONENT: i32 = -1;

/// Encodes a value with its type code.
pub fn encode(value: &Value) -> Result<BytesMut, ProtocolError> {
    encode_hinted(value, None)
}

/// Encodes a value, first re-tagging it according to `hint`.
pub fn encode_hinted(value: &Value, hint: Option<&TypeHint>) -> Result<BytesMut, ProtocolError> {
    let mut writer = BinaryWriter::new();
    writer.write_hinted(value, hint)?;
    Ok(writer.into_inner())
}

/// Decodes one value from the front of `buf`, returning it with the number of
/// bytes consumed.
pub fn decode(buf: &[u8]) -> Result<(Value, usize), ProtocolError> {
    let mut reader = BinaryReader::new(buf);
    let value = reader.read_value()?;
    Ok((value, reader.position()))
}

/// Little-endian writer over a growable buffer.
#[derive(Debug, Default)]
pub struct BinaryWriter {
    buf: BytesMut,
}

impl BinaryWriter {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(64),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> BytesMut {
        self.buf
    }

    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub fn write_i8(&mut self, v: i8) {
        self.buf.put_i8(v);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.buf.put_u8(u8::from(v));
    }

    pub fn write_i16(&mut self, v: i16) {
        self.buf.put_i16_le(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.put_u16_le(v);
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.put_i32_le(v);
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.put_i64_le(v);
    }

    pub fn write_f32(&mut self, v: f32) {
        self.buf.put_f32_le(v);
    }

    pub fn write_f64(&mut self, v: f64) {
        self.buf.put_f64_le(v);
    }

    pub fn write_slice(&mut self, v: &[u8]) {
        self.buf.put_slice(v);
    }

    /// Writes a non-negative int32 length or count.
    pub fn write_len(&mut self, len: usize) -> Result<(), ProtocolError> {
        let len = i32::try_from(len).map_err(|_| ProtocolError::RequestTooLarge {
            size: len,
            max: i32::MAX as usize,
        })?;
        self.write_i32(len);
        Ok(())
    }

    /// Writes a string object, `[9][len][utf-8]`.
    pub fn write_string(&mut self, s: &str) -> Result<(), ProtocolError> {
        self.write_u8(TypeCode::String.as_u8());
        self.write_len(s.len())?;
        self.write_slice(s.as_bytes());
        Ok(())
    }

    /// Writes a string object, or the null object for `None`.
    pub fn write_opt_string(&mut self, s: Option<&str>) -> Result<(), ProtocolError> {
        match s {
            Some(s) => self.write_string(s),
            None => {
                self.write_null();
                Ok(())
            }
        }
    }

    pub fn write_null(&mut self) {
        self.write_u8(TypeCode::Null.as_u8());
    }

    /// Writes `value` after applying the optional type hint.
    pub fn write_hinted(
        &mut self,
        value: &Value,
        hint: Option<&TypeHint>,
    ) -> Result<(), ProtocolError> {
        match hint {
            Some(hint) => {
                let value = apply_hint(value, hint)?;
                self.write_value(&value)
            }
            None => self.write_value(value),
        }
    }

    /// Writes `value` with its type code.
    pub fn write_value(&mut self, value: &Value) -> Result<(), ProtocolError> {
        match value {
            Value::Null => self.write_null(),
            Value::Byte(v) => {
                self.write_code(TypeCode::Byte);
                self.write_i8(*v);
            }
            Value::Short(v) => {
                self.write_code(TypeCode::Short);
                self.write_i16(*v);
            }
            Value::Int(v) => {
                self.write_code(TypeCode::Int);
                self.write_i32(*v);
            }
            Value::Long(v) => {
                self.write_code(TypeCode::Long);
                self.write_i64(*v);
            }
            Value::Float(v) => {
                self.write_code(TypeCode::Float);
                self.write_f32(*v);
            }
            Value::Double(v) => {
                self.write_code(TypeCode::Double);
                self.write_f64(*v);
            }
            Value::Char(c) => {
                self.write_code(TypeCode::Char);
                self.write_u16(char_unit(*c)?);
            }
            Value::Bool(v) => {
                self.write_code(TypeCode::Bool);
                self.write_bool(*v);
            }
            Value::String(s) => self.write_string(s)?,
            Value::Uuid(u) => {
                self.write_code(TypeCode::Uuid);
                self.write_uuid_body(u);
            }
            Value::Date(dt) => {
                self.write_code(TypeCode::Date);
                self.write_i64(dt.timestamp_millis());
            }
            Value::Timestamp(dt) => {
                self.write_code(TypeCode::Timestamp);
                self.write_i64(dt.timestamp_millis());
                self.write_i32((dt.timestamp_subsec_nanos() % 1_000_000) as i32);
            }
            Value::Bytes(b) => {
                self.write_code(TypeCode::ByteArray);
                self.write_len(b.len())?;
                self.write_slice(b);
            }
            Value::ShortArray(items) => {
                self.write_code(TypeCode::ShortArray);
                self.write_len(items.len())?;
                items.iter().for_each(|v| self.write_i16(*v));
            }
            Value::IntArray(items) => {
                self.write_code(TypeCode::IntArray);
                self.write_len(items.len())?;
                items.iter().for_each(|v| self.write_i32(*v));
            }
            Value::LongArray(items) => {
                self.write_code(TypeCode::LongArray);
                self.write_len(items.len())?;
                items.iter().for_each(|v| self.write_i64(*v));
            }
            Value::FloatArray(items) => {
                self.write_code(TypeCode::FloatArray);
                self.write_len(items.len())?;
                items.iter().for_each(|v| self.write_f32(*v));
            }
            Value::DoubleArray(items) => {
                self.write_code(TypeCode::DoubleArray);
                self.write_len(items.len())?;
                items.iter().for_each(|v| self.write_f64(*v));
            }
            Value::CharArray(items) => {
                self.write_code(TypeCode::CharArray);
                self.write_len(items.len())?;
                for c in items {
                    self.write_u16(char_unit(*c)?);
                }
            }
            Value::BoolArray(items) => {
                self.write_code(TypeCode::BoolArray);
                self.write_len(items.len())?;
                items.iter().for_each(|v| self.write_bool(*v));
            }
            Value::StringArray(items) => {
                self.write_code(TypeCode::StringArray);
                self.write_len(items.len())?;
                for item in items {
                    self.write_opt_string(item.as_deref())?;
                }
            }
            Value::UuidArray(items) => {
                self.write_code(TypeCode::UuidArray);
                self.write_len(items.len())?;
                for item in items {
                    match item {
                        Some(u) => {
                            self.write_code(TypeCode::Uuid);
                            self.write_uuid_body(u);
                        }
                        None => self.write_null(),
                    }
                }
            }
            Value::DateArray(items) => {
                self.write_code(TypeCode::DateArray);
                self.write_len(items.len())?;
                for item in items {
                    match item {
                        Some(dt) => {
                            self.write_code(TypeCode::Date);
                            self.write_i64(dt.timestamp_millis());
                        }
                        None => self.write_null(),
                    }
                }
            }
            Value::List(items) => {
                self.write_code(TypeCode::ObjectArray);
                self.write_i32(OBJECT_ARRAY_COMPONENT);
                self.write_len(items.len())?;
                for item in items {
                    self.write_value(item)?;
                }
            }
            Value::Collection { kind, items } => {
                if kind.is_set() {
                    return Err(ProtocolError::UnsupportedValueKind("set"));
                }
                self.write_code(TypeCode::Collection);
                self.write_len(items.len())?;
                self.write_i8(kind.to_byte());
                for item in items {
                    self.write_value(item)?;
                }
            }
            Value::Map { kind, entries } => {
                self.write_code(TypeCode::Map);
                self.write_len(entries.len())?;
                self.write_i8(kind.to_byte());
                for (k, v) in entries {
                    self.write_value(k)?;
                    self.write_value(v)?;
                }
            }
            Value::Enum { type_id, ordinal } => {
                self.write_code(TypeCode::Enum);
                self.write_i32(*type_id);
                self.write_i32(*ordinal);
            }
            Value::Object(obj) => object::write_object(self, obj)?,
        }
        Ok(())
    }

    fn write_code(&mut self, code: TypeCode) {
        self.write_u8(code.as_u8());
    }

    fn write_uuid_body(&mut self, u: &Uuid) {
        let (msb, lsb) = u.as_u64_pair();
        self.write_i64(msb as i64);
        self.write_i64(lsb as i64);
    }
}

fn char_unit(c: char) -> Result<u16, ProtocolError> {
    u16::try_from(u32::from(c)).map_err(|_| ProtocolError::ValueOutOfRange {
        hint: "char".to_string(),
        value: format!("{:?}", c),
    })
}

/// Re-tags `value` as the hinted wire type.
///
/// Null passes through any hint. Values that do not fit the hinted width are
/// rejected rather than truncated.
pub fn apply_hint<'v>(value: &'v Value, hint: &TypeHint) -> Result<Cow<'v, Value>, ProtocolError> {
    if value.is_null() {
        return Ok(Cow::Borrowed(value));
    }

    let mismatch = || ProtocolError::HintMismatch {
        hint: hint.to_string(),
        kind: value.kind_name(),
    };

    let out_of_range = |shown: String| ProtocolError::ValueOutOfRange {
        hint: hint.to_string(),
        value: shown,
    };

    let converted = match hint {
        TypeHint::Byte | TypeHint::Short | TypeHint::Int | TypeHint::Long => {
            let n = value.as_i64().ok_or_else(mismatch)?;
            match hint {
                TypeHint::Byte => Value::Byte(i8::try_from(n).map_err(|_| out_of_range(n.to_string()))?),
                TypeHint::Short => {
                    Value::Short(i16::try_from(n).map_err(|_| out_of_range(n.to_string()))?)
                }
                TypeHint::Int => Value::Int(i32::try_from(n).map_err(|_| out_of_range(n.to_string()))?),
                _ => Value::Long(n),
            }
        }
        TypeHint::Float => match value {
            Value::Float(_) => return Ok(Cow::Borrowed(value)),
            Value::Double(d) => {
                if d.is_finite() && d.abs() > f64::from(f32::MAX) {
                    return Err(out_of_range(d.to_string()));
                }
                Value::Float(*d as f32)
            }
            other => Value::Float(other.as_i64().ok_or_else(mismatch)? as f32),
        },
        TypeHint::Double => match value {
            Value::Double(_) => return Ok(Cow::Borrowed(value)),
            Value::Float(f) => Value::Double(f64::from(*f)),
            other => Value::Double(other.as_i64().ok_or_else(mismatch)? as f64),
        },
        TypeHint::Char => match value {
            Value::Char(_) => return Ok(Cow::Borrowed(value)),
            Value::String(s) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Value::Char(c),
                    _ => return Err(out_of_range(format!("{:?}", s))),
                }
            }
            _ => return Err(mismatch()),
        },
        TypeHint::Bool => match value {
            Value::Bool(_) => return Ok(Cow::Borrowed(value)),
            _ => return Err(mismatch()),
        },
        TypeHint::String => match value {
            Value::String(_) => return Ok(Cow::Borrowed(value)),
            _ => return Err(mismatch()),
        },
        TypeHint::Complex(type_name) => match value {
            Value::Object(_) => return Ok(Cow::Borrowed(value)),
            Value::Map { entries, .. } => {
                let mut obj = ComplexObject::new(type_name.clone());
                for (k, v) in entries {
                    let name = k.as_str().ok_or_else(mismatch)?;
                    obj.fields.push((name.to_string(), v.clone()));
                }
                Value::Object(obj)
            }
            _ => return Err(mismatch()),
        },
    };
    Ok(Cow::Owned(converted))
}

/// Little-endian reader that tracks its absolute position for error reports.
#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    buf: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> BinaryReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            depth: 0,
        }
    }

    /// Creates a reader over `buf` positioned at `pos`.
    pub(crate) fn at(buf: &'a [u8], pos: usize, depth: usize) -> Self {
        Self { buf, pos, depth }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub(crate) fn buffer(&self) -> &'a [u8] {
        self.buf
    }

    pub(crate) fn depth(&self) -> usize {
        self.depth
    }

    pub(crate) fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Returns the unread bytes without consuming them.
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos.min(self.buf.len())..]
    }

    pub fn read_slice(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if self.remaining() < n {
            return Err(ProtocolError::Truncated {
                needed: n,
                available: self.remaining(),
                position: self.pos,
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_slice(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, ProtocolError> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_i16(&mut self) -> Result<i16, ProtocolError> {
        Ok(i16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, ProtocolError> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, ProtocolError> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    pub fn read_f64(&mut self) -> Result<f64, ProtocolError> {
        Ok(f64::from_le_bytes(self.read_array()?))
    }

    /// Reads a non-negative int32 length or count.
    pub fn read_len(&mut self) -> Result<usize, ProtocolError> {
        let position = self.pos;
        let len = self.read_i32()?;
        usize::try_from(len).map_err(|_| ProtocolError::InvalidLength {
            length: i64::from(len),
            position,
        })
    }

    /// Reads a count of fixed-size elements, rejecting counts the input cannot hold.
    fn read_count(&mut self, elem_size: usize) -> Result<usize, ProtocolError> {
        let position = self.pos;
        let count = self.read_len()?;
        let needed = count.saturating_mul(elem_size);
        if needed > self.remaining() {
            return Err(ProtocolError::Truncated {
                needed,
                available: self.remaining(),
                position,
            });
        }
        Ok(count)
    }

    /// Reads a string object or null.
    pub fn read_string(&mut self) -> Result<Option<String>, ProtocolError> {
        let position = self.pos;
        match self.read_u8()? {
            code if code == TypeCode::String.as_u8() => self.read_string_body().map(Some),
            code if code == TypeCode::Null.as_u8() => Ok(None),
            found => Err(ProtocolError::UnexpectedTypeCode {
                expected: TypeCode::String.as_u8(),
                found,
                position,
            }),
        }
    }

    /// Reads one typed value.
    pub fn read_value(&mut self) -> Result<Value, ProtocolError> {
        let position = self.pos;
        let byte = self.read_u8()?;
        let code = TypeCode::from_u8(byte).ok_or(ProtocolError::UnknownTypeCode {
            code: byte,
            position,
        })?;
        self.read_body(code, position)
    }

    fn read_body(&mut self, code: TypeCode, position: usize) -> Result<Value, ProtocolError> {
        let value = match code {
            TypeCode::Null => Value::Null,
            TypeCode::Byte => Value::Byte(self.read_i8()?),
            TypeCode::Short => Value::Short(self.read_i16()?),
            TypeCode::Int => Value::Int(self.read_i32()?),
            TypeCode::Long => Value::Long(self.read_i64()?),
            TypeCode::Float => Value::Float(self.read_f32()?),
            TypeCode::Double => Value::Double(self.read_f64()?),
            TypeCode::Char => Value::Char(self.read_char()?),
            TypeCode::Bool => Value::Bool(self.read_bool()?),
            TypeCode::String => Value::String(self.read_string_body()?),
            TypeCode::Uuid => Value::Uuid(self.read_uuid_body()?),
            TypeCode::Date => Value::Date(self.read_date_body()?),
            TypeCode::Timestamp => Value::Timestamp(self.read_timestamp_body()?),
            TypeCode::ByteArray => {
                let len = self.read_count(1)?;
                Value::Bytes(Bytes::copy_from_slice(self.read_slice(len)?))
            }
            TypeCode::ShortArray => {
                let n = self.read_count(2)?;
                Value::ShortArray((0..n).map(|_| self.read_i16()).collect::<Result<_, _>>()?)
            }
            TypeCode::IntArray => {
                let n = self.read_count(4)?;
                Value::IntArray((0..n).map(|_| self.read_i32()).collect::<Result<_, _>>()?)
            }
            TypeCode::LongArray => {
                let n = self.read_count(8)?;
                Value::LongArray((0..n).map(|_| self.read_i64()).collect::<Result<_, _>>()?)
            }
            TypeCode::FloatArray => {
                let n = self.read_count(4)?;
                Value::FloatArray((0..n).map(|_| self.read_f32()).collect::<Result<_, _>>()?)
            }
            TypeCode::DoubleArray => {
                let n = self.read_count(8)?;
                Value::DoubleArray((0..n).map(|_| self.read_f64()).collect::<Result<_, _>>()?)
            }
            TypeCode::CharArray => {
                let n = self.read_count(2)?;
                Value::CharArray((0..n).map(|_| self.read_char()).collect::<Result<_, _>>()?)
            }
            TypeCode::BoolArray => {
                let n = self.read_count(1)?;
                Value::BoolArray((0..n).map(|_| self.read_bool()).collect::<Result<_, _>>()?)
            }
            TypeCode::StringArray => {
                let n = self.read_count(1)?;
                let mut items = Vec::with_capacity(n);
                for _ in 0..n {
                    items.push(self.read_string()?);
                }
                Value::StringArray(items)
            }
            TypeCode::UuidArray => {
                let n = self.read_count(1)?;
                let mut items = Vec::with_capacity(n);
                for _ in 0..n {
                    items.push(self.read_nullable(TypeCode::Uuid, Self::read_uuid_body)?);
                }
                Value::UuidArray(items)
            }
            TypeCode::DateArray => {
                let n = self.read_count(1)?;
                let mut items = Vec::with_capacity(n);
                for _ in 0..n {
                    items.push(self.read_nullable(TypeCode::Date, Self::read_date_body)?);
                }
                Value::DateArray(items)
            }
            TypeCode::ObjectArray => {
                let _component = self.read_i32()?;
                let n = self.read_count(1)?;
                Value::List(self.read_nested(n)?)
            }
            TypeCode::Collection => {
                let n = self.read_count(1)?;
                let kind_pos = self.pos;
                let kind_byte = self.read_i8()?;
                let kind = CollectionKind::from_byte(kind_byte).ok_or(
                    ProtocolError::InvalidCollectionKind {
                        kind: kind_byte,
                        position: kind_pos,
                    },
                )?;
                Value::Collection {
                    kind,
                    items: self.read_nested(n)?,
                }
            }
            TypeCode::Map => {
                let n = self.read_count(2)?;
                let kind_pos = self.pos;
                let kind_byte = self.read_i8()?;
                let kind = MapKind::from_byte(kind_byte).ok_or(ProtocolError::InvalidMapKind {
                    kind: kind_byte,
                    position: kind_pos,
                })?;
                let mut flat = self.read_nested(n * 2)?.into_iter();
                let mut entries = Vec::with_capacity(n);
                while let (Some(k), Some(v)) = (flat.next(), flat.next()) {
                    entries.push((k, v));
                }
                Value::Map { kind, entries }
            }
            TypeCode::Enum => Value::Enum {
                type_id: self.read_i32()?,
                ordinal: self.read_i32()?,
            },
            TypeCode::Wrapped => self.read_wrapped()?,
            TypeCode::Complex => object::read_object(self, position)?,
        };
        Ok(value)
    }

    /// Reads `n` typed values one nesting level down.
    fn read_nested(&mut self, n: usize) -> Result<Vec<Value>, ProtocolError> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(ProtocolError::NestingTooDeep {
                max: MAX_NESTING_DEPTH,
                position: self.pos,
            });
        }
        self.depth += 1;
        let mut items = Vec::with_capacity(n.min(self.remaining()));
        for _ in 0..n {
            items.push(self.read_value()?);
        }
        self.depth -= 1;
        Ok(items)
    }

    /// Unwraps `[27][len][bytes][offset]` into the value stored at `offset`.
    fn read_wrapped(&mut self) -> Result<Value, ProtocolError> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(ProtocolError::NestingTooDeep {
                max: MAX_NESTING_DEPTH,
                position: self.pos,
            });
        }
        let len = self.read_count(1)?;
        let start = self.pos;
        let end = start + len;
        self.pos = end;
        let offset_pos = self.pos;
        let offset = self.read_i32()?;
        let offset = usize::try_from(offset)
            .ok()
            .filter(|o| *o < len)
            .ok_or(ProtocolError::InvalidLength {
                length: i64::from(offset),
                position: offset_pos,
            })?;

        let mut inner = BinaryReader::at(&self.buf[..end], start + offset, self.depth + 1);
        inner.read_value()
    }

    fn read_nullable<T>(
        &mut self,
        expected: TypeCode,
        body: fn(&mut Self) -> Result<T, ProtocolError>,
    ) -> Result<Option<T>, ProtocolError> {
        let position = self.pos;
        match self.read_u8()? {
            code if code == expected.as_u8() => body(self).map(Some),
            code if code == TypeCode::Null.as_u8() => Ok(None),
            found => Err(ProtocolError::UnexpectedTypeCode {
                expected: expected.as_u8(),
                found,
                position,
            }),
        }
    }

    fn read_string_body(&mut self) -> Result<String, ProtocolError> {
        let len = self.read_count(1)?;
        let position = self.pos;
        let bytes = self.read_slice(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ProtocolError::InvalidUtf8 { position })
    }

    fn read_char(&mut self) -> Result<char, ProtocolError> {
        let position = self.pos;
        let unit = self.read_u16()?;
        char::from_u32(u32::from(unit)).ok_or(ProtocolError::InvalidChar { unit, position })
    }

    fn read_uuid_body(&mut self) -> Result<Uuid, ProtocolError> {
        let msb = self.read_i64()? as u64;
        let lsb = self.read_i64()? as u64;
        Ok(Uuid::from_u64_pair(msb, lsb))
    }

    fn read_date_body(&mut self) -> Result<DateTime<Utc>, ProtocolError> {
        let position = self.pos;
        let millis = self.read_i64()?;
        DateTime::<Utc>::from_timestamp_millis(millis)
            .ok_or(ProtocolError::InvalidTimestamp { millis, position })
    }

    fn read_timestamp_body(&mut self) -> Result<DateTime<Utc>, ProtocolError> {
        let position = self.pos;
        let base = self.read_date_body()?;
        let nanos = self.read_i32()?;
        if !(0..1_000_000).contains(&nanos) {
            return Err(ProtocolError::InvalidTimestamp {
                millis: base.timestamp_millis(),
                position,
            });
        }
        Ok(base + chrono::Duration::nanoseconds(i64::from(nanos)))
    }
}
