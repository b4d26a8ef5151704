//! Complex (user type) binary objects.
//!
//! Layout, with every offset relative to the first byte of the object:
//!
//! ```text
//! +------+-----+-------+---------+------+--------+-----------+---------------+
//! | 103  | ver | flags | type id | hash | length | schema id | schema offset |
//! | u8   | u8  | u16   | i32     | i32  | i32    | i32       | i32           |
//! +------+-----+-------+---------+------+--------+-----------+---------------+
//! | field data (typed values) ...                                            |
//! +--------------------------------------------------------------------------+
//! | footer: (field id i32, field offset u8/u16/i32) per field                |
//! +--------------------------------------------------------------------------+
//! ```
//!
//! The hash is computed over the field data only. Decoded objects come back
//! as linked maps keyed by field id, or by field index when the footer is
//! compact and carries no ids.

use crate::codec::{BinaryReader, BinaryWriter};
use crate::error::ProtocolError;
use crate::hash;
use crate::types::{MapKind, TypeCode};
use crate::value::{ComplexObject, Value};
use crate::MAX_NESTING_DEPTH;

pub const OBJECT_VERSION: u8 = 1;
pub const HEADER_LEN: usize = 24;

pub const FLAG_USER_TYPE: u16 = 0x0001;
pub const FLAG_HAS_SCHEMA: u16 = 0x0002;
pub const FLAG_HAS_RAW: u16 = 0x0004;
pub const FLAG_OFFSET_ONE_BYTE: u16 = 0x0008;
pub const FLAG_OFFSET_TWO_BYTES: u16 = 0x0010;
pub const FLAG_COMPACT_FOOTER: u16 = 0x0020;

/// One field of a [`ComplexObjectSchema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaField {
    pub name: String,
    pub id: i32,
    pub type_code: TypeCode,
}

/// Identity of a complex object's type and field layout.
///
/// Derived from the object every time it is written; nothing is cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexObjectSchema {
    pub type_id: i32,
    pub schema_id: i32,
    pub fields: Vec<SchemaField>,
}

impl ComplexObjectSchema {
    pub fn of(obj: &ComplexObject) -> Self {
        let fields: Vec<SchemaField> = obj
            .fields
            .iter()
            .map(|(name, value)| SchemaField {
                name: name.clone(),
                id: hash::field_id(name),
                type_code: value.type_code(),
            })
            .collect();
        let ids: Vec<i32> = fields.iter().map(|f| f.id).collect();
        Self {
            type_id: hash::type_id(&obj.type_name),
            schema_id: hash::schema_id(&ids),
            fields,
        }
    }

    pub fn field_ids(&self) -> impl Iterator<Item = i32> + '_ {
        self.fields.iter().map(|f| f.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OffsetWidth {
    One,
    Two,
    Four,
}

impl OffsetWidth {
    fn for_max(offset: usize) -> Self {
        if offset < 0x100 {
            OffsetWidth::One
        } else if offset < 0x1_0000 {
            OffsetWidth::Two
        } else {
            OffsetWidth::Four
        }
    }

    fn from_flags(flags: u16) -> Self {
        if flags & FLAG_OFFSET_ONE_BYTE != 0 {
            OffsetWidth::One
        } else if flags & FLAG_OFFSET_TWO_BYTES != 0 {
            OffsetWidth::Two
        } else {
            OffsetWidth::Four
        }
    }

    fn flag(self) -> u16 {
        match self {
            OffsetWidth::One => FLAG_OFFSET_ONE_BYTE,
            OffsetWidth::Two => FLAG_OFFSET_TWO_BYTES,
            OffsetWidth::Four => 0,
        }
    }

    fn size(self) -> usize {
        match self {
            OffsetWidth::One => 1,
            OffsetWidth::Two => 2,
            OffsetWidth::Four => 4,
        }
    }
}

fn to_i32(len: usize) -> Result<i32, ProtocolError> {
    i32::try_from(len).map_err(|_| ProtocolError::RequestTooLarge {
        size: len,
        max: i32::MAX as usize,
    })
}

/// Writes `obj` as a complex object with a full footer.
pub(crate) fn write_object(w: &mut BinaryWriter, obj: &ComplexObject) -> Result<(), ProtocolError> {
    let schema = ComplexObjectSchema::of(obj);

    let mut data = BinaryWriter::new();
    let mut offsets = Vec::with_capacity(obj.fields.len());
    for (_, value) in &obj.fields {
        offsets.push(HEADER_LEN + data.len());
        data.write_value(value)?;
    }

    let schema_offset = HEADER_LEN + data.len();
    let (flags, footer_len) = match offsets.last() {
        Some(&last) => {
            let width = OffsetWidth::for_max(last);
            (
                FLAG_USER_TYPE | FLAG_HAS_SCHEMA | width.flag(),
                offsets.len() * (4 + width.size()),
            )
        }
        None => (FLAG_USER_TYPE, 0),
    };
    let width = OffsetWidth::from_flags(flags);
    let length = schema_offset + footer_len;

    w.write_u8(TypeCode::Complex.as_u8());
    w.write_u8(OBJECT_VERSION);
    w.write_u16(flags);
    w.write_i32(schema.type_id);
    w.write_i32(hash::bytes_hash(data.as_bytes()));
    w.write_i32(to_i32(length)?);
    w.write_i32(schema.schema_id);
    w.write_i32(to_i32(schema_offset)?);
    w.write_slice(data.as_bytes());

    for (field_id, offset) in schema.field_ids().zip(&offsets) {
        w.write_i32(field_id);
        match width {
            OffsetWidth::One => w.write_u8(*offset as u8),
            OffsetWidth::Two => w.write_u16(*offset as u16),
            OffsetWidth::Four => w.write_i32(to_i32(*offset)?),
        }
    }
    Ok(())
}

/// Reads a complex object whose type code sits at `start`.
///
/// The reader must be positioned just past the type code. On success it is
/// left at the first byte after the object.
pub(crate) fn read_object(reader: &mut BinaryReader<'_>, start: usize) -> Result<Value, ProtocolError> {
    let version_pos = reader.position();
    let version = reader.read_u8()?;
    if version != OBJECT_VERSION {
        return Err(ProtocolError::UnsupportedObjectVersion {
            version,
            position: version_pos,
        });
    }
    let flags = reader.read_u16()?;
    let _type_id = reader.read_i32()?;
    let _hash = reader.read_i32()?;
    let length_pos = reader.position();
    let length = reader.read_i32()?;
    let _schema_id = reader.read_i32()?;
    let schema_offset_pos = reader.position();
    let schema_offset = reader.read_i32()?;

    let length = usize::try_from(length)
        .ok()
        .filter(|len| *len >= HEADER_LEN)
        .ok_or(ProtocolError::InvalidLength {
            length: i64::from(length),
            position: length_pos,
        })?;
    let buf = reader.buffer();
    let end = start + length;
    if end > buf.len() {
        return Err(ProtocolError::Truncated {
            needed: length,
            available: buf.len().saturating_sub(start),
            position: start,
        });
    }

    let mut entries = Vec::new();
    if flags & FLAG_HAS_SCHEMA != 0 {
        let schema_offset = usize::try_from(schema_offset)
            .ok()
            .filter(|off| (HEADER_LEN..=length).contains(off))
            .ok_or(ProtocolError::MalformedObject {
                reason: "schema offset outside object",
                position: schema_offset_pos,
            })?;

        if reader.depth() >= MAX_NESTING_DEPTH {
            return Err(ProtocolError::NestingTooDeep {
                max: MAX_NESTING_DEPTH,
                position: start,
            });
        }

        let footer_start = start + schema_offset;
        let footer_end = if flags & FLAG_HAS_RAW != 0 {
            end.checked_sub(4)
                .filter(|e| *e >= footer_start)
                .ok_or(ProtocolError::MalformedObject {
                    reason: "missing raw data offset",
                    position: start,
                })?
        } else {
            end
        };

        let width = OffsetWidth::from_flags(flags);
        let compact = flags & FLAG_COMPACT_FOOTER != 0;
        let entry_len = if compact { width.size() } else { 4 + width.size() };
        let footer_len = footer_end - footer_start;
        if footer_len % entry_len != 0 {
            return Err(ProtocolError::MalformedObject {
                reason: "footer length is not a whole number of entries",
                position: footer_start,
            });
        }

        let data = &buf[..footer_start];
        let mut footer = BinaryReader::at(&buf[..footer_end], footer_start, reader.depth());
        for index in 0..footer_len / entry_len {
            let key = if compact {
                index as i32
            } else {
                footer.read_i32()?
            };
            let offset_pos = footer.position();
            let offset = match width {
                OffsetWidth::One => usize::from(footer.read_u8()?),
                OffsetWidth::Two => usize::from(footer.read_u16()?),
                OffsetWidth::Four => {
                    let raw = footer.read_i32()?;
                    usize::try_from(raw).map_err(|_| ProtocolError::InvalidLength {
                        length: i64::from(raw),
                        position: offset_pos,
                    })?
                }
            };
            if offset < HEADER_LEN || offset >= schema_offset {
                return Err(ProtocolError::MalformedObject {
                    reason: "field offset outside data section",
                    position: offset_pos,
                });
            }

            let mut field = BinaryReader::at(data, start + offset, reader.depth() + 1);
            entries.push((Value::Int(key), field.read_value()?));
        }
    }

    reader.seek(end);
    Ok(Value::Map {
        kind: MapKind::Linked,
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, encode, encode_hinted};
    use crate::types::TypeHint;

    fn person() -> ComplexObject {
        ComplexObject::new("Person").field("name", "Ann").field("age", 30)
    }

    #[test]
    fn test_schema_of_person() {
        let schema = ComplexObjectSchema::of(&person());
        assert_eq!(schema.type_id, -991716523);
        assert_eq!(schema.field_ids().collect::<Vec<_>>(), vec![3373707, 96511]);
        assert_eq!(schema.fields[0].name, "name");
        assert_eq!(schema.fields[0].type_code, TypeCode::String);
        assert_eq!(schema.fields[1].type_code, TypeCode::Int);
        assert_eq!(schema.schema_id, 1946200325);
    }

    #[test]
    fn test_person_wire_form() {
        let encoded = encode(&Value::Object(person())).unwrap();

        let mut expected = vec![103, 1, 0x0B, 0x00];
        expected.extend_from_slice(&(-991716523i32).to_le_bytes());
        expected.extend_from_slice(&848612553i32.to_le_bytes());
        expected.extend_from_slice(&47i32.to_le_bytes());
        expected.extend_from_slice(&1946200325i32.to_le_bytes());
        expected.extend_from_slice(&37i32.to_le_bytes());
        expected.extend_from_slice(&[9, 3, 0, 0, 0, b'A', b'n', b'n', 3, 30, 0, 0, 0]);
        expected.extend_from_slice(&3373707i32.to_le_bytes());
        expected.push(24);
        expected.extend_from_slice(&96511i32.to_le_bytes());
        expected.push(32);

        assert_eq!(&encoded[..], &expected[..]);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let a = encode(&Value::Object(person())).unwrap();
        let b = encode(&Value::Object(person())).unwrap();
        assert_eq!(a, b);

        // Different field data changes the hash code.
        let older = ComplexObject::new("Person").field("name", "Ann").field("age", 31);
        let c = encode(&Value::Object(older)).unwrap();
        assert_eq!(a[..8], c[..8]);
        assert_ne!(a[8..12], c[8..12]);
    }

    #[test]
    fn test_person_decodes_to_field_id_map() {
        let encoded = encode(&Value::Object(person())).unwrap();
        let (value, consumed) = decode(&encoded).unwrap();
        assert_eq!(consumed, 47);
        assert_eq!(
            value,
            Value::map([
                (Value::Int(3373707), Value::from("Ann")),
                (Value::Int(96511), Value::Int(30)),
            ])
        );
    }

    #[test]
    fn test_empty_object() {
        let encoded = encode(&Value::Object(ComplexObject::new("Empty"))).unwrap();
        assert_eq!(encoded.len(), HEADER_LEN);
        assert_eq!(u16::from_le_bytes([encoded[2], encoded[3]]), FLAG_USER_TYPE);
        // Hash of an empty data section, schema id 0, schema offset at the header end.
        assert_eq!(&encoded[8..12], &1i32.to_le_bytes());
        assert_eq!(&encoded[16..20], &0i32.to_le_bytes());
        assert_eq!(&encoded[20..24], &24i32.to_le_bytes());

        let (value, _) = decode(&encoded).unwrap();
        assert_eq!(
            value,
            Value::Map {
                kind: MapKind::Linked,
                entries: vec![]
            }
        );
    }

    #[test]
    fn test_two_byte_offsets() {
        let obj = ComplexObject::new("Doc")
            .field("body", "x".repeat(300))
            .field("tag", 1);
        let encoded = encode(&Value::Object(obj)).unwrap();
        let flags = u16::from_le_bytes([encoded[2], encoded[3]]);
        assert_ne!(flags & FLAG_OFFSET_TWO_BYTES, 0);
        assert_eq!(flags & FLAG_OFFSET_ONE_BYTE, 0);

        let (value, consumed) = decode(&encoded).unwrap();
        assert_eq!(consumed, encoded.len());
        match value {
            Value::Map { entries, .. } => {
                assert_eq!(entries[1], (Value::Int(hash::field_id("tag")), Value::Int(1)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_nested_object() {
        let outer = ComplexObject::new("Order")
            .field("id", 7i64)
            .field("buyer", person());
        let encoded = encode(&Value::Object(outer)).unwrap();
        let (value, consumed) = decode(&encoded).unwrap();
        assert_eq!(consumed, encoded.len());
        let Value::Map { entries, .. } = value else {
            panic!("expected map");
        };
        assert_eq!(entries[0].1, Value::Long(7));
        assert!(matches!(&entries[1].1, Value::Map { entries, .. } if entries.len() == 2));
    }

    #[test]
    fn test_compact_footer_keys_by_index() {
        let data = [9, 1, 0, 0, 0, b'z', 8, 1];
        let flags = FLAG_USER_TYPE | FLAG_HAS_SCHEMA | FLAG_OFFSET_ONE_BYTE | FLAG_COMPACT_FOOTER;
        let schema_offset = HEADER_LEN + data.len();
        let length = schema_offset + 2;

        let mut bytes = vec![103, 1];
        bytes.extend_from_slice(&flags.to_le_bytes());
        bytes.extend_from_slice(&hash::type_id("T").to_le_bytes());
        bytes.extend_from_slice(&hash::bytes_hash(&data).to_le_bytes());
        bytes.extend_from_slice(&(length as i32).to_le_bytes());
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes.extend_from_slice(&(schema_offset as i32).to_le_bytes());
        bytes.extend_from_slice(&data);
        bytes.extend_from_slice(&[24, 30]);

        let (value, consumed) = decode(&bytes).unwrap();
        assert_eq!(consumed, length);
        assert_eq!(
            value,
            Value::map([
                (Value::Int(0), Value::from("z")),
                (Value::Int(1), Value::Bool(true)),
            ])
        );
    }

    #[test]
    fn test_unsupported_version() {
        let mut encoded = encode(&Value::Object(person())).unwrap();
        encoded[1] = 2;
        assert!(matches!(
            decode(&encoded),
            Err(ProtocolError::UnsupportedObjectVersion {
                version: 2,
                position: 1
            })
        ));
    }

    #[test]
    fn test_truncated_object() {
        let encoded = encode(&Value::Object(person())).unwrap();
        assert!(matches!(
            decode(&encoded[..40]),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn test_bad_field_offset() {
        let mut encoded = encode(&Value::Object(person())).unwrap();
        // First footer offset points into the header.
        encoded[41] = 3;
        assert!(matches!(
            decode(&encoded),
            Err(ProtocolError::MalformedObject { .. })
        ));
    }

    #[test]
    fn test_complex_hint_promotes_map() {
        let map = Value::map([("name", Value::from("Ann")), ("age", Value::Int(30))]);
        let hinted = encode_hinted(&map, Some(&TypeHint::Complex("Person".into()))).unwrap();
        let direct = encode(&Value::Object(person())).unwrap();
        assert_eq!(hinted, direct);

        let bad = Value::map([(1, "x")]);
        assert!(matches!(
            encode_hinted(&bad, Some(&TypeHint::Complex("Person".into()))),
            Err(ProtocolError::HintMismatch { .. })
        ));
    }
}
