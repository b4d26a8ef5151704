//! Dynamic values exchanged with the node.

use crate::types::{CollectionKind, MapKind, TypeCode};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A value in the binary type system.
///
/// Numeric variants carry their wire width. Maps keep their entries in
/// insertion order, which is also the order they are written in.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Char(char),
    Bool(bool),
    String(String),
    Uuid(Uuid),
    /// Millisecond precision.
    Date(DateTime<Utc>),
    /// Millisecond part plus nanoseconds within the millisecond.
    Timestamp(DateTime<Utc>),
    Bytes(Bytes),
    ShortArray(Vec<i16>),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
    FloatArray(Vec<f32>),
    DoubleArray(Vec<f64>),
    CharArray(Vec<char>),
    BoolArray(Vec<bool>),
    StringArray(Vec<Option<String>>),
    UuidArray(Vec<Option<Uuid>>),
    DateArray(Vec<Option<DateTime<Utc>>>),
    /// Heterogeneous `Object[]`.
    List(Vec<Value>),
    Collection {
        kind: CollectionKind,
        items: Vec<Value>,
    },
    Map {
        kind: MapKind,
        entries: Vec<(Value, Value)>,
    },
    Enum {
        type_id: i32,
        ordinal: i32,
    },
    Object(ComplexObject),
}

impl Value {
    /// Builds a linked map from `(key, value)` pairs, keeping their order.
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<Value>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Map {
            kind: MapKind::Linked,
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Builds a hash set collection. Such values are rejected by the encoder.
    pub fn set<I: IntoIterator<Item = Value>>(items: I) -> Self {
        Value::Collection {
            kind: CollectionKind::HashSet,
            items: items.into_iter().collect(),
        }
    }

    pub fn type_code(&self) -> TypeCode {
        match self {
            Value::Null => TypeCode::Null,
            Value::Byte(_) => TypeCode::Byte,
            Value::Short(_) => TypeCode::Short,
            Value::Int(_) => TypeCode::Int,
            Value::Long(_) => TypeCode::Long,
            Value::Float(_) => TypeCode::Float,
            Value::Double(_) => TypeCode::Double,
            Value::Char(_) => TypeCode::Char,
            Value::Bool(_) => TypeCode::Bool,
            Value::String(_) => TypeCode::String,
            Value::Uuid(_) => TypeCode::Uuid,
            Value::Date(_) => TypeCode::Date,
            Value::Timestamp(_) => TypeCode::Timestamp,
            Value::Bytes(_) => TypeCode::ByteArray,
            Value::ShortArray(_) => TypeCode::ShortArray,
            Value::IntArray(_) => TypeCode::IntArray,
            Value::LongArray(_) => TypeCode::LongArray,
            Value::FloatArray(_) => TypeCode::FloatArray,
            Value::DoubleArray(_) => TypeCode::DoubleArray,
            Value::CharArray(_) => TypeCode::CharArray,
            Value::BoolArray(_) => TypeCode::BoolArray,
            Value::StringArray(_) => TypeCode::StringArray,
            Value::UuidArray(_) => TypeCode::UuidArray,
            Value::DateArray(_) => TypeCode::DateArray,
            Value::List(_) => TypeCode::ObjectArray,
            Value::Collection { .. } => TypeCode::Collection,
            Value::Map { .. } => TypeCode::Map,
            Value::Enum { .. } => TypeCode::Enum,
            Value::Object(_) => TypeCode::Complex,
        }
    }

    /// Short human-readable name of the variant, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Byte(_) => "byte",
            Value::Short(_) => "short",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Char(_) => "char",
            Value::Bool(_) => "bool",
            Value::String(_) => "string",
            Value::Uuid(_) => "uuid",
            Value::Date(_) => "date",
            Value::Timestamp(_) => "timestamp",
            Value::Bytes(_) => "byte array",
            Value::ShortArray(_)
            | Value::IntArray(_)
            | Value::LongArray(_)
            | Value::FloatArray(_)
            | Value::DoubleArray(_)
            | Value::CharArray(_)
            | Value::BoolArray(_) => "primitive array",
            Value::StringArray(_) | Value::UuidArray(_) | Value::DateArray(_) => "typed array",
            Value::List(_) => "list",
            Value::Collection { kind, .. } if kind.is_set() => "set",
            Value::Collection { .. } => "collection",
            Value::Map { .. } => "map",
            Value::Enum { .. } => "enum",
            Value::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns any integer variant widened to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Byte(v) => Some(i64::from(*v)),
            Value::Short(v) => Some(i64::from(*v)),
            Value::Int(v) => Some(i64::from(*v)),
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    i8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    char => Char,
    bool => Bool,
    String => String,
    Uuid => Uuid,
    Bytes => Bytes,
    ComplexObject => Object,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(Bytes::copy_from_slice(v))
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// A user-defined structured value, written as a complex binary object.
///
/// Field order is significant: it determines the schema id, the footer layout
/// and the object's hash code.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexObject {
    pub type_name: String,
    pub fields: Vec<(String, Value)>,
}

impl ComplexObject {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_primitives_keeps_width() {
        assert_eq!(Value::from(1i8), Value::Byte(1));
        assert_eq!(Value::from(1i16), Value::Short(1));
        assert_eq!(Value::from(1i32), Value::Int(1));
        assert_eq!(Value::from(1i64), Value::Long(1));
        assert_eq!(Value::from(1.5f32).type_code(), TypeCode::Float);
        assert_eq!(Value::from(1.5f64).type_code(), TypeCode::Double);
    }

    #[test]
    fn test_from_option() {
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::String("x".into()));
    }

    #[test]
    fn test_map_keeps_insertion_order() {
        let map = Value::map([(3, "c"), (1, "a"), (2, "b")]);
        match map {
            Value::Map { kind, entries } => {
                assert_eq!(kind, MapKind::Linked);
                let keys: Vec<_> = entries.iter().map(|(k, _)| k.as_i64().unwrap()).collect();
                assert_eq!(keys, vec![3, 1, 2]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_set_kind_name() {
        assert_eq!(Value::set(vec![Value::Int(1)]).kind_name(), "set");
        assert_eq!(Value::List(vec![]).kind_name(), "list");
    }

    #[test]
    fn test_complex_object_builder() {
        let obj = ComplexObject::new("Person").field("name", "Ann").field("age", 30);
        assert_eq!(obj.get("age"), Some(&Value::Int(30)));
        assert_eq!(obj.get("missing"), None);
        assert_eq!(obj.fields.len(), 2);
    }
}
