//! Wire type codes, container kinds and caller-supplied type hints.

use crate::error::ProtocolError;
use std::fmt;
use std::str::FromStr;

/// Type code byte preceding every value on the wire.
///
/// The set is closed: any other byte is a decode error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeCode {
    Byte = 1,
    Short = 2,
    Int = 3,
    Long = 4,
    Float = 5,
    Double = 6,
    Char = 7,
    Bool = 8,
    String = 9,
    Uuid = 10,
    Date = 11,
    ByteArray = 12,
    ShortArray = 13,
    IntArray = 14,
    LongArray = 15,
    FloatArray = 16,
    DoubleArray = 17,
    CharArray = 18,
    BoolArray = 19,
    StringArray = 20,
    UuidArray = 21,
    DateArray = 22,
    ObjectArray = 23,
    Collection = 24,
    Map = 25,
    Wrapped = 27,
    Enum = 28,
    Timestamp = 33,
    Null = 101,
    Complex = 103,
}

impl TypeCode {
    pub fn from_u8(code: u8) -> Option<Self> {
        let tc = match code {
            1 => TypeCode::Byte,
            2 => TypeCode::Short,
            3 => TypeCode::Int,
            4 => TypeCode::Long,
            5 => TypeCode::Float,
            6 => TypeCode::Double,
            7 => TypeCode::Char,
            8 => TypeCode::Bool,
            9 => TypeCode::String,
            10 => TypeCode::Uuid,
            11 => TypeCode::Date,
            12 => TypeCode::ByteArray,
            13 => TypeCode::ShortArray,
            14 => TypeCode::IntArray,
            15 => TypeCode::LongArray,
            16 => TypeCode::FloatArray,
            17 => TypeCode::DoubleArray,
            18 => TypeCode::CharArray,
            19 => TypeCode::BoolArray,
            20 => TypeCode::StringArray,
            21 => TypeCode::UuidArray,
            22 => TypeCode::DateArray,
            23 => TypeCode::ObjectArray,
            24 => TypeCode::Collection,
            25 => TypeCode::Map,
            27 => TypeCode::Wrapped,
            28 => TypeCode::Enum,
            33 => TypeCode::Timestamp,
            101 => TypeCode::Null,
            103 => TypeCode::Complex,
            _ => return None,
        };
        Some(tc)
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Map sub-kind byte written after the entry count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MapKind {
    /// `java.util.HashMap`: no ordering promise on the server side.
    #[default]
    Hash,
    /// `java.util.LinkedHashMap`: insertion order is kept by the server.
    Linked,
}

impl MapKind {
    pub fn to_byte(self) -> i8 {
        match self {
            MapKind::Hash => 1,
            MapKind::Linked => 2,
        }
    }

    pub fn from_byte(kind: i8) -> Option<Self> {
        match kind {
            1 => Some(MapKind::Hash),
            2 => Some(MapKind::Linked),
            _ => None,
        }
    }
}

/// Collection sub-kind byte written after the element count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    UserSet,
    UserCollection,
    #[default]
    ArrayList,
    LinkedList,
    HashSet,
    LinkedHashSet,
    SingletonList,
}

impl CollectionKind {
    pub fn to_byte(self) -> i8 {
        match self {
            CollectionKind::UserSet => -1,
            CollectionKind::UserCollection => 0,
            CollectionKind::ArrayList => 1,
            CollectionKind::LinkedList => 2,
            CollectionKind::HashSet => 3,
            CollectionKind::LinkedHashSet => 4,
            CollectionKind::SingletonList => 5,
        }
    }

    pub fn from_byte(kind: i8) -> Option<Self> {
        match kind {
            -1 => Some(CollectionKind::UserSet),
            0 => Some(CollectionKind::UserCollection),
            1 => Some(CollectionKind::ArrayList),
            2 => Some(CollectionKind::LinkedList),
            3 => Some(CollectionKind::HashSet),
            4 => Some(CollectionKind::LinkedHashSet),
            5 => Some(CollectionKind::SingletonList),
            _ => None,
        }
    }

    /// Set kinds are readable but cannot be written by this client.
    pub fn is_set(self) -> bool {
        matches!(
            self,
            CollectionKind::UserSet | CollectionKind::HashSet | CollectionKind::LinkedHashSet
        )
    }
}

/// Wire type to use for a value whose width or kind is otherwise ambiguous.
///
/// Hints are applied only to the top-level key or value of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeHint {
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Char,
    Bool,
    String,
    /// Promote a string-keyed map to a complex object of the named type.
    Complex(String),
}

impl fmt::Display for TypeHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeHint::Byte => write!(f, "byte"),
            TypeHint::Short => write!(f, "short"),
            TypeHint::Int => write!(f, "int"),
            TypeHint::Long => write!(f, "long"),
            TypeHint::Float => write!(f, "float"),
            TypeHint::Double => write!(f, "double"),
            TypeHint::Char => write!(f, "char"),
            TypeHint::Bool => write!(f, "bool"),
            TypeHint::String => write!(f, "string"),
            TypeHint::Complex(name) => write!(f, "object:{}", name),
        }
    }
}

impl FromStr for TypeHint {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hint = match s.to_ascii_lowercase().as_str() {
            "byte" => TypeHint::Byte,
            "short" => TypeHint::Short,
            "int" => TypeHint::Int,
            "long" => TypeHint::Long,
            "float" => TypeHint::Float,
            "double" => TypeHint::Double,
            "char" => TypeHint::Char,
            "bool" => TypeHint::Bool,
            "string" => TypeHint::String,
            _ => match s.split_once(':') {
                Some((prefix, name)) if prefix.eq_ignore_ascii_case("object") && !name.is_empty() => {
                    TypeHint::Complex(name.to_string())
                }
                _ => return Err(ProtocolError::InvalidTypeHint(s.to_string())),
            },
        };
        Ok(hint)
    }
}

/// Key and value hints consulted by the cache operation layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeHints {
    pub key: Option<TypeHint>,
    pub value: Option<TypeHint>,
}

impl TypeHints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, hint: TypeHint) -> Self {
        self.key = Some(hint);
        self
    }

    pub fn with_value(mut self, hint: TypeHint) -> Self {
        self.value = Some(hint);
        self
    }
}
