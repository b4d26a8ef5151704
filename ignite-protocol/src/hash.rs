//! Java-compatible hashing.
//!
//! The node looks caches and binary types up by hashes it computes itself, so
//! every function here must agree bit-for-bit with the JVM. All of them reduce
//! to [`java_hash`], the `31 * h + x` polynomial used by `String.hashCode` and
//! the binary array identity resolver.

/// `h = 31 * h + unit` over `units`, starting from `seed`, with 32-bit wraparound.
pub fn java_hash<I>(seed: i32, units: I) -> i32
where
    I: IntoIterator<Item = i32>,
{
    units
        .into_iter()
        .fold(seed, |h, unit| h.wrapping_mul(31).wrapping_add(unit))
}

/// `java.lang.String#hashCode`: polynomial over UTF-16 code units, seed 0.
pub fn string_hash(s: &str) -> i32 {
    java_hash(0, s.encode_utf16().map(i32::from))
}

/// Hash code of a binary object: polynomial over signed bytes, seed 1.
pub fn bytes_hash(bytes: &[u8]) -> i32 {
    java_hash(1, bytes.iter().map(|&b| i32::from(b as i8)))
}

/// Cache id sent in every cache-scoped request.
pub fn cache_id(name: &str) -> i32 {
    string_hash(name)
}

/// Type id of a user type, as assigned by the default id mapper.
pub fn type_id(type_name: &str) -> i32 {
    string_hash(&type_name.to_lowercase())
}

/// Field id of a user type field, as assigned by the default id mapper.
pub fn field_id(field_name: &str) -> i32 {
    string_hash(&field_name.to_lowercase())
}

const FNV1_OFFSET_BASIS: u32 = 0x811C_9DC5;
const FNV1_PRIME: u32 = 0x0100_0193;

/// Schema id: FNV-1 over the little-endian bytes of each field id, in order.
///
/// An object without fields has schema id 0.
pub fn schema_id(field_ids: &[i32]) -> i32 {
    if field_ids.is_empty() {
        return 0;
    }
    let mut id = FNV1_OFFSET_BASIS;
    for field in field_ids {
        for byte in field.to_le_bytes() {
            id ^= u32::from(byte);
            id = id.wrapping_mul(FNV1_PRIME);
        }
    }
    id as i32
}
