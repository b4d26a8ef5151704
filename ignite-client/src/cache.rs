//! Cache operation layer.
//!
//! Builds request payloads for cache-scoped operations and parses their
//! responses. Every cache-scoped payload starts with `[i32 cache id][i8 flags]`.

use crate::connection::Connection;
use crate::cursor::ScanCursor;
use crate::error::ClientError;
use bytes::Bytes;
use ignite_protocol::hash;
use ignite_protocol::{apply_hint, BinaryReader, BinaryWriter, OpCode, ProtocolError, TypeHint, TypeHints, Value};
use std::sync::Arc;

/// Ask the node to return complex objects in binary form.
pub const FLAG_KEEP_BINARY: i8 = 0x01;

/// Default scan query page size.
pub const DEFAULT_PAGE_SIZE: i32 = 1024;

/// Starts a cache-scoped payload.
pub fn cache_payload(cache_id: i32, flags: i8) -> BinaryWriter {
    let mut w = BinaryWriter::with_capacity(64);
    w.write_i32(cache_id);
    w.write_i8(flags);
    w
}

fn write_hinted(w: &mut BinaryWriter, value: &Value, hint: &Option<TypeHint>) -> Result<(), ProtocolError> {
    w.write_hinted(value, hint.as_ref())
}

/// Writes `[i32 n][key]*`.
pub fn write_keys(w: &mut BinaryWriter, keys: &[Value], hints: &TypeHints) -> Result<(), ProtocolError> {
    w.write_len(keys.len())?;
    for key in keys {
        write_hinted(w, key, &hints.key)?;
    }
    Ok(())
}

/// Writes `[i32 n][key value]*`.
pub fn write_entries(
    w: &mut BinaryWriter,
    entries: &[(Value, Value)],
    hints: &TypeHints,
) -> Result<(), ProtocolError> {
    w.write_len(entries.len())?;
    for (key, value) in entries {
        write_hinted(w, key, &hints.key)?;
        write_hinted(w, value, &hints.value)?;
    }
    Ok(())
}

/// Reads a single value; null means absent.
pub fn parse_optional_value(payload: Bytes) -> Result<Option<Value>, ClientError> {
    let mut r = BinaryReader::new(&payload);
    match r.read_value()? {
        Value::Null => Ok(None),
        value => Ok(Some(value)),
    }
}

pub fn parse_bool(payload: Bytes) -> Result<bool, ClientError> {
    Ok(BinaryReader::new(&payload).read_bool()?)
}

pub fn parse_long(payload: Bytes) -> Result<i64, ClientError> {
    Ok(BinaryReader::new(&payload).read_i64()?)
}

/// Reads `[i32 n][key value]*` from `r`.
pub fn read_entries(r: &mut BinaryReader<'_>) -> Result<Vec<(Value, Value)>, ProtocolError> {
    let n = r.read_len()?;
    let mut entries = Vec::with_capacity(n.min(r.remaining()));
    for _ in 0..n {
        let key = r.read_value()?;
        let value = r.read_value()?;
        entries.push((key, value));
    }
    Ok(entries)
}

pub fn parse_entries(payload: Bytes) -> Result<Vec<(Value, Value)>, ClientError> {
    Ok(read_entries(&mut BinaryReader::new(&payload))?)
}

/// Reads `[i32 n][string]*` into sorted names. Null names are skipped.
pub fn parse_names(payload: Bytes) -> Result<Vec<String>, ClientError> {
    let mut r = BinaryReader::new(&payload);
    let n = r.read_len()?;
    let mut names = Vec::with_capacity(n.min(r.remaining()));
    for _ in 0..n {
        if let Some(name) = r.read_string()? {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Keys as they go on the wire under `hint`.
pub fn hinted_keys(keys: &[Value], hint: Option<&TypeHint>) -> Result<Vec<Value>, ProtocolError> {
    match hint {
        Some(hint) => keys
            .iter()
            .map(|key| apply_hint(key, hint).map(|k| k.into_owned()))
            .collect(),
        None => Ok(keys.to_vec()),
    }
}

/// Orders `entries` by the position of their key in `keys`.
///
/// Entries whose key was not asked for keep their relative order at the end.
pub fn order_by_keys(keys: &[Value], mut entries: Vec<(Value, Value)>) -> Vec<(Value, Value)> {
    let mut ordered = Vec::with_capacity(entries.len());
    for key in keys {
        if let Some(pos) = entries.iter().position(|(k, _)| k == key) {
            ordered.push(entries.remove(pos));
        }
    }
    ordered.extend(entries);
    ordered
}

/// Handle to a named cache.
///
/// Cheap to create; holds the cache id, the key/value type hints and the
/// request flags used for every operation.
#[derive(Clone)]
pub struct Cache {
    conn: Arc<Connection>,
    name: String,
    id: i32,
    hints: TypeHints,
    flags: i8,
}

impl Cache {
    pub fn new(conn: Arc<Connection>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: hash::cache_id(&name),
            conn,
            name,
            hints: TypeHints::default(),
            flags: 0,
        }
    }

    pub fn with_hints(mut self, hints: TypeHints) -> Self {
        self.hints = hints;
        self
    }

    pub fn with_keep_binary(mut self, keep_binary: bool) -> Self {
        if keep_binary {
            self.flags |= FLAG_KEEP_BINARY;
        } else {
            self.flags &= !FLAG_KEEP_BINARY;
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn hints(&self) -> &TypeHints {
        &self.hints
    }

    fn payload(&self) -> BinaryWriter {
        cache_payload(self.id, self.flags)
    }

    fn key_payload(&self, key: &Value) -> Result<BinaryWriter, ClientError> {
        let mut w = self.payload();
        write_hinted(&mut w, key, &self.hints.key)?;
        Ok(w)
    }

    fn keys_payload(&self, keys: &[Value]) -> Result<BinaryWriter, ClientError> {
        let mut w = self.payload();
        write_keys(&mut w, keys, &self.hints)?;
        Ok(w)
    }

    /// Returns the value stored under `key`, or `None`.
    pub async fn get(&self, key: impl Into<Value>) -> Result<Option<Value>, ClientError> {
        let w = self.key_payload(&key.into())?;
        self.conn
            .execute_with(OpCode::CacheGet, w.as_bytes(), parse_optional_value)
            .await
    }

    pub async fn put(&self, key: impl Into<Value>, value: impl Into<Value>) -> Result<(), ClientError> {
        let mut w = self.key_payload(&key.into())?;
        write_hinted(&mut w, &value.into(), &self.hints.value)?;
        self.conn.execute(OpCode::CachePut, w.as_bytes()).await?;
        Ok(())
    }

    /// Returns the entries present for `keys`, in the order of `keys`.
    pub async fn get_all(&self, keys: &[Value]) -> Result<Vec<(Value, Value)>, ClientError> {
        let w = self.keys_payload(keys)?;
        let entries = self
            .conn
            .execute_with(OpCode::CacheGetAll, w.as_bytes(), parse_entries)
            .await?;
        // The node answers with the hinted keys, so match against those.
        let sent = hinted_keys(keys, self.hints.key.as_ref())?;
        Ok(order_by_keys(&sent, entries))
    }

    pub async fn put_all(&self, entries: &[(Value, Value)]) -> Result<(), ClientError> {
        let mut w = self.payload();
        write_entries(&mut w, entries, &self.hints)?;
        self.conn.execute(OpCode::CachePutAll, w.as_bytes()).await?;
        Ok(())
    }

    pub async fn contains_key(&self, key: impl Into<Value>) -> Result<bool, ClientError> {
        let w = self.key_payload(&key.into())?;
        self.conn
            .execute_with(OpCode::CacheContainsKey, w.as_bytes(), parse_bool)
            .await
    }

    /// Returns whether every one of `keys` is present.
    pub async fn contains_keys(&self, keys: &[Value]) -> Result<bool, ClientError> {
        let w = self.keys_payload(keys)?;
        self.conn
            .execute_with(OpCode::CacheContainsKeys, w.as_bytes(), parse_bool)
            .await
    }

    pub async fn clear(&self) -> Result<(), ClientError> {
        self.conn
            .execute(OpCode::CacheClear, self.payload().as_bytes())
            .await?;
        Ok(())
    }

    pub async fn clear_key(&self, key: impl Into<Value>) -> Result<(), ClientError> {
        let w = self.key_payload(&key.into())?;
        self.conn.execute(OpCode::CacheClearKey, w.as_bytes()).await?;
        Ok(())
    }

    /// Removes `key`, returning whether it was present.
    pub async fn remove_key(&self, key: impl Into<Value>) -> Result<bool, ClientError> {
        let w = self.key_payload(&key.into())?;
        self.conn
            .execute_with(OpCode::CacheRemoveKey, w.as_bytes(), parse_bool)
            .await
    }

    pub async fn remove_keys(&self, keys: &[Value]) -> Result<(), ClientError> {
        let w = self.keys_payload(keys)?;
        self.conn.execute(OpCode::CacheRemoveKeys, w.as_bytes()).await?;
        Ok(())
    }

    /// Removes every entry, notifying listeners on the node (unlike [`Cache::clear`]).
    pub async fn remove_all(&self) -> Result<(), ClientError> {
        self.conn
            .execute(OpCode::CacheRemoveAll, self.payload().as_bytes())
            .await?;
        Ok(())
    }

    /// Number of entries across all peek modes.
    pub async fn size(&self) -> Result<i64, ClientError> {
        let mut w = self.payload();
        w.write_i32(0);
        self.conn
            .execute_with(OpCode::CacheGetSize, w.as_bytes(), parse_long)
            .await
    }

    /// Opens a scan query over the whole cache.
    pub async fn scan(&self, page_size: i32) -> Result<ScanCursor, ClientError> {
        ScanCursor::open(self.conn.clone(), self, page_size).await
    }

    pub(crate) fn flags(&self) -> i8 {
        self.flags
    }
}
