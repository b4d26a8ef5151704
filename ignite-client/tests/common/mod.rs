//! In-process mock Ignite node for integration tests.
//!
//! Speaks just enough of the thin client protocol to exercise the client:
//! handshake with optional credentials and version proposal, the cache
//! operations, cache lifecycle and paged scan queries. Caches keep entries in
//! insertion order.

#![allow(dead_code)]

use bytes::Bytes;
use ignite_client::{Client, ConnectionConfig};
use ignite_protocol::hash;
use ignite_protocol::{BinaryReader, BinaryWriter, FrameDecoder, OpCode, ProtocolVersion, Value};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Misbehaviour injected into the response to one op code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Answer with a request id that was never sent.
    WrongRequestId,
    /// Answer with a payload that starts with an unknown type code.
    GarbagePayload,
    /// Sleep before answering.
    Delay(Duration),
    /// Close the socket instead of answering.
    Hangup,
}

#[derive(Debug, Clone)]
pub struct NodeOptions {
    /// Versions the node accepts; the last one is proposed on mismatch.
    pub versions: Vec<ProtocolVersion>,
    pub credentials: Option<(String, String)>,
    pub faults: Vec<(OpCode, Fault)>,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            versions: ProtocolVersion::SUPPORTED.to_vec(),
            credentials: None,
            faults: Vec::new(),
        }
    }
}

#[derive(Default)]
struct CacheData {
    name: String,
    entries: Vec<(Value, Value)>,
}

impl CacheData {
    fn position(&self, key: &Value) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    fn put(&mut self, key: Value, value: Value) {
        match self.position(&key) {
            Some(pos) => self.entries[pos].1 = value,
            None => self.entries.push((key, value)),
        }
    }

    fn remove(&mut self, key: &Value) -> bool {
        match self.position(key) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }
}

struct Cursor {
    remaining: VecDeque<(Value, Value)>,
    page_size: usize,
}

#[derive(Default)]
struct NodeState {
    caches: Mutex<HashMap<i32, CacheData>>,
    cursors: Mutex<HashMap<i64, Cursor>>,
    next_cursor: AtomicI64,
    /// Every request seen, in arrival order: (op code, request id).
    requests: Mutex<Vec<(i16, i64)>>,
    handshakes: Mutex<Vec<ProtocolVersion>>,
    connections: AtomicUsize,
}

pub struct MockNode {
    addr: SocketAddr,
    state: Arc<NodeState>,
}

impl MockNode {
    pub async fn start() -> Self {
        Self::start_with(NodeOptions::default()).await
    }

    pub async fn start_with(options: NodeOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(NodeState {
            next_cursor: AtomicI64::new(100),
            ..Default::default()
        });
        let options = Arc::new(options);

        let accept_state = state.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                accept_state.connections.fetch_add(1, Ordering::SeqCst);
                let state = accept_state.clone();
                let options = options.clone();
                tokio::spawn(async move {
                    let _ = serve(socket, state, options).await;
                });
            }
        });

        Self { addr, state }
    }

    pub fn config(&self) -> ConnectionConfig {
        ConnectionConfig::new(self.addr.ip().to_string(), self.addr.port())
            .with_connect_timeout(Duration::from_secs(2))
            .with_request_timeout(Duration::from_secs(2))
    }

    pub async fn client(&self) -> Client {
        Client::open(self.config()).await.unwrap()
    }

    /// Creates a cache directly on the node.
    pub fn create_cache(&self, name: &str) {
        self.state.caches.lock().insert(
            hash::cache_id(name),
            CacheData {
                name: name.to_string(),
                entries: Vec::new(),
            },
        );
    }

    pub fn entries(&self, name: &str) -> Vec<(Value, Value)> {
        self.state
            .caches
            .lock()
            .get(&hash::cache_id(name))
            .map(|c| c.entries.clone())
            .unwrap_or_default()
    }

    pub fn requests(&self) -> Vec<(i16, i64)> {
        self.state.requests.lock().clone()
    }

    pub fn request_ids(&self) -> Vec<i64> {
        self.requests().into_iter().map(|(_, id)| id).collect()
    }

    pub fn count_op(&self, op: OpCode) -> usize {
        self.requests()
            .iter()
            .filter(|(code, _)| *code == op.code())
            .count()
    }

    pub fn handshakes(&self) -> Vec<ProtocolVersion> {
        self.state.handshakes.lock().clone()
    }

    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    pub fn open_cursors(&self) -> usize {
        self.state.cursors.lock().len()
    }
}

async fn read_frame(socket: &mut TcpStream, decoder: &mut FrameDecoder) -> Option<Bytes> {
    loop {
        if let Some(body) = decoder.decode_frame().ok()? {
            return Some(body);
        }
        let buf = decoder.buffer_mut();
        buf.reserve(4096);
        match socket.read_buf(buf).await {
            Ok(0) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

async fn write_frame(socket: &mut TcpStream, body: &[u8]) -> std::io::Result<()> {
    let mut out = (body.len() as i32).to_le_bytes().to_vec();
    out.extend_from_slice(body);
    socket.write_all(&out).await
}

async fn serve(
    mut socket: TcpStream,
    state: Arc<NodeState>,
    options: Arc<NodeOptions>,
) -> std::io::Result<()> {
    let mut decoder = FrameDecoder::new();

    let Some(hello) = read_frame(&mut socket, &mut decoder).await else {
        return Ok(());
    };
    if !handshake(&mut socket, &hello, &state, &options).await? {
        return Ok(());
    }

    while let Some(body) = read_frame(&mut socket, &mut decoder).await {
        let mut r = BinaryReader::new(&body);
        let (Ok(op), Ok(request_id)) = (r.read_i16(), r.read_i64()) else {
            return Ok(());
        };
        state.requests.lock().push((op, request_id));
        let payload = r.rest();

        let fault = OpCode::from_code(op).and_then(|op| {
            options
                .faults
                .iter()
                .find(|(code, _)| *code == op)
                .map(|(_, fault)| *fault)
        });

        let mut response = BinaryWriter::new();
        let mut id = request_id;
        match fault {
            Some(Fault::Hangup) => return Ok(()),
            Some(Fault::Delay(d)) => tokio::time::sleep(d).await,
            Some(Fault::WrongRequestId) => id += 1000,
            _ => {}
        }

        response.write_i64(id);
        if fault == Some(Fault::GarbagePayload) {
            response.write_i32(0);
            response.write_u8(26);
        } else {
            match handle(&state, op, payload) {
                Ok(body) => {
                    response.write_i32(0);
                    response.write_slice(body.as_bytes());
                }
                Err((status, message)) => {
                    response.write_i32(status);
                    response.write_string(&message).unwrap();
                }
            }
        }
        write_frame(&mut socket, response.as_bytes()).await?;
    }
    Ok(())
}

/// Answers the handshake; returns whether the session proceeds.
async fn handshake(
    socket: &mut TcpStream,
    body: &[u8],
    state: &NodeState,
    options: &NodeOptions,
) -> std::io::Result<bool> {
    let mut r = BinaryReader::new(body);
    let _code = r.read_i8().unwrap();
    let version = ProtocolVersion::new(
        r.read_i16().unwrap(),
        r.read_i16().unwrap(),
        r.read_i16().unwrap(),
    );
    let _client = r.read_i8().unwrap();
    let username = if r.is_empty() { None } else { r.read_string().unwrap() };
    let password = if r.is_empty() { None } else { r.read_string().unwrap() };
    state.handshakes.lock().push(version);

    let proposed = options.versions.last().copied().unwrap_or_default();
    let mut reply = BinaryWriter::new();
    if !options.versions.contains(&version) {
        reply.write_bool(false);
        reply.write_i16(proposed.major);
        reply.write_i16(proposed.minor);
        reply.write_i16(proposed.patch);
        reply.write_string(&format!("Unsupported version: {}", version)).unwrap();
        write_frame(socket, reply.as_bytes()).await?;
        return Ok(false);
    }

    if let Some((user, pass)) = &options.credentials {
        if username.as_deref() != Some(user.as_str()) || password.as_deref() != Some(pass.as_str()) {
            reply.write_bool(false);
            reply.write_i16(version.major);
            reply.write_i16(version.minor);
            reply.write_i16(version.patch);
            reply.write_string("The user name or password is incorrect").unwrap();
            reply.write_i32(2000);
            write_frame(socket, reply.as_bytes()).await?;
            return Ok(false);
        }
    }

    reply.write_bool(true);
    write_frame(socket, reply.as_bytes()).await?;
    Ok(true)
}

type OpResult = Result<BinaryWriter, (i32, String)>;

fn missing_cache(id: i32) -> (i32, String) {
    (1000, format!("Cache does not exist [cacheId= {}]", id))
}

fn read_keys(r: &mut BinaryReader<'_>) -> Vec<Value> {
    let n = r.read_i32().unwrap();
    (0..n).map(|_| r.read_value().unwrap()).collect()
}

fn handle(state: &NodeState, op: i16, payload: &[u8]) -> OpResult {
    let mut r = BinaryReader::new(payload);
    let mut out = BinaryWriter::new();
    let op = OpCode::from_code(op).ok_or((2, format!("Invalid op code: {}", op)))?;

    match op {
        OpCode::CacheGetNames => {
            let caches = state.caches.lock();
            out.write_i32(caches.len() as i32);
            for cache in caches.values() {
                out.write_string(&cache.name).unwrap();
            }
            return Ok(out);
        }
        OpCode::CacheCreateWithName => {
            let name = r.read_string().unwrap().unwrap_or_default();
            let mut caches = state.caches.lock();
            let id = hash::cache_id(&name);
            if caches.contains_key(&id) {
                return Err((1001, format!("Cache already exists [name={}]", name)));
            }
            caches.insert(
                id,
                CacheData {
                    name,
                    entries: Vec::new(),
                },
            );
            return Ok(out);
        }
        OpCode::CacheDestroy => {
            let id = r.read_i32().unwrap();
            return match state.caches.lock().remove(&id) {
                Some(_) => Ok(out),
                None => Err(missing_cache(id)),
            };
        }
        OpCode::QueryScanCursorGetPage => {
            let cursor_id = r.read_i64().unwrap();
            let mut cursors = state.cursors.lock();
            let cursor = cursors
                .get_mut(&cursor_id)
                .ok_or((1011, format!("Failed to find resource with id: {}", cursor_id)))?;
            let has_more = write_page(&mut out, cursor);
            if !has_more {
                cursors.remove(&cursor_id);
            }
            return Ok(out);
        }
        OpCode::ResourceClose => {
            let cursor_id = r.read_i64().unwrap();
            return match state.cursors.lock().remove(&cursor_id) {
                Some(_) => Ok(out),
                None => Err((1011, format!("Failed to find resource with id: {}", cursor_id))),
            };
        }
        _ => {}
    }

    let cache_id = r.read_i32().unwrap();
    let _flags = r.read_i8().unwrap();
    let mut caches = state.caches.lock();
    let cache = caches.get_mut(&cache_id).ok_or_else(|| missing_cache(cache_id))?;

    match op {
        OpCode::CacheGet => {
            let key = r.read_value().unwrap();
            let value = cache
                .position(&key)
                .map(|pos| cache.entries[pos].1.clone())
                .unwrap_or(Value::Null);
            out.write_value(&value).unwrap();
        }
        OpCode::CachePut => {
            let key = r.read_value().unwrap();
            let value = r.read_value().unwrap();
            cache.put(key, value);
        }
        OpCode::CacheGetAll => {
            let keys = read_keys(&mut r);
            // Storage order, not request order.
            let found: Vec<_> = cache
                .entries
                .iter()
                .filter(|(k, _)| keys.contains(k))
                .cloned()
                .collect();
            out.write_i32(found.len() as i32);
            for (k, v) in &found {
                out.write_value(k).unwrap();
                out.write_value(v).unwrap();
            }
        }
        OpCode::CachePutAll => {
            let n = r.read_i32().unwrap();
            for _ in 0..n {
                let key = r.read_value().unwrap();
                let value = r.read_value().unwrap();
                cache.put(key, value);
            }
        }
        OpCode::CacheContainsKey => {
            let key = r.read_value().unwrap();
            out.write_bool(cache.position(&key).is_some());
        }
        OpCode::CacheContainsKeys => {
            let keys = read_keys(&mut r);
            out.write_bool(keys.iter().all(|k| cache.position(k).is_some()));
        }
        OpCode::CacheClear | OpCode::CacheRemoveAll => cache.entries.clear(),
        OpCode::CacheClearKey => {
            let key = r.read_value().unwrap();
            cache.remove(&key);
        }
        OpCode::CacheRemoveKey => {
            let key = r.read_value().unwrap();
            out.write_bool(cache.remove(&key));
        }
        OpCode::CacheRemoveKeys => {
            for key in read_keys(&mut r) {
                cache.remove(&key);
            }
        }
        OpCode::CacheGetSize => {
            let modes = r.read_i32().unwrap();
            for _ in 0..modes {
                r.read_i8().unwrap();
            }
            out.write_i64(cache.entries.len() as i64);
        }
        OpCode::QueryScan => {
            let _filter = r.read_value().unwrap();
            let _platform = r.read_i8().unwrap();
            let page_size = r.read_i32().unwrap() as usize;
            let _partition = r.read_i32().unwrap();
            let _local = r.read_bool().unwrap();

            let cursor_id = state.next_cursor.fetch_add(1, Ordering::SeqCst);
            let mut cursor = Cursor {
                remaining: cache.entries.iter().cloned().collect(),
                page_size,
            };
            out.write_i64(cursor_id);
            if write_page(&mut out, &mut cursor) {
                state.cursors.lock().insert(cursor_id, cursor);
            }
        }
        _ => return Err((2, format!("Unsupported op: {}", op))),
    }
    Ok(out)
}

/// Writes the next page; returns whether more pages remain.
fn write_page(out: &mut BinaryWriter, cursor: &mut Cursor) -> bool {
    let n = cursor.page_size.min(cursor.remaining.len());
    out.write_i32(n as i32);
    for (k, v) in cursor.remaining.drain(..n) {
        out.write_value(&k).unwrap();
        out.write_value(&v).unwrap();
    }
    let has_more = !cursor.remaining.is_empty();
    out.write_bool(has_more);
    has_more
}
