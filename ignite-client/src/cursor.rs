//! Scan query cursor.
//!
//! ```text
//! Opened --next()--> Advancing --last page--> Exhausted
//!    \                   |                        |
//!     +------ close() / error / drop -------> Closed
//! ```
//!
//! The first page arrives with the open response. Further pages are fetched
//! lazily, one request each. Once the node reports no more pages it has
//! already released the cursor, so nothing is sent on close.

use crate::cache::{read_entries, Cache};
use crate::connection::Connection;
use crate::error::ClientError;
use bytes::Bytes;
use ignite_protocol::{BinaryReader, BinaryWriter, OpCode, Value};
use std::collections::VecDeque;
use std::sync::Arc;

/// Cursor lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Opened,
    Advancing,
    Exhausted,
    Closed,
}

struct Page {
    entries: Vec<(Value, Value)>,
    has_more: bool,
}

fn read_page(r: &mut BinaryReader<'_>) -> Result<Page, ClientError> {
    let entries = read_entries(r)?;
    let has_more = r.read_bool()?;
    Ok(Page { entries, has_more })
}

fn parse_first_page(payload: Bytes) -> Result<(i64, Page), ClientError> {
    let mut r = BinaryReader::new(&payload);
    let cursor_id = r.read_i64()?;
    Ok((cursor_id, read_page(&mut r)?))
}

fn parse_page(payload: Bytes) -> Result<Page, ClientError> {
    read_page(&mut BinaryReader::new(&payload))
}

/// Forward-only iterator over the entries of a cache.
pub struct ScanCursor {
    conn: Arc<Connection>,
    cache_name: String,
    cursor_id: i64,
    page_size: i32,
    epoch: u64,
    buffer: VecDeque<(Value, Value)>,
    has_more: bool,
    pages: usize,
    state: CursorState,
}

impl ScanCursor {
    pub(crate) async fn open(
        conn: Arc<Connection>,
        cache: &Cache,
        page_size: i32,
    ) -> Result<Self, ClientError> {
        if page_size <= 0 {
            return Err(ClientError::Config(format!(
                "scan page size must be positive, got {}",
                page_size
            )));
        }

        let mut w = BinaryWriter::with_capacity(32);
        w.write_i32(cache.id());
        w.write_i8(cache.flags());
        w.write_null(); // filter
        w.write_i8(1); // filter platform: Java
        w.write_i32(page_size);
        w.write_i32(-1); // all partitions
        w.write_bool(false); // local

        let epoch = conn.epoch();
        let (cursor_id, page) = conn
            .execute_with(OpCode::QueryScan, w.as_bytes(), parse_first_page)
            .await?;
        tracing::debug!(
            "Opened scan cursor {} on {} ({} entries, more={})",
            cursor_id,
            cache.name(),
            page.entries.len(),
            page.has_more
        );

        let mut cursor = Self {
            conn,
            cache_name: cache.name().to_string(),
            cursor_id,
            page_size,
            epoch,
            buffer: VecDeque::new(),
            has_more: true,
            pages: 0,
            state: CursorState::Opened,
        };
        cursor.accept(page);
        Ok(cursor)
    }

    fn accept(&mut self, page: Page) {
        self.pages += 1;
        self.has_more = page.has_more;
        self.buffer.extend(page.entries);
        if !self.has_more && self.buffer.is_empty() {
            self.state = CursorState::Exhausted;
        }
    }

    /// Returns the next entry, fetching a page when the buffer runs dry.
    pub async fn next(&mut self) -> Result<Option<(Value, Value)>, ClientError> {
        loop {
            match self.state {
                CursorState::Closed => return Err(ClientError::CursorClosed),
                CursorState::Exhausted => return Ok(None),
                CursorState::Opened | CursorState::Advancing => {}
            }

            if let Some(entry) = self.buffer.pop_front() {
                self.state = if self.buffer.is_empty() && !self.has_more {
                    CursorState::Exhausted
                } else {
                    CursorState::Advancing
                };
                return Ok(Some(entry));
            }

            if !self.has_more {
                self.state = CursorState::Exhausted;
                return Ok(None);
            }

            if self.conn.epoch() != self.epoch {
                tracing::debug!("Scan cursor {} outlived its session", self.cursor_id);
                self.state = CursorState::Closed;
                return Err(ClientError::CursorClosed);
            }

            self.state = CursorState::Advancing;
            let page = self
                .conn
                .execute_with(
                    OpCode::QueryScanCursorGetPage,
                    &self.cursor_id.to_le_bytes(),
                    parse_page,
                )
                .await;
            match page {
                Ok(page) => self.accept(page),
                Err(err) => {
                    self.state = CursorState::Closed;
                    self.buffer.clear();
                    return Err(err);
                }
            }
        }
    }

    /// Drains the cursor into a vector.
    pub async fn collect_all(mut self) -> Result<Vec<(Value, Value)>, ClientError> {
        let mut out = Vec::new();
        while let Some(entry) = self.next().await? {
            out.push(entry);
        }
        Ok(out)
    }

    /// Whether the node still holds this cursor.
    fn open_on_node(&self) -> bool {
        self.has_more && self.state != CursorState::Closed
    }

    /// Releases the cursor on the node if it is still open there.
    ///
    /// Best effort: a failed release is logged, and the cursor is closed
    /// either way. A fatal failure still tears the session down.
    pub async fn close(&mut self) {
        let release = self.open_on_node() && self.conn.epoch() == self.epoch;
        self.state = CursorState::Closed;
        self.buffer.clear();
        self.has_more = false;

        if !release {
            return;
        }
        if let Err(err) = self
            .conn
            .execute(OpCode::ResourceClose, &self.cursor_id.to_le_bytes())
            .await
        {
            tracing::warn!("Failed to close scan cursor {}: {}", self.cursor_id, err);
        }
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn cursor_id(&self) -> i64 {
        self.cursor_id
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn page_size(&self) -> i32 {
        self.page_size
    }

    /// Pages received so far, the one delivered with the open response included.
    pub fn pages_fetched(&self) -> usize {
        self.pages
    }
}

impl Drop for ScanCursor {
    fn drop(&mut self) {
        if self.open_on_node() {
            self.conn.defer_release(self.epoch, self.cursor_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_bytes(cursor_id: Option<i64>, entries: &[(i32, &str)], has_more: bool) -> Bytes {
        let mut w = BinaryWriter::new();
        if let Some(id) = cursor_id {
            w.write_i64(id);
        }
        w.write_i32(entries.len() as i32);
        for (k, v) in entries {
            w.write_value(&Value::Int(*k)).unwrap();
            w.write_value(&Value::from(*v)).unwrap();
        }
        w.write_bool(has_more);
        w.freeze()
    }

    #[test]
    fn test_parse_first_page() {
        let (id, page) = parse_first_page(page_bytes(Some(77), &[(1, "a"), (2, "b")], true)).unwrap();
        assert_eq!(id, 77);
        assert_eq!(page.entries.len(), 2);
        assert!(page.has_more);
    }

    #[test]
    fn test_parse_last_page() {
        let page = parse_page(page_bytes(None, &[], false)).unwrap();
        assert!(page.entries.is_empty());
        assert!(!page.has_more);
    }

    #[test]
    fn test_parse_page_missing_flag() {
        let mut bytes = page_bytes(None, &[(1, "a")], true).to_vec();
        bytes.pop();
        assert!(matches!(
            parse_page(Bytes::from(bytes)),
            Err(ClientError::Decode(_))
        ));
    }
}
