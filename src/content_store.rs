//! Centralized file-content store (§4.1).
//!
//! A single writer task serializes all mutations through a bounded
//! request queue; readers hit a concurrent map directly and never
//! block. The map (`dashmap::DashMap`) is the "atomic snapshot of a
//! concurrent map" the design notes call for: its per-shard locking
//! gives readers a consistent prior-or-new record without a torn read,
//! while the writer task is the only caller ever granted a mutable
//! view of the bookkeeping (id allocation, path table, eviction order).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::types::{FileId, FileIdAllocator};

/// One file's immutable content and precomputed position index.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub id: FileId,
    pub path: String,
    pub content: Arc<[u8]>,
    /// `line_offsets[0] == 0`; strictly increasing; element `i` is the
    /// byte offset where line `i + 1` starts.
    pub line_offsets: Arc<[u32]>,
    pub fast_hash: u64,
    pub strong_hash: [u8; 32],
}

impl FileRecord {
    fn cost(&self) -> usize {
        self.content.len() + 4 * self.line_offsets.len() + 64
    }
}

fn compute_line_offsets(content: &[u8]) -> Vec<u32> {
    let mut offsets = vec![0u32];
    for (i, &b) in content.iter().enumerate() {
        if b == b'\n' {
            offsets.push((i + 1) as u32);
        }
    }
    offsets
}

fn fast_hash(content: &[u8]) -> u64 {
    xxhash_rust::xxh3::xxh3_64(content)
}

fn strong_hash(content: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(content);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

enum Command {
    Load {
        path: String,
        bytes: Vec<u8>,
        reply: oneshot::Sender<FileId>,
    },
    Invalidate {
        path: String,
        reply: oneshot::Sender<bool>,
    },
    InvalidateById {
        id: FileId,
        reply: oneshot::Sender<bool>,
    },
    Clear {
        reply: oneshot::Sender<()>,
    },
}

struct Shared {
    records: DashMap<FileId, Arc<FileRecord>>,
    paths: DashMap<String, FileId>,
    closed: AtomicBool,
}

/// Handle to the content store. Cheaply `Clone`-able; all clones share
/// the same backing writer task and maps.
#[derive(Clone)]
pub struct ContentStore {
    shared: Arc<Shared>,
    command_tx: mpsc::Sender<Command>,
}

struct Writer {
    shared: Arc<Shared>,
    allocator: FileIdAllocator,
    insertion_order: std::collections::VecDeque<FileId>,
    total_bytes: usize,
    byte_cap: Option<usize>,
}

impl Writer {
    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Load { path, bytes, reply } => {
                let id = self.load(path, bytes);
                let _ = reply.send(id);
            }
            Command::Invalidate { path, reply } => {
                let removed = self.invalidate_path(&path);
                let _ = reply.send(removed);
            }
            Command::InvalidateById { id, reply } => {
                let removed = self.invalidate_id(id);
                let _ = reply.send(removed);
            }
            Command::Clear { reply } => {
                self.shared.records.clear();
                self.shared.paths.clear();
                self.insertion_order.clear();
                self.total_bytes = 0;
                let _ = reply.send(());
            }
        }
    }

    fn load(&mut self, path: String, bytes: Vec<u8>) -> FileId {
        let new_fast_hash = fast_hash(&bytes);
        let new_strong_hash = strong_hash(&bytes);
        let line_offsets: Arc<[u32]> = compute_line_offsets(&bytes).into();
        let content: Arc<[u8]> = Arc::from(bytes.into_boxed_slice());

        if let Some(existing_id) = self.shared.paths.get(&path).map(|r| *r) {
            if let Some(existing) = self.shared.records.get(&existing_id) {
                if existing.fast_hash == new_fast_hash {
                    return existing_id;
                }
            }
            let record = Arc::new(FileRecord {
                id: existing_id,
                path: path.clone(),
                content,
                line_offsets,
                fast_hash: new_fast_hash,
                strong_hash: new_strong_hash,
            });
            self.replace_record(existing_id, record);
            return existing_id;
        }

        let id = self.allocator.allocate();
        let record = Arc::new(FileRecord {
            id,
            path: path.clone(),
            content,
            line_offsets,
            fast_hash: new_fast_hash,
            strong_hash: new_strong_hash,
        });
        self.shared.paths.insert(path, id);
        self.insertion_order.push_back(id);
        self.insert_record(id, record);
        id
    }

    fn insert_record(&mut self, id: FileId, record: Arc<FileRecord>) {
        self.total_bytes += record.cost();
        self.shared.records.insert(id, record);
        self.enforce_cap();
    }

    fn replace_record(&mut self, id: FileId, record: Arc<FileRecord>) {
        if let Some(old) = self.shared.records.get(&id) {
            self.total_bytes = self.total_bytes.saturating_sub(old.cost());
        }
        self.total_bytes += record.cost();
        self.shared.records.insert(id, record);
        self.enforce_cap();
    }

    fn enforce_cap(&mut self) {
        let Some(cap) = self.byte_cap else { return };
        while self.total_bytes > cap && self.insertion_order.len() > 1 {
            let Some(oldest) = self.insertion_order.pop_front() else {
                break;
            };
            if let Some((_, record)) = self.shared.records.remove(&oldest) {
                self.total_bytes = self.total_bytes.saturating_sub(record.cost());
                self.shared.paths.remove(&record.path);
                debug!(file = %oldest, "evicted oldest file to respect byte cap");
            }
        }
    }

    fn invalidate_path(&mut self, path: &str) -> bool {
        if let Some((_, id)) = self.shared.paths.remove(path) {
            self.remove_id(id);
            true
        } else {
            false
        }
    }

    fn invalidate_id(&mut self, id: FileId) -> bool {
        let Some((_, record)) = self.shared.records.get(&id).map(|r| (id, r.clone())) else {
            return false;
        };
        self.shared.paths.remove(&record.path);
        self.remove_id(id);
        true
    }

    fn remove_id(&mut self, id: FileId) {
        if let Some((_, record)) = self.shared.records.remove(&id) {
            self.total_bytes = self.total_bytes.saturating_sub(record.cost());
        }
        if let Some(pos) = self.insertion_order.iter().position(|&x| x == id) {
            self.insertion_order.remove(pos);
        }
    }
}

impl ContentStore {
    /// Spawn the writer task and return a handle. `byte_cap` bounds the
    /// cumulative accounted cost (§4.1 "Memory policy"); `None` is
    /// unbounded.
    pub fn new(byte_cap: Option<usize>) -> Self {
        let shared = Arc::new(Shared {
            records: DashMap::new(),
            paths: DashMap::new(),
            closed: AtomicBool::new(false),
        });
        let (command_tx, mut command_rx) = mpsc::channel::<Command>(1024);

        let mut writer = Writer {
            shared: shared.clone(),
            allocator: FileIdAllocator::new(),
            insertion_order: std::collections::VecDeque::new(),
            total_bytes: 0,
            byte_cap,
        };

        tokio::spawn(async move {
            while let Some(cmd) = command_rx.recv().await {
                writer.handle(cmd);
            }
            debug!("content store writer drained and shutting down");
        });

        Self { shared, command_tx }
    }

    /// Load `bytes` at `path`. Returns the existing FileID unchanged if
    /// the content's fast hash matches what's already stored.
    pub async fn load(&self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> FileId {
        if self.shared.closed.load(Ordering::Acquire) {
            return FileId::INVALID;
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        let cmd = Command::Load {
            path: path.into(),
            bytes: bytes.into(),
            reply: reply_tx,
        };
        if self.command_tx.send(cmd).await.is_err() {
            return FileId::INVALID;
        }
        reply_rx.await.unwrap_or(FileId::INVALID)
    }

    pub async fn invalidate(&self, path: &str) -> bool {
        if self.shared.closed.load(Ordering::Acquire) {
            return false;
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .command_tx
            .send(Command::Invalidate {
                path: path.to_string(),
                reply: reply_tx,
            })
            .await
            .is_err()
        {
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }

    pub async fn invalidate_by_id(&self, id: FileId) -> bool {
        if self.shared.closed.load(Ordering::Acquire) {
            return false;
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .command_tx
            .send(Command::InvalidateById { id, reply: reply_tx })
            .await
            .is_err()
        {
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }

    pub async fn clear(&self) {
        if self.shared.closed.load(Ordering::Acquire) {
            return;
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.command_tx.send(Command::Clear { reply: reply_tx }).await.is_ok() {
            let _ = reply_rx.await;
        }
    }

    /// Stop accepting writes. Queued commands already sent are still
    /// drained by the writer task; subsequent `load`/`invalidate` calls
    /// return immediately with the closed-store defaults (§4.1, §7).
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    // --- lock-free reads -------------------------------------------------

    pub fn record(&self, id: FileId) -> Option<Arc<FileRecord>> {
        self.shared.records.get(&id).map(|r| r.clone())
    }

    pub fn content(&self, id: FileId) -> Option<Arc<[u8]>> {
        self.record(id).map(|r| r.content.clone())
    }

    pub fn path(&self, id: FileId) -> Option<String> {
        self.record(id).map(|r| r.path.clone())
    }

    pub fn line_offsets(&self, id: FileId) -> Option<Arc<[u32]>> {
        self.record(id).map(|r| r.line_offsets.clone())
    }

    pub fn fast_hash(&self, id: FileId) -> Option<u64> {
        self.record(id).map(|r| r.fast_hash)
    }

    pub fn strong_hash(&self, id: FileId) -> Option<[u8; 32]> {
        self.record(id).map(|r| r.strong_hash)
    }

    pub fn line_count(&self, id: FileId) -> Option<usize> {
        self.record(id).map(|r| r.line_offsets.len())
    }

    /// 1-based line content, with a single trailing `\r` stripped if
    /// present (CRLF, §4.1). Returns `None` if the file or line is
    /// unknown.
    pub fn line(&self, id: FileId, line_number: usize) -> Option<String> {
        let record = self.record(id)?;
        if line_number == 0 || line_number > record.line_offsets.len() {
            return None;
        }
        let start = record.line_offsets[line_number - 1] as usize;
        let end = record
            .line_offsets
            .get(line_number)
            .copied()
            .map(|o| o as usize)
            .unwrap_or(record.content.len());
        let mut slice = &record.content[start..end];
        if slice.ends_with(b"\n") {
            slice = &slice[..slice.len() - 1];
        }
        if slice.ends_with(b"\r") {
            slice = &slice[..slice.len() - 1];
        }
        Some(String::from_utf8_lossy(slice).into_owned())
    }

    /// A contiguous run of `count` lines starting at 1-based `start`.
    /// Out-of-range indices yield an empty vector rather than an error.
    pub fn line_range(&self, id: FileId, start: usize, count: usize) -> Vec<String> {
        let Some(record) = self.record(id) else {
            return Vec::new();
        };
        if start == 0 || count == 0 || start > record.line_offsets.len() {
            return Vec::new();
        }
        (start..(start + count))
            .filter(|&n| n <= record.line_offsets.len())
            .filter_map(|n| self.line(id, n))
            .collect()
    }

    /// Resolve a byte offset to a 1-based `(line, column)` pair via
    /// binary search over the precomputed offsets.
    pub fn offset_to_position(&self, id: FileId, offset: u32) -> Option<crate::types::Position> {
        let record = self.record(id)?;
        let line_idx = match record.line_offsets.binary_search(&offset) {
            Ok(exact) => exact,
            Err(insertion_point) => insertion_point.saturating_sub(1),
        };
        let line_start = record.line_offsets[line_idx];
        let column = offset.saturating_sub(line_start) + 1;
        Some(crate::types::Position::new((line_idx + 1) as u32, column))
    }

    pub fn total_bytes_accounted(&self) -> usize {
        self.shared.records.iter().map(|r| r.cost()).sum()
    }

    pub fn file_count(&self) -> usize {
        self.shared.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> ContentStore {
        ContentStore::new(None)
    }

    #[tokio::test]
    async fn load_assigns_and_reads_back_content() {
        let store = store().await;
        let id = store.load("a.rs", b"hello world".to_vec()).await;
        assert!(id.is_valid());
        assert_eq!(&*store.content(id).unwrap(), b"hello world");
        assert_eq!(&*store.line_offsets(id).unwrap(), &[0]);
    }

    #[tokio::test]
    async fn double_load_identical_bytes_is_noop_and_stable_id() {
        let store = store().await;
        let id1 = store.load("a.rs", b"same".to_vec()).await;
        let id2 = store.load("a.rs", b"same".to_vec()).await;
        assert_eq!(id1, id2);
    }

    #[tokio::test]
    async fn content_change_replaces_same_file_id() {
        let store = store().await;
        let id1 = store.load("a.rs", b"hello world".to_vec()).await;
        let id2 = store.load("a.rs", b"hello universe".to_vec()).await;
        assert_eq!(id1, id2);
        assert_eq!(&*store.content(id2).unwrap(), b"hello universe");
    }

    #[tokio::test]
    async fn no_trailing_newline_line_count_is_newlines_plus_one() {
        let store = store().await;
        let id = store.load("a.txt", b"one\ntwo\nthree".to_vec()).await;
        assert_eq!(store.line_count(id), Some(3));
        assert_eq!(store.line(id, 3).unwrap(), "three");
    }

    #[tokio::test]
    async fn crlf_offsets_count_all_bytes_but_line_strips_cr() {
        let store = store().await;
        let id = store.load("a.txt", b"one\r\ntwo\r\n".to_vec()).await;
        assert_eq!(store.line(id, 1).unwrap(), "one");
        assert_eq!(store.line(id, 2).unwrap(), "two");
        // offsets count the \r bytes
        let offsets = store.line_offsets(id).unwrap();
        assert_eq!(&*offsets, &[0, 5, 10]);
    }

    #[tokio::test]
    async fn invalidate_removes_and_reload_restores() {
        let store = store().await;
        let id = store.load("a.rs", b"hello world".to_vec()).await;
        assert!(store.invalidate("a.rs").await);
        assert!(store.content(id).is_none());
        let id2 = store.load("a.rs", b"hello world".to_vec()).await;
        assert_eq!(&*store.content(id2).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn out_of_bounds_range_is_empty_not_error() {
        let store = store().await;
        let id = store.load("a.rs", b"one\ntwo\n".to_vec()).await;
        assert!(store.line_range(id, 99, 3).is_empty());
    }

    #[tokio::test]
    async fn offset_to_position_matches_binary_search() {
        let store = store().await;
        let id = store.load("a.rs", b"abc\ndef\nghi".to_vec()).await;
        // offset 4 is 'd', start of line 2
        let pos = store.offset_to_position(id, 4).unwrap();
        assert_eq!(pos.line, 2);
        assert_eq!(pos.column, 1);
    }

    #[tokio::test]
    async fn closed_store_load_returns_invalid_id() {
        let store = store().await;
        store.close();
        let id = store.load("a.rs", b"x".to_vec()).await;
        assert_eq!(id, FileId::INVALID);
    }

    #[tokio::test]
    async fn capacity_eviction_drops_oldest_first() {
        let store = ContentStore::new(Some(1024 * 1024));
        let mut ids = Vec::new();
        for i in 0..20 {
            let bytes = vec![b'a'; 100 * 1024];
            let id = store.load(format!("file_{i}.bin"), bytes).await;
            ids.push(id);
        }
        let alive = ids.iter().filter(|id| store.content(**id).is_some()).count();
        assert!(alive >= 10, "expected at least 10 files to survive, got {alive}");
        let evicted = ids.len() - alive;
        assert!(evicted >= 10, "expected at least 10 evictions, got {evicted}");
        // survivors must be the most-recently loaded ones
        for id in ids.iter().rev().take(alive) {
            assert!(store.content(*id).is_some());
        }
    }
}
