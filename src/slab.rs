//! Size-tiered pooled byte-buffer allocator (§4.2).
//!
//! Backs posting-list storage for the trigram and word-postings indices:
//! instead of letting every bucket merge allocate and drop its own
//! `Vec<u8>`, buffers are drawn from and returned to tier-indexed free
//! pools. The allocator does not track per-slice ownership — a caller
//! that `put`s the same buffer twice corrupts the pool for everyone
//! after it, the same tradeoff the teacher's own pooled buffers make
//! for the sake of avoiding a second allocation on the hot path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::types::{FileId, Posting};

/// A pooled byte buffer. Plain `Vec<u8>`; the type alias exists so call
/// sites read as "slab slice" rather than "vec of bytes".
pub type Slice = Vec<u8>;

#[derive(Debug, Default)]
pub struct SlabStats {
    pub allocations: AtomicU64,
    pub reuses: AtomicU64,
    pub pool_hits: AtomicU64,
}

impl SlabStats {
    pub fn snapshot(&self) -> SlabStatsSnapshot {
        SlabStatsSnapshot {
            allocations: self.allocations.load(Ordering::Relaxed),
            reuses: self.reuses.load(Ordering::Relaxed),
            pool_hits: self.pool_hits.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlabStatsSnapshot {
    pub allocations: u64,
    pub reuses: u64,
    pub pool_hits: u64,
}

/// Size-tiered pool. `tiers` must be ascending; anything above the top
/// tier is served from a single catch-all pool keyed by exact capacity.
pub struct SlabAllocator {
    tiers: Vec<usize>,
    pools: Vec<Mutex<Vec<Slice>>>,
    catch_all: Mutex<Vec<Slice>>,
    stats: SlabStats,
}

impl SlabAllocator {
    pub fn new(tiers: impl Into<Vec<usize>>) -> Self {
        let tiers = tiers.into();
        let pools = tiers.iter().map(|_| Mutex::new(Vec::new())).collect();
        Self {
            tiers,
            pools,
            catch_all: Mutex::new(Vec::new()),
            stats: SlabStats::default(),
        }
    }

    fn tier_index_for(&self, min_cap: usize) -> Option<usize> {
        self.tiers.iter().position(|&tier| tier >= min_cap)
    }

    /// Return an empty slice with capacity at least `min_cap`, drawn
    /// from the matching tier's pool when one is available.
    pub fn get(&self, min_cap: usize) -> Slice {
        if let Some(idx) = self.tier_index_for(min_cap) {
            if let Some(mut buf) = self.pools[idx].lock().pop() {
                buf.clear();
                self.stats.reuses.fetch_add(1, Ordering::Relaxed);
                self.stats.pool_hits.fetch_add(1, Ordering::Relaxed);
                return buf;
            }
            self.stats.allocations.fetch_add(1, Ordering::Relaxed);
            return Vec::with_capacity(self.tiers[idx]);
        }

        let mut catch_all = self.catch_all.lock();
        if let Some(pos) = catch_all.iter().position(|buf| buf.capacity() >= min_cap) {
            let mut buf = catch_all.swap_remove(pos);
            buf.clear();
            self.stats.reuses.fetch_add(1, Ordering::Relaxed);
            self.stats.pool_hits.fetch_add(1, Ordering::Relaxed);
            return buf;
        }
        drop(catch_all);
        self.stats.allocations.fetch_add(1, Ordering::Relaxed);
        Vec::with_capacity(min_cap)
    }

    /// Return `buf` to the pool matching its capacity. The allocator
    /// never inspects contents; the caller must not reference `buf`
    /// again without re-`get`ting it.
    pub fn put(&self, buf: Slice) {
        let cap = buf.capacity();
        if cap == 0 {
            return;
        }
        match self.tier_index_for(cap) {
            Some(idx) => self.pools[idx].lock().push(buf),
            None => self.catch_all.lock().push(buf),
        }
    }

    /// Return a slice whose first `slice.len()` bytes equal `slice`'s,
    /// with capacity at least `slice.len() + additional`. If `slice`
    /// already has enough capacity, it's returned unchanged — no pool
    /// traffic. Otherwise a new slice is drawn via [`get`](Self::get)
    /// and `slice`'s backing buffer is returned to the pool.
    pub fn grow(&self, mut slice: Slice, additional: usize) -> Slice {
        let needed = slice.len() + additional;
        if slice.capacity() >= needed {
            return slice;
        }
        let mut grown = self.get(needed);
        grown.clear();
        grown.extend_from_slice(&slice);
        slice.clear();
        self.put(slice);
        grown
    }

    pub fn stats(&self) -> SlabStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn tiers(&self) -> &[usize] {
        &self.tiers
    }
}

const POSTING_RECORD_BYTES: usize = 8;

fn encode_posting(p: Posting) -> [u8; POSTING_RECORD_BYTES] {
    let mut record = [0u8; POSTING_RECORD_BYTES];
    record[0..4].copy_from_slice(&p.file.as_u32().to_le_bytes());
    record[4..8].copy_from_slice(&p.offset.to_le_bytes());
    record
}

fn decode_posting(record: &[u8]) -> Posting {
    let file = u32::from_le_bytes(record[0..4].try_into().expect("4-byte record half"));
    let offset = u32::from_le_bytes(record[4..8].try_into().expect("4-byte record half"));
    Posting::new(FileId::from_raw(file), offset)
}

/// An append-mostly list of [`Posting`]s whose backing byte buffer is
/// drawn from a [`SlabAllocator`] and handed back to it when the list
/// is dropped (§4.3, §5: "Trigram posting buffers: owned by the slab
/// allocator; … reclaimed only on clear or cleanup sweep under the
/// bucket lock"). Every caller keeps these behind a bucket mutex, so
/// the buffer only ever changes hands while that lock is held — when an
/// `IndexMap`/`HashMap` entry holding one is removed or replaced, or
/// when a cleanup sweep's `retain` drops an empty entry.
///
/// Each posting is packed as two little-endian `u32`s (file id, byte
/// offset); the list itself is just `buf.len() / 8` of those back to
/// back, so growth and in-place compaction (`retain`) never need to
/// decode more than the record they're looking at.
pub struct PostingList {
    slab: Arc<SlabAllocator>,
    buf: Slice,
}

impl PostingList {
    pub fn new_in(slab: Arc<SlabAllocator>) -> Self {
        let buf = slab.get(0);
        Self { slab, buf }
    }

    pub fn len(&self) -> usize {
        self.buf.len() / POSTING_RECORD_BYTES
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn push(&mut self, posting: Posting) {
        if self.buf.capacity() < self.buf.len() + POSTING_RECORD_BYTES {
            let taken = std::mem::take(&mut self.buf);
            self.buf = self.slab.grow(taken, POSTING_RECORD_BYTES);
        }
        self.buf.extend_from_slice(&encode_posting(posting));
    }

    pub fn extend(&mut self, postings: impl IntoIterator<Item = Posting>) {
        for posting in postings {
            self.push(posting);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Posting> + '_ {
        self.buf.chunks_exact(POSTING_RECORD_BYTES).map(decode_posting)
    }

    /// Compact in place, keeping only postings for which `f` returns
    /// `true`. Never reallocates — the buffer stays sized for reuse.
    pub fn retain(&mut self, mut f: impl FnMut(Posting) -> bool) {
        let mut write = 0;
        let mut read = 0;
        while read < self.buf.len() {
            let posting = decode_posting(&self.buf[read..read + POSTING_RECORD_BYTES]);
            if f(posting) {
                if write != read {
                    self.buf.copy_within(read..read + POSTING_RECORD_BYTES, write);
                }
                write += POSTING_RECORD_BYTES;
            }
            read += POSTING_RECORD_BYTES;
        }
        self.buf.truncate(write);
    }
}

impl Drop for PostingList {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        self.slab.put(buf);
    }
}
