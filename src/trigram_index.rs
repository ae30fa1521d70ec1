//! Sharded trigram index with deferred invalidation (§4.3).
//!
//! Buckets are independent lock domains so a bulk-indexing pipeline can
//! merge disjoint bucket ranges in parallel (`index_file_bucketed`),
//! mirroring the teacher's per-shard `DashMap`/mutex split. Trigrams are
//! folded to lowercase at index time — both for content and for the
//! query pattern — so the candidate prefilter is always case-blind; the
//! `case_insensitive` flag only changes how `find_match_locations`
//! confirms a match against the real bytes. See DESIGN.md for why this
//! reading of the contract was chosen over indexing both cases.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashSet;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::IndexConfig;
use crate::observability::{self, Counter};
use crate::slab::{PostingList, SlabAllocator};
use crate::types::{FileId, Position, Posting};

/// A 3-character window, either packed ASCII or a short UTF-8 string
/// for runs containing multi-byte characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Trigram {
    Packed(u32),
    Unicode(Box<str>),
}

fn is_alnum_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric()
}

fn pack_ascii(a: u8, b: u8, c: u8) -> u32 {
    ((a.to_ascii_lowercase() as u32) << 16) | ((b.to_ascii_lowercase() as u32) << 8) | (c.to_ascii_lowercase() as u32)
}

/// Extract `(Trigram, byte_offset)` pairs from `text`, folding ASCII
/// case and skipping windows with no alphanumeric character (§4.3).
pub fn extract_trigrams(text: &[u8]) -> Vec<(Trigram, u32)> {
    if text.len() < 3 {
        return Vec::new();
    }
    if text.is_ascii() {
        let mut out = Vec::with_capacity(text.len().saturating_sub(2));
        for i in 0..text.len() - 2 {
            let (a, b, c) = (text[i], text[i + 1], text[i + 2]);
            if !is_alnum_byte(a) && !is_alnum_byte(b) && !is_alnum_byte(c) {
                continue;
            }
            out.push((Trigram::Packed(pack_ascii(a, b, c)), i as u32));
        }
        return out;
    }

    // Non-ASCII: decode to chars, carry byte offsets, and build 3-rune
    // string trigrams. Offsets recorded are byte offsets of the first
    // rune in the window, into the original UTF-8 buffer.
    let text_str = String::from_utf8_lossy(text);
    let chars: Vec<(usize, char)> = text_str.char_indices().collect();
    if chars.len() < 3 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(chars.len().saturating_sub(2));
    for i in 0..chars.len() - 2 {
        let (off, a) = chars[i];
        let (_, b) = chars[i + 1];
        let (_, c) = chars[i + 2];
        if !a.is_alphanumeric() && !b.is_alphanumeric() && !c.is_alphanumeric() {
            continue;
        }
        let folded: String = [a, b, c].iter().flat_map(|ch| ch.to_lowercase()).collect();
        out.push((Trigram::Unicode(folded.into_boxed_str()), off as u32));
    }
    out
}

fn trigram_hash(t: &Trigram) -> u64 {
    match t {
        Trigram::Packed(v) => xxhash_rust::xxh3::xxh3_64(&v.to_le_bytes()),
        Trigram::Unicode(s) => xxhash_rust::xxh3::xxh3_64(s.as_bytes()),
    }
}

type Bucket = Mutex<IndexMap<Trigram, PostingList>>;

struct CacheEntry {
    files: Vec<FileId>,
    inserted_at: Instant,
}

/// Anything that can hand the trigram index raw file bytes and resolve
/// a byte offset back to a line/column. [`ContentStore`](crate::content_store::ContentStore)
/// implements this directly.
pub trait FileAccessor {
    fn content(&self, id: FileId) -> Option<Arc<[u8]>>;
    fn offset_to_position(&self, id: FileId, offset: u32) -> Option<Position>;
}

impl FileAccessor for crate::content_store::ContentStore {
    fn content(&self, id: FileId) -> Option<Arc<[u8]>> {
        crate::content_store::ContentStore::content(self, id)
    }
    fn offset_to_position(&self, id: FileId, offset: u32) -> Option<Position> {
        crate::content_store::ContentStore::offset_to_position(self, id, offset)
    }
}

/// A confirmed literal match location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchLocation {
    pub file: FileId,
    pub line: u32,
    pub column: u32,
    pub offset: u32,
}

pub struct TrigramIndex {
    buckets: Vec<Bucket>,
    bucket_count: usize,
    slab: Arc<SlabAllocator>,
    invalidated_files: DashSet<FileId>,
    bulk_indexing: AtomicBool,
    active_indexing_ops: AtomicI64,
    cleanup_running: AtomicBool,
    sweep_threshold: usize,
    cache: Mutex<IndexMap<String, CacheEntry>>,
    cache_ttl: Duration,
    cache_capacity: usize,
    cache_eviction_fraction: f64,
    cleanup_sweeps: AtomicU64,
}

impl TrigramIndex {
    pub fn new(config: &IndexConfig) -> Arc<Self> {
        let bucket_count = config.bucket_count.next_power_of_two().max(1);
        let buckets = (0..bucket_count).map(|_| Mutex::new(IndexMap::new())).collect();
        let slab = Arc::new(SlabAllocator::new(config.slab_tiers.clone()));
        Arc::new(Self {
            buckets,
            bucket_count,
            slab,
            invalidated_files: DashSet::new(),
            bulk_indexing: AtomicBool::new(false),
            active_indexing_ops: AtomicI64::new(0),
            cleanup_running: AtomicBool::new(false),
            sweep_threshold: config.invalidation_sweep_threshold,
            cache: Mutex::new(IndexMap::new()),
            cache_ttl: config.cache_ttl,
            cache_capacity: config.cache_capacity,
            cache_eviction_fraction: config.cache_eviction_fraction,
            cleanup_sweeps: AtomicU64::new(0),
        })
    }

    pub fn set_bulk_indexing(&self, enabled: bool) {
        self.bulk_indexing.store(enabled, Ordering::Release);
    }

    fn bucket_index(&self, t: &Trigram) -> usize {
        (trigram_hash(t) as usize) & (self.bucket_count - 1)
    }

    fn begin_write(&self) {
        self.active_indexing_ops.fetch_add(1, Ordering::AcqRel);
    }

    fn end_write(&self) {
        self.active_indexing_ops.fetch_sub(1, Ordering::AcqRel);
    }

    /// §4.3: extract trigrams from `content` and append postings.
    pub fn index_file(&self, file: FileId, content: &[u8]) {
        let mut grouped: HashMap<Trigram, Vec<u32>> = HashMap::new();
        for (trigram, offset) in extract_trigrams(content) {
            grouped.entry(trigram).or_default().push(offset);
        }
        self.index_file_trigrams(file, grouped);
    }

    /// Preferred path when trigrams were already extracted in parallel.
    pub fn index_file_trigrams(&self, file: FileId, trigrams: HashMap<Trigram, Vec<u32>>) {
        self.begin_write();
        self.invalidated_files.remove(&file);
        for (trigram, offsets) in trigrams {
            let idx = self.bucket_index(&trigram);
            let mut bucket = self.buckets[idx].lock();
            let list = bucket.entry(trigram).or_insert_with(|| PostingList::new_in(self.slab.clone()));
            list.extend(offsets.into_iter().map(|o| Posting::new(file, o)));
        }
        self.clear_cache();
        self.end_write();
        observability::record(Counter::IndexOps);
        debug!(file = %file, "indexed file into trigram index");
    }

    /// Accepts maps already sharded by bucket index: `buckets[i]` holds
    /// only trigrams that hash into bucket `i`. Lets independent
    /// workers merge disjoint ranges concurrently.
    pub fn index_file_bucketed(&self, file: FileId, per_bucket: Vec<HashMap<Trigram, Vec<u32>>>) {
        self.begin_write();
        self.invalidated_files.remove(&file);
        for (idx, trigrams) in per_bucket.into_iter().enumerate() {
            if idx >= self.bucket_count || trigrams.is_empty() {
                continue;
            }
            let mut bucket = self.buckets[idx].lock();
            for (trigram, offsets) in trigrams {
                let list = bucket.entry(trigram).or_insert_with(|| PostingList::new_in(self.slab.clone()));
                list.extend(offsets.into_iter().map(|o| Posting::new(file, o)));
            }
        }
        self.clear_cache();
        self.end_write();
        observability::record(Counter::IndexOps);
    }

    /// §4.3 "update_file: remove-then-insert". Physically purges every
    /// posting this FileID holds under `old_content`'s trigram set
    /// before inserting `new_content`'s — not the deferred-tombstone
    /// path, since the exact old trigram set is known up front and the
    /// ordering guarantee (no query observes the old content's
    /// positions once this call returns) requires the purge to be
    /// synchronous, not swept in later.
    pub fn update_file(&self, file: FileId, old_content: &[u8], new_content: &[u8]) {
        self.begin_write();

        let old_trigrams: HashSet<Trigram> = extract_trigrams(old_content).into_iter().map(|(t, _)| t).collect();
        for trigram in &old_trigrams {
            let idx = self.bucket_index(trigram);
            let mut bucket = self.buckets[idx].lock();
            if let Some(list) = bucket.get_mut(trigram) {
                list.retain(|p| p.file != file);
                if list.is_empty() {
                    bucket.remove(trigram);
                }
            }
        }
        self.invalidated_files.remove(&file);

        let mut grouped: HashMap<Trigram, Vec<u32>> = HashMap::new();
        for (trigram, offset) in extract_trigrams(new_content) {
            grouped.entry(trigram).or_default().push(offset);
        }
        for (trigram, offsets) in grouped {
            let idx = self.bucket_index(&trigram);
            let mut bucket = self.buckets[idx].lock();
            let list = bucket.entry(trigram).or_insert_with(|| PostingList::new_in(self.slab.clone()));
            list.extend(offsets.into_iter().map(|o| Posting::new(file, o)));
        }

        self.clear_cache();
        self.end_write();
        observability::record(Counter::IndexOps);
        debug!(file = %file, "updated file in trigram index (remove-then-insert)");
    }

    /// Defer removal: mark the FileID invalidated, leave postings in
    /// place, and trigger a background sweep once the tombstone set
    /// crosses the configured threshold. Does not spawn a sweep task —
    /// callers that want the background trigger should go through
    /// [`Self::remove_file`] on an `Arc<TrigramIndex>`.
    fn remove_file_deferred(&self, file: FileId) {
        self.begin_write();
        self.invalidated_files.insert(file);
        self.clear_cache();
        self.end_write();
    }

    /// Public removal entry point: defers the physical removal and, if
    /// not in bulk-indexing mode, triggers a background sweep once the
    /// tombstone set crosses the configured threshold.
    pub fn remove_file(self: &Arc<Self>, file: FileId) {
        self.remove_file_deferred(file);
        if !self.bulk_indexing.load(Ordering::Acquire) {
            self.trigger_cleanup_if_needed();
        }
    }

    /// Run the deferred cleanup sweep if the tombstone count has
    /// crossed the configured threshold; a no-op otherwise. Exposed for
    /// the harness's post-merge phase (§5 phase 4).
    pub fn cleanup_if_needed(self: &Arc<Self>) {
        self.trigger_cleanup_if_needed();
    }

    fn trigger_cleanup_if_needed(self: &Arc<Self>) {
        if self.invalidated_files.len() <= self.sweep_threshold {
            return;
        }
        if self
            .cleanup_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let this = self.clone();
        tokio::task::spawn_blocking(move || {
            this.force_cleanup();
            this.cleanup_running.store(false, Ordering::Release);
        });
    }

    /// Synchronously sweep every bucket, physically removing postings
    /// for invalidated FileIDs and dropping now-empty trigram entries.
    pub fn force_cleanup(&self) {
        if self.invalidated_files.is_empty() {
            return;
        }
        let start = Instant::now();
        for bucket in &self.buckets {
            let mut map = bucket.lock();
            map.retain(|_, postings| {
                postings.retain(|p| !self.invalidated_files.contains(&p.file));
                !postings.is_empty()
            });
        }
        self.invalidated_files.clear();
        self.cleanup_sweeps.fetch_add(1, Ordering::Relaxed);
        observability::record(Counter::CleanupSweeps);
        let elapsed = start.elapsed();
        if elapsed > Duration::from_millis(250) {
            warn!(?elapsed, "trigram index cleanup sweep took longer than expected");
        } else {
            debug!(?elapsed, "trigram index cleanup sweep complete");
        }
    }

    fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    fn candidate_threshold(trigram_count: usize) -> usize {
        if trigram_count <= 3 {
            1
        } else if trigram_count <= 6 {
            3
        } else {
            (trigram_count + 1) / 2
        }
    }

    /// Trigram-prefilter: FileIDs whose distinct-trigram hit count for
    /// `pattern` meets the coverage threshold. Patterns shorter than 3
    /// characters return empty, as does an all-non-alphanumeric pattern.
    pub fn find_candidates(&self, pattern: &str, _case_insensitive: bool) -> Vec<FileId> {
        if pattern.len() < 3 {
            return Vec::new();
        }
        if self.active_indexing_ops.load(Ordering::Acquire) == 0 {
            if let Some(cached) = self.cache_get(pattern) {
                return cached;
            }
        }

        let trigrams: HashSet<Trigram> = extract_trigrams(pattern.as_bytes()).into_iter().map(|(t, _)| t).collect();
        if trigrams.is_empty() {
            return Vec::new();
        }
        let threshold = Self::candidate_threshold(trigrams.len());

        let mut hit_counts: HashMap<FileId, usize> = HashMap::new();
        for trigram in &trigrams {
            let idx = self.bucket_index(trigram);
            let bucket = self.buckets[idx].lock();
            if let Some(postings) = bucket.get(trigram) {
                let distinct_files: HashSet<FileId> = postings.iter().map(|p| p.file).collect();
                for file in distinct_files {
                    *hit_counts.entry(file).or_insert(0) += 1;
                }
            }
        }

        let mut candidates: Vec<FileId> = hit_counts
            .into_iter()
            .filter(|(file, count)| *count >= threshold && !self.invalidated_files.contains(file))
            .map(|(file, _)| file)
            .collect();
        candidates.sort_by_key(|f| f.as_u32());

        if self.active_indexing_ops.load(Ordering::Acquire) == 0 {
            self.cache_put(pattern, candidates.clone());
        }
        observability::record(Counter::SearchOps);
        candidates
    }

    fn cache_get(&self, pattern: &str) -> Option<Vec<FileId>> {
        let mut cache = self.cache.lock();
        if let Some(entry) = cache.get(pattern) {
            if entry.inserted_at.elapsed() < self.cache_ttl {
                observability::record(Counter::CacheHits);
                return Some(entry.files.clone());
            }
            cache.shift_remove(pattern);
        }
        observability::record(Counter::CacheMisses);
        None
    }

    fn cache_put(&self, pattern: &str, files: Vec<FileId>) {
        let mut cache = self.cache.lock();
        if cache.len() >= self.cache_capacity {
            let evict_count = ((cache.len() as f64) * self.cache_eviction_fraction).ceil() as usize;
            for _ in 0..evict_count.max(1) {
                if cache.is_empty() {
                    break;
                }
                cache.shift_remove_index(0);
            }
        }
        cache.insert(
            pattern.to_string(),
            CacheEntry {
                files,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Confirm candidates against real bytes and return exact match
    /// positions. `case_insensitive` governs this confirmation step
    /// only — the trigram prefilter itself is always case-folded.
    pub fn find_match_locations(
        &self,
        pattern: &str,
        case_insensitive: bool,
        accessor: &dyn FileAccessor,
    ) -> Vec<MatchLocation> {
        let candidates = self.find_candidates(pattern, case_insensitive);
        let mut out = Vec::new();
        let needle_lower;
        let needle: &[u8] = if case_insensitive {
            needle_lower = pattern.to_ascii_lowercase();
            needle_lower.as_bytes()
        } else {
            pattern.as_bytes()
        };
        if needle.is_empty() {
            return out;
        }

        for file in candidates {
            let Some(content) = accessor.content(file) else {
                continue;
            };
            let haystack_owned;
            let haystack: &[u8] = if case_insensitive {
                haystack_owned = content.to_ascii_lowercase();
                &haystack_owned
            } else {
                &content
            };
            for offset in find_all(haystack, needle) {
                if let Some(pos) = accessor.offset_to_position(file, offset as u32) {
                    out.push(MatchLocation {
                        file,
                        line: pos.line,
                        column: pos.column,
                        offset: offset as u32,
                    });
                }
            }
        }
        out
    }

    pub fn cleanup_sweep_count(&self) -> u64 {
        self.cleanup_sweeps.load(Ordering::Relaxed)
    }

    pub fn invalidated_count(&self) -> usize {
        self.invalidated_files.len()
    }
}

fn find_all(haystack: &[u8], needle: &[u8]) -> Vec<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut start = 0;
    while start + needle.len() <= haystack.len() {
        if &haystack[start..start + needle.len()] == needle {
            out.push(start);
            start += 1;
        } else {
            start += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;

    fn index() -> Arc<TrigramIndex> {
        TrigramIndex::new(&IndexConfig::default())
    }

    #[test]
    fn short_pattern_returns_no_candidates() {
        let idx = index();
        idx.index_file(FileId::from_raw(1), b"hello world");
        assert!(idx.find_candidates("ab", false).is_empty());
    }

    #[test]
    fn exact_substring_is_found_as_candidate() {
        let idx = index();
        idx.index_file(FileId::from_raw(1), b"the quick brown fox");
        let candidates = idx.find_candidates("quick", false);
        assert_eq!(candidates, vec![FileId::from_raw(1)]);
    }

    #[test]
    fn case_insensitive_prefilter_matches_regardless_of_source_case() {
        let idx = index();
        idx.index_file(FileId::from_raw(1), b"Hello World");
        let candidates = idx.find_candidates("hello", false);
        assert_eq!(candidates, vec![FileId::from_raw(1)]);
    }

    #[test]
    fn unicode_content_indexes_without_panicking() {
        let idx = index();
        idx.index_file(FileId::from_raw(1), "héllo wörld".as_bytes());
        let candidates = idx.find_candidates("wörld", false);
        assert_eq!(candidates, vec![FileId::from_raw(1)]);
    }

    #[test]
    fn remove_file_defers_physical_removal_until_threshold() {
        let idx = index();
        idx.index_file(FileId::from_raw(1), b"needle in a haystack");
        idx.remove_file(FileId::from_raw(1));
        assert_eq!(idx.invalidated_count(), 1);
        // candidates filter out invalidated files even before the sweep
        assert!(idx.find_candidates("needle", false).is_empty());
    }

    #[test]
    fn force_cleanup_clears_tombstones_and_postings() {
        let idx = index();
        idx.index_file(FileId::from_raw(1), b"needle in a haystack");
        idx.remove_file(FileId::from_raw(1));
        idx.force_cleanup();
        assert_eq!(idx.invalidated_count(), 0);
        assert_eq!(idx.cleanup_sweep_count(), 1);
    }

    #[test]
    fn reindex_after_invalidation_clears_tombstone() {
        let idx = index();
        idx.index_file(FileId::from_raw(1), b"needle in a haystack");
        idx.remove_file(FileId::from_raw(1));
        idx.index_file(FileId::from_raw(1), b"needle again");
        assert_eq!(idx.invalidated_count(), 0);
        assert_eq!(idx.find_candidates("needle", false), vec![FileId::from_raw(1)]);
    }

    #[test]
    fn bucketed_indexing_merges_disjoint_buckets() {
        let idx = index();
        let trigrams = extract_trigrams(b"concurrent bucket merge test");
        let mut per_bucket: Vec<HashMap<Trigram, Vec<u32>>> = vec![HashMap::new(); idx.bucket_count];
        for (t, off) in trigrams {
            let b = idx.bucket_index(&t);
            per_bucket[b].entry(t).or_default().push(off);
        }
        idx.index_file_bucketed(FileId::from_raw(7), per_bucket);
        assert_eq!(idx.find_candidates("bucket", false), vec![FileId::from_raw(7)]);
    }

    #[test]
    fn candidate_threshold_matches_spec_tiers() {
        assert_eq!(TrigramIndex::candidate_threshold(2), 1);
        assert_eq!(TrigramIndex::candidate_threshold(3), 1);
        assert_eq!(TrigramIndex::candidate_threshold(4), 3);
        assert_eq!(TrigramIndex::candidate_threshold(6), 3);
        assert_eq!(TrigramIndex::candidate_threshold(7), 4);
        assert_eq!(TrigramIndex::candidate_threshold(10), 5);
    }
}
