//! Word-token postings index, a fast prefilter for literal-word queries
//! (§4.4). Mirrors the trigram index's bucket-sharded concurrency model
//! but stores only first-occurrence offsets: this index is advisory,
//! so callers still confirm matches against real bytes downstream.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::config::IndexConfig;
use crate::observability::{self, Counter};
use crate::slab::{PostingList, SlabAllocator};
use crate::types::{FileId, Posting};

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Scan `content` for runs of `[A-Za-z0-9_]`, lowercase-fold them, and
/// keep the ones that are ≥3 bytes and pure ASCII. Only the first
/// occurrence's offset survives per token (§4.4).
pub fn tokenize(content: &[u8]) -> HashMap<String, u32> {
    let mut tokens: HashMap<String, u32> = HashMap::new();
    let mut i = 0;
    while i < content.len() {
        if !is_token_byte(content[i]) {
            i += 1;
            continue;
        }
        let start = i;
        while i < content.len() && is_token_byte(content[i]) {
            i += 1;
        }
        let raw = &content[start..i];
        if raw.len() >= 3 && raw.is_ascii() {
            let lowered = String::from_utf8_lossy(raw).to_ascii_lowercase();
            tokens.entry(lowered).or_insert(start as u32);
        }
    }
    tokens
}

type Bucket = Mutex<HashMap<String, PostingList>>;

pub struct PostingsIndex {
    buckets: Vec<Bucket>,
    bucket_count: usize,
    slab: Arc<SlabAllocator>,
    file_tokens: DashMap<FileId, Vec<String>>,
    bulk_indexing: AtomicBool,
}

impl PostingsIndex {
    pub fn new(config: &IndexConfig) -> Self {
        let bucket_count = config.bucket_count.next_power_of_two().max(1);
        Self {
            buckets: (0..bucket_count).map(|_| Mutex::new(HashMap::new())).collect(),
            bucket_count,
            slab: Arc::new(SlabAllocator::new(config.slab_tiers.clone())),
            file_tokens: DashMap::new(),
            bulk_indexing: AtomicBool::new(false),
        }
    }

    pub fn set_bulk_indexing(&self, enabled: bool) {
        self.bulk_indexing.store(enabled, Ordering::Release);
    }

    fn bucket_index(&self, token: &str) -> usize {
        (xxhash_rust::xxh3::xxh3_64(token.as_bytes()) as usize) & (self.bucket_count - 1)
    }

    pub fn index_file(&self, file: FileId, content: &[u8]) {
        self.remove_file(file);
        let tokens = tokenize(content);
        let mut token_names = Vec::with_capacity(tokens.len());
        for (token, offset) in tokens {
            let idx = self.bucket_index(&token);
            let mut bucket = self.buckets[idx].lock();
            let slab = self.slab.clone();
            bucket.entry(token.clone()).or_insert_with(|| PostingList::new_in(slab)).push(Posting::new(file, offset));
            token_names.push(token);
        }
        self.file_tokens.insert(file, token_names);
        observability::record(Counter::IndexOps);
    }

    /// O(tokens) removal via the reverse `FileID → tokens` map.
    pub fn remove_file(&self, file: FileId) {
        if let Some((_, tokens)) = self.file_tokens.remove(&file) {
            for token in tokens {
                let idx = self.bucket_index(&token);
                let mut bucket = self.buckets[idx].lock();
                if let Some(files) = bucket.get_mut(&token) {
                    files.retain(|p| p.file != file);
                    if files.is_empty() {
                        bucket.remove(&token);
                    }
                }
            }
        }
    }

    /// `token` is folded to lowercase before lookup regardless of
    /// `case_insensitive` — the index stores only the folded form, so
    /// this flag is preserved for API symmetry with the trigram index
    /// but does not change behavior here.
    pub fn find(&self, token: &str, _case_insensitive: bool) -> (Vec<FileId>, HashMap<FileId, u32>) {
        observability::record(Counter::SearchOps);
        if token.len() < 3 || !token.is_ascii() {
            return (Vec::new(), HashMap::new());
        }
        let folded = token.to_ascii_lowercase();
        let idx = self.bucket_index(&folded);
        let bucket = self.buckets[idx].lock();
        match bucket.get(&folded) {
            Some(postings) => {
                let files: HashMap<FileId, u32> = postings.iter().map(|p| (p.file, p.offset)).collect();
                let mut ids: Vec<FileId> = files.keys().copied().collect();
                ids.sort_by_key(|f| f.as_u32());
                (ids, files)
            }
            None => (Vec::new(), HashMap::new()),
        }
    }

    pub fn token_count_for(&self, file: FileId) -> usize {
        self.file_tokens.get(&file).map(|v| v.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idx() -> PostingsIndex {
        PostingsIndex::new(&IndexConfig::default())
    }

    #[test]
    fn tokenize_skips_short_and_non_ascii_runs() {
        let tokens = tokenize(b"fn ab abc héllo world_1");
        assert!(!tokens.contains_key("fn"));
        assert!(!tokens.contains_key("ab"));
        assert!(tokens.contains_key("abc"));
        assert!(tokens.contains_key("world_1"));
    }

    #[test]
    fn only_first_occurrence_offset_is_kept() {
        let tokens = tokenize(b"hello world hello again");
        assert_eq!(tokens.get("hello"), Some(&0));
    }

    #[test]
    fn find_returns_file_and_offset_after_index() {
        let p = idx();
        p.index_file(FileId::from_raw(1), b"let counter = 0;");
        let (files, offsets) = p.find("counter", false);
        assert_eq!(files, vec![FileId::from_raw(1)]);
        assert_eq!(offsets.get(&FileId::from_raw(1)), Some(&4));
    }

    #[test]
    fn remove_file_drops_all_its_tokens() {
        let p = idx();
        p.index_file(FileId::from_raw(1), b"let counter = 0;");
        p.remove_file(FileId::from_raw(1));
        assert!(p.find("counter", false).0.is_empty());
        assert_eq!(p.token_count_for(FileId::from_raw(1)), 0);
    }

    #[test]
    fn reindex_replaces_previous_tokens() {
        let p = idx();
        p.index_file(FileId::from_raw(1), b"alpha beta");
        p.index_file(FileId::from_raw(1), b"gamma delta");
        assert!(p.find("alpha", false).0.is_empty());
        assert_eq!(p.find("gamma", false).0, vec![FileId::from_raw(1)]);
    }
}
