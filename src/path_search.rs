//! File-path search over indexed paths (§4.8): glob, regex, and exact
//! modes over a normalized path index, guarded by a single reader/writer
//! lock so concurrent indexing and searches never race.

use std::collections::HashMap;

use globset::{Glob, GlobMatcher};
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::FileId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchType {
    Glob,
    Regex,
    Exact,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOptions {
    pub pattern: String,
    #[serde(rename = "type")]
    pub search_type: SearchType,
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub directories: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_max_results() -> usize {
    100
}

impl SearchOptions {
    pub fn new(pattern: impl Into<String>, search_type: SearchType) -> Self {
        Self {
            pattern: pattern.into(),
            search_type,
            extensions: Vec::new(),
            directories: Vec::new(),
            exclude: Vec::new(),
            max_results: default_max_results(),
        }
    }
}

/// Normalize platform separators to `/` and drop a leading `./`.
pub fn normalize_path(path: &str) -> String {
    let replaced = path.replace('\\', "/");
    replaced.strip_prefix("./").unwrap_or(&replaced).to_string()
}

fn extension_of(path: &str) -> Option<String> {
    let base = path.rsplit('/').next().unwrap_or(path);
    base.rsplit_once('.').map(|(_, ext)| format!(".{}", ext.to_ascii_lowercase()))
}

fn directory_of(path: &str) -> String {
    match path.rfind('/') {
        Some(idx) => path[..idx].to_string(),
        None => String::new(),
    }
}

fn basename_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn has_glob_metachars(pattern: &str) -> bool {
    pattern.chars().any(|c| matches!(c, '*' | '?' | '[' | ']'))
}

#[derive(Default)]
struct Inner {
    path_by_id: HashMap<FileId, String>,
    segments_by_depth: Vec<HashMap<String, Vec<FileId>>>,
    extension_index: HashMap<String, Vec<FileId>>,
    directory_index: HashMap<String, Vec<FileId>>,
    basename_index: HashMap<String, Vec<FileId>>,
}

impl Inner {
    fn remove_from_indexes(&mut self, file: FileId, path: &str) {
        for (depth, seg) in path.split('/').enumerate() {
            if let Some(level) = self.segments_by_depth.get_mut(depth) {
                if let Some(list) = level.get_mut(seg) {
                    list.retain(|&f| f != file);
                }
            }
        }
        if let Some(ext) = extension_of(path) {
            if let Some(list) = self.extension_index.get_mut(&ext) {
                list.retain(|&f| f != file);
            }
        }
        let dir = directory_of(path);
        if let Some(list) = self.directory_index.get_mut(&dir) {
            list.retain(|&f| f != file);
        }
        let base = basename_of(path).to_string();
        if let Some(list) = self.basename_index.get_mut(&base) {
            list.retain(|&f| f != file);
        }
    }

    fn add_to_indexes(&mut self, file: FileId, path: &str) {
        for (depth, seg) in path.split('/').enumerate() {
            while self.segments_by_depth.len() <= depth {
                self.segments_by_depth.push(HashMap::new());
            }
            self.segments_by_depth[depth].entry(seg.to_string()).or_default().push(file);
        }
        if let Some(ext) = extension_of(path) {
            self.extension_index.entry(ext).or_default().push(file);
        }
        self.directory_index.entry(directory_of(path)).or_default().push(file);
        self.basename_index.entry(basename_of(path).to_string()).or_default().push(file);
    }
}

pub struct PathSearchIndex {
    inner: RwLock<Inner>,
}

impl Default for PathSearchIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl PathSearchIndex {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn index_file(&self, file: FileId, path: &str) {
        let normalized = normalize_path(path);
        let mut inner = self.inner.write();
        if let Some(old) = inner.path_by_id.get(&file).cloned() {
            inner.remove_from_indexes(file, &old);
        }
        inner.add_to_indexes(file, &normalized);
        inner.path_by_id.insert(file, normalized);
    }

    pub fn remove_file(&self, file: FileId) {
        let mut inner = self.inner.write();
        if let Some(path) = inner.path_by_id.remove(&file) {
            inner.remove_from_indexes(file, &path);
        }
    }

    pub fn clear(&self) {
        *self.inner.write() = Inner::default();
    }

    pub fn reset(&self) {
        self.clear();
    }

    pub fn path_of(&self, file: FileId) -> Option<String> {
        self.inner.read().path_by_id.get(&file).cloned()
    }

    pub fn search(&self, options: &SearchOptions) -> Vec<FileId> {
        let inner = self.inner.read();
        let candidates = match options.search_type {
            SearchType::Exact => Self::exact_candidates(&inner, &options.pattern),
            SearchType::Regex => Self::regex_candidates(&inner, &options.pattern),
            SearchType::Glob => {
                if has_glob_metachars(&options.pattern) {
                    Self::glob_candidates(&inner, &options.pattern)
                } else {
                    Self::exact_candidates(&inner, &options.pattern)
                }
            }
        };

        let mut results: Vec<FileId> = candidates
            .into_iter()
            .filter(|&file| Self::passes_post_filters(&inner, file, options))
            .collect();

        results.sort_by(|a, b| {
            inner
                .path_by_id
                .get(a)
                .cloned()
                .unwrap_or_default()
                .cmp(&inner.path_by_id.get(b).cloned().unwrap_or_default())
        });
        results.dedup();
        results.truncate(options.max_results.max(1));
        results
    }

    fn exact_candidates(inner: &Inner, pattern: &str) -> Vec<FileId> {
        let normalized = normalize_path(pattern);
        inner
            .path_by_id
            .iter()
            .filter(|(_, path)| **path == normalized)
            .map(|(&file, _)| file)
            .collect()
    }

    fn regex_candidates(inner: &Inner, pattern: &str) -> Vec<FileId> {
        let Ok(re) = Regex::new(pattern) else {
            return Vec::new();
        };
        inner
            .path_by_id
            .iter()
            .filter(|(_, path)| re.is_match(path))
            .map(|(&file, _)| file)
            .collect()
    }

    fn glob_candidates(inner: &Inner, pattern: &str) -> Vec<FileId> {
        let Ok(compiled) = Glob::new(pattern).map(|g| g.compile_matcher()) else {
            return Vec::new();
        };
        let has_separator = pattern.contains('/');

        let seed: Vec<FileId> = Self::seed_candidates(inner, pattern);

        seed.into_iter()
            .filter(|file| {
                let Some(path) = inner.path_by_id.get(file) else {
                    return false;
                };
                Self::glob_matches(&compiled, path, has_separator)
            })
            .collect()
    }

    fn glob_matches(matcher: &GlobMatcher, path: &str, has_separator: bool) -> bool {
        if has_separator {
            matcher.is_match(path)
        } else {
            matcher.is_match(basename_of(path))
        }
    }

    /// Pick the first concrete (non-wildcard) path segment to seed
    /// candidates from `depth → segment`; if every segment is a
    /// wildcard, fall back to scanning all indexed files (§4.8).
    fn seed_candidates(inner: &Inner, pattern: &str) -> Vec<FileId> {
        for (depth, seg) in pattern.split('/').enumerate() {
            if !has_glob_metachars(seg) && !seg.is_empty() {
                if let Some(level) = inner.segments_by_depth.get(depth) {
                    if let Some(hits) = level.get(seg) {
                        return hits.clone();
                    }
                }
                return Vec::new();
            }
        }
        inner.path_by_id.keys().copied().collect()
    }

    fn passes_post_filters(inner: &Inner, file: FileId, options: &SearchOptions) -> bool {
        let Some(path) = inner.path_by_id.get(&file) else {
            return false;
        };

        for exclude in &options.exclude {
            if let Ok(glob) = Glob::new(exclude) {
                if glob.compile_matcher().is_match(path) {
                    return false;
                }
            }
        }

        if !options.extensions.is_empty() {
            let ext = extension_of(path);
            let matches_ext = ext.is_some_and(|e| options.extensions.iter().any(|want| want.eq_ignore_ascii_case(&e)));
            if !matches_ext {
                return false;
            }
        }

        if !options.directories.is_empty() {
            let dir = directory_of(path);
            let matches_dir = options
                .directories
                .iter()
                .any(|pat| Glob::new(pat).map(|g| g.compile_matcher().is_match(&dir)).unwrap_or(false));
            if !matches_dir {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated() -> PathSearchIndex {
        let idx = PathSearchIndex::new();
        idx.index_file(FileId::from_raw(1), "src/auth/login.rs");
        idx.index_file(FileId::from_raw(2), "src/auth/logout.rs");
        idx.index_file(FileId::from_raw(3), "src/db/pool.rs");
        idx.index_file(FileId::from_raw(4), "README.md");
        idx
    }

    #[test]
    fn exact_search_matches_single_normalized_path() {
        let idx = populated();
        let options = SearchOptions::new("src/db/pool.rs", SearchType::Exact);
        assert_eq!(idx.search(&options), vec![FileId::from_raw(3)]);
    }

    #[test]
    fn glob_without_metachars_defers_to_exact() {
        let idx = populated();
        let options = SearchOptions::new("README.md", SearchType::Glob);
        assert_eq!(idx.search(&options), vec![FileId::from_raw(4)]);
    }

    #[test]
    fn glob_seeds_from_first_concrete_segment() {
        let idx = populated();
        let options = SearchOptions::new("src/auth/*.rs", SearchType::Glob);
        let mut results = idx.search(&options);
        results.sort_by_key(|f| f.as_u32());
        assert_eq!(results, vec![FileId::from_raw(1), FileId::from_raw(2)]);
    }

    #[test]
    fn glob_without_separator_matches_basename_only() {
        let idx = populated();
        let options = SearchOptions::new("*.rs", SearchType::Glob);
        let results = idx.search(&options);
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn extension_whitelist_filters_results() {
        let idx = populated();
        let mut options = SearchOptions::new("*", SearchType::Glob);
        options.extensions = vec![".md".to_string()];
        let results = idx.search(&options);
        assert_eq!(results, vec![FileId::from_raw(4)]);
    }

    #[test]
    fn exclude_glob_drops_matches() {
        let idx = populated();
        let mut options = SearchOptions::new("src/auth/*.rs", SearchType::Glob);
        options.exclude = vec!["**/logout.rs".to_string()];
        assert_eq!(idx.search(&options), vec![FileId::from_raw(1)]);
    }

    #[test]
    fn regex_search_matches_against_full_path() {
        let idx = populated();
        let options = SearchOptions::new(r"^src/.*\.rs$", SearchType::Regex);
        assert_eq!(idx.search(&options).len(), 3);
    }

    #[test]
    fn results_are_sorted_and_capped() {
        let idx = populated();
        let mut options = SearchOptions::new("*", SearchType::Glob);
        options.max_results = 2;
        assert_eq!(idx.search(&options).len(), 2);
    }

    #[test]
    fn remove_file_drops_it_from_all_indexes() {
        let idx = populated();
        idx.remove_file(FileId::from_raw(1));
        let options = SearchOptions::new("src/auth/*.rs", SearchType::Glob);
        assert_eq!(idx.search(&options), vec![FileId::from_raw(2)]);
    }
}
