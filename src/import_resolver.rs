//! Per-language import extraction and reference resolution (§4.7).
//!
//! Extractors are pure functions over source bytes — "populated in a
//! lock-free per-file pass (no shared state)" — compiled once as
//! process-wide statics per the teacher's pattern for its own parser
//! regex tables, then shared across every resolver instance.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::{FileId, SymbolId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportBinding {
    pub imported_name: String,
    pub original_name: String,
    pub source_file: String,
    pub line: u32,
    pub is_wildcard: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Go,
    JavaScriptOrTypeScript,
    Python,
    Rust,
}

impl Language {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.') {
            "go" => Some(Language::Go),
            "js" | "jsx" | "ts" | "tsx" => Some(Language::JavaScriptOrTypeScript),
            "py" => Some(Language::Python),
            "rs" => Some(Language::Rust),
            _ => None,
        }
    }

    /// Short lowercase tag used by the assembly-search language filter
    /// and the parser backend's grammar dispatch.
    pub fn tag(self) -> &'static str {
        match self {
            Language::Go => "go",
            Language::JavaScriptOrTypeScript => "javascript",
            Language::Python => "python",
            Language::Rust => "rust",
        }
    }
}

fn line_of(content: &str, byte_offset: usize) -> u32 {
    1 + content.as_bytes()[..byte_offset.min(content.len())]
        .iter()
        .filter(|&&b| b == b'\n')
        .count() as u32
}

static GO_PLAIN: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?m)^\s*import\s+(?:(\w+)\s+)?"([^"]+)"\s*$"#).unwrap());
static GO_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)import\s*\(([^)]*)\)").unwrap());
static GO_BLOCK_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?m)^\s*(?:(\w+)\s+)?"([^"]+)"\s*$"#).unwrap());

fn go_imported_name(alias: Option<&str>, path: &str) -> String {
    alias
        .map(|a| a.to_string())
        .unwrap_or_else(|| path.rsplit('/').next().unwrap_or(path).to_string())
}

fn extract_go(content: &str) -> Vec<ImportBinding> {
    let mut out = Vec::new();
    for cap in GO_PLAIN.captures_iter(content) {
        let whole = cap.get(0).unwrap();
        let alias = cap.get(1).map(|m| m.as_str());
        let path = cap.get(2).unwrap().as_str();
        out.push(ImportBinding {
            imported_name: go_imported_name(alias, path),
            original_name: path.to_string(),
            source_file: path.to_string(),
            line: line_of(content, whole.start()),
            is_wildcard: false,
        });
    }
    for block in GO_BLOCK.captures_iter(content) {
        let body = block.get(1).unwrap();
        for cap in GO_BLOCK_LINE.captures_iter(body.as_str()) {
            let alias = cap.get(1).map(|m| m.as_str());
            let path = cap.get(2).unwrap().as_str();
            let abs_offset = body.start() + cap.get(0).unwrap().start();
            out.push(ImportBinding {
                imported_name: go_imported_name(alias, path),
                original_name: path.to_string(),
                source_file: path.to_string(),
                line: line_of(content, abs_offset),
                is_wildcard: false,
            });
        }
    }
    out
}

static JS_NAMED: Lazy<Regex> = Lazy::new(|| Regex::new(r#"import\s*\{([^}]*)\}\s*from\s*['"]([^'"]+)['"]"#).unwrap());
static JS_DEFAULT: Lazy<Regex> = Lazy::new(|| Regex::new(r#"import\s+(\w+)\s+from\s*['"]([^'"]+)['"]"#).unwrap());
static JS_NAMESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"import\s*\*\s*as\s+(\w+)\s+from\s*['"]([^'"]+)['"]"#).unwrap());

fn extract_js_ts(content: &str) -> Vec<ImportBinding> {
    let mut out = Vec::new();
    for cap in JS_NAMESPACE.captures_iter(content) {
        let alias = cap.get(1).unwrap().as_str();
        let module = cap.get(2).unwrap().as_str();
        out.push(ImportBinding {
            imported_name: alias.to_string(),
            original_name: "*".to_string(),
            source_file: module.to_string(),
            line: line_of(content, cap.get(0).unwrap().start()),
            is_wildcard: true,
        });
    }
    for cap in JS_NAMED.captures_iter(content) {
        let module = cap.get(2).unwrap().as_str();
        let line = line_of(content, cap.get(0).unwrap().start());
        for item in cap.get(1).unwrap().as_str().split(',') {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            let (original, imported) = match item.split_once(" as ") {
                Some((orig, alias)) => (orig.trim(), alias.trim()),
                None => (item, item),
            };
            out.push(ImportBinding {
                imported_name: imported.to_string(),
                original_name: original.to_string(),
                source_file: module.to_string(),
                line,
                is_wildcard: false,
            });
        }
    }
    for cap in JS_DEFAULT.captures_iter(content) {
        let name = cap.get(1).unwrap().as_str();
        let module = cap.get(2).unwrap().as_str();
        out.push(ImportBinding {
            imported_name: name.to_string(),
            original_name: name.to_string(),
            source_file: module.to_string(),
            line: line_of(content, cap.get(0).unwrap().start()),
            is_wildcard: false,
        });
    }
    out
}

static PY_FROM: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*from\s+(\S+)\s+import\s+(.+)$").unwrap());
static PY_PLAIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*import\s+(\S+)\s*$").unwrap());

fn extract_python(content: &str) -> Vec<ImportBinding> {
    let mut out = Vec::new();
    for cap in PY_FROM.captures_iter(content) {
        let module = cap.get(1).unwrap().as_str();
        let line = line_of(content, cap.get(0).unwrap().start());
        for item in cap.get(2).unwrap().as_str().split(',') {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            let (original, imported) = match item.split_once(" as ") {
                Some((orig, alias)) => (orig.trim(), alias.trim()),
                None => (item, item),
            };
            out.push(ImportBinding {
                imported_name: imported.to_string(),
                original_name: original.to_string(),
                source_file: module.to_string(),
                line,
                is_wildcard: false,
            });
        }
    }
    for cap in PY_PLAIN.captures_iter(content) {
        let module = cap.get(1).unwrap().as_str();
        out.push(ImportBinding {
            imported_name: module.to_string(),
            original_name: module.to_string(),
            source_file: module.to_string(),
            line: line_of(content, cap.get(0).unwrap().start()),
            is_wildcard: false,
        });
    }
    out
}

static RUST_USE: Lazy<Regex> = Lazy::new(|| Regex::new(r"use\s+([\w:]+(?:::\{[^}]*\})?)\s*;").unwrap());

fn extract_rust(content: &str) -> Vec<ImportBinding> {
    let mut out = Vec::new();
    for cap in RUST_USE.captures_iter(content) {
        let path = cap.get(1).unwrap().as_str();
        let line = line_of(content, cap.get(0).unwrap().start());
        if let Some((prefix, group)) = path.split_once("::{") {
            let group = group.trim_end_matches('}');
            for seg in group.split(',') {
                let seg = seg.trim();
                if seg.is_empty() {
                    continue;
                }
                out.push(ImportBinding {
                    imported_name: seg.to_string(),
                    original_name: seg.to_string(),
                    source_file: prefix.to_string(),
                    line,
                    is_wildcard: false,
                });
            }
        } else {
            let last = path.rsplit("::").next().unwrap_or(path);
            let prefix = path.strip_suffix(last).unwrap_or(path).trim_end_matches("::").to_string();
            out.push(ImportBinding {
                imported_name: last.to_string(),
                original_name: last.to_string(),
                source_file: prefix,
                line,
                is_wildcard: false,
            });
        }
    }
    out
}

/// Returns nothing for unknown extensions, per §4.7's dispatch table.
pub fn extract_imports(language: Option<Language>, content: &str) -> Vec<ImportBinding> {
    match language {
        Some(Language::Go) => extract_go(content),
        Some(Language::JavaScriptOrTypeScript) => extract_js_ts(content),
        Some(Language::Python) => extract_python(content),
        Some(Language::Rust) => extract_rust(content),
        None => Vec::new(),
    }
}

/// Per-language exportedness rule (§4.7): Go/Rust approximate via a
/// capital initial, Python via a non-`_` prefix, JS/TS is always
/// exported since the language has no visibility modifiers to read.
pub fn is_exported_by_convention(language: Option<Language>, name: &str) -> bool {
    match language {
        Some(Language::Go) | Some(Language::Rust) => name.chars().next().is_some_and(|c| c.is_uppercase()),
        Some(Language::Python) => !name.starts_with('_'),
        Some(Language::JavaScriptOrTypeScript) => true,
        None => false,
    }
}

/// What `resolve_reference` needs to know about each candidate symbol.
/// Implemented by whatever owns the symbol store — kept as a trait so
/// the resolver has no dependency on `symbol_store`'s concrete type.
pub trait SymbolLookup {
    fn declared_file(&self, id: SymbolId) -> Option<FileId>;
    fn is_exported(&self, id: SymbolId) -> bool;
    /// Package or module path the candidate was declared under, in
    /// whatever form the language's imports name it (e.g. `"fmt"` for
    /// Go, `"x::y"` for Rust) — matched against `ImportBinding::source_file`
    /// in step 1 to tell apart same-named symbols from different origins.
    fn package_path(&self, id: SymbolId) -> Option<String>;
}

/// `FileID → list<ImportBinding>`, built single-threaded after
/// per-file extraction (§4.7, §5 phase 4).
#[derive(Default)]
pub struct ImportGraph {
    bindings: DashMap<FileId, Arc<Vec<ImportBinding>>>,
}

impl ImportGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_bindings(&self, file: FileId, bindings: Vec<ImportBinding>) {
        self.bindings.insert(file, Arc::new(bindings));
    }

    pub fn remove_file(&self, file: FileId) {
        self.bindings.remove(&file);
    }

    pub fn clear(&self) {
        self.bindings.clear();
    }

    pub fn bindings_for(&self, file: FileId) -> Arc<Vec<ImportBinding>> {
        self.bindings.get(&file).map(|r| r.clone()).unwrap_or_default()
    }

    /// Deterministic resolution strategy chain (§4.7, §8 "Import
    /// resolution is deterministic"). Returns `SymbolID::NONE` (0) when
    /// `candidate_ids` is empty.
    pub fn resolve_reference(
        &self,
        ref_file: FileId,
        name: &str,
        candidate_ids: &[SymbolId],
        lookup: &dyn SymbolLookup,
    ) -> SymbolId {
        if candidate_ids.is_empty() {
            return SymbolId::NONE;
        }

        let bindings = self.bindings_for(ref_file);
        let matching_bindings: Vec<&ImportBinding> =
            bindings.iter().filter(|b| b.imported_name == name || b.original_name == name).collect();
        if !matching_bindings.is_empty() {
            if let Some(&hit) = candidate_ids
                .iter()
                .find(|&&c| lookup.package_path(c).is_some_and(|pkg| matching_bindings.iter().any(|b| b.source_file == pkg)))
            {
                return hit;
            }
            if let Some(&hit) = candidate_ids.iter().find(|&&c| lookup.declared_file(c).is_some()) {
                return hit;
            }
        }

        if let Some(&hit) = candidate_ids.iter().find(|&&c| lookup.declared_file(c) == Some(ref_file)) {
            return hit;
        }

        if let Some(&hit) = candidate_ids.iter().find(|&&c| lookup.is_exported(c)) {
            return hit;
        }

        candidate_ids[0]
    }
}
