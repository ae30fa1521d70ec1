//! Assembly search: reconstruct where a target string's pieces live in
//! the codebase (§4.9).
//!
//! The engine is pure with respect to the rest of the crate — it never
//! owns or mutates an index, it only reads through borrowed references
//! handed in by the caller, mirroring the read-only accessor seam the
//! trigram index already exposes to callers like this one.

use std::time::Instant;

use indexmap::IndexSet;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ast_store::AstStore;
use crate::import_resolver::Language;
use crate::symbol_location_index::SymbolLocationIndex;
use crate::symbol_store::SymbolStore;
use crate::trigram_index::{FileAccessor, TrigramIndex};
use crate::types::{FileId, Position};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblySearchOptions {
    pub pattern: String,
    #[serde(default = "default_min_coverage")]
    pub min_coverage: f64,
    #[serde(default = "default_min_fragment_length")]
    pub min_fragment_length: usize,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default)]
    pub languages: Vec<String>,
}

fn default_min_coverage() -> f64 {
    0.7
}
fn default_min_fragment_length() -> usize {
    4
}
fn default_max_results() -> usize {
    20
}

impl AssemblySearchOptions {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            min_coverage: default_min_coverage(),
            min_fragment_length: default_min_fragment_length(),
            max_results: default_max_results(),
            languages: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub text: String,
    pub file: FileId,
    pub location: Position,
    pub in_string_literal: bool,
    pub symbol_context: Option<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Literal,
    Concat,
    /// Reserved for future use; the classifier never emits this today
    /// (§9 Open Question — kept so a scorer that sets it still scores).
    Format,
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyResult {
    pub fragments: Vec<Fragment>,
    pub coverage: f64,
    pub pattern: PatternKind,
    pub file: FileId,
    pub primary_location: Position,
    pub score: f64,
    pub group_id: usize,
}

const SEPARATORS: &[&str] = &[": ", " - ", ", ", " | ", "/", " ", ".", "!", "?"];
const ERROR_KEYWORDS: &[&str] = &["Error", "Warning", "Failed", "Success", "Invalid", "Missing"];
const SIGNIFICANT_WORDS: &[&str] = &[
    "error",
    "warning",
    "success",
    "failed",
    "invalid",
    "missing",
    "required",
    "user",
    "system",
    "database",
    "file",
    "connection",
    "timeout",
    "permission",
    "access",
];

static ERROR_KEYWORD_RES: Lazy<Vec<(String, Regex)>> = Lazy::new(|| {
    ERROR_KEYWORDS
        .iter()
        .map(|kw| (kw.to_string(), Regex::new(&format!(r"(?i)\b{}[^\s:]*", kw)).expect("static error-keyword regex")))
        .collect()
});

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?([A-Za-z][\w.-]*)").unwrap());
static ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([A-Za-z_:][-\w:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|\{([^}]*)\})"#).unwrap());
static TEXT_BETWEEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r">([^<>{}]+)<").unwrap());
static IDENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_.]*").unwrap());

fn looks_like_markup(pattern: &str) -> bool {
    pattern.contains('<') && pattern.contains('>')
}

/// Split on the fixed separator set, drop anything shorter than
/// `min_len`, then fold in canonical error-keyword matches. Dedup
/// preserves first-seen order (§4.9 step 1).
fn extract_text_fragments(pattern: &str, min_len: usize) -> Vec<String> {
    let mut seen: IndexSet<String> = IndexSet::new();

    let mut pieces = vec![pattern.to_string()];
    for sep in SEPARATORS {
        pieces = pieces.iter().flat_map(|p| p.split(*sep).map(str::to_string)).collect();
        // Record fragments at this split granularity before refining
        // further, so phrases split by a coarser separator (": ", " - ",
        // etc.) survive even once a finer one (the bare " ") breaks
        // them down into single words.
        for piece in &pieces {
            let trimmed = piece.trim();
            if trimmed.len() >= min_len {
                seen.insert(trimmed.to_string());
            }
        }
    }

    for (_, re) in ERROR_KEYWORD_RES.iter() {
        for m in re.find_iter(pattern) {
            let text = m.as_str().to_string();
            if text.len() >= min_len {
                seen.insert(text);
            }
        }
    }

    seen.into_iter().collect()
}

/// Regex-scan tag names, attribute names/values, JSX-expression
/// identifiers, classNames, `data-*`/`aria-*` attrs, and inter-tag text
/// (§4.9 step 1, HTML/JSX extractor).
fn extract_markup_fragments(pattern: &str, min_len: usize) -> Vec<String> {
    let mut seen: IndexSet<String> = IndexSet::new();
    let mut push = |text: &str| {
        let trimmed = text.trim();
        if trimmed.len() >= min_len {
            seen.insert(trimmed.to_string());
        }
    };

    for cap in TAG_RE.captures_iter(pattern) {
        push(&cap[1]);
    }

    for cap in ATTR_RE.captures_iter(pattern) {
        push(&cap[1]);
        if let Some(quoted) = cap.get(2).or(cap.get(3)) {
            for token in quoted.as_str().split_whitespace() {
                push(token);
            }
        } else if let Some(expr) = cap.get(4) {
            for ident in IDENT_RE.find_iter(expr.as_str()) {
                push(ident.as_str().trim_end_matches('.'));
            }
        }
    }

    for cap in TEXT_BETWEEN_RE.captures_iter(pattern) {
        push(cap[1].trim());
    }

    seen.into_iter().collect()
}

fn confidence_for(fragment: &str) -> f64 {
    let len = fragment.len() as f64;
    let mut score = 0.5 + 0.5 * (len / 20.0).min(1.0);

    let lower = fragment.to_ascii_lowercase();
    if SIGNIFICANT_WORDS.iter().any(|w| lower.contains(w)) {
        score *= 1.2;
    }
    if fragment.len() < 6 {
        score *= 0.7;
    }
    score.min(1.0)
}

struct LocatedFragment {
    text: String,
    file: FileId,
    location: Position,
    confidence: f64,
}

/// Resolve the enclosing symbol's name at `location`, if any.
fn symbol_context_at(symbol_locations: &SymbolLocationIndex, symbols: &SymbolStore, file: FileId, location: Position) -> Option<String> {
    let id = symbol_locations.find_symbol_at(file, location.line, location.column);
    if !id.is_some() {
        return None;
    }
    symbols.get(id).map(|s| s.name.clone())
}

/// Fragment the pattern, locate each fragment in the trigram index,
/// group matches by file, score each group, and return results sorted
/// by descending score and truncated to `max_results` (§4.9).
pub fn search(
    options: &AssemblySearchOptions,
    trigram_index: &TrigramIndex,
    accessor: &dyn FileAccessor,
    symbol_locations: &SymbolLocationIndex,
    symbols: &SymbolStore,
    ast_store: Option<&AstStore>,
) -> Vec<AssemblyResult> {
    let started = Instant::now();

    let fragment_texts = if looks_like_markup(&options.pattern) {
        extract_markup_fragments(&options.pattern, options.min_fragment_length)
    } else {
        extract_text_fragments(&options.pattern, options.min_fragment_length)
    };

    let mut located: Vec<LocatedFragment> = Vec::new();
    for text in &fragment_texts {
        let confidence = confidence_for(text);
        for m in trigram_index.find_match_locations(text, false, accessor) {
            if !options.languages.is_empty() {
                let matches_language = ast_store
                    .and_then(|store| store.language_of(m.file))
                    .map(|lang| language_matches(lang, &options.languages))
                    .unwrap_or(false);
                if !matches_language {
                    continue;
                }
            }
            located.push(LocatedFragment {
                text: text.clone(),
                file: m.file,
                location: Position::new(m.line, m.column),
                confidence,
            });
        }
    }

    let mut by_file: std::collections::BTreeMap<FileId, Vec<LocatedFragment>> = std::collections::BTreeMap::new();
    for lf in located {
        by_file.entry(lf.file).or_default().push(lf);
    }

    let pattern_len = options.pattern.len().max(1) as f64;
    let mut group_id = 0usize;
    let mut results = Vec::new();

    for (file, group) in by_file {
        let mut by_text: indexmap::IndexMap<String, LocatedFragment> = indexmap::IndexMap::new();
        for lf in group {
            by_text
                .entry(lf.text.clone())
                .and_modify(|existing| {
                    if lf.location < existing.location {
                        existing.location = lf.location;
                    }
                })
                .or_insert(lf);
        }

        let coverage_sum: usize = by_text.keys().map(|t| t.len()).sum();
        let coverage = (coverage_sum as f64 / pattern_len).min(1.0);
        if coverage < options.min_coverage {
            continue;
        }

        let mut fragments: Vec<Fragment> = by_text
            .into_values()
            .map(|lf| Fragment {
                text: lf.text,
                file,
                location: lf.location,
                in_string_literal: false,
                symbol_context: symbol_context_at(symbol_locations, symbols, file, lf.location),
                confidence: lf.confidence,
            })
            .collect();
        fragments.sort_by_key(|f| (f.location.line, f.location.column));

        let pattern_kind = classify_pattern(&fragments);
        let score = score_group(&fragments, coverage, pattern_kind);
        let primary_location = fragments.first().map(|f| f.location).unwrap_or(Position::new(1, 1));

        results.push(AssemblyResult {
            fragments,
            coverage,
            pattern: pattern_kind,
            file,
            primary_location,
            score,
            group_id,
        });
        group_id += 1;
    }

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(options.max_results.max(1));

    let elapsed = started.elapsed();
    if elapsed.as_millis() > 500 {
        debug!(pattern = %options.pattern, elapsed_ms = elapsed.as_millis(), "assembly search exceeded 500ms");
    }

    results
}

fn language_matches(lang: Language, wanted: &[String]) -> bool {
    wanted.iter().any(|w| w.eq_ignore_ascii_case(lang.tag()))
}

fn classify_pattern(fragments: &[Fragment]) -> PatternKind {
    if fragments.len() <= 1 {
        return PatternKind::Literal;
    }
    let max_delta = max_line_delta(fragments);
    if max_delta <= 2 {
        PatternKind::Concat
    } else {
        PatternKind::Unknown
    }
}

fn max_line_delta(fragments: &[Fragment]) -> u32 {
    fragments
        .windows(2)
        .map(|w| w[1].location.line.saturating_sub(w[0].location.line))
        .max()
        .unwrap_or(0)
}

fn score_group(fragments: &[Fragment], coverage: f64, pattern: PatternKind) -> f64 {
    let shared_symbol_context = !fragments.is_empty()
        && fragments
            .first()
            .and_then(|f| f.symbol_context.as_ref())
            .is_some_and(|first| !first.is_empty() && fragments.iter().all(|f| f.symbol_context.as_deref() == Some(first.as_str())));

    let proximity_boost = if shared_symbol_context {
        2.0
    } else {
        match max_line_delta(fragments) {
            d if d <= 5 => 1.5,
            d if d <= 20 => 1.2,
            _ => 1.0,
        }
    };

    let pattern_multiplier = match pattern {
        PatternKind::Concat => 1.2,
        PatternKind::Format => 1.3,
        PatternKind::Literal | PatternKind::Unknown => 1.0,
    };

    let size_penalty = if fragments.len() > 5 { 0.8 } else { 1.0 };

    coverage * 100.0 * proximity_boost * pattern_multiplier * size_penalty
}
