//! Dense-array symbol store (§3, §4.6).
//!
//! `data` is the backing array; `id_to_index`/`index_to_id` are the
//! parallel forward/reverse maps that make `delete` an O(1)
//! swap-and-delete instead of a shift. The store assumes an external
//! lock — it holds none itself — matching the teacher's convention of
//! separating data structures from their concurrency wrapper (see
//! `symbol_location_index.rs` for the lock that actually guards this).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{FileId, Position, SymbolId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Struct,
    Enum,
    Interface,
    Trait,
    Variable,
    Constant,
    Module,
    TypeAlias,
    Field,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub file: FileId,
    pub start: Position,
    pub end: Position,
    pub name: String,
    pub kind: SymbolKind,
    pub exported: bool,
    pub signature: Option<String>,
    pub type_info: Option<String>,
}

/// Parallel-array store: no internal locking, callers hold an external
/// lock (§4.6 "Assumes an external lock; the store itself holds none").
#[derive(Debug, Default)]
pub struct SymbolStore {
    data: Vec<Symbol>,
    id_to_index: HashMap<SymbolId, usize>,
    index_to_id: Vec<SymbolId>,
}

impl SymbolStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: SymbolId) -> Option<&Symbol> {
        let idx = *self.id_to_index.get(&id)?;
        self.data.get(idx)
    }

    /// Updates in place if `sym.id` is already present, otherwise
    /// appends and records the reverse index.
    pub fn set(&mut self, id: SymbolId, sym: Symbol) {
        if let Some(&idx) = self.id_to_index.get(&id) {
            self.data[idx] = sym;
            return;
        }
        let idx = self.data.len();
        self.data.push(sym);
        self.id_to_index.insert(id, idx);
        self.index_to_id.push(id);
    }

    /// Swap-and-delete: move the last element into the removed slot and
    /// fix up both the forward and reverse indexes for whichever
    /// element now occupies it.
    pub fn delete(&mut self, id: SymbolId) -> Option<Symbol> {
        let idx = self.id_to_index.remove(&id)?;
        let last_idx = self.data.len() - 1;
        let removed = self.data.swap_remove(idx);
        self.index_to_id.swap_remove(idx);
        if idx != last_idx {
            let moved_id = self.index_to_id[idx];
            self.id_to_index.insert(moved_id, idx);
        }
        Some(removed)
    }

    /// Visit symbols in insertion order via the reverse index.
    pub fn range(&self, mut f: impl FnMut(&Symbol)) {
        for id in &self.index_to_id {
            if let Some(&idx) = self.id_to_index.get(id) {
                f(&self.data[idx]);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn contains(&self, id: SymbolId) -> bool {
        self.id_to_index.contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(id: u64, name: &str) -> Symbol {
        Symbol {
            id: SymbolId::from_raw(id),
            file: FileId::from_raw(1),
            start: Position::new(1, 1),
            end: Position::new(1, 10),
            name: name.to_string(),
            kind: SymbolKind::Function,
            exported: true,
            signature: None,
            type_info: None,
        }
    }

    #[test]
    fn set_then_get_round_trips() {
        let mut store = SymbolStore::new();
        store.set(SymbolId::from_raw(1), sym(1, "foo"));
        assert_eq!(store.get(SymbolId::from_raw(1)).unwrap().name, "foo");
    }

    #[test]
    fn set_on_existing_id_updates_in_place_without_growing() {
        let mut store = SymbolStore::new();
        store.set(SymbolId::from_raw(1), sym(1, "foo"));
        store.set(SymbolId::from_raw(1), sym(1, "bar"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(SymbolId::from_raw(1)).unwrap().name, "bar");
    }

    #[test]
    fn delete_preserves_lookup_for_remaining_symbols() {
        let mut store = SymbolStore::new();
        store.set(SymbolId::from_raw(1), sym(1, "a"));
        store.set(SymbolId::from_raw(2), sym(2, "b"));
        store.set(SymbolId::from_raw(3), sym(3, "c"));

        store.delete(SymbolId::from_raw(1));
        assert!(!store.contains(SymbolId::from_raw(1)));
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(SymbolId::from_raw(2)).unwrap().name, "b");
        assert_eq!(store.get(SymbolId::from_raw(3)).unwrap().name, "c");
    }

    #[test]
    fn range_visits_in_insertion_order() {
        let mut store = SymbolStore::new();
        store.set(SymbolId::from_raw(1), sym(1, "a"));
        store.set(SymbolId::from_raw(2), sym(2, "b"));
        store.set(SymbolId::from_raw(3), sym(3, "c"));
        store.delete(SymbolId::from_raw(1));

        let mut names = Vec::new();
        store.range(|s| names.push(s.name.clone()));
        assert_eq!(names, vec!["c", "b"]);
    }
}
