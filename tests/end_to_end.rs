//! Crate-level integration tests for the six end-to-end scenarios
//! named in spec.md's "Concrete end-to-end scenarios" list.

use std::collections::HashMap as Map;
use std::fs;

use pretty_assertions::assert_eq;

use lci_core::{
    AssemblySearchOptions, ContentStore, FileId, IndexConfig, SymbolId, SymbolLocationIndex,
    SymbolLookup, SymbolStore, TrigramIndex,
};

fn trigram_index() -> std::sync::Arc<TrigramIndex> {
    TrigramIndex::new(&IndexConfig::default())
}

#[tokio::test]
async fn round_trip_index_and_search() {
    let store = ContentStore::new(None);
    let index = trigram_index();

    let a = store.load("a.txt", b"hello world".to_vec()).await;
    let b = store.load("b.txt", b"hello test".to_vec()).await;
    index.index_file(a, b"hello world");
    index.index_file(b, b"hello test");

    let mut hits = index.find_candidates("hello", false);
    hits.sort_by_key(|f| f.as_u32());
    assert_eq!(hits, vec![a, b]);
    assert!(index.find_candidates("xyz", false).is_empty());

    index.remove_file(a);
    assert_eq!(index.find_candidates("hello", false), vec![b]);
}

#[tokio::test]
async fn update_semantics_replace_old_content() {
    let store = ContentStore::new(None);
    let index = trigram_index();

    let a = store.load("a.txt", b"hello world".to_vec()).await;
    index.index_file(a, b"hello world");

    index.update_file(a, b"hello world", b"hello universe");

    assert!(index.find_candidates("world", false).is_empty());
    assert_eq!(index.find_candidates("universe", false), vec![a]);
    assert_eq!(index.find_candidates("hello", false), vec![a]);
}

#[tokio::test]
async fn crlf_content_reports_grep_compatible_line_number() {
    let store = ContentStore::new(None);
    let index = trigram_index();

    let content = b"pub struct Auth {\r\n    db: Database,\r\n}\r\n\r\nimpl Auth {\r\n    pub fn verify(&self) -> Result<(), String> {\r\n        if !ok { return Err(\"invalid credentials\".into()); }\r\n    }\r\n}".to_vec();
    let file = store.load("auth.rs", content.clone()).await;
    index.index_file(file, &content);

    let matches = index.find_match_locations("invalid credentials", false, &store);
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].line, 7);
}

#[tokio::test]
async fn import_resolution_prefers_candidate_from_imported_package() {
    use lci_core::import_resolver::{ImportBinding, ImportGraph};

    struct FakeLookup {
        declared_in: Map<SymbolId, FileId>,
        exported: Map<SymbolId, bool>,
        packages: Map<SymbolId, String>,
    }
    impl SymbolLookup for FakeLookup {
        fn declared_file(&self, id: SymbolId) -> Option<FileId> {
            self.declared_in.get(&id).copied()
        }
        fn is_exported(&self, id: SymbolId) -> bool {
            *self.exported.get(&id).unwrap_or(&false)
        }
        fn package_path(&self, id: SymbolId) -> Option<String> {
            self.packages.get(&id).cloned()
        }
    }

    let graph = ImportGraph::new();
    let file = FileId::from_raw(1);
    let other_file = FileId::from_raw(2);
    graph.set_bindings(
        file,
        vec![ImportBinding {
            imported_name: "fmt".to_string(),
            original_name: "fmt".to_string(),
            source_file: "fmt".to_string(),
            line: 1,
            is_wildcard: false,
        }],
    );

    // Two candidates both named Println, declared in the same file but
    // from different packages — only the one whose package matches the
    // import binding's source should resolve (spec.md §8 scenario 4).
    let println_fmt = SymbolId::from_raw(1);
    let println_other = SymbolId::from_raw(2);
    let lookup = FakeLookup {
        declared_in: Map::from([(println_fmt, other_file), (println_other, other_file)]),
        exported: Map::from([(println_fmt, true), (println_other, true)]),
        packages: Map::from([(println_fmt, "fmt".to_string()), (println_other, "other".to_string())]),
    };

    let resolved = graph.resolve_reference(file, "fmt", &[println_other, println_fmt], &lookup);
    assert_eq!(resolved, println_fmt);
}

#[tokio::test]
async fn assembly_search_on_jsx_recovers_expected_fragments() {
    let store = ContentStore::new(None);
    let index = trigram_index();
    let symbols = SymbolStore::new();
    let locations = SymbolLocationIndex::new();

    let snippet = b"const el = <Button variant=\"primary\" onClick={handleClick}>Submit</Button>;".to_vec();
    let file = store.load("widget.tsx", snippet.clone()).await;
    index.index_file(file, &snippet);

    let options = AssemblySearchOptions::new(r#"<Button variant="primary" onClick={handleClick}>Submit</Button>"#);
    let results = lci_core::search(&options, &index, &store, &locations, &symbols, None);

    assert!(!results.is_empty(), "expected at least one grouped result");
    let all_fragment_texts: Vec<&str> = results
        .iter()
        .flat_map(|r| r.fragments.iter().map(|f| f.text.as_str()))
        .collect();
    for expected in ["Button", "variant", "primary", "onClick", "handleClick", "Submit"] {
        assert!(all_fragment_texts.contains(&expected), "missing fragment {expected}");
    }
}

#[tokio::test]
async fn capacity_eviction_drops_oldest_files_first() {
    // Write the bodies to a scratch directory first so the test exercises
    // `load` against real on-disk bytes rather than an in-memory literal.
    let scratch = tempfile::tempdir().expect("scratch dir");
    let store = ContentStore::new(Some(1024 * 1024));
    let mut ids = Vec::new();
    for i in 0..20 {
        let path = scratch.path().join(format!("file_{i}.bin"));
        fs::write(&path, vec![b'x'; 100 * 1024]).expect("write scratch file");
        let bytes = fs::read(&path).expect("read scratch file");
        let id = store.load(format!("file_{i}.bin"), bytes).await;
        ids.push(id);
    }

    let alive: Vec<FileId> = ids.iter().copied().filter(|id| store.content(*id).is_some()).collect();
    assert!(alive.len() >= 10, "expected at least 10 survivors, got {}", alive.len());
    assert!(ids.len() - alive.len() >= 10, "expected at least 10 evictions");

    // The most recently loaded files must be among the survivors.
    for id in ids.iter().rev().take(alive.len().min(5)) {
        assert!(store.content(*id).is_some());
    }
}
