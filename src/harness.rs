//! Concurrency harness: wires every index into one facade and drives
//! the four-phase indexing pass (§5).
//!
//! Phase 1 ingest: many tasks call `content.load`, serialized by its
//! own writer queue. Phase 2 extract: fully parallel, one task per
//! file, reading content lock-free and writing only task-local output
//! — no shared-state mutation. Phase 3 merge: bounded parallelism,
//! `bulk_indexing` set on every index for the duration so read APIs
//! know structural mutation is underway and must not trust the search
//! cache. Phase 4 post-merge: `bulk_indexing` cleared, the trigram
//! index's deferred cleanup runs if its tombstone threshold was
//! crossed, and the import graph builds single-threaded over the
//! per-file extraction results.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::ast_store::AstStore;
use crate::config::IndexConfig;
use crate::content_store::ContentStore;
use crate::import_resolver::{self, ImportBinding, ImportGraph, Language};
use crate::parsing::{NullParser, ParseTree, Parser};
use crate::path_search::PathSearchIndex;
use crate::postings_index::PostingsIndex;
use crate::symbol_location_index::SymbolLocationIndex;
use crate::symbol_store::{Symbol, SymbolKind, SymbolStore};
use crate::trigram_index::{extract_trigrams, Trigram, TrigramIndex};
use crate::types::{FileId, Position, SymbolIdAllocator};

/// A symbol an extractor found, not yet assigned an ID — the merge
/// phase allocates IDs sequentially under the symbol table's lock.
#[derive(Debug, Clone)]
pub struct ExtractedSymbol {
    pub start: Position,
    pub end: Position,
    pub name: String,
    pub kind: SymbolKind,
    pub exported: bool,
    pub signature: Option<String>,
    pub type_info: Option<String>,
}

/// Per-file symbol extraction is language-specific and outside this
/// crate's scope (§4.6 only specifies storage, not how symbols are
/// found); callers plug in their own. The default never finds any,
/// same posture as [`NullParser`] for AST.
pub trait SymbolExtractor: Send + Sync {
    fn extract(&self, file: FileId, content: &[u8], language: Option<Language>) -> Vec<ExtractedSymbol>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullSymbolExtractor;

impl SymbolExtractor for NullSymbolExtractor {
    fn extract(&self, _file: FileId, _content: &[u8], _language: Option<Language>) -> Vec<ExtractedSymbol> {
        Vec::new()
    }
}

struct SymbolTable {
    store: SymbolStore,
    allocator: SymbolIdAllocator,
}

/// Everything one file's extraction pass produced, read-only input to
/// the merge phase.
pub struct FileExtraction {
    pub file: FileId,
    pub path: String,
    pub content: Arc<[u8]>,
    pub trigrams: std::collections::HashMap<Trigram, Vec<u32>>,
    pub language: Option<Language>,
    pub ast_tree: Option<Arc<dyn ParseTree>>,
    pub import_bindings: Vec<ImportBinding>,
    pub symbols: Vec<ExtractedSymbol>,
}

fn language_for_path(path: &str) -> Option<Language> {
    let ext = path.rsplit('.').next()?;
    Language::from_extension(ext)
}

fn extract_one(
    file: FileId,
    content_store: &ContentStore,
    parser: &dyn Parser,
    symbol_extractor: &dyn SymbolExtractor,
) -> Option<FileExtraction> {
    let content = content_store.content(file)?;
    let path = content_store.path(file).unwrap_or_default();
    let language = language_for_path(&path);

    let mut trigrams: std::collections::HashMap<Trigram, Vec<u32>> = std::collections::HashMap::new();
    for (trigram, offset) in extract_trigrams(&content) {
        trigrams.entry(trigram).or_default().push(offset);
    }

    let ast_tree = language
        .and_then(|lang| parser.parse(&content, lang.tag()))
        .map(|tree| Arc::<dyn ParseTree>::from(tree));

    let content_str = String::from_utf8_lossy(&content);
    let import_bindings = import_resolver::extract_imports(language, &content_str);

    let symbols = symbol_extractor.extract(file, &content, language);

    Some(FileExtraction {
        file,
        path,
        content,
        trigrams,
        language,
        ast_tree,
        import_bindings,
        symbols,
    })
}

/// Owns one instance of every index and drives the phased pipeline
/// over them. Cloning the facade is cheap — every field is an `Arc` or
/// an internally-locked handle, matching `ContentStore`'s own clone
/// contract.
pub struct IndexSet {
    pub content: ContentStore,
    pub trigrams: Arc<TrigramIndex>,
    pub postings: Arc<PostingsIndex>,
    pub locations: Arc<SymbolLocationIndex>,
    pub imports: Arc<ImportGraph>,
    pub paths: Arc<PathSearchIndex>,
    pub ast: Arc<AstStore>,
    symbols: Arc<Mutex<SymbolTable>>,
    parser: Arc<dyn Parser>,
    symbol_extractor: Arc<dyn SymbolExtractor>,
}

impl Clone for IndexSet {
    fn clone(&self) -> Self {
        Self {
            content: self.content.clone(),
            trigrams: self.trigrams.clone(),
            postings: self.postings.clone(),
            locations: self.locations.clone(),
            imports: self.imports.clone(),
            paths: self.paths.clone(),
            ast: self.ast.clone(),
            symbols: self.symbols.clone(),
            parser: self.parser.clone(),
            symbol_extractor: self.symbol_extractor.clone(),
        }
    }
}

impl IndexSet {
    pub fn new(config: &IndexConfig) -> Self {
        Self {
            content: ContentStore::new(config.content_store_byte_cap),
            trigrams: TrigramIndex::new(config),
            postings: Arc::new(PostingsIndex::new(config)),
            locations: Arc::new(SymbolLocationIndex::new()),
            imports: Arc::new(ImportGraph::new()),
            paths: Arc::new(PathSearchIndex::new()),
            ast: Arc::new(AstStore::new()),
            symbols: Arc::new(Mutex::new(SymbolTable {
                store: SymbolStore::new(),
                allocator: SymbolIdAllocator::new(),
            })),
            parser: Arc::new(NullParser),
            symbol_extractor: Arc::new(NullSymbolExtractor),
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn Parser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_symbol_extractor(mut self, extractor: Arc<dyn SymbolExtractor>) -> Self {
        self.symbol_extractor = extractor;
        self
    }

    /// Run all four phases over a batch of `(path, bytes)` pairs and
    /// return the assigned FileIDs in input order.
    pub async fn run_indexing_pass(&self, files: Vec<(String, Vec<u8>)>) -> Vec<FileId> {
        let ids = self.ingest(files).await;
        let extractions = self.extract(ids.clone()).await;
        let merged = self.merge(extractions).await;
        self.post_merge(&merged);
        ids
    }

    /// Phase 1 — many tasks each call `load`; the store's own writer
    /// queue serializes the actual mutation.
    pub async fn ingest(&self, files: Vec<(String, Vec<u8>)>) -> Vec<FileId> {
        let mut handles = Vec::with_capacity(files.len());
        for (path, bytes) in files {
            let store = self.content.clone();
            handles.push(tokio::spawn(async move { store.load(path, bytes).await }));
        }
        let mut ids = Vec::with_capacity(handles.len());
        for handle in handles {
            ids.push(handle.await.unwrap_or(FileId::INVALID));
        }
        ids
    }

    /// Phase 2 — parallel, one blocking task per file; no shared state
    /// is touched here.
    pub async fn extract(&self, file_ids: Vec<FileId>) -> Vec<FileExtraction> {
        let mut handles = Vec::with_capacity(file_ids.len());
        for id in file_ids {
            if !id.is_valid() {
                continue;
            }
            let content_store = self.content.clone();
            let parser = self.parser.clone();
            let symbol_extractor = self.symbol_extractor.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                extract_one(id, &content_store, parser.as_ref(), symbol_extractor.as_ref())
            }));
        }
        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Ok(Some(extraction)) = handle.await {
                out.push(extraction);
            }
        }
        out
    }

    /// Phase 3 — merge per-file output into the shared indexes.
    /// `bulk_indexing` is set for the duration; bucket-level mutexes
    /// inside the trigram/postings indexes mean concurrent merges only
    /// contend when two files happen to hash into the same bucket.
    pub async fn merge(&self, extractions: Vec<FileExtraction>) -> Vec<FileExtraction> {
        self.set_bulk_indexing(true);

        let mut handles = Vec::with_capacity(extractions.len());
        for extraction in extractions {
            let trigrams = self.trigrams.clone();
            let postings = self.postings.clone();
            let paths = self.paths.clone();
            let ast = self.ast.clone();
            handles.push(tokio::spawn(async move {
                trigrams.index_file_trigrams(extraction.file, extraction.trigrams.clone());
                postings.index_file(extraction.file, &extraction.content);
                paths.index_file(extraction.file, &extraction.path);
                if let Some(tree) = extraction.ast_tree.clone() {
                    ast.store(extraction.file, tree, extraction.path.clone(), extraction.language);
                }
                extraction
            }));
        }

        let mut merged = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Ok(extraction) = handle.await {
                merged.push(extraction);
            }
        }

        {
            let mut table = self.symbols.lock();
            for extraction in &merged {
                for draft in &extraction.symbols {
                    let id = table.allocator.allocate();
                    self.locations
                        .insert(extraction.file, id, draft.start.line, draft.start.column, draft.end.line, draft.end.column);
                    table.store.set(
                        id,
                        Symbol {
                            id,
                            file: extraction.file,
                            start: draft.start,
                            end: draft.end,
                            name: draft.name.clone(),
                            kind: draft.kind,
                            exported: draft.exported,
                            signature: draft.signature.clone(),
                            type_info: draft.type_info.clone(),
                        },
                    );
                }
            }
        }

        self.set_bulk_indexing(false);
        merged
    }

    /// Phase 4 — clear `bulk_indexing`, sweep the trigram index if its
    /// tombstone count crossed the threshold, and rebuild the import
    /// graph single-threaded.
    pub fn post_merge(&self, extractions: &[FileExtraction]) {
        for extraction in extractions {
            self.imports.set_bindings(extraction.file, extraction.import_bindings.clone());
        }
        self.trigrams.cleanup_if_needed();
        debug!(files = extractions.len(), "post-merge: import graph rebuilt");
    }

    /// Remove a file from every index (content store, trigram,
    /// postings, path search, AST store, import graph, symbol
    /// locations). The symbol store itself needs its caller to also
    /// drop the symbol rows under the external lock (`with_symbols`).
    pub async fn remove_file(&self, id: FileId) {
        self.content.invalidate_by_id(id).await;
        self.trigrams.remove_file(id);
        self.postings.remove_file(id);
        self.paths.remove_file(id);
        self.ast.remove_file(id);
        self.imports.remove_file(id);
        self.locations.remove_file(id);
    }

    /// Run `f` with exclusive access to the symbol store, the one
    /// structure the spec requires callers to lock externally (§4.6).
    pub fn with_symbols<R>(&self, f: impl FnOnce(&mut SymbolStore) -> R) -> R {
        let mut table = self.symbols.lock();
        f(&mut table.store)
    }

    fn set_bulk_indexing(&self, enabled: bool) {
        self.trigrams.set_bulk_indexing(enabled);
        self.postings.set_bulk_indexing(enabled);
        self.locations.set_bulk_indexing(enabled);
    }
}
