// lci - a local, in-process code-intelligence indexer.
// Root library module.

pub mod ast_store;
pub mod assembly_search;
pub mod config;
pub mod content_store;
pub mod error;
pub mod harness;
pub mod import_resolver;
pub mod observability;
pub mod parsing;
pub mod path_search;
pub mod postings_index;
pub mod slab;
pub mod symbol_location_index;
pub mod symbol_store;
pub mod trigram_index;
pub mod types;
pub mod validation;

// Re-export the core value types every module builds on.
pub use types::{
    ByteRange, FileId, FileIdAllocator, Position, Posting, RelationKind, SymbolId,
    SymbolIdAllocator,
};

pub use error::{LciError, Result};

pub use config::{IndexConfig, IndexConfigBuilder, DEFAULT_SLAB_TIERS};

pub use observability::{init_logging, record, snapshot, Counter, CounterSnapshot};

// Content storage and the slab allocator behind it.
pub use content_store::{ContentStore, FileRecord};
pub use slab::{SlabAllocator, SlabStats, SlabStatsSnapshot, Slice};

// Search and intelligence indexes.
pub use trigram_index::{FileAccessor, MatchLocation, Trigram, TrigramIndex};
pub use postings_index::{tokenize, PostingsIndex};
pub use symbol_store::{Symbol, SymbolKind, SymbolStore};
pub use symbol_location_index::SymbolLocationIndex;
pub use import_resolver::{
    extract_imports, is_exported_by_convention, ImportBinding, ImportGraph, Language, SymbolLookup,
};
pub use path_search::{normalize_path, PathSearchIndex, SearchOptions, SearchType};

// Parsing and AST-derived structure.
pub use parsing::{NodeEvent, NodeInfo, NullParser, ParseTree, Parser};
pub use ast_store::{
    filter, looks_like_graphql, looks_like_sql, AstStore, FilterResult, RangeTag, TaggedRange,
    TemplateFragment, TemplateType,
};

// Assembly / string-reconstruction search.
pub use assembly_search::{search, AssemblyResult, AssemblySearchOptions, Fragment, PatternKind};

// The concurrency harness tying every index together.
pub use harness::{
    ExtractedSymbol, FileExtraction, IndexSet, NullSymbolExtractor, SymbolExtractor,
};
