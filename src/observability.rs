//! Structured logging and lightweight counters for the indexing substrate.
//!
//! Initialization follows the teacher's layered-subscriber pattern:
//! environment-driven filtering with a sane default, safe to call more
//! than once (a second `try_init` is treated as already-initialized,
//! not an error — tests call this from many places).

use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INDEX_OPS: AtomicU64 = AtomicU64::new(0);
static SEARCH_OPS: AtomicU64 = AtomicU64::new(0);
static CACHE_HITS: AtomicU64 = AtomicU64::new(0);
static CACHE_MISSES: AtomicU64 = AtomicU64::new(0);
static CLEANUP_SWEEPS: AtomicU64 = AtomicU64::new(0);

/// Initialize tracing with the crate's default filter
/// (`lci_core=warn,error` unless `RUST_LOG` is set).
pub fn init_logging() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lci_core=warn,error"));

    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    match tracing_subscriber::registry().with(env_filter).with(fmt_layer).try_init() {
        Ok(()) => Ok(()),
        Err(_) => Ok(()), // already initialized — fine in tests
    }
}

/// Named counters this crate maintains. Kept deliberately small: the
/// core is a library, not a metrics backend — callers that want
/// full observability wire these into their own exporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    IndexOps,
    SearchOps,
    CacheHits,
    CacheMisses,
    CleanupSweeps,
}

pub fn record(counter: Counter) {
    let atomic = match counter {
        Counter::IndexOps => &INDEX_OPS,
        Counter::SearchOps => &SEARCH_OPS,
        Counter::CacheHits => &CACHE_HITS,
        Counter::CacheMisses => &CACHE_MISSES,
        Counter::CleanupSweeps => &CLEANUP_SWEEPS,
    };
    atomic.fetch_add(1, Ordering::Relaxed);
}

pub fn snapshot() -> CounterSnapshot {
    CounterSnapshot {
        index_ops: INDEX_OPS.load(Ordering::Relaxed),
        search_ops: SEARCH_OPS.load(Ordering::Relaxed),
        cache_hits: CACHE_HITS.load(Ordering::Relaxed),
        cache_misses: CACHE_MISSES.load(Ordering::Relaxed),
        cleanup_sweeps: CLEANUP_SWEEPS.load(Ordering::Relaxed),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub index_ops: u64,
    pub search_ops: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cleanup_sweeps: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let before = snapshot().search_ops;
        record(Counter::SearchOps);
        assert_eq!(snapshot().search_ops, before + 1);
    }
}
