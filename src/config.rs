//! Tunable parameters for every index in the substrate.
//!
//! Defaults match every number named in spec.md: 256 trigram buckets,
//! a 5 minute / 1000-entry result cache with 10% bulk eviction, a
//! 100-entry invalidation sweep threshold, and the tuned slab tiers.
//! Overridable via TOML/env through the `config` crate, the way the
//! teacher layers deployment config under code defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Size tiers used by the slab allocator (§4.2). Powers of two from 8
/// to 4096; allocations above the top tier fall into a catch-all pool.
pub const DEFAULT_SLAB_TIERS: &[usize] = &[8, 16, 32, 64, 128, 256, 512, 1024, 2048, 4096];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Number of trigram/postings buckets. Must be a power of two.
    pub bucket_count: usize,
    /// Result cache time-to-live.
    #[serde(with = "duration_secs")]
    pub cache_ttl: Duration,
    /// Result cache entry cap before bulk eviction kicks in.
    pub cache_capacity: usize,
    /// Fraction of the cache evicted at once on overflow (0.0..=1.0).
    pub cache_eviction_fraction: f64,
    /// Number of tombstoned FileIDs that triggers a background cleanup sweep.
    pub invalidation_sweep_threshold: usize,
    /// Cumulative byte cost cap for the content store; `None` = unbounded.
    pub content_store_byte_cap: Option<usize>,
    /// Slab allocator size tiers, ascending.
    pub slab_tiers: Vec<usize>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            bucket_count: 256,
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 1000,
            cache_eviction_fraction: 0.10,
            invalidation_sweep_threshold: 100,
            content_store_byte_cap: None,
            slab_tiers: DEFAULT_SLAB_TIERS.to_vec(),
        }
    }
}

impl IndexConfig {
    /// Load configuration, layering any `LCI_`-prefixed environment
    /// variables and an optional `lci.toml` file over the built-in
    /// defaults. Never fails on a missing file; only on a malformed one.
    pub fn load() -> anyhow::Result<Self> {
        let defaults = IndexConfig::default();
        let builder = config::Config::builder()
            .add_source(config::Config::try_from(&defaults)?)
            .add_source(config::File::with_name("lci").required(false))
            .add_source(config::Environment::with_prefix("LCI").separator("__"));

        let settings = builder.build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn builder() -> IndexConfigBuilder {
        IndexConfigBuilder::default()
    }
}

/// Fluent builder mirroring the crate's other builder types.
#[derive(Debug, Default)]
pub struct IndexConfigBuilder {
    config: Option<IndexConfig>,
}

impl IndexConfigBuilder {
    fn cfg(&mut self) -> &mut IndexConfig {
        self.config.get_or_insert_with(IndexConfig::default)
    }

    pub fn bucket_count(mut self, count: usize) -> Self {
        self.cfg().bucket_count = count.next_power_of_two();
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cfg().cache_ttl = ttl;
        self
    }

    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cfg().cache_capacity = capacity;
        self
    }

    pub fn invalidation_sweep_threshold(mut self, threshold: usize) -> Self {
        self.cfg().invalidation_sweep_threshold = threshold;
        self
    }

    pub fn content_store_byte_cap(mut self, cap: usize) -> Self {
        self.cfg().content_store_byte_cap = Some(cap);
        self
    }

    pub fn build(self) -> IndexConfig {
        self.config.unwrap_or_default()
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
