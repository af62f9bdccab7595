//! Cache-aware entry point shared by the CLI, HTTP server, and tools.
//!
//! [`FactChecker`] owns one [`Pipeline`] and one [`ResultCache`]. Single
//! checks consult the cache first; batch checks serve hits from the cache,
//! run only the misses through a [`BatchRunner`], and store every
//! successful record they produce.

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;

use crate::batch::BatchRunner;
use crate::cache::{CacheStats, ResultCache};
use crate::config::{BatchConfig, Config};
use crate::models::{BatchItem, ClaimRecord};
use crate::pipeline::Pipeline;
use crate::router::TierStats;
use crate::search::{ProviderQuota, SearchOutcome};

/// Result of a single check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    /// Whether the record was served from the cache.
    pub cached: bool,
    #[serde(flatten)]
    pub record: ClaimRecord,
}

/// One slot of a batch check, in input order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchEntry {
    pub cached: bool,
    #[serde(flatten)]
    pub item: BatchItem,
}

/// How a batch is executed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BatchMode {
    Parallel { max_concurrent: usize },
    RateLimited { rate_per_second: f64 },
}

impl BatchMode {
    /// Bounded-parallel mode with the configured concurrency.
    pub fn parallel(config: &BatchConfig) -> Self {
        BatchMode::Parallel {
            max_concurrent: config.max_concurrent,
        }
    }

    /// Rate-limited mode with the configured rate.
    pub fn rate_limited(config: &BatchConfig) -> Self {
        BatchMode::RateLimited {
            rate_per_second: config.rate_per_second,
        }
    }
}

/// Snapshot of cache, search quota, and model window usage.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub cache: CacheStats,
    pub search_quota: Vec<ProviderQuota>,
    pub models: Vec<TierStats>,
}

pub struct FactChecker {
    pipeline: Arc<Pipeline>,
    cache: ResultCache,
    batch: BatchConfig,
}

impl FactChecker {
    pub fn new(pipeline: Pipeline, cache: ResultCache, batch: BatchConfig) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            cache,
            batch,
        }
    }

    /// Build the production checker.
    ///
    /// # Errors
    ///
    /// Fails if the pipeline cannot be built (see [`Pipeline::from_config`]).
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            Pipeline::from_config(config)?,
            ResultCache::from_config(&config.cache),
            config.batch.clone(),
        ))
    }

    pub fn batch_settings(&self) -> &BatchConfig {
        &self.batch
    }

    /// Verify one statement, reusing a cached record when allowed.
    pub async fn check(&self, statement: &str, use_cache: bool) -> CheckOutcome {
        if use_cache {
            if let Some(record) = self.cache.get(statement) {
                tracing::debug!(record = %record.id, "cache hit");
                return CheckOutcome {
                    cached: true,
                    record,
                };
            }
        }

        let record = self.pipeline.run(statement).await;
        self.cache.set(statement, record.clone());
        CheckOutcome {
            cached: false,
            record,
        }
    }

    /// Verify many statements, returning one entry per input in order.
    ///
    /// # Errors
    ///
    /// Fails only for an invalid rate in [`BatchMode::RateLimited`].
    pub async fn check_batch(&self, statements: &[String], mode: BatchMode) -> Result<Vec<BatchEntry>> {
        let mut slots: Vec<Option<BatchEntry>> = Vec::with_capacity(statements.len());
        let mut misses = Vec::new();
        let mut miss_slots = Vec::new();

        for (i, statement) in statements.iter().enumerate() {
            match self.cache.get(statement) {
                Some(record) => slots.push(Some(BatchEntry {
                    cached: true,
                    item: BatchItem::Verified(record),
                })),
                None => {
                    slots.push(None);
                    misses.push(statement.clone());
                    miss_slots.push(i);
                }
            }
        }

        tracing::info!(
            total = statements.len(),
            cached = statements.len() - misses.len(),
            "running batch"
        );

        let runner = BatchRunner::new(self.pipeline.clone());
        let items = match mode {
            BatchMode::Parallel { max_concurrent } => {
                runner.run_parallel(&misses, max_concurrent).await
            }
            BatchMode::RateLimited { rate_per_second } => {
                runner.run_rate_limited(&misses, rate_per_second).await?
            }
        };

        for (slot, item) in miss_slots.into_iter().zip(items) {
            if let BatchItem::Verified(record) = &item {
                self.cache.set(record.statement(), record.clone());
            }
            slots[slot] = Some(BatchEntry {
                cached: false,
                item,
            });
        }

        Ok(slots.into_iter().flatten().collect())
    }

    /// Run a web search through the provider chain.
    pub async fn search_web(&self, query: &str) -> SearchOutcome {
        self.pipeline.search().search(query).await
    }

    pub fn quota_status(&self) -> Vec<ProviderQuota> {
        self.pipeline.search().quota_status()
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            cache: self.cache.stats(),
            search_quota: self.quota_status(),
            models: self.pipeline.router().stats(),
        }
    }

    /// Drop expired cache entries; returns how many were removed.
    pub fn sweep_cache(&self) -> usize {
        self.cache.clear_expired()
    }

    /// Drop every cache entry.
    pub fn clear_all(&self) {
        self.cache.clear();
    }
}
