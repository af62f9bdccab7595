//! In-memory TTL cache of verification results.
//!
//! Entries are keyed by the SHA-256 of the normalized statement (trimmed,
//! whitespace-collapsed, lower-cased), so trivially different spellings of
//! the same claim share one entry. An entry is valid while
//! `now - created < ttl`; expired entries are dropped lazily on lookup or by
//! [`ResultCache::clear_expired`]. Nothing is persisted across restarts.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::CacheConfig;
use crate::models::ClaimRecord;

struct CacheEntry {
    record: ClaimRecord,
    created: Instant,
}

/// Size and TTL, as reported by [`ResultCache::stats`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CacheStats {
    pub size: usize,
    pub ttl_hours: f64,
}

/// Memoizes [`ClaimRecord`]s by statement. Safe to share across tasks.
pub struct ResultCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(Duration::from_secs(config.ttl_hours * 3600))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Deterministic key for `statement`.
    pub fn key(statement: &str) -> String {
        let normalized = statement
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        hex::encode(Sha256::digest(normalized.as_bytes()))
    }

    /// Cached record for `statement`, if present and unexpired.
    ///
    /// An expired entry is removed and reported as absent.
    pub fn get(&self, statement: &str) -> Option<ClaimRecord> {
        let key = Self::key(statement);
        let mut entries = self.lock();
        let fresh = match entries.get(&key) {
            Some(entry) => entry.created.elapsed() < self.ttl,
            None => return None,
        };
        if fresh {
            entries.get(&key).map(|entry| entry.record.clone())
        } else {
            entries.remove(&key);
            None
        }
    }

    /// Insert or overwrite the record for `statement`, stamped now.
    pub fn set(&self, statement: &str, record: ClaimRecord) {
        let entry = CacheEntry {
            record,
            created: Instant::now(),
        };
        self.lock().insert(Self::key(statement), entry);
    }

    /// Remove every expired entry and return how many were removed.
    pub fn clear_expired(&self) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.created.elapsed() < self.ttl);
        before - entries.len()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Current size after an expiry sweep, and the configured TTL.
    pub fn stats(&self) -> CacheStats {
        self.clear_expired();
        CacheStats {
            size: self.lock().len(),
            ttl_hours: self.ttl.as_secs_f64() / 3600.0,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}
