//! Response cache keyed by request fingerprint.
//!
//! Entries are stored serialized so a damaged entry surfaces as a decode
//! error, which is treated as a miss. Expiry is checked lazily on read
//! against the entry creation time; moka's own TTL runs a grace period
//! later and only reclaims memory for keys that are never read again.

use moka::future::Cache;
use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::types::SearchResponse;

const BACKSTOP_GRACE: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct CacheEntry {
    created_at: Instant,
    payload: Vec<u8>,
}

impl CacheEntry {
    fn encode(response: &SearchResponse) -> Result<Self, CacheError> {
        Ok(Self {
            created_at: Instant::now(),
            payload: serde_json::to_vec(response).map_err(CacheError::Serialization)?,
        })
    }

    fn decode(&self) -> Result<SearchResponse, CacheError> {
        serde_json::from_slice(&self.payload).map_err(CacheError::Corrupted)
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
    evicted: AtomicU64,
}

/// Point-in-time cache statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: u64,
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub evicted: u64,
    pub hit_rate: f64,
}

/// Shared handle to the response cache; clones see the same entries
#[derive(Clone)]
pub struct SearchCache {
    inner: Cache<String, Arc<CacheEntry>>,
    ttl: Duration,
    counters: Arc<Counters>,
}

impl SearchCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let counters = Arc::new(Counters::default());
        let listener_counters = counters.clone();
        let inner = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl + BACKSTOP_GRACE)
            .eviction_policy(EvictionPolicy::lru())
            .eviction_listener(move |_key, _value, cause| {
                if cause == RemovalCause::Size {
                    listener_counters.evicted.fetch_add(1, Ordering::Relaxed);
                }
            })
            .build();

        Self {
            inner,
            ttl,
            counters,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_size, config.ttl())
    }

    pub async fn get(&self, key: &str) -> Option<SearchResponse> {
        let Some(entry) = self.inner.get(key).await else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        if entry.created_at.elapsed() > self.ttl {
            debug!("Cache entry expired");
            self.inner.invalidate(key).await;
            self.counters.expired.fetch_add(1, Ordering::Relaxed);
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        match entry.decode() {
            Ok(response) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(response)
            }
            Err(e) => {
                warn!("Dropping cache entry: {}", e);
                self.inner.invalidate(key).await;
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub async fn put(&self, key: String, response: &SearchResponse) {
        match CacheEntry::encode(response) {
            Ok(entry) => self.inner.insert(key, Arc::new(entry)).await,
            Err(e) => warn!("Skipping cache write: {}", e),
        }
    }

    /// Apply pending evictions so `stats().entries` is exact
    #[cfg(test)]
    async fn run_pending_tasks(&self) {
        self.inner.run_pending_tasks().await;
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            entries: self.inner.entry_count(),
            hits,
            misses,
            expired: self.counters.expired.load(Ordering::Relaxed),
            evicted: self.counters.evicted.load(Ordering::Relaxed),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }

    #[cfg(test)]
    async fn insert_raw(&self, key: &str, payload: Vec<u8>) {
        let entry = CacheEntry {
            created_at: Instant::now(),
            payload,
        };
        self.inner.insert(key.to_string(), Arc::new(entry)).await;
    }
}
