//! TTL cache for resolved client configurations.
//!
//! Entries are keyed by client id. Reads never block: a hit is served
//! straight from the map. Populating a miss and invalidating after a write
//! both run under the same per-key async lock, which gives the ordering
//! guarantee writers rely on:
//!
//! - a populate that started before a write either finishes before the
//!   write (and its entry is evicted by it) or starts after and reads the
//!   new row
//! - once `invalidate_with` returns, no entry older than the write remains
//!
//! A reader racing a write may still see the previous value until the
//! eviction lands.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::db::schemas::ClientConfig;
use crate::types::Result;

// =============================================================================
// Configuration
// =============================================================================

/// Settings for the configuration cache.
#[derive(Debug, Clone)]
pub struct ConfigCacheSettings {
    /// How long a resolved configuration stays valid
    pub ttl: Duration,

    /// Maximum number of cached client ids
    pub max_entries: usize,

    /// How often the background sweep runs
    pub cleanup_interval: Duration,
}

impl Default for ConfigCacheSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            max_entries: 10_000,
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

// =============================================================================
// Cached entry
// =============================================================================

struct CachedConfig {
    config: ClientConfig,
    expires_at: Instant,
}

impl CachedConfig {
    fn new(config: ClientConfig, ttl: Duration) -> Self {
        Self {
            config,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

// =============================================================================
// Statistics
// =============================================================================

#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub inserts: AtomicU64,
    /// TTL expiry, capacity eviction, and explicit invalidation
    pub evictions: AtomicU64,
}

impl CacheStats {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
}

// =============================================================================
// Cache
// =============================================================================

/// Client id -> configuration cache with per-key write ordering.
pub struct ConfigCache {
    entries: DashMap<String, CachedConfig>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    settings: ConfigCacheSettings,
    stats: CacheStats,
}

impl ConfigCache {
    pub fn new(settings: ConfigCacheSettings) -> Self {
        Self {
            entries: DashMap::new(),
            locks: DashMap::new(),
            settings,
            stats: CacheStats::default(),
        }
    }

    pub fn settings(&self) -> &ConfigCacheSettings {
        &self.settings
    }

    /// Lock-free lookup. Expired entries count as misses and are dropped.
    pub fn get(&self, client_id: &str) -> Option<ClientConfig> {
        let expired = match self.entries.get(client_id) {
            Some(entry) if !entry.is_expired() => {
                self.stats.record_hit();
                return Some(entry.config.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired && self.entries.remove_if(client_id, |_, e| e.is_expired()).is_some() {
            self.stats.record_eviction();
        }
        self.stats.record_miss();
        None
    }

    /// Return the cached value, or run `populate` under the key lock and
    /// cache its result. A failed populate caches nothing.
    pub async fn get_or_populate<F, Fut>(
        &self,
        client_id: &str,
        populate: F,
    ) -> Result<ClientConfig>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ClientConfig>>,
    {
        if let Some(config) = self.get(client_id) {
            return Ok(config);
        }

        let lock = self.key_lock(client_id);
        let _guard = lock.lock().await;

        // Another task may have populated while we waited
        if let Some(entry) = self.entries.get(client_id) {
            if !entry.is_expired() {
                return Ok(entry.config.clone());
            }
        }

        let config = populate().await?;
        self.insert(client_id, config.clone());
        Ok(config)
    }

    /// Run `write` under the key lock, then evict the key before releasing
    /// it. The entry is evicted whether or not the write succeeded.
    pub async fn invalidate_with<T, F, Fut>(&self, client_id: &str, write: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let lock = self.key_lock(client_id);
        let _guard = lock.lock().await;

        let result = write().await;
        self.invalidate(client_id);
        result
    }

    /// Drop a key immediately
    pub fn invalidate(&self, client_id: &str) -> bool {
        let removed = self.entries.remove(client_id).is_some();
        if removed {
            self.stats.record_eviction();
            debug!(client_id = %client_id, "Evicted cached client configuration");
        }
        removed
    }

    /// Sweep expired entries and idle key locks. Returns entries removed.
    pub fn cleanup(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let removed = before.saturating_sub(self.entries.len());

        self.stats
            .evictions
            .fetch_add(removed as u64, Ordering::Relaxed);

        // Only this map holds an idle lock
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);

        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    fn key_lock(&self, client_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(client_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    fn insert(&self, client_id: &str, config: ClientConfig) {
        if self.entries.len() >= self.settings.max_entries
            && !self.entries.contains_key(client_id)
        {
            self.evict_soonest_expiring();
        }

        self.entries.insert(
            client_id.to_string(),
            CachedConfig::new(config, self.settings.ttl),
        );
        self.stats.record_insert();
    }

    fn evict_soonest_expiring(&self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|entry| entry.expires_at)
            .map(|entry| entry.key().clone());

        if let Some(key) = victim {
            if self.entries.remove(&key).is_some() {
                self.stats.record_eviction();
            }
        }
    }
}

impl Default for ConfigCache {
    fn default() -> Self {
        Self::new(ConfigCacheSettings::default())
    }
}
