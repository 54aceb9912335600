//! Client configuration resolution and updates

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use super::cache::{CacheStatsSnapshot, ConfigCache, ConfigCacheSettings};
use super::defaults::{default_config, default_config_for_name};
use crate::client::{classify, ClientType};
use crate::db::schemas::{ClientConfig, ClientConfiguration};
use crate::db::Storage;
use crate::types::Result;

/// Partial row update. Omitted parts keep the stored value, or the
/// built-in default when no row exists yet.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigUpdate {
    #[serde(default)]
    pub config: Option<ClientConfig>,
    #[serde(default)]
    pub client_type: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl ConfigUpdate {
    pub fn config(config: ClientConfig) -> Self {
        Self {
            config: Some(config),
            ..Default::default()
        }
    }
}

/// Resolves the effective configuration for a client and keeps the cache
/// coherent with writes.
pub struct ClientConfigStore {
    storage: Arc<dyn Storage>,
    cache: ConfigCache,
}

impl ClientConfigStore {
    pub fn new(storage: Arc<dyn Storage>, settings: ConfigCacheSettings) -> Self {
        Self {
            storage,
            cache: ConfigCache::new(settings),
        }
    }

    /// Effective configuration for a client.
    ///
    /// An active stored row wins; otherwise the default for `client_type`.
    /// A storage failure falls back to the default without caching it.
    pub async fn resolve(&self, client_id: &str, client_type: ClientType) -> ClientConfig {
        let storage = &self.storage;
        let resolved = self
            .cache
            .get_or_populate(client_id, || async move {
                Ok(match storage.find_client_configuration(client_id).await? {
                    Some(row) if row.is_active => row.config,
                    _ => default_config(client_type),
                })
            })
            .await;

        match resolved {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    client_id = %client_id,
                    error = %e,
                    "Configuration lookup failed, using defaults"
                );
                default_config(client_type)
            }
        }
    }

    /// Persist a configuration change. The cached entry is evicted before
    /// this returns.
    pub async fn update(
        &self,
        client_id: &str,
        update: ConfigUpdate,
    ) -> Result<ClientConfiguration> {
        let storage = &self.storage;
        let saved = self
            .cache
            .invalidate_with(client_id, || async move {
                let existing = storage.find_client_configuration(client_id).await?;
                let row = merge_update(client_id, existing, update);
                storage.upsert_client_configuration(row).await
            })
            .await?;

        info!(
            client_id = %saved.client_id,
            client_type = %saved.client_type,
            is_active = saved.is_active,
            "Client configuration updated"
        );

        Ok(saved)
    }

    /// Drop expired cache entries
    pub fn cleanup(&self) -> usize {
        self.cache.cleanup()
    }

    pub fn cache_stats(&self) -> CacheStatsSnapshot {
        self.cache.stats()
    }

    pub fn cache_settings(&self) -> &ConfigCacheSettings {
        self.cache.settings()
    }
}

/// Periodically drop expired entries from the store's cache
pub fn spawn_cleanup_task(store: Arc<ClientConfigStore>) {
    let interval = store.cache_settings().cleanup_interval;

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = store.cleanup();
            if removed > 0 {
                let stats = store.cache_stats();
                debug!(
                    removed = removed,
                    hits = stats.hits,
                    misses = stats.misses,
                    "Config cache cleanup completed"
                );
            }
        }
    });

    info!(
        interval_secs = interval.as_secs(),
        "Config cache cleanup task started"
    );
}

fn merge_update(
    client_id: &str,
    existing: Option<ClientConfiguration>,
    update: ConfigUpdate,
) -> ClientConfiguration {
    let client_type = update
        .client_type
        .or_else(|| existing.as_ref().map(|row| row.client_type.clone()))
        .unwrap_or_else(|| classify(client_id).as_str().to_string());

    let config = update
        .config
        .or_else(|| existing.as_ref().map(|row| row.config.clone()))
        .unwrap_or_else(|| default_config_for_name(&client_type));

    let is_active = update
        .is_active
        .or_else(|| existing.as_ref().map(|row| row.is_active))
        .unwrap_or(true);

    ClientConfiguration::new(client_id, client_type, config).active(is_active)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    fn store() -> (Arc<MemoryStore>, ClientConfigStore) {
        let memory = Arc::new(MemoryStore::new());
        let store = ClientConfigStore::new(memory.clone(), ConfigCacheSettings::default());
        (memory, store)
    }

    #[tokio::test]
    async fn test_resolve_without_row_uses_type_default() {
        let (_, store) = store();
        let config = store
            .resolve("general_hospital", ClientType::LegacyHospital)
            .await;
        assert_eq!(config, default_config(ClientType::LegacyHospital));
    }

    #[tokio::test]
    async fn test_update_then_resolve_returns_new_config() {
        let (_, store) = store();

        // Warm the cache with the default
        let before = store.resolve("clinic_a", ClientType::ModernClinic).await;
        assert!(!before.audit_enabled);

        let mut next = ClientConfig::new(&["email", "phone"], true, 50, false);
        next.extra.insert("theme".into(), serde_json::json!("dark"));
        store
            .update("clinic_a", ConfigUpdate::config(next.clone()))
            .await
            .unwrap();

        let after = store.resolve("clinic_a", ClientType::ModernClinic).await;
        assert_eq!(after, next);
    }

    #[tokio::test]
    async fn test_inactive_row_falls_back_to_default() {
        let (memory, store) = store();
        memory
            .upsert_client_configuration(
                ClientConfiguration::new(
                    "mobile_x",
                    "mobile_app",
                    ClientConfig::new(&[], true, 1, true),
                )
                .active(false),
            )
            .await
            .unwrap();

        let config = store.resolve("mobile_x", ClientType::MobileApp).await;
        assert_eq!(config, default_config(ClientType::MobileApp));
    }

    #[tokio::test]
    async fn test_update_without_config_seeds_type_default() {
        let (_, store) = store();
        let saved = store
            .update(
                "anything",
                ConfigUpdate {
                    client_type: Some("legacy_hospital".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(saved.client_type, "legacy_hospital");
        assert_eq!(saved.config, default_config(ClientType::LegacyHospital));
        assert!(saved.is_active);
    }

    #[tokio::test]
    async fn test_partial_update_keeps_stored_parts() {
        let (_, store) = store();
        let custom = ClientConfig::new(&["email"], true, 77, true);
        store
            .update("clinic_b", ConfigUpdate::config(custom.clone()))
            .await
            .unwrap();

        let saved = store
            .update(
                "clinic_b",
                ConfigUpdate {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(saved.config, custom);
        assert_eq!(saved.client_type, "modern_clinic");
        assert!(!saved.is_active);

        let resolved = store.resolve("clinic_b", ClientType::ModernClinic).await;
        assert_eq!(resolved, default_config(ClientType::ModernClinic));
    }
}
