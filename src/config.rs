//! Configuration for chartway
//!
//! CLI arguments and environment variable handling using clap.

use clap::{Parser, ValueEnum};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

use crate::tenants::ConfigCacheSettings;

/// Where records and configuration rows live
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackend {
    /// Process-local maps, lost on restart
    Memory,
    /// MongoDB at MONGODB_URI
    Mongo,
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackend::Memory => write!(f, "memory"),
            StorageBackend::Mongo => write!(f, "mongo"),
        }
    }
}

/// Chartway - client-adaptive healthcare records gateway
#[derive(Parser, Debug, Clone)]
#[command(name = "chartway")]
#[command(about = "Serves one patient record store to legacy, modern, and mobile clients")]
pub struct Args {
    /// Unique node identifier, stamped on audit events
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8000")]
    pub listen: SocketAddr,

    /// Enable development mode (falls back to memory storage when MongoDB is unreachable)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Storage backend
    #[arg(long, env = "STORAGE_BACKEND", value_enum, default_value_t = StorageBackend::Mongo)]
    pub storage_backend: StorageBackend,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "chartway")]
    pub mongodb_db: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Seconds a resolved client configuration stays cached
    #[arg(long, env = "CONFIG_CACHE_TTL_SECS", default_value = "3600")]
    pub config_cache_ttl_secs: u64,

    /// Maximum cached client configurations
    #[arg(long, env = "CONFIG_CACHE_MAX_ENTRIES", default_value = "10000")]
    pub config_cache_max_entries: usize,

    /// Comma-separated client ids audited regardless of their configuration
    #[arg(
        long,
        env = "AUDIT_ENABLED_CLIENTS",
        default_value = "premium_clinic_1,premium_clinic_2"
    )]
    pub audit_enabled_clients: String,

    /// Append audit events to this file as JSON lines
    #[arg(long, env = "AUDIT_LOG_PATH")]
    pub audit_log_path: Option<PathBuf>,

    /// Admin API key for configuration updates (X-API-Key header)
    #[arg(long, env = "API_KEY_ADMIN")]
    pub api_key_admin: Option<String>,
}

impl Args {
    /// Client ids that are always audited
    pub fn audit_client_list(&self) -> Vec<String> {
        self.audit_enabled_clients
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Cache settings derived from the arguments
    pub fn cache_settings(&self) -> ConfigCacheSettings {
        ConfigCacheSettings {
            ttl: Duration::from_secs(self.config_cache_ttl_secs),
            max_entries: self.config_cache_max_entries,
            ..Default::default()
        }
    }

    /// Whether a presented X-API-Key may change client configuration.
    ///
    /// With a configured key only an exact match is accepted. Without one,
    /// updates are open in dev mode and closed otherwise.
    pub fn admin_allowed(&self, presented: Option<&str>) -> bool {
        match self.api_key_admin.as_deref() {
            Some(key) => presented == Some(key),
            None => self.dev_mode,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.config_cache_ttl_secs == 0 {
            return Err("CONFIG_CACHE_TTL_SECS must be greater than zero".to_string());
        }

        if self.config_cache_max_entries == 0 {
            return Err("CONFIG_CACHE_MAX_ENTRIES must be greater than zero".to_string());
        }

        if self.storage_backend == StorageBackend::Mongo && self.mongodb_db.trim().is_empty() {
            return Err("MONGODB_DB must not be empty".to_string());
        }

        if self.api_key_admin.as_deref().is_some_and(|k| k.trim().is_empty()) {
            return Err("API_KEY_ADMIN must not be blank when set".to_string());
        }

        Ok(())
    }
}
