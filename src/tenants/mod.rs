//! Per-client configuration
//!
//! Every client resolves to a [`ClientConfig`](crate::db::schemas::ClientConfig):
//! a stored, active row for its client id, or the built-in default for its
//! client type. Resolutions are cached; writes evict synchronously.

pub mod cache;
pub mod defaults;
pub mod store;

pub use cache::{CacheStatsSnapshot, ConfigCache, ConfigCacheSettings};
pub use defaults::{default_config, default_config_for_name};
pub use store::{spawn_cleanup_task, ClientConfigStore, ConfigUpdate};
