//! Health check endpoints
//!
//! - /health, /healthz - Liveness probe with storage, cache, and audit details
//! - /version - Build version

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use super::response::json_response;
use crate::server::AppState;
use crate::tenants::CacheStatsSnapshot;

#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall health status (true if service is running)
    pub healthy: bool,
    pub status: &'static str,
    pub version: &'static str,
    /// Uptime in seconds since the server state was built
    pub uptime: u64,
    pub timestamp: String,
    /// Operating mode
    pub mode: &'static str,
    pub node_id: String,
    pub storage: StorageHealth,
    #[serde(rename = "configCache")]
    pub config_cache: ConfigCacheHealth,
    pub audit: AuditHealth,
}

#[derive(Serialize)]
pub struct StorageHealth {
    pub backend: &'static str,
}

#[derive(Serialize)]
pub struct ConfigCacheHealth {
    pub ttl_secs: u64,
    pub max_entries: usize,
    #[serde(flatten)]
    pub stats: CacheStatsSnapshot,
}

#[derive(Serialize)]
pub struct AuditHealth {
    pub sinks: Vec<&'static str>,
}

#[derive(Serialize)]
struct VersionResponse {
    version: &'static str,
    service: &'static str,
}

fn build_health_response(state: &AppState) -> HealthResponse {
    let args = &state.args;
    let pipeline = &state.pipeline;
    let settings = pipeline.configs().cache_settings();

    HealthResponse {
        healthy: true,
        status: "online",
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        mode: if args.dev_mode {
            "development"
        } else {
            "production"
        },
        node_id: args.node_id.to_string(),
        storage: StorageHealth {
            backend: pipeline.storage().backend_name(),
        },
        config_cache: ConfigCacheHealth {
            ttl_secs: settings.ttl.as_secs(),
            max_entries: settings.max_entries,
            stats: pipeline.configs().cache_stats(),
        },
        audit: AuditHealth {
            sinks: pipeline.audit_recorder().sink_names(),
        },
    }
}

/// Liveness probe
pub fn health_check(state: &AppState) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &build_health_response(state))
}

pub fn version_info() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &VersionResponse {
            version: env!("CARGO_PKG_VERSION"),
            service: env!("CARGO_PKG_NAME"),
        },
    )
}
