//! Audit trail for patient data access
//!
//! Every audited request produces one [`AuditEvent`], fanned out to the
//! configured sinks: the storage backend's `audit_logs` collection and,
//! optionally, a JSONL file. Emission is best-effort; callers log and drop
//! the error.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hyper::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::client::ClientContext;
use crate::db::schemas::{AuditLog, ClientConfig};
use crate::db::Storage;
use crate::types::Result;

/// What the request did to the resource
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Read,
    Create,
    Update,
    Delete,
}

impl AuditAction {
    /// Methods outside GET/POST/PUT/PATCH/DELETE are not audited
    pub fn from_method(method: &Method) -> Option<Self> {
        match *method {
            Method::GET => Some(AuditAction::Read),
            Method::POST => Some(AuditAction::Create),
            Method::PUT | Method::PATCH => Some(AuditAction::Update),
            Method::DELETE => Some(AuditAction::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Read => "read",
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
        }
    }
}

/// Second path segment, e.g. `patients` for `/api/patients/4/`
pub fn resource_type_from_path(path: &str) -> String {
    path.trim_matches('/')
        .split('/')
        .nth(1)
        .filter(|segment| !segment.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

/// First all-digit path segment, or 0
pub fn resource_id_from_path(path: &str) -> i64 {
    path.split('/')
        .find(|segment| !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|segment| segment.parse().ok())
        .unwrap_or(0)
}

/// First `X-Forwarded-For` entry, else the peer address
pub fn client_ip(forwarded_for: Option<&str>, remote: Option<SocketAddr>) -> Option<String> {
    forwarded_for
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .or_else(|| remote.map(|addr| addr.ip().to_string()))
}

/// Request facts the audit trail needs
#[derive(Debug, Clone)]
pub struct AuditRequest<'a> {
    pub method: &'a Method,
    pub path: &'a str,
    pub forwarded_for: Option<&'a str>,
    pub remote_addr: Option<SocketAddr>,
    pub user: Option<&'a str>,
}

/// One audited request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub resource_type: String,
    pub resource_id: i64,
    pub client_id: String,
    /// Node that handled the request
    pub host_id: String,
    pub user: Option<String>,
    pub ip_address: Option<String>,
    pub metadata: serde_json::Value,
}

impl AuditEvent {
    pub fn new(
        action: AuditAction,
        client_id: impl Into<String>,
        host_id: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            action,
            resource_type: "unknown".to_string(),
            resource_id: 0,
            client_id: client_id.into(),
            host_id: host_id.into(),
            user: None,
            ip_address: None,
            metadata: serde_json::Value::Null,
        }
    }

    /// Derive an event from a finished request; `None` when the method is
    /// not audited
    pub fn from_request(
        ctx: &ClientContext,
        request: &AuditRequest<'_>,
        status: StatusCode,
        host_id: &str,
    ) -> Option<Self> {
        let action = AuditAction::from_method(request.method)?;

        let mut event = Self::new(action, ctx.client_id.as_str(), host_id)
            .with_resource(
                resource_type_from_path(request.path),
                resource_id_from_path(request.path),
            )
            .with_metadata(serde_json::json!({
                "path": request.path,
                "method": request.method.as_str(),
                "status_code": status.as_u16(),
            }));

        if let Some(ip) = client_ip(request.forwarded_for, request.remote_addr) {
            event = event.with_ip(ip);
        }
        if let Some(user) = request.user {
            event = event.with_user(user.to_string());
        }

        Some(event)
    }

    pub fn with_resource(mut self, resource_type: String, resource_id: i64) -> Self {
        self.resource_type = resource_type;
        self.resource_id = resource_id;
        self
    }

    pub fn with_user(mut self, user: String) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_ip(mut self, ip: String) -> Self {
        self.ip_address = Some(ip);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Convert to JSONL line
    pub fn to_jsonl(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Sinks
// =============================================================================

/// Destination for audit events
#[async_trait]
pub trait AuditSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn record(&self, event: &AuditEvent) -> Result<()>;
}

/// Writes events to the storage backend's audit log
pub struct StorageAuditSink {
    storage: Arc<dyn Storage>,
}

impl StorageAuditSink {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl AuditSink for StorageAuditSink {
    fn name(&self) -> &'static str {
        "storage"
    }

    async fn record(&self, event: &AuditEvent) -> Result<()> {
        self.storage.insert_audit_log(AuditLog::from(event)).await?;
        Ok(())
    }
}

/// Appends events to a JSONL file
#[derive(Clone)]
pub struct JsonlAuditSink {
    writer: Arc<Mutex<BufWriter<File>>>,
}

impl JsonlAuditSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        info!("Audit JSONL log at {}", path.display());

        Ok(Self {
            writer: Arc::new(Mutex::new(BufWriter::new(file))),
        })
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    async fn record(&self, event: &AuditEvent) -> Result<()> {
        let line = event.to_jsonl()?;
        let mut writer = self.writer.lock().await;
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}

// =============================================================================
// Recorder
// =============================================================================

/// Decides whether a request is audited and fans events out to sinks
#[derive(Clone)]
pub struct AuditRecorder {
    sinks: Vec<Arc<dyn AuditSink>>,
    always_audit: HashSet<String>,
    host_id: String,
}

impl AuditRecorder {
    pub fn new(always_audit: impl IntoIterator<Item = String>, host_id: impl Into<String>) -> Self {
        Self {
            sinks: Vec::new(),
            always_audit: always_audit.into_iter().collect(),
            host_id: host_id.into(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    pub fn sink_names(&self) -> Vec<&'static str> {
        self.sinks.iter().map(|sink| sink.name()).collect()
    }

    /// Audited when the client's configuration asks for it or the client
    /// is on the always-audit list
    pub fn should_audit(&self, client_id: &str, config: &ClientConfig) -> bool {
        config.audit_enabled || self.always_audit.contains(client_id)
    }

    /// Send an event to every sink. All sinks are attempted; the first
    /// failure is returned.
    pub async fn emit(&self, event: &AuditEvent) -> Result<()> {
        let mut first_error = None;

        for sink in &self.sinks {
            if let Err(e) = sink.record(event).await {
                debug!(sink = sink.name(), error = %e, "Audit sink failed");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
