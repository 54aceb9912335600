//! Audit log document schema

use bson::{doc, Document};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::{IntoIndexes, Timestamped};
use crate::logging::{AuditAction, AuditEvent};

/// Collection name for audit logs
pub const AUDIT_LOG_COLLECTION: &str = "audit_logs";

/// Persisted audit entry
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AuditLog {
    #[serde(default)]
    pub id: i64,
    pub user: Option<String>,
    pub action: AuditAction,
    pub resource_type: String,
    pub resource_id: i64,
    pub client_id: String,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub timestamp: DateTime<Utc>,
    pub ip_address: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

impl From<&AuditEvent> for AuditLog {
    fn from(event: &AuditEvent) -> Self {
        Self {
            id: 0,
            user: event.user.clone(),
            action: event.action,
            resource_type: event.resource_type.clone(),
            resource_id: event.resource_id,
            client_id: event.client_id.clone(),
            timestamp: event.timestamp,
            ip_address: event.ip_address.clone(),
            metadata: event.metadata.clone(),
        }
    }
}

impl IntoIndexes for AuditLog {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "resource_type": 1, "resource_id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("resource_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "client_id": 1, "timestamp": -1 },
                Some(
                    IndexOptions::builder()
                        .name("client_timestamp_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl Timestamped for AuditLog {
    // The event time is fixed when the event is built; only fill a blank one
    fn touch_created(&mut self, now: DateTime<Utc>) {
        if self.timestamp == DateTime::<Utc>::default() {
            self.timestamp = now;
        }
    }
}
