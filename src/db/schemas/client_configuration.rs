//! Client configuration document schema
//!
//! Per-client overrides of the built-in client-type defaults. Rows are
//! keyed by `client_id`; inactive rows are ignored at resolution time.

use bson::{doc, Document};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::db::{IntoIndexes, Timestamped};

/// Collection name for client configurations
pub const CLIENT_CONFIGURATION_COLLECTION: &str = "client_configurations";

fn default_true() -> bool {
    true
}

fn default_rate_limit() -> u32 {
    5000
}

/// The configuration mapping a client resolves to.
///
/// Keys missing from a stored mapping take neutral values: no required
/// fields, auditing off. Keys Chartway does not know about are kept in
/// `extra` so they survive a read-modify-write.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ClientConfig {
    /// Patient fields that must be non-empty on create
    #[serde(default)]
    pub required_fields: Vec<String>,

    /// Whether requests from this client are audited
    #[serde(default)]
    pub audit_enabled: bool,

    /// Requests per hour granted to this client
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,

    /// Whether `?fields=` selection is honoured
    #[serde(default = "default_true")]
    pub allow_field_selection: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ClientConfig {
    pub fn new(
        required_fields: &[&str],
        audit_enabled: bool,
        rate_limit: u32,
        allow_field_selection: bool,
    ) -> Self {
        Self {
            required_fields: required_fields.iter().map(|f| f.to_string()).collect(),
            audit_enabled,
            rate_limit,
            allow_field_selection,
            extra: Map::new(),
        }
    }

    /// Parse an arbitrary JSON mapping
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

/// Stored configuration row
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ClientConfiguration {
    /// Unique client identifier (matches `X-Client-ID`)
    pub client_id: String,

    /// Declared client type name; free-form in storage
    pub client_type: String,

    pub config: ClientConfig,

    #[serde(default = "default_true")]
    pub is_active: bool,

    #[serde(default, with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,

    #[serde(default, with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl ClientConfiguration {
    pub fn new(
        client_id: impl Into<String>,
        client_type: impl Into<String>,
        config: ClientConfig,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_type: client_type.into(),
            config,
            is_active: true,
            created_at: DateTime::<Utc>::default(),
            updated_at: DateTime::<Utc>::default(),
        }
    }

    /// Same row with the active flag set
    pub fn active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }
}

impl IntoIndexes for ClientConfiguration {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "client_id": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("client_id_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl Timestamped for ClientConfiguration {
    fn touch_created(&mut self, now: DateTime<Utc>) {
        self.created_at = now;
        self.updated_at = now;
    }
}
