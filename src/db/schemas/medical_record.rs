//! Medical record document schema

use bson::{doc, Document};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::db::{IntoIndexes, Timestamped};

/// Collection name for medical records
pub const MEDICAL_RECORD_COLLECTION: &str = "medical_records";

/// Record type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    /// Narrative record using diagnosis/treatment/notes
    #[default]
    General,
    LabResult,
    Prescription,
    Note,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::General => "general",
            RecordType::LabResult => "lab_result",
            RecordType::Prescription => "prescription",
            RecordType::Note => "note",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "general" => Some(RecordType::General),
            "lab_result" => Some(RecordType::LabResult),
            "prescription" => Some(RecordType::Prescription),
            "note" => Some(RecordType::Note),
            _ => None,
        }
    }

    /// Payload key that must be present and non-empty for this type
    pub fn required_payload_key(&self) -> Option<&'static str> {
        match self {
            RecordType::LabResult => Some("test_name"),
            RecordType::Prescription => Some("medication"),
            RecordType::General | RecordType::Note => None,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Medical record document. Belongs to exactly one patient.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct MedicalRecord {
    /// Storage-assigned identifier (0 until inserted)
    pub id: i64,

    /// Owning patient id
    pub patient: i64,

    /// Immutable after creation
    pub record_type: RecordType,

    pub diagnosis: String,
    pub treatment: String,
    pub notes: String,

    /// Open-ended structured payload for non-general record types
    pub flexible_data: Map<String, Value>,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
}

impl IntoIndexes for MedicalRecord {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("record_id_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "patient": 1, "record_type": 1 },
                Some(
                    IndexOptions::builder()
                        .name("patient_record_type_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "created_at": 1 },
                Some(
                    IndexOptions::builder()
                        .name("created_at_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl Timestamped for MedicalRecord {
    fn touch_created(&mut self, now: DateTime<Utc>) {
        self.created_at = now;
        self.updated_at = now;
    }
}
