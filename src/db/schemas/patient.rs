//! Patient document schema
//!
//! One row per registered patient. The SSN is stored twice over during the
//! format migration:
//!
//! - `ssn_legacy` - the free-form string column
//! - `ssn_number` / `ssn_verified` / `ssn_verification_date` - the structured form
//!
//! Only `adapt::ssn` writes these fields.

use bson::{doc, Document};
use chrono::{DateTime, NaiveDate, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::{IntoIndexes, Timestamped};

/// Collection name for patients
pub const PATIENT_COLLECTION: &str = "patients";

/// Patient document
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Patient {
    /// Storage-assigned identifier (0 until inserted)
    pub id: i64,

    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub phone: String,
    pub address: String,

    /// Legacy flat SSN string
    pub ssn_legacy: String,
    /// Structured SSN number; authoritative when non-empty
    pub ssn_number: String,
    pub ssn_verified: bool,
    pub ssn_verification_date: Option<NaiveDate>,

    pub blood_type: String,
    pub allergies: String,
    pub emergency_contact: String,
    pub emergency_phone: String,
    pub insurance_provider: String,
    pub insurance_number: String,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    /// New unsaved patient with just an email
    pub fn with_email(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ..Default::default()
        }
    }
}

impl IntoIndexes for Patient {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("patient_id_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "email": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("email_unique".to_string())
                        .build(),
                ),
            ),
            // Both SSN columns are searched during the migration window
            (
                doc! { "ssn_legacy": 1 },
                Some(
                    IndexOptions::builder()
                        .name("ssn_legacy_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "ssn_number": 1 },
                Some(
                    IndexOptions::builder()
                        .name("ssn_number_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl Timestamped for Patient {
    fn touch_created(&mut self, now: DateTime<Utc>) {
        self.created_at = now;
        self.updated_at = now;
    }
}
