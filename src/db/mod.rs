//! Persistence layer
//!
//! The pipeline talks to a [`Storage`] trait object. Two backends exist:
//!
//! - [`MemoryStore`] - DashMap-backed, used for dev mode and tests
//! - [`MongoStore`] - MongoDB collections with schema-declared indexes
//!
//! Identifiers are sequential integers assigned by the backend on insert.

pub mod memory;
pub mod mongo;
pub mod schemas;

use async_trait::async_trait;
use bson::Document;
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;

use crate::types::Result;
use schemas::{AuditLog, ClientConfiguration, MedicalRecord, Patient, RecordType};

pub use memory::MemoryStore;
pub use mongo::{MongoClient, MongoCollection, MongoStore};

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Trait for schemas that carry creation timestamps
pub trait Timestamped {
    fn touch_created(&mut self, now: DateTime<Utc>);
}

/// Storage operations used by the request pipeline.
///
/// Inserts assign the identifier and creation timestamps and return the
/// stored row.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Human-readable backend name for logs and `/health`
    fn backend_name(&self) -> &'static str;

    // =========================================================================
    // Patients
    // =========================================================================

    /// Insert a patient. Fails with a validation error on a duplicate email.
    async fn insert_patient(&self, patient: Patient) -> Result<Patient>;

    async fn get_patient(&self, id: i64) -> Result<Option<Patient>>;

    async fn find_patient_by_email(&self, email: &str) -> Result<Option<Patient>>;

    // =========================================================================
    // Medical records
    // =========================================================================

    async fn insert_record(&self, record: MedicalRecord) -> Result<MedicalRecord>;

    async fn get_record(&self, id: i64) -> Result<Option<MedicalRecord>>;

    /// Records of one patient, newest first, optionally of a single type
    async fn records_for_patient(
        &self,
        patient: i64,
        record_type: Option<RecordType>,
    ) -> Result<Vec<MedicalRecord>>;

    // =========================================================================
    // Client configuration
    // =========================================================================

    /// Stored row for a client, active or not
    async fn find_client_configuration(
        &self,
        client_id: &str,
    ) -> Result<Option<ClientConfiguration>>;

    /// Create or replace a client's row. An existing row keeps its `created_at`.
    async fn upsert_client_configuration(
        &self,
        configuration: ClientConfiguration,
    ) -> Result<ClientConfiguration>;

    // =========================================================================
    // Audit
    // =========================================================================

    async fn insert_audit_log(&self, entry: AuditLog) -> Result<AuditLog>;
}
