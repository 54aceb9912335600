//! Database schemas for Chartway
//!
//! Document structures for patients, medical records, client
//! configurations, and audit logs. Shared by every storage backend.

mod audit_log;
mod client_configuration;
mod medical_record;
mod patient;

pub use audit_log::{AuditLog, AUDIT_LOG_COLLECTION};
pub use client_configuration::{ClientConfig, ClientConfiguration, CLIENT_CONFIGURATION_COLLECTION};
pub use medical_record::{MedicalRecord, RecordType, MEDICAL_RECORD_COLLECTION};
pub use patient::{Patient, PATIENT_COLLECTION};
