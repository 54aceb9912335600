//! In-memory storage backend
//!
//! Used when `STORAGE_BACKEND=memory` and as the dev-mode fallback when
//! MongoDB is unreachable. Contents are lost on restart.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::schemas::{AuditLog, ClientConfiguration, MedicalRecord, Patient, RecordType};
use super::{Storage, Timestamped};
use crate::types::{FieldErrors, GatewayError, Result};

/// Message for a second patient with an existing email
pub const DUPLICATE_EMAIL: &str = "patient with this email already exists.";

/// DashMap-backed [`Storage`]
pub struct MemoryStore {
    patients: DashMap<i64, Patient>,
    /// email -> patient id
    emails: DashMap<String, i64>,
    records: DashMap<i64, MedicalRecord>,
    configurations: DashMap<String, ClientConfiguration>,
    audit_logs: DashMap<i64, AuditLog>,
    patient_seq: AtomicI64,
    record_seq: AtomicI64,
    audit_seq: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            patients: DashMap::new(),
            emails: DashMap::new(),
            records: DashMap::new(),
            configurations: DashMap::new(),
            audit_logs: DashMap::new(),
            patient_seq: AtomicI64::new(0),
            record_seq: AtomicI64::new(0),
            audit_seq: AtomicI64::new(0),
        }
    }

    /// Snapshot of every audit entry, oldest first
    pub fn audit_logs(&self) -> Vec<AuditLog> {
        let mut logs: Vec<AuditLog> = self.audit_logs.iter().map(|e| e.value().clone()).collect();
        logs.sort_by_key(|log| log.id);
        logs
    }

    pub fn patient_count(&self) -> usize {
        self.patients.len()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn insert_patient(&self, mut patient: Patient) -> Result<Patient> {
        // The entry guard holds the shard lock, so concurrent inserts of the
        // same email cannot both pass
        let entry = match self.emails.entry(patient.email.clone()) {
            Entry::Occupied(_) => {
                return Err(GatewayError::Validation(FieldErrors::single(
                    "email",
                    DUPLICATE_EMAIL,
                )));
            }
            Entry::Vacant(entry) => entry,
        };

        patient.id = self.patient_seq.fetch_add(1, Ordering::SeqCst) + 1;
        patient.touch_created(Utc::now());
        entry.insert(patient.id);
        self.patients.insert(patient.id, patient.clone());

        Ok(patient)
    }

    async fn get_patient(&self, id: i64) -> Result<Option<Patient>> {
        Ok(self.patients.get(&id).map(|p| p.value().clone()))
    }

    async fn find_patient_by_email(&self, email: &str) -> Result<Option<Patient>> {
        let id = match self.emails.get(email) {
            Some(id) => *id,
            None => return Ok(None),
        };
        self.get_patient(id).await
    }

    async fn insert_record(&self, mut record: MedicalRecord) -> Result<MedicalRecord> {
        record.id = self.record_seq.fetch_add(1, Ordering::SeqCst) + 1;
        record.touch_created(Utc::now());
        self.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_record(&self, id: i64) -> Result<Option<MedicalRecord>> {
        Ok(self.records.get(&id).map(|r| r.value().clone()))
    }

    async fn records_for_patient(
        &self,
        patient: i64,
        record_type: Option<RecordType>,
    ) -> Result<Vec<MedicalRecord>> {
        let mut records: Vec<MedicalRecord> = self
            .records
            .iter()
            .filter(|r| r.patient == patient)
            .filter(|r| record_type.map_or(true, |t| r.record_type == t))
            .map(|r| r.value().clone())
            .collect();

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(records)
    }

    async fn find_client_configuration(
        &self,
        client_id: &str,
    ) -> Result<Option<ClientConfiguration>> {
        Ok(self.configurations.get(client_id).map(|c| c.value().clone()))
    }

    async fn upsert_client_configuration(
        &self,
        mut configuration: ClientConfiguration,
    ) -> Result<ClientConfiguration> {
        let now = Utc::now();
        let mut slot = self
            .configurations
            .entry(configuration.client_id.clone())
            .or_insert_with(|| {
                let mut fresh = configuration.clone();
                fresh.touch_created(now);
                fresh
            });

        configuration.created_at = slot.created_at;
        configuration.updated_at = now;
        *slot = configuration.clone();

        Ok(configuration)
    }

    async fn insert_audit_log(&self, mut entry: AuditLog) -> Result<AuditLog> {
        entry.id = self.audit_seq.fetch_add(1, Ordering::SeqCst) + 1;
        entry.touch_created(Utc::now());
        self.audit_logs.insert(entry.id, entry.clone());
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::ClientConfig;

    #[tokio::test]
    async fn test_patient_ids_are_sequential() {
        let store = MemoryStore::new();
        let a = store.insert_patient(Patient::with_email("a@x.org")).await.unwrap();
        let b = store.insert_patient(Patient::with_email("b@x.org")).await.unwrap();

        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(store.patient_count(), 2);
        assert!(a.created_at <= b.created_at);
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = MemoryStore::new();
        store.insert_patient(Patient::with_email("a@x.org")).await.unwrap();

        let err = store
            .insert_patient(Patient::with_email("a@x.org"))
            .await
            .unwrap_err();

        match err {
            GatewayError::Validation(errors) => assert!(errors.contains("email")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.patient_count(), 1);
    }

    #[tokio::test]
    async fn test_records_for_patient_filters_and_orders() {
        let store = MemoryStore::new();
        for record_type in [RecordType::General, RecordType::LabResult, RecordType::LabResult] {
            store
                .insert_record(MedicalRecord {
                    patient: 7,
                    record_type,
                    ..Default::default()
                })
                .await
                .unwrap();
        }
        store
            .insert_record(MedicalRecord {
                patient: 8,
                ..Default::default()
            })
            .await
            .unwrap();

        let all = store.records_for_patient(7, None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, 3);

        let labs = store
            .records_for_patient(7, Some(RecordType::LabResult))
            .await
            .unwrap();
        assert_eq!(labs.len(), 2);
    }

    #[tokio::test]
    async fn test_upsert_keeps_created_at() {
        let store = MemoryStore::new();
        let config = ClientConfig::new(&["email"], false, 5000, true);

        let first = store
            .upsert_client_configuration(ClientConfiguration::new("c1", "modern", config.clone()))
            .await
            .unwrap();

        let mut changed = config;
        changed.audit_enabled = true;
        let second = store
            .upsert_client_configuration(ClientConfiguration::new("c1", "modern", changed))
            .await
            .unwrap();

        assert_eq!(first.created_at, second.created_at);
        assert!(second.updated_at >= first.updated_at);

        let stored = store.find_client_configuration("c1").await.unwrap().unwrap();
        assert!(stored.config.audit_enabled);
    }
}
