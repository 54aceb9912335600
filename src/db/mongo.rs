//! MongoDB client, typed collections, and the Mongo storage backend

use async_trait::async_trait;
use bson::{doc, Document};
use chrono::Utc;
use mongodb::{
    error::{ErrorKind, WriteFailure},
    options::ReturnDocument,
    Client, Collection, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, info};

use super::memory::DUPLICATE_EMAIL;
use super::schemas::{
    AuditLog, ClientConfiguration, MedicalRecord, Patient, RecordType, AUDIT_LOG_COLLECTION,
    CLIENT_CONFIGURATION_COLLECTION, MEDICAL_RECORD_COLLECTION, PATIENT_COLLECTION,
};
use super::{IntoIndexes, Storage, Timestamped};
use crate::types::{FieldErrors, GatewayError, Result};

/// Collection holding one sequence document per id space
const COUNTER_COLLECTION: &str = "counters";

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Connect and ping
    pub async fn new(uri: &str, db_name: &str) -> Result<Self> {
        info!("Connecting to MongoDB at {}", uri);

        // Fail fast instead of hanging on an unreachable server
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| GatewayError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| GatewayError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Get a typed collection, creating its indexes
    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + Timestamped,
    {
        MongoCollection::new(&self.client, &self.db_name, name).await
    }

    /// Untyped collection
    pub fn raw(&self, name: &str) -> Collection<Document> {
        self.client.database(&self.db_name).collection::<Document>(name)
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }
}

/// Typed MongoDB collection with automatic indexing
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + Timestamped,
{
    pub async fn new(client: &Client, db_name: &str, collection_name: &str) -> Result<Self> {
        let collection = client.database(db_name).collection::<T>(collection_name);
        let mongo_collection = MongoCollection { inner: collection };

        mongo_collection.apply_indexes().await?;

        Ok(mongo_collection)
    }

    async fn apply_indexes(&self) -> Result<()> {
        let schema_indices = T::into_indices();

        if schema_indices.is_empty() {
            return Ok(());
        }

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        self.inner
            .create_indexes(indices)
            .await
            .map_err(|e| GatewayError::Database(format!("Failed to create indexes: {}", e)))?;

        Ok(())
    }

    /// Insert a document, stamping its creation time
    pub async fn insert_one(&self, mut item: T) -> std::result::Result<T, mongodb::error::Error> {
        item.touch_created(Utc::now());
        self.inner.insert_one(&item).await?;
        Ok(item)
    }

    pub async fn find_one(&self, filter: Document) -> Result<Option<T>> {
        self.inner
            .find_one(filter)
            .await
            .map_err(|e| GatewayError::Database(format!("Find failed: {}", e)))
    }

    /// Find many documents, optionally sorted
    pub async fn find_many(&self, filter: Document, sort: Option<Document>) -> Result<Vec<T>> {
        use futures_util::StreamExt;

        let mut action = self.inner.find(filter);
        if let Some(sort) = sort {
            action = action.sort(sort);
        }

        let cursor = action
            .await
            .map_err(|e| GatewayError::Database(format!("Find failed: {}", e)))?;

        let results: Vec<T> = cursor
            .filter_map(|doc| async {
                match doc {
                    Ok(d) => Some(d),
                    Err(e) => {
                        error!("Error reading document: {}", e);
                        None
                    }
                }
            })
            .collect()
            .await;

        Ok(results)
    }

    /// Replace the matching document, inserting when none matches
    pub async fn replace_or_insert(&self, filter: Document, item: &T) -> Result<()> {
        self.inner
            .replace_one(filter, item)
            .upsert(true)
            .await
            .map_err(|e| GatewayError::Database(format!("Replace failed: {}", e)))?;
        Ok(())
    }

    pub fn inner(&self) -> &Collection<T> {
        &self.inner
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == 11000
    )
}

/// MongoDB-backed [`Storage`]
pub struct MongoStore {
    client: MongoClient,
    patients: MongoCollection<Patient>,
    records: MongoCollection<MedicalRecord>,
    configurations: MongoCollection<ClientConfiguration>,
    audit_logs: MongoCollection<AuditLog>,
    counters: Collection<Document>,
}

impl MongoStore {
    /// Open every collection and apply its indexes
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self> {
        let client = MongoClient::new(uri, db_name).await?;

        let patients = client.collection::<Patient>(PATIENT_COLLECTION).await?;
        let records = client
            .collection::<MedicalRecord>(MEDICAL_RECORD_COLLECTION)
            .await?;
        let configurations = client
            .collection::<ClientConfiguration>(CLIENT_CONFIGURATION_COLLECTION)
            .await?;
        let audit_logs = client.collection::<AuditLog>(AUDIT_LOG_COLLECTION).await?;
        let counters = client.raw(COUNTER_COLLECTION);

        debug!(db = %client.db_name(), "MongoDB collections ready");

        Ok(Self {
            client,
            patients,
            records,
            configurations,
            audit_logs,
            counters,
        })
    }

    pub fn client(&self) -> &MongoClient {
        &self.client
    }

    /// Allocate the next integer id in a named sequence
    async fn next_id(&self, sequence: &str) -> Result<i64> {
        let counter = self
            .counters
            .find_one_and_update(doc! { "_id": sequence }, doc! { "$inc": { "seq": 1_i64 } })
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|e| GatewayError::Database(format!("Sequence update failed: {}", e)))?;

        counter
            .and_then(|d| d.get_i64("seq").ok())
            .ok_or_else(|| GatewayError::Database(format!("Sequence '{}' unavailable", sequence)))
    }
}

#[async_trait]
impl Storage for MongoStore {
    fn backend_name(&self) -> &'static str {
        "mongo"
    }

    async fn insert_patient(&self, mut patient: Patient) -> Result<Patient> {
        patient.id = self.next_id(PATIENT_COLLECTION).await?;

        self.patients.insert_one(patient).await.map_err(|e| {
            if is_duplicate_key(&e) {
                GatewayError::Validation(FieldErrors::single("email", DUPLICATE_EMAIL))
            } else {
                GatewayError::Database(format!("Insert failed: {}", e))
            }
        })
    }

    async fn get_patient(&self, id: i64) -> Result<Option<Patient>> {
        self.patients.find_one(doc! { "id": id }).await
    }

    async fn find_patient_by_email(&self, email: &str) -> Result<Option<Patient>> {
        self.patients.find_one(doc! { "email": email }).await
    }

    async fn insert_record(&self, mut record: MedicalRecord) -> Result<MedicalRecord> {
        record.id = self.next_id(MEDICAL_RECORD_COLLECTION).await?;

        self.records
            .insert_one(record)
            .await
            .map_err(|e| GatewayError::Database(format!("Insert failed: {}", e)))
    }

    async fn get_record(&self, id: i64) -> Result<Option<MedicalRecord>> {
        self.records.find_one(doc! { "id": id }).await
    }

    async fn records_for_patient(
        &self,
        patient: i64,
        record_type: Option<RecordType>,
    ) -> Result<Vec<MedicalRecord>> {
        let mut filter = doc! { "patient": patient };
        if let Some(record_type) = record_type {
            filter.insert("record_type", record_type.as_str());
        }

        self.records
            .find_many(filter, Some(doc! { "created_at": -1, "id": -1 }))
            .await
    }

    async fn find_client_configuration(
        &self,
        client_id: &str,
    ) -> Result<Option<ClientConfiguration>> {
        self.configurations
            .find_one(doc! { "client_id": client_id })
            .await
    }

    async fn upsert_client_configuration(
        &self,
        mut configuration: ClientConfiguration,
    ) -> Result<ClientConfiguration> {
        let now = Utc::now();
        configuration.created_at = match self
            .find_client_configuration(&configuration.client_id)
            .await?
        {
            Some(existing) => existing.created_at,
            None => now,
        };
        configuration.updated_at = now;

        self.configurations
            .replace_or_insert(doc! { "client_id": &configuration.client_id }, &configuration)
            .await?;

        Ok(configuration)
    }

    async fn insert_audit_log(&self, mut entry: AuditLog) -> Result<AuditLog> {
        entry.id = self.next_id(AUDIT_LOG_COLLECTION).await?;

        self.audit_logs
            .insert_one(entry)
            .await
            .map_err(|e| GatewayError::Database(format!("Insert failed: {}", e)))
    }
}
