//! Medical record create, read, and per-patient listing

use serde_json::{Map, Value};
use tracing::info;

use super::Pipeline;
use crate::adapt::records::{self, RecordVariant};
use crate::auth::{AccessHeaders, ObjectAction};
use crate::client::ClientContext;
use crate::db::schemas::RecordType;
use crate::types::{FieldErrors, GatewayError, Result};

impl Pipeline {
    /// Validate and store a record in the caller's variant
    pub async fn create_record(
        &self,
        ctx: &ClientContext,
        access: &AccessHeaders,
        payload: &Value,
        created_by: Option<&str>,
    ) -> Result<Map<String, Value>> {
        Self::check_access(ctx, access, ObjectAction::Create)?;

        let variant = RecordVariant::select(ctx.client_type);
        let draft = records::validate(variant, payload).map_err(GatewayError::Validation)?;

        if self.storage.get_patient(draft.patient).await?.is_none() {
            return Err(GatewayError::Validation(FieldErrors::single(
                "patient",
                format!("Invalid pk \"{}\" - object does not exist.", draft.patient),
            )));
        }

        let record = self
            .storage
            .insert_record(draft.into_record(created_by.unwrap_or_default()))
            .await?;

        info!(
            record_id = record.id,
            patient_id = record.patient,
            record_type = %record.record_type,
            client_id = %ctx.client_id,
            "Medical record created"
        );

        Ok(records::render(&record, variant))
    }

    /// Load a record and render it in the caller's variant
    pub async fn get_record(
        &self,
        ctx: &ClientContext,
        access: &AccessHeaders,
        id: i64,
    ) -> Result<Map<String, Value>> {
        let record = self
            .storage
            .get_record(id)
            .await?
            .ok_or_else(|| {
                GatewayError::NotFound("No MedicalRecord matches the given query.".into())
            })?;

        Self::check_access(ctx, access, ObjectAction::Retrieve)?;

        Ok(records::render(&record, RecordVariant::select(ctx.client_type)))
    }

    /// Records of one patient, newest first, optionally of one type
    pub async fn list_records(
        &self,
        ctx: &ClientContext,
        access: &AccessHeaders,
        patient: i64,
        record_type: Option<&str>,
    ) -> Result<Vec<Map<String, Value>>> {
        Self::check_access(ctx, access, ObjectAction::Retrieve)?;

        let record_type = match record_type.filter(|t| !t.is_empty()) {
            None => None,
            Some(raw) => Some(RecordType::parse(raw).ok_or_else(|| {
                GatewayError::Validation(FieldErrors::single(
                    "record_type",
                    format!("\"{}\" is not a valid choice.", raw),
                ))
            })?),
        };

        let variant = RecordVariant::select(ctx.client_type);
        let found = self.storage.records_for_patient(patient, record_type).await?;

        Ok(found
            .iter()
            .map(|record| records::render(record, variant))
            .collect())
    }
}
