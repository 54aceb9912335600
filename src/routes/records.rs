//! Medical record endpoints
//!
//! - `POST /api/records/` - create in the caller's variant
//! - `GET /api/records/?patient={id}[&record_type=...]` - list for a patient
//! - `GET /api/records/{id}/` - retrieve

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde_json::Value;

use super::response::{error_response, json_response};
use crate::auth::AccessHeaders;
use crate::client::ClientContext;
use crate::server::AppState;
use crate::types::{FieldErrors, GatewayError};

pub async fn create_record(
    state: &AppState,
    ctx: &ClientContext,
    access: &AccessHeaders,
    payload: &Value,
    created_by: Option<&str>,
) -> Response<Full<Bytes>> {
    match state
        .pipeline
        .create_record(ctx, access, payload, created_by)
        .await
    {
        Ok(record) => json_response(StatusCode::CREATED, &record),
        Err(e) => error_response(&e),
    }
}

pub async fn get_record(
    state: &AppState,
    ctx: &ClientContext,
    access: &AccessHeaders,
    id: i64,
) -> Response<Full<Bytes>> {
    match state.pipeline.get_record(ctx, access, id).await {
        Ok(record) => json_response(StatusCode::OK, &record),
        Err(e) => error_response(&e),
    }
}

pub async fn list_records(
    state: &AppState,
    ctx: &ClientContext,
    access: &AccessHeaders,
    patient: Option<&str>,
    record_type: Option<&str>,
) -> Response<Full<Bytes>> {
    let patient = match patient.map(str::trim).filter(|p| !p.is_empty()) {
        None => {
            return error_response(&GatewayError::Validation(FieldErrors::single(
                "patient",
                "This field is required.",
            )))
        }
        Some(raw) => match raw.parse::<i64>() {
            Ok(id) => id,
            Err(_) => {
                return error_response(&GatewayError::Validation(FieldErrors::single(
                    "patient",
                    "A valid integer is required.",
                )))
            }
        },
    };

    match state
        .pipeline
        .list_records(ctx, access, patient, record_type)
        .await
    {
        Ok(records) => json_response(StatusCode::OK, &records),
        Err(e) => error_response(&e),
    }
}
