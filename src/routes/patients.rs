//! Patient endpoints
//!
//! - `POST /api/patients/` - create
//! - `GET /api/patients/{id}/` - retrieve

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde_json::Value;

use super::response::{error_response, json_response};
use crate::auth::AccessHeaders;
use crate::client::ClientContext;
use crate::server::AppState;

pub async fn create_patient(
    state: &AppState,
    ctx: &ClientContext,
    access: &AccessHeaders,
    payload: &Value,
) -> Response<Full<Bytes>> {
    match state.pipeline.create_patient(ctx, access, payload).await {
        Ok(patient) => json_response(StatusCode::CREATED, &patient),
        Err(e) => error_response(&e),
    }
}

pub async fn get_patient(
    state: &AppState,
    ctx: &ClientContext,
    access: &AccessHeaders,
    id: i64,
) -> Response<Full<Bytes>> {
    match state.pipeline.get_patient(ctx, access, id).await {
        Ok(patient) => json_response(StatusCode::OK, &patient),
        Err(e) => error_response(&e),
    }
}
