//! Client configuration endpoint
//!
//! `PUT /api/clients/{client_id}/config` with a body of
//! `{"config": {...}, "client_type": "...", "is_active": true}`; every key
//! is optional.
//!
//! Client identity on the record endpoints is the self-declared
//! `X-Client-ID` header and can be spoofed. This endpoint rewrites what
//! every caller with that id sees, so it is gated separately: when
//! `API_KEY_ADMIN` is set the request must carry it in `X-API-Key`, and
//! without a key the endpoint is only open in dev mode.

use bytes::Bytes;
use chrono::SecondsFormat;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde_json::{json, Value};
use tracing::warn;

use super::response::{error_response, json_response};
use crate::auth::PERMISSION_DENIED;
use crate::db::schemas::{ClientConfig, ClientConfiguration};
use crate::server::AppState;
use crate::tenants::ConfigUpdate;
use crate::types::{FieldErrors, GatewayError, Result};

/// Turn a request body into a partial update, collecting every field error
pub fn parse_update(body: &Value) -> Result<ConfigUpdate> {
    let Some(body) = body.as_object() else {
        return Err(GatewayError::Validation(FieldErrors::single(
            "non_field_errors",
            "Invalid data. Expected a dictionary.",
        )));
    };

    let mut errors = FieldErrors::new();
    let mut update = ConfigUpdate::default();

    match body.get("config") {
        None | Some(Value::Null) => {}
        Some(value @ Value::Object(_)) => match ClientConfig::from_value(value.clone()) {
            Ok(config) => update.config = Some(config),
            Err(e) => errors.add("config", e.to_string()),
        },
        Some(_) => errors.add("config", "Expected a dictionary of items."),
    }

    match body.get("client_type") {
        None | Some(Value::Null) => {}
        Some(Value::String(s)) if !s.trim().is_empty() => {
            update.client_type = Some(s.trim().to_string())
        }
        Some(_) => errors.add("client_type", "Not a valid string."),
    }

    match body.get("is_active") {
        None | Some(Value::Null) => {}
        Some(Value::Bool(b)) => update.is_active = Some(*b),
        Some(_) => errors.add("is_active", "Must be a valid boolean."),
    }

    errors.into_result()?;
    Ok(update)
}

/// Response body for a saved row
pub fn render_configuration(saved: &ClientConfiguration) -> Value {
    json!({
        "client_id": saved.client_id,
        "client_type": saved.client_type,
        "config": saved.config,
        "is_active": saved.is_active,
        "created_at": saved.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
        "updated_at": saved.updated_at.to_rfc3339_opts(SecondsFormat::Micros, true),
    })
}

pub async fn update_config(
    state: &AppState,
    client_id: &str,
    api_key: Option<&str>,
    body: &Value,
) -> Response<Full<Bytes>> {
    if !state.args.admin_allowed(api_key) {
        warn!(client_id = %client_id, "Rejected client configuration update without admin key");
        return error_response(&GatewayError::Forbidden(PERMISSION_DENIED.to_string()));
    }

    let update = match parse_update(body) {
        Ok(update) => update,
        Err(e) => return error_response(&e),
    };

    match state.pipeline.update_client_config(client_id, update).await {
        Ok(saved) => json_response(StatusCode::OK, &render_configuration(&saved)),
        Err(e) => error_response(&e),
    }
}
