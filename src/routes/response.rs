//! Response builders and request body helpers shared by the routes

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderMap, HeaderValue, ALLOW, CONTENT_TYPE};
use hyper::{Method, Response, StatusCode};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::error;

use crate::types::GatewayError;

const JSON: &str = "application/json";

/// JSON response with the given status
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let (status, bytes) = match serde_json::to_vec(body) {
        Ok(bytes) => (status, bytes),
        Err(e) => {
            error!("Failed to serialize response body: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                br#"{"detail":"Internal server error"}"#.to_vec(),
            )
        }
    };

    let mut response = Response::new(Full::new(Bytes::from(bytes)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(JSON));
    response
}

/// `{"detail": message}` with the given status
pub fn detail_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, &serde_json::json!({ "detail": message }))
}

/// Map a gateway error onto its HTTP response
pub fn error_response(err: &GatewayError) -> Response<Full<Bytes>> {
    let status = err.status_code();

    match err {
        GatewayError::Validation(errors) => json_response(status, errors),
        GatewayError::NotFound(_) => detail_response(status, "Not found."),
        GatewayError::Forbidden(message)
        | GatewayError::NotAcceptable(message)
        | GatewayError::BadRequest(message) => detail_response(status, message),
        GatewayError::Json(e) => detail_response(status, &format!("JSON parse error - {}", e)),
        other => {
            error!("Request failed: {}", other);
            detail_response(status, "Internal server error")
        }
    }
}

pub fn not_found_response() -> Response<Full<Bytes>> {
    detail_response(StatusCode::NOT_FOUND, "Not found.")
}

pub fn method_not_allowed(method: &Method, allow: &'static str) -> Response<Full<Bytes>> {
    let mut response = detail_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &format!("Method \"{}\" not allowed.", method),
    );
    response
        .headers_mut()
        .insert(ALLOW, HeaderValue::from_static(allow));
    response
}

/// CORS preflight response
pub fn preflight_response() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    let headers = response.headers_mut();
    headers.insert("Access-Control-Allow-Origin", HeaderValue::from_static("*"));
    headers.insert("Access-Control-Allow-Headers", HeaderValue::from_static("*"));
    headers.insert(
        "Access-Control-Allow-Methods",
        HeaderValue::from_static("GET, POST, PUT, OPTIONS"),
    );
    response
}

/// Header value as a string, if present and valid UTF-8
pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Decode a request body as JSON or as a URL-encoded form.
///
/// An empty body decodes to an empty object.
pub fn parse_body(headers: &HeaderMap, body: &Bytes) -> Result<Value, GatewayError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }

    let is_form = header_str(headers, CONTENT_TYPE.as_str())
        .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false);

    if is_form {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body)
            .map_err(|e| GatewayError::BadRequest(format!("Malformed form body: {}", e)))?;
        return Ok(Value::Object(
            pairs
                .into_iter()
                .map(|(key, value)| (key, Value::String(value)))
                .collect(),
        ));
    }

    Ok(serde_json::from_slice(body)?)
}

/// Value of the first occurrence of a query parameter
pub fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query?).ok()?;
    pairs
        .into_iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value)
}
