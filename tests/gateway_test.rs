//! End-to-end tests for the HTTP front
//!
//! Requests go through `dispatch` against the in-memory store, so routing,
//! negotiation, projection, and the audit trail are exercised together.

use bytes::Bytes;
use chartway::config::Args;
use chartway::db::MemoryStore;
use chartway::{dispatch, AppState};
use clap::Parser;
use http_body_util::BodyExt;
use hyper::{Method, Request, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;

const ADMIN_KEY: &str = "test-admin-key";

fn test_args(extra: &[&str]) -> Args {
    let mut argv = vec!["chartway", "--storage-backend", "memory"];
    argv.extend_from_slice(extra);
    Args::parse_from(argv)
}

fn state_with(args: Args) -> (AppState, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::with_storage(args, store.clone()).unwrap();
    (state, store)
}

fn test_state() -> (AppState, Arc<MemoryStore>) {
    state_with(test_args(&["--api-key-admin", ADMIN_KEY]))
}

/// Send a request and decode the JSON response
async fn send(
    state: &AppState,
    method: Method,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let body = match body {
        Some(value) => Bytes::from(serde_json::to_vec(&value).unwrap()),
        None => Bytes::new(),
    };
    let request = builder
        .header("content-type", "application/json")
        .body(body)
        .unwrap();

    let response = dispatch(state, request, Some("10.0.0.9:5000".parse().unwrap())).await;
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn legacy_patient(email: &str) -> Value {
    json!({
        "email": email,
        "first_name": "Grace",
        "last_name": "Hopper",
        "date_of_birth": "1906-12-09",
        "phone": "555-0100",
        "ssn": "123-45-6789"
    })
}

#[tokio::test]
async fn test_health() {
    let (state, _) = test_state();
    let (status, body) = send(&state, Method::GET, "/health", &[], None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["healthy"], true);
    assert_eq!(body["storage"]["backend"], "memory");
    assert_eq!(body["audit"]["sinks"], json!(["storage"]));
}

#[tokio::test]
async fn test_legacy_client_requires_its_fields() {
    let (state, store) = test_state();
    let headers = [("X-Client-ID", "hospital_a")];

    let (status, body) = send(
        &state,
        Method::POST,
        "/api/patients/",
        &headers,
        Some(json!({"email": "a@clinic.com"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    for field in ["first_name", "last_name", "date_of_birth", "phone"] {
        assert_eq!(
            body[field][0], "This field is required for legacy_hospital",
            "missing error for {field}"
        );
    }
    assert_eq!(store.patient_count(), 0);
}

#[tokio::test]
async fn test_blank_required_fields_rejected() {
    let (state, store) = test_state();

    let (status, body) = send(
        &state,
        Method::POST,
        "/api/patients/",
        &[("X-Client-ID", "hospital_a")],
        Some(json!({
            "email": "w@x.org",
            "first_name": "   ",
            "last_name": "  ",
            "date_of_birth": "1990-01-01",
            "phone": " "
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    for field in ["first_name", "last_name", "phone"] {
        assert_eq!(
            body[field][0], "This field is required for legacy_hospital",
            "missing error for {field}"
        );
    }
    assert!(body.get("date_of_birth").is_none());
    assert_eq!(store.patient_count(), 0);
}

#[tokio::test]
async fn test_legacy_create_and_read_back() {
    let (state, _) = test_state();
    let headers = [("X-Client-ID", "hospital_a")];

    let (status, created) = send(
        &state,
        Method::POST,
        "/api/patients/",
        &headers,
        Some(legacy_patient("grace@navy.mil")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    assert_eq!(created["ssn"], "123-45-6789");
    assert_eq!(created["ssn_legacy"], "123-45-6789");
    assert!(created.get("ssn_verified").is_none());

    let id = created["id"].as_i64().unwrap();
    let uri = format!("/api/patients/{id}/");

    let (status, v2) = send(
        &state,
        Method::GET,
        &uri,
        &[
            ("X-Client-ID", "hospital_a"),
            ("Accept", "application/json; version=v2"),
        ],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        v2["ssn"],
        json!({"number": "123-45-6789", "verified": false, "verification_date": null})
    );
    assert!(v2.get("ssn_legacy").is_none());
}

#[tokio::test]
async fn test_duplicate_email_rejected() {
    let (state, store) = test_state();
    let headers = [("X-Client-ID", "clinic_north")];
    let body = json!({"email": "dup@clinic.com"});

    let (status, _) = send(
        &state,
        Method::POST,
        "/api/patients/",
        &headers,
        Some(body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, errors) =
        send(&state, Method::POST, "/api/patients/", &headers, Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(errors["email"][0], "patient with this email already exists.");
    assert_eq!(store.patient_count(), 1);
}

#[tokio::test]
async fn test_mobile_field_selection() {
    let (state, _) = test_state();
    let (_, created) = send(
        &state,
        Method::POST,
        "/api/patients/",
        &[("X-Client-ID", "clinic_south")],
        Some(json!({"email": "m@clinic.com", "first_name": "Mae"})),
    )
    .await;
    let id = created["id"].as_i64().unwrap();

    let (status, mobile) = send(
        &state,
        Method::GET,
        &format!("/api/patients/{id}/?fields=id,email,not_a_field"),
        &[("X-Client-ID", "mobile_app_ios")],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let keys: Vec<&str> = mobile
        .as_object()
        .unwrap()
        .keys()
        .map(String::as_str)
        .collect();
    assert_eq!(keys, vec!["id", "email"]);

    // Modern clinics ignore the selection
    let (_, modern) = send(
        &state,
        Method::GET,
        &format!("/api/patients/{id}/?fields=email"),
        &[("X-Client-ID", "clinic_south")],
        None,
    )
    .await;
    assert_eq!(modern["first_name"], "Mae");
}

#[tokio::test]
async fn test_unknown_version_not_acceptable() {
    let (state, _) = test_state();
    let (status, body) = send(
        &state,
        Method::GET,
        "/api/patients/1/",
        &[("Accept", "application/json; version=v9")],
        None,
    )
    .await;

    assert_eq!(status, StatusCode::NOT_ACCEPTABLE);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn test_missing_patient_is_404() {
    let (state, _) = test_state();
    let (status, body) = send(&state, Method::GET, "/api/patients/404/", &[], None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Not found.");
}

#[tokio::test]
async fn test_mobile_without_consent_forbidden() {
    let (state, _) = test_state();
    let (_, created) = send(
        &state,
        Method::POST,
        "/api/patients/",
        &[("X-Client-ID", "clinic_a")],
        Some(json!({"email": "c@clinic.com"})),
    )
    .await;
    let uri = format!("/api/patients/{}/", created["id"]);

    let (status, body) = send(
        &state,
        Method::GET,
        &uri,
        &[("X-Client-ID", "mobile_app"), ("X-Patient-Consent", "false")],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["detail"], "You do not have permission to perform this action.");

    let (status, _) =
        send(&state, Method::GET, &uri, &[("X-Client-ID", "mobile_app")], None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_legacy_nurse_cannot_create() {
    let (state, store) = test_state();
    let (status, _) = send(
        &state,
        Method::POST,
        "/api/patients/",
        &[("X-Client-ID", "hospital_a"), ("X-User-Role", "nurse")],
        Some(legacy_patient("nurse@h.org")),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(store.patient_count(), 0);
}

#[tokio::test]
async fn test_record_variants() {
    let (state, _) = test_state();
    let (_, patient) = send(
        &state,
        Method::POST,
        "/api/patients/",
        &[("X-Client-ID", "clinic_a")],
        Some(json!({"email": "r@clinic.com"})),
    )
    .await;
    let patient_id = patient["id"].as_i64().unwrap();

    // Modern clinic: lab result needs a test name
    let (status, errors) = send(
        &state,
        Method::POST,
        "/api/records/",
        &[("X-Client-ID", "clinic_a")],
        Some(json!({"patient": patient_id, "record_type": "lab_result", "data": {}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(errors["data"][0], "test_name is required for lab results");

    let (status, lab) = send(
        &state,
        Method::POST,
        "/api/records/",
        &[("X-Client-ID", "clinic_a"), ("X-User-ID", "dr_lee")],
        Some(json!({
            "patient": patient_id,
            "record_type": "lab_result",
            "data": {"test_name": "CBC", "result": "normal"}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{lab}");
    assert_eq!(lab["patient_id"], patient_id);
    assert_eq!(lab["test_name"], "CBC");
    assert!(lab.get("diagnosis").is_none());

    // Mobile view keeps the payload nested
    let (status, mobile) = send(
        &state,
        Method::GET,
        &format!("/api/records/{}/", lab["id"]),
        &[("X-Client-ID", "mobile_app")],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mobile["data"]["result"], "normal");

    // Legacy view is the rigid shape
    let (_, legacy) = send(
        &state,
        Method::GET,
        &format!("/api/records/{}/", lab["id"]),
        &[("X-Client-ID", "hospital_a")],
        None,
    )
    .await;
    assert!(legacy.get("record_type").is_none());
    assert_eq!(legacy["patient"], patient_id);
}

#[tokio::test]
async fn test_record_for_missing_patient() {
    let (state, store) = test_state();
    let (status, errors) = send(
        &state,
        Method::POST,
        "/api/records/",
        &[("X-Client-ID", "hospital_a")],
        Some(json!({"patient": 77, "diagnosis": "Flu", "treatment": "Rest"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(errors["patient"][0], "Invalid pk \"77\" - object does not exist.");
    assert_eq!(store.record_count(), 0);
}

#[tokio::test]
async fn test_list_records_filters_by_type() {
    let (state, _) = test_state();
    let headers = [("X-Client-ID", "clinic_a")];
    let (_, patient) = send(
        &state,
        Method::POST,
        "/api/patients/",
        &headers,
        Some(json!({"email": "l@clinic.com"})),
    )
    .await;
    let patient_id = patient["id"].as_i64().unwrap();

    for body in [
        json!({"patient": patient_id, "record_type": "general", "diagnosis": "Cold"}),
        json!({
            "patient": patient_id,
            "record_type": "prescription",
            "data": {"medication": "Ibuprofen"}
        }),
    ] {
        let (status, _) =
            send(&state, Method::POST, "/api/records/", &headers, Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, all) = send(
        &state,
        Method::GET,
        &format!("/api/records/?patient={patient_id}"),
        &headers,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 2);
    assert_eq!(all[0]["record_type"], "prescription");

    let (_, prescriptions) = send(
        &state,
        Method::GET,
        &format!("/api/records/?patient={patient_id}&record_type=prescription"),
        &headers,
        None,
    )
    .await;
    assert_eq!(prescriptions.as_array().unwrap().len(), 1);

    let (status, errors) = send(&state, Method::GET, "/api/records/", &headers, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(errors["patient"][0], "This field is required.");
}

#[tokio::test]
async fn test_config_update_takes_effect_immediately() {
    let (state, _) = test_state();
    let headers = [("X-Client-ID", "clinic_west")];

    // Warm the cache with the default configuration
    let (status, _) = send(
        &state,
        Method::POST,
        "/api/patients/",
        &headers,
        Some(json!({"email": "w1@clinic.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, saved) = send(
        &state,
        Method::PUT,
        "/api/clients/clinic_west/config",
        &[("X-API-Key", ADMIN_KEY)],
        Some(json!({"config": {"required_fields": ["email", "phone"]}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{saved}");
    assert_eq!(saved["client_id"], "clinic_west");
    assert!(saved["created_at"].as_str().unwrap().ends_with('Z'));

    let (status, errors) = send(
        &state,
        Method::POST,
        "/api/patients/",
        &headers,
        Some(json!({"email": "w2@clinic.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(errors["phone"][0], "This field is required for modern_clinic");
}

#[tokio::test]
async fn test_config_update_validates_body() {
    let (state, _) = test_state();
    let (status, errors) = send(
        &state,
        Method::PUT,
        "/api/clients/clinic_west/config",
        &[("X-API-Key", ADMIN_KEY)],
        Some(json!({"is_active": "sometimes"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(errors["is_active"].is_array());
}

#[tokio::test]
async fn test_config_update_requires_admin_key() {
    let (state, _) = test_state();
    let body = json!({"config": {"audit_enabled": false}});

    for headers in [vec![], vec![("X-API-Key", "guess")]] {
        let (status, errors) = send(
            &state,
            Method::PUT,
            "/api/clients/premium_clinic_1/config",
            &headers,
            Some(body.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(errors["detail"], "You do not have permission to perform this action.");
    }

    // Without a configured key the endpoint is closed outside dev mode
    let (closed, _) = state_with(test_args(&[]));
    let (status, _) = send(
        &closed,
        Method::PUT,
        "/api/clients/clinic_a/config",
        &[],
        Some(body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (dev, _) = state_with(test_args(&["--dev-mode"]));
    let (status, _) = send(
        &dev,
        Method::PUT,
        "/api/clients/clinic_a/config",
        &[],
        Some(body),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_audit_for_listed_clients_only() {
    let (state, store) = test_state();

    let (status, _) = send(
        &state,
        Method::POST,
        "/api/patients/",
        &[
            ("X-Client-ID", "premium_clinic_1"),
            ("X-User-ID", "dr_who"),
            ("X-Forwarded-For", "203.0.113.7, 10.0.0.1"),
        ],
        Some(json!({"email": "p@premium.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    send(
        &state,
        Method::POST,
        "/api/patients/",
        &[("X-Client-ID", "clinic_plain")],
        Some(json!({"email": "q@plain.com"})),
    )
    .await;

    let logs = store.audit_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].client_id, "premium_clinic_1");
    assert_eq!(logs[0].resource_type, "patients");
    assert_eq!(logs[0].user.as_deref(), Some("dr_who"));
    assert_eq!(logs[0].ip_address.as_deref(), Some("203.0.113.7"));
}

#[tokio::test]
async fn test_rejected_requests_are_audited() {
    let (state, store) = test_state();
    let audited = ("X-Client-ID", "premium_clinic_1");

    let (status, _) = send(&state, Method::GET, "/api/unknown/", &[audited], None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &state,
        Method::GET,
        "/api/patients/1/",
        &[audited, ("Accept", "application/json; version=v9")],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_ACCEPTABLE);

    let logs = store.audit_logs();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].metadata["status_code"], 404);
    assert_eq!(logs[0].metadata["path"], "/api/unknown/");
    assert_eq!(logs[1].metadata["status_code"], 406);
    assert_eq!(logs[1].resource_id, 1);

    // Preflight requests are not audited
    send(&state, Method::OPTIONS, "/api/patients/", &[audited], None).await;
    assert_eq!(store.audit_logs().len(), 2);
}

#[tokio::test]
async fn test_routing_edges() {
    let (state, _) = test_state();

    let (status, _) = send(&state, Method::GET, "/api/unknown/", &[], None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&state, Method::DELETE, "/api/patients/1/", &[], None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let (status, _) = send(&state, Method::OPTIONS, "/api/patients/", &[], None).await;
    assert_eq!(status, StatusCode::OK);
}
