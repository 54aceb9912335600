//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. Bodies are collected
//! up front and handed to [`dispatch`], which owns routing and is the entry
//! point the integration tests drive directly.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::ACCEPT;
use hyper::http::request::Parts;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::auth::AccessHeaders;
use crate::client::{ApiVersion, ClientContext};
use crate::config::Args;
use crate::db::Storage;
use crate::logging::{AuditRecorder, AuditRequest, JsonlAuditSink, StorageAuditSink};
use crate::pipeline::Pipeline;
use crate::routes::{
    self, error_response, header_str, method_not_allowed, not_found_response, parse_body,
    query_param,
};
use crate::tenants::{self, ClientConfigStore};
use crate::types::Result;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

pub const CLIENT_ID_HEADER: &str = "x-client-id";
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const DEPARTMENT_HEADER: &str = "x-department";
pub const PATIENT_CONSENT_HEADER: &str = "x-patient-consent";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
pub const API_KEY_HEADER: &str = "x-api-key";

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub pipeline: Arc<Pipeline>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(args: Args, pipeline: Pipeline) -> Self {
        Self {
            args,
            pipeline: Arc::new(pipeline),
            started_at: Instant::now(),
        }
    }

    /// Wire the config store and audit sinks over a storage backend
    pub fn with_storage(args: Args, storage: Arc<dyn Storage>) -> Result<Self> {
        let configs = Arc::new(ClientConfigStore::new(
            Arc::clone(&storage),
            args.cache_settings(),
        ));

        let mut recorder = AuditRecorder::new(args.audit_client_list(), args.node_id.to_string())
            .with_sink(Arc::new(StorageAuditSink::new(Arc::clone(&storage))));

        if let Some(ref path) = args.audit_log_path {
            recorder = recorder.with_sink(Arc::new(JsonlAuditSink::open(path)?));
        }

        let pipeline = Pipeline::new(storage, configs, recorder);
        Ok(Self::new(args, pipeline))
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Chartway listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    if state.args.dev_mode {
        warn!("Development mode enabled");
    }

    if state.args.api_key_admin.is_none() && !state.args.dev_mode {
        warn!("API_KEY_ADMIN not set, client configuration updates are disabled");
    }

    tenants::spawn_cleanup_task(Arc::clone(state.pipeline.configs()));
    info!(
        "Config cache enabled (ttl {}s, max {} entries)",
        state.args.config_cache_ttl_secs, state.args.config_cache_max_entries
    );

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<BoxBody>, hyper::Error> {
    info!("[{}] {} {}", addr, req.method(), req.uri().path());

    let (parts, body) = req.into_parts();
    let body = body.collect().await?.to_bytes();

    let response = dispatch(&state, Request::from_parts(parts, body), Some(addr)).await;
    Ok(to_boxed(response))
}

// =============================================================================
// Routing
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route<'a> {
    Health,
    Version,
    Patients,
    Patient(i64),
    Records,
    Record(i64),
    ClientConfig(&'a str),
}

/// Match a path, tolerating a missing or extra trailing slash
fn match_route(path: &str) -> Option<Route<'_>> {
    let trimmed = path.trim_end_matches('/');
    let segments: Vec<&str> = trimmed.split('/').skip(1).collect();

    match segments.as_slice() {
        ["health"] | ["healthz"] => Some(Route::Health),
        ["version"] => Some(Route::Version),
        ["api", "patients"] => Some(Route::Patients),
        ["api", "patients", id] => id.parse().ok().map(Route::Patient),
        ["api", "records"] => Some(Route::Records),
        ["api", "records", id] => id.parse().ok().map(Route::Record),
        ["api", "clients", client_id, "config"] if !client_id.is_empty() => {
            Some(Route::ClientConfig(*client_id))
        }
        _ => None,
    }
}

fn access_headers(parts: &Parts) -> AccessHeaders {
    let header = |name: &str| header_str(&parts.headers, name).map(str::to_string);
    AccessHeaders {
        role: header(USER_ROLE_HEADER),
        department: header(DEPARTMENT_HEADER),
        patient_consent: header(PATIENT_CONSENT_HEADER),
    }
}

/// Route a fully-read request and audit the outcome.
///
/// Every API request is audited, including unknown routes and failed
/// version negotiation; those are recorded at the default version.
pub async fn dispatch(
    state: &AppState,
    req: Request<Bytes>,
    addr: Option<SocketAddr>,
) -> Response<Full<Bytes>> {
    let (parts, body) = req.into_parts();

    if parts.method == Method::OPTIONS {
        return routes::preflight_response();
    }

    let route = match_route(parts.uri.path());

    match route {
        Some(Route::Health) => {
            return match parts.method {
                Method::GET | Method::HEAD => routes::health_check(state),
                _ => method_not_allowed(&parts.method, "GET, HEAD, OPTIONS"),
            };
        }
        Some(Route::Version) => {
            return match parts.method {
                Method::GET => routes::version_info(),
                _ => method_not_allowed(&parts.method, "GET, OPTIONS"),
            };
        }
        _ => {}
    }

    let client_id = header_str(&parts.headers, CLIENT_ID_HEADER);
    let fields = query_param(parts.uri.query(), "fields");
    let negotiated = ClientContext::from_parts(
        client_id,
        header_str(&parts.headers, ACCEPT.as_str()),
        fields.as_deref(),
    );

    let response = match (route, &negotiated) {
        (None, _) => not_found_response(),
        (Some(_), Err(e)) => error_response(e),
        (Some(route), Ok(ctx)) => route_api(state, ctx, &parts, &body, route).await,
    };

    let ctx = negotiated
        .unwrap_or_else(|_| ClientContext::new(client_id.unwrap_or(""), ApiVersion::default()));
    let request = AuditRequest {
        method: &parts.method,
        path: parts.uri.path(),
        forwarded_for: header_str(&parts.headers, FORWARDED_FOR_HEADER),
        remote_addr: addr,
        user: header_str(&parts.headers, USER_ID_HEADER),
    };
    state.pipeline.audit(&ctx, &request, response.status()).await;

    response
}

async fn route_api(
    state: &AppState,
    ctx: &ClientContext,
    parts: &Parts,
    body: &Bytes,
    route: Route<'_>,
) -> Response<Full<Bytes>> {
    let access = access_headers(parts);
    let method = &parts.method;

    let payload = if *method == Method::POST || *method == Method::PUT {
        match parse_body(&parts.headers, body) {
            Ok(value) => value,
            Err(e) => return error_response(&e),
        }
    } else {
        serde_json::Value::Null
    };

    match (route, method.clone()) {
        (Route::Patients, Method::POST) => {
            routes::create_patient(state, ctx, &access, &payload).await
        }
        (Route::Patients, _) => method_not_allowed(method, "POST, OPTIONS"),

        (Route::Patient(id), Method::GET) => routes::get_patient(state, ctx, &access, id).await,
        (Route::Patient(_), _) => method_not_allowed(method, "GET, OPTIONS"),

        (Route::Records, Method::POST) => {
            let created_by = header_str(&parts.headers, USER_ID_HEADER);
            routes::create_record(state, ctx, &access, &payload, created_by).await
        }
        (Route::Records, Method::GET) => {
            let query = parts.uri.query();
            let patient = query_param(query, "patient");
            let record_type = query_param(query, "record_type");
            routes::list_records(
                state,
                ctx,
                &access,
                patient.as_deref(),
                record_type.as_deref(),
            )
            .await
        }
        (Route::Records, _) => method_not_allowed(method, "GET, POST, OPTIONS"),

        (Route::Record(id), Method::GET) => routes::get_record(state, ctx, &access, id).await,
        (Route::Record(_), _) => method_not_allowed(method, "GET, OPTIONS"),

        (Route::ClientConfig(client_id), Method::PUT) => {
            let api_key = header_str(&parts.headers, API_KEY_HEADER);
            routes::update_config(state, client_id, api_key, &payload).await
        }
        (Route::ClientConfig(_), _) => method_not_allowed(method, "PUT, OPTIONS"),

        (Route::Health, _) | (Route::Version, _) => not_found_response(),
    }
}

fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}
