//! Chartway - client-adaptive healthcare records gateway
//!
//! One patient and medical-record store served to several client
//! populations at once. Each request is classified by its `X-Client-ID`,
//! negotiates an API version through `Accept`, and gets validation rules,
//! field sets, and record shapes that fit its client type.
//!
//! ## Layers
//!
//! - **client**: client classification and per-request context
//! - **tenants**: per-client configuration with a TTL cache
//! - **adapt**: field projection, SSN representations, record variants
//! - **auth**: object-level access checks from request headers
//! - **pipeline**: create/read operations over a [`db::Storage`] backend
//! - **logging**: audit trail for configured clients
//! - **server** / **routes**: hyper HTTP front

pub mod adapt;
pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod logging;
pub mod pipeline;
pub mod routes;
pub mod server;
pub mod tenants;
pub mod types;

pub use config::Args;
pub use pipeline::Pipeline;
pub use server::{dispatch, run, AppState};
pub use types::{GatewayError, Result};
