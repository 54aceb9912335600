//! Logging infrastructure for Chartway
//!
//! Operational logs go through `tracing`; the audit trail lives here.

pub mod audit;

pub use audit::{
    AuditAction, AuditEvent, AuditRecorder, AuditRequest, AuditSink, JsonlAuditSink,
    StorageAuditSink,
};
