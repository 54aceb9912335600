//! Request pipeline
//!
//! Each operation takes a [`ClientContext`] built by the HTTP front and runs
//! the same sequence: resolve the client's configuration, check access,
//! validate, persist, and render in the client's shape. Nothing is persisted
//! when validation fails.

mod patients;
mod records;

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::{has_object_permission, AccessHeaders, ObjectAction, PERMISSION_DENIED};
use crate::client::ClientContext;
use crate::db::schemas::{ClientConfig, ClientConfiguration};
use crate::db::Storage;
use crate::logging::{AuditEvent, AuditRecorder, AuditRequest};
use crate::tenants::{ClientConfigStore, ConfigUpdate};
use crate::types::{FieldErrors, GatewayError, Result};

/// Shared request pipeline
pub struct Pipeline {
    storage: Arc<dyn Storage>,
    configs: Arc<ClientConfigStore>,
    audit: AuditRecorder,
}

impl Pipeline {
    pub fn new(
        storage: Arc<dyn Storage>,
        configs: Arc<ClientConfigStore>,
        audit: AuditRecorder,
    ) -> Self {
        Self {
            storage,
            configs,
            audit,
        }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn configs(&self) -> &Arc<ClientConfigStore> {
        &self.configs
    }

    pub fn audit_recorder(&self) -> &AuditRecorder {
        &self.audit
    }

    /// Configuration in effect for the requesting client
    pub async fn config_for(&self, ctx: &ClientContext) -> ClientConfig {
        self.configs.resolve(&ctx.client_id, ctx.client_type).await
    }

    /// Replace a client's configuration; the cache is coherent on return
    pub async fn update_client_config(
        &self,
        client_id: &str,
        update: ConfigUpdate,
    ) -> Result<ClientConfiguration> {
        if client_id.trim().is_empty() {
            return Err(GatewayError::Validation(FieldErrors::single(
                "client_id",
                "This field may not be blank.",
            )));
        }
        self.configs.update(client_id, update).await
    }

    /// Record an audit event for a finished request when the client is
    /// audited. Failures are logged and dropped.
    pub async fn audit(
        &self,
        ctx: &ClientContext,
        request: &AuditRequest<'_>,
        status: hyper::StatusCode,
    ) {
        let config = self.config_for(ctx).await;
        if !self.audit.should_audit(&ctx.client_id, &config) {
            return;
        }

        let host_id = self.audit.host_id();
        let Some(event) = AuditEvent::from_request(ctx, request, status, host_id) else {
            return;
        };

        match self.audit.emit(&event).await {
            Ok(()) => debug!(
                client_id = %event.client_id,
                action = event.action.as_str(),
                resource_type = %event.resource_type,
                resource_id = event.resource_id,
                "Audit event recorded"
            ),
            Err(e) => warn!(client_id = %ctx.client_id, error = %e, "Audit emission failed"),
        }
    }

    fn check_access(
        ctx: &ClientContext,
        access: &AccessHeaders,
        action: ObjectAction,
    ) -> Result<()> {
        if has_object_permission(ctx.client_type, access, action) {
            Ok(())
        } else {
            debug!(
                client_id = %ctx.client_id,
                client_type = %ctx.client_type,
                action = %action,
                "Object access denied"
            );
            Err(GatewayError::Forbidden(PERMISSION_DENIED.to_string()))
        }
    }
}

/// Reject anything but a JSON object as a create payload
fn expect_object(payload: &Value) -> Result<&serde_json::Map<String, Value>> {
    payload.as_object().ok_or_else(|| {
        GatewayError::Validation(FieldErrors::single(
            "non_field_errors",
            "Invalid data. Expected a dictionary.",
        ))
    })
}
