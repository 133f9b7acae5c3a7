//! External collaborator seams.
//!
//! The workflow engine never talks to a tenant directory, a vendor API, a
//! git remote, or a status store directly; it consumes these traits.
//! Production wiring injects real implementations; tests inject scripted
//! ones. Each collaborator supplies its own concurrency safety.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::delivery::MergeStrategy;
use crate::error::JobError;
use crate::jobs::{DeliveryRef, Payload, StatusEvent};

/// Resolves a tenant id to its human-facing display name.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn display_name(&self, tenant_id: &str) -> Result<String, JobError>;
}

/// Invokes vendor / provisioning APIs.
///
/// `idempotency_key` is derived from the job id; implementations should pass
/// it through when the upstream supports idempotent replay.
#[async_trait]
pub trait ExternalApi: Send + Sync {
    async fn call(
        &self,
        api_name: &str,
        payload: &Value,
        idempotency_key: &str,
    ) -> Result<Payload, JobError>;
}

/// Everything the git delivery collaborator needs for one delivery.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    pub job_id: String,
    pub template_id: String,
    pub context: Payload,
    pub category: String,
    pub destination_path: String,
    pub merge_strategy: MergeStrategy,
}

/// Renders category configuration and delivers it into a git repository.
///
/// Must be idempotent per (job_id, destination path): re-delivery with
/// identical inputs returns the existing reference instead of duplicating
/// externally visible effects.
#[async_trait]
pub trait GitDelivery: Send + Sync {
    async fn render_and_deliver(&self, request: DeliveryRequest) -> Result<DeliveryRef, JobError>;
}

/// Persists job status transitions. Fire-and-forget: the workflow logs and
/// swallows sink failures rather than letting them block completion.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn record(&self, event: &StatusEvent) -> Result<(), JobError>;
}

/// The full set of collaborator handles injected into the engine.
#[derive(Clone)]
pub struct Collaborators {
    pub tenants: Arc<dyn TenantDirectory>,
    pub api: Arc<dyn ExternalApi>,
    pub git: Arc<dyn GitDelivery>,
    pub status: Arc<dyn StatusSink>,
}

/// Status sink that emits each transition as a structured log line.
#[derive(Debug, Default)]
pub struct TracingStatusSink;

#[async_trait]
impl StatusSink for TracingStatusSink {
    async fn record(&self, event: &StatusEvent) -> Result<(), JobError> {
        info!(
            job_id = %event.job_id,
            status = %event.status,
            message = %event.message,
            "job status transition"
        );
        Ok(())
    }
}

/// Tenant directory that echoes the tenant id back as the display name,
/// keeping template context and destination paths deterministic when no
/// directory service is wired in.
#[derive(Debug, Default)]
pub struct StaticTenantDirectory;

#[async_trait]
impl TenantDirectory for StaticTenantDirectory {
    async fn display_name(&self, tenant_id: &str) -> Result<String, JobError> {
        Ok(tenant_id.to_string())
    }
}

/// Placeholder vendor API client; real integrations replace this.
#[derive(Debug, Default)]
pub struct StubExternalApi;

#[async_trait]
impl ExternalApi for StubExternalApi {
    async fn call(
        &self,
        api_name: &str,
        _payload: &Value,
        idempotency_key: &str,
    ) -> Result<Payload, JobError> {
        info!(api = %api_name, idempotency_key = %idempotency_key, "stub external API call");
        let mut result = Payload::new();
        result.insert("status".to_string(), Value::String("ok".to_string()));
        result.insert("api".to_string(), Value::String(api_name.to_string()));
        Ok(result)
    }
}
