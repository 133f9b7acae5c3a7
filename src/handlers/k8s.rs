//! Kubernetes resource handlers. All three categories are pure GitOps:
//! manifests are delivered into the cluster repository and reconciled from
//! there, so no provisioning API is involved.

use async_trait::async_trait;
use serde_json::Value;

use crate::delivery::MergeStrategy;
use crate::error::JobError;
use crate::external::GitDelivery;
use crate::jobs::DeliveryRef;

use super::{require_str, validate_dns_label, Capabilities, HandlerContext, JobHandler};

/// `k8s/namespace`: tenant namespaces.
pub struct NamespaceHandler;

#[async_trait]
impl JobHandler for NamespaceHandler {
    fn category(&self) -> &'static str {
        "k8s/namespace"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::DELIVERY
    }

    async fn pre_checks(&self, ctx: &HandlerContext) -> Result<(), JobError> {
        let name = require_str(&ctx.request.payload, "name")?;
        validate_dns_label(name, "namespace")
    }

    async fn commit_to_git(
        &self,
        ctx: &HandlerContext,
        git: &dyn GitDelivery,
        strategy: MergeStrategy,
    ) -> Result<Option<DeliveryRef>, JobError> {
        git.render_and_deliver(ctx.delivery_request(strategy))
            .await
            .map(Some)
    }
}

/// `k8s/pvs`: persistent volumes.
pub struct PersistentVolumesHandler;

#[async_trait]
impl JobHandler for PersistentVolumesHandler {
    fn category(&self) -> &'static str {
        "k8s/pvs"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::DELIVERY
    }

    async fn pre_checks(&self, ctx: &HandlerContext) -> Result<(), JobError> {
        let name = require_str(&ctx.request.payload, "name")?;
        validate_dns_label(name, "volume")?;

        match ctx.request.payload.get("capacity_gib").and_then(Value::as_u64) {
            Some(capacity) if capacity > 0 => Ok(()),
            Some(_) => Err(JobError::Validation(
                "payload field 'capacity_gib' must be positive".to_string(),
            )),
            None => Err(JobError::Validation(
                "payload field 'capacity_gib' is required".to_string(),
            )),
        }
    }

    async fn commit_to_git(
        &self,
        ctx: &HandlerContext,
        git: &dyn GitDelivery,
        strategy: MergeStrategy,
    ) -> Result<Option<DeliveryRef>, JobError> {
        git.render_and_deliver(ctx.delivery_request(strategy))
            .await
            .map(Some)
    }
}

/// `k8s/service_mesh`: mesh enrollment for a tenant namespace.
pub struct ServiceMeshHandler;

#[async_trait]
impl JobHandler for ServiceMeshHandler {
    fn category(&self) -> &'static str {
        "k8s/service_mesh"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::DELIVERY
    }

    async fn pre_checks(&self, ctx: &HandlerContext) -> Result<(), JobError> {
        let name = require_str(&ctx.request.payload, "name")?;
        validate_dns_label(name, "mesh member")
    }

    async fn commit_to_git(
        &self,
        ctx: &HandlerContext,
        git: &dyn GitDelivery,
        strategy: MergeStrategy,
    ) -> Result<Option<DeliveryRef>, JobError> {
        git.render_and_deliver(ctx.delivery_request(strategy))
            .await
            .map(Some)
    }
}
