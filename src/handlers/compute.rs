//! Compute handlers: virtual machines go through the provider API only;
//! OS images are hybrid; the image spec is delivered as configuration and
//! the build is kicked off (and polled) through the image-builder API.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::delivery::MergeStrategy;
use crate::error::JobError;
use crate::external::{ExternalApi, GitDelivery};
use crate::jobs::{DeliveryRef, Payload};

use super::{require_str, validate_dns_label, Capabilities, HandlerContext, JobHandler};

const IMAGE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// `compute/vms`: lifecycle against the VM provider API, no GitOps.
pub struct VirtualMachinesHandler;

#[async_trait]
impl JobHandler for VirtualMachinesHandler {
    fn category(&self) -> &'static str {
        "compute/vms"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::EXTERNAL
    }

    async fn pre_checks(&self, ctx: &HandlerContext) -> Result<(), JobError> {
        let name = require_str(&ctx.request.payload, "name")?;
        validate_dns_label(name, "vm")?;
        require_str(&ctx.request.payload, "flavor")?;

        if let Some(cores) = ctx.request.payload.get("cpu_cores") {
            if !cores.as_u64().is_some_and(|c| c > 0) {
                return Err(JobError::Validation(
                    "payload field 'cpu_cores' must be a positive integer".to_string(),
                ));
            }
        }
        Ok(())
    }

    async fn call_external_apis(
        &self,
        ctx: &HandlerContext,
        api: &dyn ExternalApi,
    ) -> Result<Option<Payload>, JobError> {
        let body = json!({
            "tenant": ctx.tenant_name,
            "operation": ctx.request.job_type,
            "vm": Value::Object(ctx.request.payload.clone()),
        });
        let result = api
            .call("vm_provisioner", &body, &ctx.idempotency_key())
            .await?;
        Ok(Some(result))
    }
}

/// `compute/osimages`: image spec in git, build via the image-builder API.
pub struct OsImagesHandler;

#[async_trait]
impl JobHandler for OsImagesHandler {
    fn category(&self) -> &'static str {
        "compute/osimages"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::DELIVERY_AND_EXTERNAL
    }

    async fn pre_checks(&self, ctx: &HandlerContext) -> Result<(), JobError> {
        let name = require_str(&ctx.request.payload, "name")?;
        validate_dns_label(name, "image")?;
        require_str(&ctx.request.payload, "base_os")?;
        Ok(())
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

    async fn call_external_apis(
        &self,
        ctx: &HandlerContext,
        api: &dyn ExternalApi,
    ) -> Result<Option<Payload>, JobError> {
        let body = json!({
            "tenant": ctx.tenant_name,
            "image": Value::Object(ctx.request.payload.clone()),
        });
        let result = api
            .call("image_builder", &body, &ctx.idempotency_key())
            .await?;
        Ok(Some(result))
    }

    /// Poll the builder until the image reports ready. The workflow bounds
    /// this with the wait step's timeout.
    async fn wait_for_completion(
        &self,
        ctx: &HandlerContext,
        api: &dyn ExternalApi,
    ) -> Result<(), JobError> {
        let body = json!({ "name": ctx.request.resource_name() });
        loop {
            let status = api
                .call("image_builder/status", &body, &ctx.idempotency_key())
                .await?;
            if build_finished(&status) {
                return Ok(());
            }
            debug!(job_id = %ctx.request.job_id, "image build still running");
            tokio::time::sleep(IMAGE_POLL_INTERVAL).await;
        }
    }
}

fn build_finished(status: &Payload) -> bool {
    let state = status
        .get("state")
        .or_else(|| status.get("status"))
        .and_then(Value::as_str);
    matches!(state, Some("ready") | Some("ok") | Some("done"))
}
