//! Object storage handlers. Both categories are configuration-as-code: the
//! storage operator reconciles tenants and buckets from the delivered
//! manifests.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use crate::delivery::MergeStrategy;
use crate::error::JobError;
use crate::external::GitDelivery;
use crate::jobs::DeliveryRef;

use super::{require_str, validate_dns_label, Capabilities, HandlerContext, JobHandler};

// S3 bucket naming: 3-63 chars, lowercase letters, digits, hyphens,
// starting and ending alphanumeric.
static BUCKET_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]{1,61}[a-z0-9]$").unwrap());

/// `storage/s3tenant`: per-tenant storage accounts.
pub struct S3TenantHandler;

#[async_trait]
impl JobHandler for S3TenantHandler {
    fn category(&self) -> &'static str {
        "storage/s3tenant"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::DELIVERY
    }

    async fn pre_checks(&self, ctx: &HandlerContext) -> Result<(), JobError> {
        let name = require_str(&ctx.request.payload, "name")?;
        validate_dns_label(name, "storage tenant")
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

/// `storage/s3bucket`: individual buckets.
pub struct S3BucketHandler;

#[async_trait]
impl JobHandler for S3BucketHandler {
    fn category(&self) -> &'static str {
        "storage/s3bucket"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::DELIVERY
    }

    async fn pre_checks(&self, ctx: &HandlerContext) -> Result<(), JobError> {
        let name = require_str(&ctx.request.payload, "name")?;
        if !BUCKET_NAME.is_match(name) {
            return Err(JobError::Validation(format!(
                "bucket name '{name}' must be 3-63 lowercase alphanumeric or hyphen characters"
            )));
        }
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
}
