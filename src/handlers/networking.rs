//! Enterprise networking handlers. These are hybrid categories: the desired
//! state is delivered as configuration and the change is also pushed to the
//! network team's provisioning APIs.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::delivery::MergeStrategy;
use crate::error::JobError;
use crate::external::{ExternalApi, GitDelivery};
use crate::jobs::{DeliveryRef, Payload};

use super::{
    require_port, require_str, validate_dns_label, validate_hostname, Capabilities,
    HandlerContext, JobHandler,
};

/// `enterprise_networking/lb`: load balancer virtual services.
pub struct LoadBalancerHandler;

#[async_trait]
impl JobHandler for LoadBalancerHandler {
    fn category(&self) -> &'static str {
        "enterprise_networking/lb"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::DELIVERY_AND_EXTERNAL
    }

    async fn pre_checks(&self, ctx: &HandlerContext) -> Result<(), JobError> {
        let name = require_str(&ctx.request.payload, "name")?;
        validate_dns_label(name, "load balancer")?;
        require_port(&ctx.request.payload, "frontend_port")?;
        require_port(&ctx.request.payload, "backend_port")?;
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
            "service": Value::Object(ctx.request.payload.clone()),
        });
        let result = api
            .call("loadbalancer", &body, &ctx.idempotency_key())
            .await?;
        Ok(Some(result))
    }
}

/// `enterprise_networking/cname`: DNS aliases.
pub struct CnameHandler;

#[async_trait]
impl JobHandler for CnameHandler {
    fn category(&self) -> &'static str {
        "enterprise_networking/cname"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::DELIVERY_AND_EXTERNAL
    }

    async fn pre_checks(&self, ctx: &HandlerContext) -> Result<(), JobError> {
        let name = require_str(&ctx.request.payload, "name")?;
        validate_hostname(name, "cname")?;
        let target = require_str(&ctx.request.payload, "target")?;
        validate_hostname(target, "cname target")
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
            "record": Value::Object(ctx.request.payload.clone()),
        });
        let result = api.call("dns", &body, &ctx.idempotency_key()).await?;
        Ok(Some(result))
    }
}

/// `enterprise_networking/fw`: firewall rule sets.
pub struct FirewallHandler;

#[async_trait]
impl JobHandler for FirewallHandler {
    fn category(&self) -> &'static str {
        "enterprise_networking/fw"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::DELIVERY_AND_EXTERNAL
    }

    async fn pre_checks(&self, ctx: &HandlerContext) -> Result<(), JobError> {
        let name = require_str(&ctx.request.payload, "name")?;
        validate_dns_label(name, "rule set")?;

        let rules = ctx
            .request
            .payload
            .get("rules")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                JobError::Validation("payload field 'rules' must be an array".to_string())
            })?;
        if rules.is_empty() {
            return Err(JobError::Validation(
                "payload field 'rules' must not be empty".to_string(),
            ));
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

    async fn call_external_apis(
        &self,
        ctx: &HandlerContext,
        api: &dyn ExternalApi,
    ) -> Result<Option<Payload>, JobError> {
        let body = json!({
            "tenant": ctx.tenant_name,
            "ruleset": Value::Object(ctx.request.payload.clone()),
        });
        let result = api.call("firewall", &body, &ctx.idempotency_key()).await?;
        Ok(Some(result))
    }
}
