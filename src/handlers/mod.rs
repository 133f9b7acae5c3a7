//! Handler capability contract and the category handlers shipped with the
//! orchestrator.
//!
//! Every resource category implements [`JobHandler`]; the workflow never
//! special-cases a category. Capability flags make the optional lifecycle
//! steps explicit so the workflow can branch without probing for no-op
//! overrides.

pub mod compute;
pub mod k8s;
pub mod misc;
pub mod networking;
pub mod registry;
pub mod storage;

pub use registry::{default_registry, HandlerRegistry};

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use crate::delivery::MergeStrategy;
use crate::error::JobError;
use crate::external::{DeliveryRequest, ExternalApi, GitDelivery};
use crate::jobs::{DeliveryRef, JobRequest, Payload};

/// Which optional lifecycle steps a handler participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub supports_delivery: bool,
    pub supports_external_call: bool,
}

impl Capabilities {
    pub const NONE: Capabilities = Capabilities {
        supports_delivery: false,
        supports_external_call: false,
    };
    pub const DELIVERY: Capabilities = Capabilities {
        supports_delivery: true,
        supports_external_call: false,
    };
    pub const EXTERNAL: Capabilities = Capabilities {
        supports_delivery: false,
        supports_external_call: true,
    };
    pub const DELIVERY_AND_EXTERNAL: Capabilities = Capabilities {
        supports_delivery: true,
        supports_external_call: true,
    };
}

/// Per-job context handed to every lifecycle step.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub request: JobRequest,
    pub tenant_name: String,
    pub correlation_id: String,
}

impl HandlerContext {
    /// Idempotency key for upstream calls, stable across retries and
    /// workflow resumes for the same job.
    pub fn idempotency_key(&self) -> String {
        format!("provisio-{}", self.request.job_id)
    }

    /// Template id by category convention.
    pub fn template_id(&self) -> String {
        format!("{}.yaml.j2", self.request.category)
    }

    /// Destination path inside the category repository.
    pub fn destination_path(&self) -> String {
        format!("{}/{}.yaml", self.request.tenant_id, self.request.resource_name())
    }

    /// Render context: tenant, resource name, and the raw payload.
    pub fn render_context(&self) -> Payload {
        let mut context = Payload::new();
        context.insert("tenant".to_string(), Value::String(self.tenant_name.clone()));
        context.insert(
            "name".to_string(),
            Value::String(self.request.resource_name().to_string()),
        );
        context.insert(
            "payload".to_string(),
            Value::Object(self.request.payload.clone()),
        );
        context
    }

    pub fn delivery_request(&self, strategy: MergeStrategy) -> DeliveryRequest {
        DeliveryRequest {
            job_id: self.request.job_id.clone(),
            template_id: self.template_id(),
            context: self.render_context(),
            category: self.request.category.clone(),
            destination_path: self.destination_path(),
            merge_strategy: strategy,
        }
    }
}

/// Uniform lifecycle contract for one resource category.
///
/// `pre_checks` failures are terminal; retry cannot fix malformed input.
/// `commit_to_git` and `call_external_apis` are optional (gate them with
/// [`Capabilities`]) and retryable. `post_actions` is best-effort: the
/// workflow logs and swallows its errors.
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn category(&self) -> &'static str;

    fn capabilities(&self) -> Capabilities;

    /// Validate payload shape, naming, and quota before any side effect.
    async fn pre_checks(&self, ctx: &HandlerContext) -> Result<(), JobError>;

    /// Render and deliver category configuration; `None` when the category
    /// is not configuration-as-code.
    async fn commit_to_git(
        &self,
        _ctx: &HandlerContext,
        _git: &dyn GitDelivery,
        _strategy: MergeStrategy,
    ) -> Result<Option<DeliveryRef>, JobError> {
        Ok(None)
    }

    /// Invoke provisioning APIs; `None` when the category is pure GitOps.
    async fn call_external_apis(
        &self,
        _ctx: &HandlerContext,
        _api: &dyn ExternalApi,
    ) -> Result<Option<Payload>, JobError> {
        Ok(None)
    }

    /// Wait for upstream completion. Default is an immediate return; the
    /// workflow bounds overrides with the step timeout.
    async fn wait_for_completion(
        &self,
        _ctx: &HandlerContext,
        _api: &dyn ExternalApi,
    ) -> Result<(), JobError> {
        Ok(())
    }

    /// Notifications, metrics, cleanup. Never fails the job.
    async fn post_actions(&self, _ctx: &HandlerContext) -> Result<(), JobError> {
        Ok(())
    }
}

static DNS_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$").unwrap());

static HOSTNAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,}$").unwrap()
});

/// RFC-1123 label check shared by the kubernetes and storage handlers.
pub(crate) fn validate_dns_label(name: &str, what: &str) -> Result<(), JobError> {
    if DNS_LABEL.is_match(name) {
        Ok(())
    } else {
        Err(JobError::Validation(format!(
            "{what} '{name}' must be a lowercase RFC-1123 label"
        )))
    }
}

pub(crate) fn validate_hostname(name: &str, what: &str) -> Result<(), JobError> {
    if HOSTNAME.is_match(name) {
        Ok(())
    } else {
        Err(JobError::Validation(format!(
            "{what} '{name}' must be a fully qualified hostname"
        )))
    }
}

pub(crate) fn require_str<'a>(payload: &'a Payload, key: &str) -> Result<&'a str, JobError> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| JobError::Validation(format!("payload field '{key}' is required")))
}

pub(crate) fn require_port(payload: &Payload, key: &str) -> Result<u16, JobError> {
    let port = payload
        .get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| JobError::Validation(format!("payload field '{key}' is required")))?;
    u16::try_from(port)
        .ok()
        .filter(|p| *p > 0)
        .ok_or_else(|| JobError::Validation(format!("payload field '{key}' is not a valid port")))
}
