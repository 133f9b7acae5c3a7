//! Catch-all category for requests that only need validation and status
//! tracking; no configuration delivery, no provisioning API.

use async_trait::async_trait;
use tracing::info;

use crate::error::JobError;

use super::{Capabilities, HandlerContext, JobHandler};

pub struct MiscHandler;

#[async_trait]
impl JobHandler for MiscHandler {
    fn category(&self) -> &'static str {
        "misc"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
    }

    async fn pre_checks(&self, ctx: &HandlerContext) -> Result<(), JobError> {
        if ctx.request.payload.is_empty() {
            return Err(JobError::Validation("payload must not be empty".to_string()));
        }
        Ok(())
    }

    async fn post_actions(&self, ctx: &HandlerContext) -> Result<(), JobError> {
        // Notification hook; replaced per deployment.
        info!(job_id = %ctx.request.job_id, "misc job recorded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{JobRequest, JobType, Payload};
    use serde_json::json;

    fn context(payload: Payload) -> HandlerContext {
        HandlerContext {
            request: JobRequest {
                job_id: "job-1".to_string(),
                tenant_id: "acme".to_string(),
                category: "misc".to_string(),
                job_type: JobType::Create,
                payload,
            },
            tenant_name: "acme".to_string(),
            correlation_id: "corr".to_string(),
        }
    }

    #[tokio::test]
    async fn empty_payload_is_rejected() {
        assert!(MiscHandler.pre_checks(&context(Payload::new())).await.is_err());

        let mut payload = Payload::new();
        payload.insert("note".to_string(), json!("manual request"));
        assert!(MiscHandler.pre_checks(&context(payload)).await.is_ok());
    }
}
