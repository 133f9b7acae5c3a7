//! The durable per-job workflow state machine.
//!
//! One runner drives exactly one job through
//! `Submitted → PreChecking → Delivering? → Invoking? → Completing →
//! {Succeeded, Failed}`. Workflow logic never does I/O directly: every
//! I/O-bearing operation runs through [`run_step`] with its own timeout and
//! retry budget, and the state is checkpointed after each completed step so
//! a crash resumes from there rather than from `Submitted`.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::delivery::merge_strategy::{self, MergeStrategy, MergeStrategyMap};
use crate::error::JobError;
use crate::external::Collaborators;
use crate::handlers::{HandlerContext, JobHandler};
use crate::jobs::{
    JobPhase, JobRequest, JobStatus, StatusEvent, StepName, WorkflowExecutionState,
};

use super::persistence::StateStore;
use super::retry::{backoff_delay, RetryConfig, StepBudgets};

/// Merge-strategy policy inputs shared by all jobs.
#[derive(Debug, Clone, Default)]
pub struct MergeSettings {
    pub configured: MergeStrategyMap,
    pub default: MergeStrategy,
}

pub(crate) struct WorkflowRunner {
    request: JobRequest,
    handler: Arc<dyn JobHandler>,
    collaborators: Collaborators,
    store: Arc<dyn StateStore>,
    budgets: Arc<StepBudgets>,
    merge: MergeSettings,
    state: WorkflowExecutionState,
    cancel: Arc<AtomicBool>,
    phase_tx: watch::Sender<JobPhase>,
}

impl WorkflowRunner {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        request: JobRequest,
        handler: Arc<dyn JobHandler>,
        collaborators: Collaborators,
        store: Arc<dyn StateStore>,
        budgets: Arc<StepBudgets>,
        merge: MergeSettings,
        state: WorkflowExecutionState,
        cancel: Arc<AtomicBool>,
        phase_tx: watch::Sender<JobPhase>,
    ) -> Self {
        Self {
            request,
            handler,
            collaborators,
            store,
            budgets,
            merge,
            state,
            cancel,
            phase_tx,
        }
    }

    pub(crate) async fn run(mut self) -> JobPhase {
        info!(
            job_id = %self.request.job_id,
            category = %self.request.category,
            phase = %self.state.phase,
            "workflow instance starting"
        );
        if let Err(err) = self.drive().await {
            self.fail(err).await;
        }
        self.state.phase
    }

    async fn drive(&mut self) -> Result<(), JobError> {
        loop {
            // Cancellation is honored between steps only; an in-flight step
            // always finishes first.
            self.check_cancel()?;

            match self.state.phase {
                JobPhase::Submitted => self.submitted().await?,
                JobPhase::PreChecking => self.pre_checking().await?,
                JobPhase::Delivering => self.delivering().await?,
                JobPhase::Invoking => self.invoking().await?,
                JobPhase::Completing => {
                    self.completing().await?;
                    return Ok(());
                }
                // Resumed an already-terminal instance: nothing to do.
                JobPhase::Succeeded | JobPhase::Failed => return Ok(()),
            }
        }
    }

    async fn submitted(&mut self) -> Result<(), JobError> {
        let tenants = self.collaborators.tenants.clone();
        let tenant_id = self.request.tenant_id.clone();
        let budget = self.budgets.for_step(StepName::Lookup);
        let tenant_name = run_step(&mut self.state, StepName::Lookup, budget, || {
            let tenants = tenants.clone();
            let tenant_id = tenant_id.clone();
            async move { tenants.display_name(&tenant_id).await }
        })
        .await?;

        self.state.tenant_name = Some(tenant_name.clone());
        self.advance(
            JobPhase::PreChecking,
            format!(
                "dispatched to '{}' handler for tenant '{tenant_name}'",
                self.handler.category()
            ),
        )
        .await
    }

    async fn pre_checking(&mut self) -> Result<(), JobError> {
        let ctx = self.context();
        let handler = self.handler.clone();
        let budget = self.budgets.for_step(StepName::PreChecks);
        run_step(&mut self.state, StepName::PreChecks, budget, || {
            let handler = handler.clone();
            let ctx = ctx.clone();
            async move { handler.pre_checks(&ctx).await }
        })
        .await?;

        let caps = self.handler.capabilities();
        let next = if caps.supports_delivery {
            JobPhase::Delivering
        } else if caps.supports_external_call {
            JobPhase::Invoking
        } else {
            JobPhase::Completing
        };
        self.advance(next, "pre-checks passed".to_string()).await
    }

    async fn delivering(&mut self) -> Result<(), JobError> {
        let strategy = merge_strategy::resolve(
            merge_strategy::explicit_override(&self.request.payload),
            &self.request.category,
            &self.merge.configured,
            self.merge.default,
        );

        let ctx = self.context();
        let handler = self.handler.clone();
        let git = self.collaborators.git.clone();
        let budget = self.budgets.for_step(StepName::Delivery);
        let delivered = run_step(&mut self.state, StepName::Delivery, budget, || {
            let handler = handler.clone();
            let ctx = ctx.clone();
            let git = git.clone();
            async move { handler.commit_to_git(&ctx, git.as_ref(), strategy).await }
        })
        .await?;

        let message = match &delivered {
            Some(reference) => format!("configuration delivered ({reference})"),
            None => "no configuration to deliver".to_string(),
        };
        self.state.delivery_ref = delivered;

        let next = if self.handler.capabilities().supports_external_call {
            JobPhase::Invoking
        } else {
            JobPhase::Completing
        };
        self.advance(next, message).await
    }

    async fn invoking(&mut self) -> Result<(), JobError> {
        let ctx = self.context();
        let handler = self.handler.clone();
        let api = self.collaborators.api.clone();

        let budget = self.budgets.for_step(StepName::Invoke);
        let result = run_step(&mut self.state, StepName::Invoke, budget, || {
            let handler = handler.clone();
            let ctx = ctx.clone();
            let api = api.clone();
            async move { handler.call_external_apis(&ctx, api.as_ref()).await }
        })
        .await?;
        self.state.api_result = result;

        self.check_cancel()?;

        let budget = self.budgets.for_step(StepName::Wait);
        run_step(&mut self.state, StepName::Wait, budget, || {
            let handler = handler.clone();
            let ctx = ctx.clone();
            let api = api.clone();
            async move { handler.wait_for_completion(&ctx, api.as_ref()).await }
        })
        .await?;

        self.advance(JobPhase::Completing, "external provisioning finished".to_string())
            .await
    }

    async fn completing(&mut self) -> Result<(), JobError> {
        let ctx = self.context();
        let budget = self.budgets.for_step(StepName::PostActions);
        // Best-effort: a notification failure never fails a finished job.
        match tokio::time::timeout(budget.timeout(), self.handler.post_actions(&ctx)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(job_id = %self.request.job_id, error = %err, "post actions failed, ignoring")
            }
            Err(_) => {
                warn!(job_id = %self.request.job_id, "post actions timed out, ignoring")
            }
        }

        // Deterministic tie-break: the delivery reference wins the final
        // message; both outputs stay retrievable in the execution state.
        let message = match (&self.state.delivery_ref, &self.state.api_result) {
            (Some(reference), _) => format!("delivered {reference}"),
            (None, Some(_)) => "external provisioning completed".to_string(),
            (None, None) => "completed with no provisioning actions".to_string(),
        };

        self.state.phase = JobPhase::Succeeded;
        let event = StatusEvent::now(&self.request.job_id, JobStatus::Succeeded, message);
        self.state.push_event(event.clone());
        self.checkpoint().await?;
        if let Err(err) = self.store.archive(&self.request.job_id).await {
            warn!(job_id = %self.request.job_id, error = %err, "archiving terminal state failed");
        }
        let _ = self.phase_tx.send(JobPhase::Succeeded);
        self.record_status(&event).await;
        info!(job_id = %self.request.job_id, "workflow succeeded");
        Ok(())
    }

    async fn fail(&mut self, err: JobError) {
        let (status, message) = match &err {
            JobError::Cancelled => (
                JobStatus::Cancelled,
                "job cancelled before completion".to_string(),
            ),
            other => (JobStatus::Failed, other.to_string()),
        };
        error!(job_id = %self.request.job_id, error = %err, "workflow failed");

        self.state.phase = JobPhase::Failed;
        let event = StatusEvent::now(&self.request.job_id, status, message);
        self.state.push_event(event.clone());
        if let Err(persist_err) = self.checkpoint().await {
            error!(
                job_id = %self.request.job_id,
                error = %persist_err,
                "failed to checkpoint terminal state"
            );
        }
        if let Err(archive_err) = self.store.archive(&self.request.job_id).await {
            warn!(job_id = %self.request.job_id, error = %archive_err, "archiving terminal state failed");
        }
        let _ = self.phase_tx.send(JobPhase::Failed);
        self.record_status(&event).await;
    }

    /// Record the completed step's outputs and move to the next phase:
    /// checkpoint first, then publish, so observers never see a phase the
    /// store does not.
    async fn advance(&mut self, next: JobPhase, message: String) -> Result<(), JobError> {
        self.state.phase = next;
        let event = StatusEvent::now(&self.request.job_id, JobStatus::Running, message);
        self.state.push_event(event.clone());
        self.checkpoint().await?;
        let _ = self.phase_tx.send(next);
        self.record_status(&event).await;
        Ok(())
    }

    async fn checkpoint(&mut self) -> Result<(), JobError> {
        self.store
            .save(&self.state)
            .await
            .map_err(|err| JobError::Internal(format!("state checkpoint failed: {err}")))
    }

    /// Fire-and-forget status recording: sink failures are logged, never
    /// propagated.
    async fn record_status(&self, event: &StatusEvent) {
        if let Err(err) = self.collaborators.status.record(event).await {
            warn!(
                job_id = %event.job_id,
                error = %err,
                "status sink rejected event, ignoring"
            );
        }
    }

    fn check_cancel(&mut self) -> Result<(), JobError> {
        if self.cancel.load(Ordering::SeqCst) {
            self.state.cancel_requested = true;
            return Err(JobError::Cancelled);
        }
        Ok(())
    }

    fn context(&self) -> HandlerContext {
        HandlerContext {
            request: self.request.clone(),
            tenant_name: self
                .state
                .tenant_name
                .clone()
                .unwrap_or_else(|| self.request.tenant_id.clone()),
            correlation_id: self.state.correlation_id.clone(),
        }
    }
}

/// Execute one workflow step under its retry budget.
///
/// Each attempt is bounded by the budget's timeout; a timeout counts as one
/// failed attempt. Retryable errors back off exponentially until the budget
/// is exhausted, at which point they convert to `RetriesExhausted` so
/// operators can tell "gave up after N attempts" from "rejected input".
async fn run_step<T, F, Fut>(
    state: &mut WorkflowExecutionState,
    step: StepName,
    budget: &RetryConfig,
    op: F,
) -> Result<T, JobError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, JobError>>,
{
    loop {
        let attempt = state.record_attempt(step);
        let outcome = match tokio::time::timeout(budget.timeout(), op()).await {
            Ok(result) => result,
            Err(_) => Err(JobError::StepTimeout {
                step,
                timeout_ms: budget.timeout().as_millis() as u64,
            }),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < budget.max_attempts => {
                warn!(step = %step, attempt, error = %err, "step attempt failed, retrying");
                tokio::time::sleep(backoff_delay(budget, attempt)).await;
            }
            Err(err) if err.is_retryable() => {
                return Err(JobError::RetriesExhausted {
                    step,
                    attempts: attempt,
                    last: Box::new(err),
                });
            }
            Err(err) => return Err(err),
        }
    }
}
