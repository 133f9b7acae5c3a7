use thiserror::Error;

use crate::jobs::StepName;

/// Error taxonomy for job execution.
///
/// Terminal errors (`Validation`, `UnknownCategory`, `Dispatch`, `Lookup`)
/// fail the job on first occurrence. Transient errors (`Delivery`,
/// `Upstream`, `StepTimeout`) are retried against the owning step's budget
/// and converted to `RetriesExhausted` once the budget runs out.
#[derive(Debug, Clone, Error)]
pub enum JobError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unsupported resource category '{0}'")]
    UnknownCategory(String),

    #[error("handler dispatch failed: {0}")]
    Dispatch(String),

    #[error("tenant lookup failed: {0}")]
    Lookup(String),

    #[error("git delivery failed: {0}")]
    Delivery(String),

    #[error("upstream API call failed: {0}")]
    Upstream(String),

    #[error("job cancelled")]
    Cancelled,

    #[error("internal orchestrator error: {0}")]
    Internal(String),

    #[error("step '{step}' timed out after {timeout_ms}ms")]
    StepTimeout { step: StepName, timeout_ms: u64 },

    #[error("step '{step}' gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        step: StepName,
        attempts: u32,
        last: Box<JobError>,
    },
}

impl JobError {
    /// Whether the error may resolve on its own and is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            JobError::Delivery(_) | JobError::Upstream(_) | JobError::StepTimeout { .. }
        )
    }

    /// Terminal errors end the job; everything else is attempt-scoped.
    pub fn is_terminal(&self) -> bool {
        !self.is_retryable()
    }
}
