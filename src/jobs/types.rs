use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque structured payload attached to a job request.
pub type Payload = Map<String, Value>;

/// Lifecycle operation requested for a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Create,
    Update,
    Delete,
    Read,
}

/// Immutable input describing one provisioning job.
///
/// Created once at submission and never mutated; everything the workflow
/// learns along the way lives in [`WorkflowExecutionState`] instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub job_id: String,
    pub tenant_id: String,
    /// Hierarchical category string, e.g. `k8s/namespace`.
    pub category: String,
    pub job_type: JobType,
    #[serde(default)]
    pub payload: Payload,
}

impl JobRequest {
    /// Resource name from the payload, falling back to a stable default so
    /// destination paths stay deterministic.
    pub fn resource_name(&self) -> &str {
        self.payload
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("resource")
    }

    /// Top-level category group (`k8s` for `k8s/namespace`).
    pub fn category_group(&self) -> &str {
        self.category.split('/').next().unwrap_or(&self.category)
    }
}

/// Status vocabulary used by the append-only job history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// One entry in a job's status history, emitted per phase transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    pub job_id: String,
    pub status: JobStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl StatusEvent {
    pub fn now(job_id: &str, status: JobStatus, message: impl Into<String>) -> Self {
        Self {
            job_id: job_id.to_string(),
            status,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Phases of the job workflow state machine.
///
/// `Submitted` is the sole initial phase; `Succeeded` and `Failed` are
/// terminal; once reached, the execution state becomes immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Submitted,
    PreChecking,
    Delivering,
    Invoking,
    Completing,
    Succeeded,
    Failed,
}

impl JobPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobPhase::Succeeded | JobPhase::Failed)
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobPhase::Submitted => "submitted",
            JobPhase::PreChecking => "pre_checking",
            JobPhase::Delivering => "delivering",
            JobPhase::Invoking => "invoking",
            JobPhase::Completing => "completing",
            JobPhase::Succeeded => "succeeded",
            JobPhase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Closed set of independently retried, independently timed workflow steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    Lookup,
    PreChecks,
    Delivery,
    Invoke,
    Wait,
    PostActions,
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepName::Lookup => "lookup",
            StepName::PreChecks => "pre_checks",
            StepName::Delivery => "delivery",
            StepName::Invoke => "invoke",
            StepName::Wait => "wait",
            StepName::PostActions => "post_actions",
        };
        f.write_str(s)
    }
}

/// Durable reference returned by git delivery: the commit pushed directly,
/// or the review branch pushed for out-of-band PR creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "ref", rename_all = "snake_case")]
pub enum DeliveryRef {
    Commit(String),
    Branch(String),
}

impl fmt::Display for DeliveryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryRef::Commit(sha) => write!(f, "commit {sha}"),
            DeliveryRef::Branch(name) => write!(f, "branch {name}"),
        }
    }
}

/// Durable state of one job's execution, exclusively owned by its workflow
/// instance and checkpointed after every completed step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecutionState {
    pub job_id: String,
    pub phase: JobPhase,
    /// Correlation id for logs and upstream idempotency keys.
    pub correlation_id: String,
    /// Per-step attempt counts, persisted alongside step outputs.
    #[serde(default)]
    pub attempts: HashMap<StepName, u32>,
    pub tenant_name: Option<String>,
    pub delivery_ref: Option<DeliveryRef>,
    pub api_result: Option<Payload>,
    /// Set when cancellation was requested; honored at step boundaries.
    #[serde(default)]
    pub cancel_requested: bool,
    /// Append-only status history, one event per phase transition.
    #[serde(default)]
    pub history: Vec<StatusEvent>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowExecutionState {
    pub fn new(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            phase: JobPhase::Submitted,
            correlation_id: uuid::Uuid::new_v4().to_string(),
            attempts: HashMap::new(),
            tenant_name: None,
            delivery_ref: None,
            api_result: None,
            cancel_requested: false,
            history: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn record_attempt(&mut self, step: StepName) -> u32 {
        let count = self.attempts.entry(step).or_insert(0);
        *count += 1;
        *count
    }

    pub fn attempts_for(&self, step: StepName) -> u32 {
        self.attempts.get(&step).copied().unwrap_or(0)
    }

    pub fn last_event(&self) -> Option<&StatusEvent> {
        self.history.last()
    }

    pub fn push_event(&mut self, event: StatusEvent) {
        self.history.push(event);
        self.updated_at = Utc::now();
    }
}
