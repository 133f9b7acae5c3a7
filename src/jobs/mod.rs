//! Job domain model: requests, phases, status events, and the durable
//! per-job execution state the workflow engine checkpoints.

pub mod types;

pub use types::{
    DeliveryRef, JobPhase, JobRequest, JobStatus, JobType, Payload, StatusEvent, StepName,
    WorkflowExecutionState,
};
