// provisio - Multi-Tenant Infrastructure Provisioning Orchestrator
// This exposes the core components for testing and integration

pub mod config;
pub mod delivery;
pub mod error;
pub mod external;
pub mod handlers;
pub mod jobs;
pub mod orchestrator;
pub mod telemetry;

// Re-export key types for easy access
pub use config::ProvisioConfig;
pub use delivery::{
    resolve, Git2Delivery, GitAuth, JsonManifestEngine, MergeStrategy, MergeStrategyMap,
    TemplateEngine,
};
pub use error::JobError;
pub use external::{
    Collaborators, DeliveryRequest, ExternalApi, GitDelivery, StaticTenantDirectory, StatusSink,
    StubExternalApi, TenantDirectory, TracingStatusSink,
};
pub use handlers::{default_registry, Capabilities, HandlerContext, HandlerRegistry, JobHandler};
pub use jobs::{
    DeliveryRef, JobPhase, JobRequest, JobStatus, JobType, Payload, StatusEvent, StepName,
    WorkflowExecutionState,
};
pub use orchestrator::{
    FileStateStore, InMemoryStateStore, JobHandle, MergeSettings, Orchestrator, RetryConfig,
    StateStore, StateStoreError, StepBudgets,
};
pub use telemetry::{generate_correlation_id, init_telemetry, shutdown_telemetry};
