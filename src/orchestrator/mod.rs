//! Job orchestration engine.
//!
//! [`Orchestrator`] is the submission surface: it guarantees exactly one
//! workflow instance per job id, hands out [`JobHandle`]s for observation,
//! and answers status queries from the durable state store. All engine
//! pieces are explicitly constructed, passed-down handles; nothing here is
//! a process-global.

pub mod persistence;
pub mod retry;
pub mod workflow;

pub use persistence::{FileStateStore, InMemoryStateStore, StateStore, StateStoreError};
pub use retry::{RetryConfig, StepBudgets};
pub use workflow::MergeSettings;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tracing::{debug, info};

use crate::external::Collaborators;
use crate::handlers::HandlerRegistry;
use crate::jobs::{JobPhase, JobRequest, StatusEvent, WorkflowExecutionState};

use workflow::WorkflowRunner;

/// Observation handle for one workflow instance.
#[derive(Debug, Clone)]
pub struct JobHandle {
    job_id: String,
    phase: watch::Receiver<JobPhase>,
}

impl JobHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Current phase, non-blocking.
    pub fn phase(&self) -> JobPhase {
        *self.phase.borrow()
    }

    /// Wait until the instance reaches `Succeeded` or `Failed`.
    pub async fn await_terminal(&mut self) -> JobPhase {
        loop {
            let phase = *self.phase.borrow_and_update();
            if phase.is_terminal() {
                return phase;
            }
            if self.phase.changed().await.is_err() {
                return *self.phase.borrow();
            }
        }
    }
}

struct RunningInstance {
    cancel: Arc<AtomicBool>,
    phase: watch::Receiver<JobPhase>,
}

pub struct Orchestrator {
    registry: Arc<HandlerRegistry>,
    collaborators: Collaborators,
    store: Arc<dyn StateStore>,
    budgets: Arc<StepBudgets>,
    merge: MergeSettings,
    running: Arc<RwLock<HashMap<String, RunningInstance>>>,
}

impl Orchestrator {
    pub fn new(
        registry: HandlerRegistry,
        collaborators: Collaborators,
        store: Arc<dyn StateStore>,
        budgets: StepBudgets,
        merge: MergeSettings,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            collaborators,
            store,
            budgets: Arc::new(budgets),
            merge,
            running: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Start (or re-attach to) the workflow instance for a job.
    ///
    /// Exactly one instance runs per job id: re-submission returns a handle
    /// to the existing instance (running or already terminal) and never
    /// starts a second one. A persisted non-terminal state is resumed from
    /// its last completed step.
    pub async fn submit(&self, request: JobRequest) -> Result<JobHandle, StateStoreError> {
        let mut running = self.running.write().await;
        if let Some(instance) = running.get(&request.job_id) {
            debug!(job_id = %request.job_id, "job already submitted, returning existing handle");
            return Ok(JobHandle {
                job_id: request.job_id,
                phase: instance.phase.clone(),
            });
        }

        let state = match self.store.load(&request.job_id).await? {
            Some(state) if state.phase.is_terminal() => {
                debug!(job_id = %request.job_id, phase = %state.phase, "job already terminal");
                let (_tx, rx) = watch::channel(state.phase);
                return Ok(JobHandle {
                    job_id: request.job_id,
                    phase: rx,
                });
            }
            Some(state) => {
                info!(job_id = %request.job_id, phase = %state.phase, "resuming persisted job");
                state
            }
            None => {
                let state = WorkflowExecutionState::new(&request.job_id);
                self.store.save(&state).await?;
                state
            }
        };

        let handler = self.registry.resolve(&request.category);
        let cancel = Arc::new(AtomicBool::new(state.cancel_requested));
        let (phase_tx, phase_rx) = watch::channel(state.phase);

        let runner = WorkflowRunner::new(
            request.clone(),
            handler,
            self.collaborators.clone(),
            self.store.clone(),
            self.budgets.clone(),
            self.merge.clone(),
            state,
            cancel.clone(),
            phase_tx,
        );

        running.insert(
            request.job_id.clone(),
            RunningInstance {
                cancel,
                phase: phase_rx.clone(),
            },
        );
        drop(running);

        tokio::spawn(runner.run());

        Ok(JobHandle {
            job_id: request.job_id,
            phase: phase_rx,
        })
    }

    /// Current phase plus the last status event, read from the durable
    /// store; never blocks on the workflow itself.
    pub async fn status(
        &self,
        job_id: &str,
    ) -> Result<Option<(JobPhase, Option<StatusEvent>)>, StateStoreError> {
        let state = self.store.load(job_id).await?;
        Ok(state.map(|s| {
            let last = s.last_event().cloned();
            (s.phase, last)
        }))
    }

    /// Request cancellation. Takes effect at the next step boundary; the
    /// in-flight step is allowed to finish. Returns whether the job was
    /// running.
    pub async fn cancel(&self, job_id: &str) -> bool {
        let running = self.running.read().await;
        match running.get(job_id) {
            Some(instance) if !instance.phase.borrow().is_terminal() => {
                info!(job_id, "cancellation requested");
                instance.cancel.store(true, Ordering::SeqCst);
                true
            }
            _ => false,
        }
    }

    /// Categories the engine can dispatch.
    pub fn categories(&self) -> Vec<&str> {
        self.registry.categories()
    }
}
