//! Durable workflow state storage.
//!
//! The runner checkpoints [`WorkflowExecutionState`] after every completed
//! step; a crash therefore resumes from the last completed step instead of
//! `Submitted`. Terminal states are archived but stay queryable.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

use crate::jobs::WorkflowExecutionState;

#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("state IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn save(&self, state: &WorkflowExecutionState) -> Result<(), StateStoreError>;

    /// Load the state for a job, active or archived.
    async fn load(&self, job_id: &str)
        -> Result<Option<WorkflowExecutionState>, StateStoreError>;

    /// Move a terminal state out of the active set.
    async fn archive(&self, job_id: &str) -> Result<(), StateStoreError>;
}

/// JSON-file-per-job store under a state directory.
///
/// Writes go through a temp file plus rename so a crash mid-write never
/// leaves a torn checkpoint behind.
pub struct FileStateStore {
    root: PathBuf,
}

impl FileStateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn active_path(&self, job_id: &str) -> PathBuf {
        self.root.join(format!("{job_id}.json"))
    }

    fn archived_path(&self, job_id: &str) -> PathBuf {
        self.root.join("archived").join(format!("{job_id}.json"))
    }

    async fn read_state(
        path: &Path,
    ) -> Result<Option<WorkflowExecutionState>, StateStoreError> {
        match fs::read(path).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn save(&self, state: &WorkflowExecutionState) -> Result<(), StateStoreError> {
        fs::create_dir_all(&self.root).await?;
        let path = self.active_path(&state.job_id);
        let tmp = self.root.join(format!("{}.json.tmp", state.job_id));
        let raw = serde_json::to_vec_pretty(state)?;
        fs::write(&tmp, &raw).await?;
        fs::rename(&tmp, &path).await?;
        debug!(job_id = %state.job_id, phase = %state.phase, "checkpointed workflow state");
        Ok(())
    }

    async fn load(
        &self,
        job_id: &str,
    ) -> Result<Option<WorkflowExecutionState>, StateStoreError> {
        if let Some(state) = Self::read_state(&self.active_path(job_id)).await? {
            return Ok(Some(state));
        }
        Self::read_state(&self.archived_path(job_id)).await
    }

    async fn archive(&self, job_id: &str) -> Result<(), StateStoreError> {
        let active = self.active_path(job_id);
        let archived = self.archived_path(job_id);
        if let Some(parent) = archived.parent() {
            fs::create_dir_all(parent).await?;
        }
        match fs::rename(&active, &archived).await {
            Ok(()) => Ok(()),
            // Already archived (or never persisted): nothing to move.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// In-memory store for tests and ephemeral deployments.
#[derive(Default)]
pub struct InMemoryStateStore {
    states: RwLock<HashMap<String, WorkflowExecutionState>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a state, e.g. to simulate a resumed process in tests.
    pub async fn insert(&self, state: WorkflowExecutionState) {
        self.states.write().await.insert(state.job_id.clone(), state);
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn save(&self, state: &WorkflowExecutionState) -> Result<(), StateStoreError> {
        self.states
            .write()
            .await
            .insert(state.job_id.clone(), state.clone());
        Ok(())
    }

    async fn load(
        &self,
        job_id: &str,
    ) -> Result<Option<WorkflowExecutionState>, StateStoreError> {
        Ok(self.states.read().await.get(job_id).cloned())
    }

    async fn archive(&self, _job_id: &str) -> Result<(), StateStoreError> {
        Ok(())
    }
}
