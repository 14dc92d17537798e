//! The engine's own event-history store: opaque, keyed by
//! `(engine_workflow_id, engine_run_id)`, holding the append-only
//! [`WorkflowEvent`](crate::WorkflowEvent) log the executor replays.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::workflow::WorkflowEvent;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("workflow run not found: {0}")]
    NotFound(String),
    #[error("optimistic concurrency conflict on {0}")]
    Conflict(String),
    #[error("transient store error: {0}")]
    Transient(String),
    #[error("internal store error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Transient(_) | StoreError::Internal(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowRunStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Terminated,
    TimedOut,
}

impl WorkflowRunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, WorkflowRunStatus::Pending | WorkflowRunStatus::Running)
    }
}

/// A unit of work claimed from the task queue by a worker.
#[derive(Debug, Clone)]
pub struct ClaimedTask {
    pub engine_workflow_id: String,
    pub engine_run_id: String,
    pub workflow_type: String,
    pub attempt: u32,
}

#[derive(Debug, Clone)]
pub struct TaskDefinition {
    pub engine_workflow_id: String,
    pub engine_run_id: String,
    pub workflow_type: String,
    pub input: Value,
    pub queue: String,
}

/// The durable event-history backend the [`WorkflowExecutor`](crate::WorkflowExecutor)
/// replays against. One run's history is append-only; `expected_sequence`
/// gives optimistic concurrency so two workers can never both append to the
/// same run.
#[async_trait]
pub trait WorkflowEventStore: Send + Sync {
    async fn create_run(
        &self,
        engine_workflow_id: &str,
        engine_run_id: &str,
        workflow_type: &str,
        input: Value,
    ) -> Result<(), StoreError>;

    async fn append_event(
        &self,
        engine_workflow_id: &str,
        engine_run_id: &str,
        event: WorkflowEvent,
        expected_sequence: usize,
    ) -> Result<usize, StoreError>;

    async fn load_history(
        &self,
        engine_workflow_id: &str,
        engine_run_id: &str,
    ) -> Result<Vec<WorkflowEvent>, StoreError>;

    async fn set_status(
        &self,
        engine_workflow_id: &str,
        engine_run_id: &str,
        status: WorkflowRunStatus,
    ) -> Result<(), StoreError>;

    async fn get_status(
        &self,
        engine_workflow_id: &str,
        engine_run_id: &str,
    ) -> Result<WorkflowRunStatus, StoreError>;

    /// Enqueue a run for pickup by a worker.
    async fn enqueue(&self, task: TaskDefinition) -> Result<(), StoreError>;

    /// Claim the next queued task for `queue`, if any is pending. Claimed
    /// tasks are invisible to other claimants until released/completed or
    /// reclaimed after a stale-visibility timeout.
    async fn claim_next(&self, queue: &str) -> Result<Option<ClaimedTask>, StoreError>;

    async fn complete_task(&self, engine_workflow_id: &str, engine_run_id: &str) -> Result<(), StoreError>;

    /// Reclaim tasks whose claim has been held longer than `older_than`,
    /// returning them to the queue. Used by the worker pool's stale-task
    /// reclamation loop to recover from a crashed worker.
    async fn reclaim_stale(&self, queue: &str, older_than: chrono::Duration) -> Result<usize, StoreError>;

    async fn record_heartbeat(
        &self,
        engine_workflow_id: &str,
        engine_run_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}
