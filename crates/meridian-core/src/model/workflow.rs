//! Workflow and WorkflowStep entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The seven registered workflow function shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    Intent,
    Execution,
    Analysis,
    Review,
    Deployment,
    TaskExecution,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// Workflow status. Transitions follow a strict DAG:
/// `Pending -> Running -> {Completed | Failed | Cancelled | Terminated | TimedOut}`.
/// There are no transitions out of a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Terminated,
    TimedOut,
}

impl WorkflowStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed
                | WorkflowStatus::Failed
                | WorkflowStatus::Cancelled
                | WorkflowStatus::Terminated
                | WorkflowStatus::TimedOut
        )
    }

    /// Whether `self -> next` is a legal transition under the status DAG.
    pub fn can_transition_to(self, next: WorkflowStatus) -> bool {
        use WorkflowStatus::*;
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (Pending, Running) => true,
            (Pending, Failed) => true, // engine rejected before acceptance
            (Pending, Cancelled) => true,
            (Running, Completed | Failed | Cancelled | Terminated | TimedOut) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowError {
    pub kind: String,
    pub message: String,
}

/// A durable workflow instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    pub workflow_type: WorkflowType,
    pub priority: Priority,
    pub status: WorkflowStatus,
    pub input: Value,
    pub config: Value,
    pub output: Option<Value>,
    pub error: Option<WorkflowError>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub timeout_s: u64,
    pub created_by: Option<String>,
    pub project_id: Option<String>,
    pub engine_workflow_id: Option<String>,
    pub engine_run_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Workflow {
    pub fn new(
        name: impl Into<String>,
        workflow_type: WorkflowType,
        input: Value,
        config: Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            workflow_type,
            priority: Priority::default(),
            status: WorkflowStatus::Pending,
            input,
            config,
            output: None,
            error: None,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            retry_count: 0,
            max_retries: 3,
            timeout_s: 300,
            created_by: None,
            project_id: None,
            engine_workflow_id: None,
            engine_run_id: None,
            created_at: Utc::now(),
        }
    }

    /// `completed_at >= started_at` and terminal status implies `completed_at`
    /// is set. Checked in the store before persisting a status transition.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.status.is_terminal() && self.completed_at.is_none() {
            return Err("terminal workflow missing completed_at".into());
        }
        if let (Some(started), Some(completed)) = (self.started_at, self.completed_at) {
            if completed < started {
                return Err("completed_at precedes started_at".into());
            }
        }
        Ok(())
    }
}

/// A step recorded within a workflow's execution. Append-only once the
/// workflow reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub name: String,
    pub step_type: String,
    pub status: WorkflowStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub retry_count: u32,
    pub input: Value,
    pub output: Option<Value>,
    pub error: Option<WorkflowError>,
}

impl WorkflowStep {
    pub fn new(workflow_id: Uuid, name: impl Into<String>, step_type: impl Into<String>, input: Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            workflow_id,
            name: name.into(),
            step_type: step_type.into(),
            status: WorkflowStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            retry_count: 0,
            input,
            output: None,
            error: None,
        }
    }
}
