//! Domain-level persistence for `Workflow`/`WorkflowStep`/`Agent` rows (the
//! Durable Store component, C1). Distinct from [`super::store::WorkflowEventStore`],
//! which only persists the engine's opaque replay history — this trait is
//! what `StartWorkflow`/`GetWorkflow`/`ListWorkflows` and the Agent Registry
//! read and write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use meridian_core::{Agent, AgentDesign, Artifact, PerformanceRecord, Workflow, WorkflowStatus, WorkflowStep, WorkflowType};
use uuid::Uuid;

use super::store::StoreError;

/// `ListWorkflows`'s `sort` parameter: both orders are on `created_at`,
/// matching the column every store already indexes workflows by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    CreatedAtAsc,
    CreatedAtDesc,
}

impl Default for SortOrder {
    fn default() -> Self {
        SortOrder::CreatedAtDesc
    }
}

#[derive(Debug, Clone, Default)]
pub struct WorkflowFilter {
    pub project_id: Option<String>,
    pub status: Option<WorkflowStatus>,
    pub workflow_type: Option<WorkflowType>,
    pub created_by: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub sort: SortOrder,
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, Default)]
pub struct AgentFilter {
    pub status: Option<meridian_core::AgentStatus>,
    pub project_id: Option<String>,
    pub required_capabilities: Vec<String>,
}

#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn create_workflow(&self, workflow: Workflow) -> Result<Workflow, StoreError>;

    /// Atomic status transition; rejects any transition not permitted by
    /// `WorkflowStatus::can_transition_to`.
    async fn update_workflow_status(
        &self,
        id: Uuid,
        status: WorkflowStatus,
        output: Option<serde_json::Value>,
        error: Option<meridian_core::WorkflowError>,
    ) -> Result<Workflow, StoreError>;

    async fn get_workflow(&self, id: Uuid) -> Result<Workflow, StoreError>;

    async fn list_workflows(&self, filter: WorkflowFilter, page: Page) -> Result<Vec<Workflow>, StoreError>;

    /// Append-only: rejected once the parent workflow is terminal.
    async fn append_step(&self, step: WorkflowStep) -> Result<WorkflowStep, StoreError>;

    async fn list_steps(&self, workflow_id: Uuid) -> Result<Vec<WorkflowStep>, StoreError>;

    async fn upsert_agent(&self, agent: Agent) -> Result<Agent, StoreError>;

    async fn get_agent(&self, id: Uuid) -> Result<Agent, StoreError>;

    async fn list_agents(&self, filter: AgentFilter) -> Result<Vec<Agent>, StoreError>;

    async fn delete_agent(&self, id: Uuid) -> Result<(), StoreError>;

    /// Immutable once stored; `AgentDesign::evolve` produces a new row
    /// rather than mutating this one.
    async fn create_agent_design(&self, design: AgentDesign) -> Result<AgentDesign, StoreError>;

    async fn get_agent_design(&self, id: Uuid) -> Result<AgentDesign, StoreError>;

    /// All designs for an agent type, in no particular order; callers
    /// needing the newest generation use `latest_agent_design`.
    async fn list_agent_designs(&self, agent_type: &str) -> Result<Vec<AgentDesign>, StoreError>;

    /// The highest-`generation` design for `agent_type`, if any have been
    /// registered yet. Spawns consult this so an `OptimizeAgentPerformance`
    /// evolution is picked up by the next `FindOrCreateAgentForTask` call.
    async fn latest_agent_design(&self, agent_type: &str) -> Result<Option<AgentDesign>, StoreError>;

    /// Insert-or-replace on the `(agent_id, design_version)` key; callers
    /// read-modify-write via `PerformanceRecord::record_run`.
    async fn upsert_performance_record(&self, record: PerformanceRecord) -> Result<PerformanceRecord, StoreError>;

    async fn get_performance_record(
        &self,
        agent_id: Uuid,
        design_version: u32,
    ) -> Result<Option<PerformanceRecord>, StoreError>;

    async fn create_artifact(&self, artifact: Artifact) -> Result<Artifact, StoreError>;

    async fn list_artifacts(&self, task_id: Uuid) -> Result<Vec<Artifact>, StoreError>;
}
