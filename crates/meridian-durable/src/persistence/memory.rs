//! In-memory backend for both persistence traits. The default test backend
//! and a legitimate small-deployment backend; a `sqlx`-backed Postgres
//! implementation of the same traits lives behind the `postgres` feature.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use meridian_core::{Agent, AgentDesign, Artifact, PerformanceRecord, Workflow, WorkflowStatus, WorkflowStep};
use parking_lot::Mutex;
use std::collections::VecDeque;
use uuid::Uuid;

use super::domain::{AgentFilter, DurableStore, Page, SortOrder, WorkflowFilter};
use super::store::{ClaimedTask, StoreError, TaskDefinition, WorkflowEventStore, WorkflowRunStatus};
use crate::workflow::WorkflowEvent;

#[derive(Default)]
struct RunRecord {
    history: Vec<WorkflowEvent>,
    status: WorkflowRunStatus,
    last_heartbeat: Option<DateTime<Utc>>,
}

struct QueuedEntry {
    task: TaskDefinition,
    claimed_at: Option<DateTime<Utc>>,
    attempt: u32,
}

/// In-memory implementation of [`WorkflowEventStore`].
pub struct InMemoryEventStore {
    runs: DashMap<(String, String), RunRecord>,
    queues: DashMap<String, Mutex<VecDeque<QueuedEntry>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self {
            runs: DashMap::new(),
            queues: DashMap::new(),
        }
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkflowEventStore for InMemoryEventStore {
    async fn create_run(
        &self,
        engine_workflow_id: &str,
        engine_run_id: &str,
        _workflow_type: &str,
        _input: serde_json::Value,
    ) -> Result<(), StoreError> {
        let key = (engine_workflow_id.to_string(), engine_run_id.to_string());
        self.runs.entry(key).or_insert_with(|| RunRecord {
            status: WorkflowRunStatus::Pending,
            ..Default::default()
        });
        Ok(())
    }

    async fn append_event(
        &self,
        engine_workflow_id: &str,
        engine_run_id: &str,
        event: WorkflowEvent,
        expected_sequence: usize,
    ) -> Result<usize, StoreError> {
        let key = (engine_workflow_id.to_string(), engine_run_id.to_string());
        let mut record = self
            .runs
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", engine_workflow_id, engine_run_id)))?;
        if record.history.len() != expected_sequence {
            return Err(StoreError::Conflict(format!(
                "expected sequence {}, found {}",
                expected_sequence,
                record.history.len()
            )));
        }
        record.history.push(event);
        Ok(record.history.len())
    }

    async fn load_history(
        &self,
        engine_workflow_id: &str,
        engine_run_id: &str,
    ) -> Result<Vec<WorkflowEvent>, StoreError> {
        let key = (engine_workflow_id.to_string(), engine_run_id.to_string());
        let record = self
            .runs
            .get(&key)
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", engine_workflow_id, engine_run_id)))?;
        Ok(record.history.clone())
    }

    async fn set_status(
        &self,
        engine_workflow_id: &str,
        engine_run_id: &str,
        status: WorkflowRunStatus,
    ) -> Result<(), StoreError> {
        let key = (engine_workflow_id.to_string(), engine_run_id.to_string());
        let mut record = self
            .runs
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", engine_workflow_id, engine_run_id)))?;
        record.status = status;
        Ok(())
    }

    async fn get_status(
        &self,
        engine_workflow_id: &str,
        engine_run_id: &str,
    ) -> Result<WorkflowRunStatus, StoreError> {
        let key = (engine_workflow_id.to_string(), engine_run_id.to_string());
        let record = self
            .runs
            .get(&key)
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", engine_workflow_id, engine_run_id)))?;
        Ok(record.status)
    }

    async fn enqueue(&self, task: TaskDefinition) -> Result<(), StoreError> {
        let queue = self.queues.entry(task.queue.clone()).or_default();
        queue.lock().push_back(QueuedEntry {
            task,
            claimed_at: None,
            attempt: 0,
        });
        Ok(())
    }

    async fn claim_next(&self, queue: &str) -> Result<Option<ClaimedTask>, StoreError> {
        let Some(q) = self.queues.get(queue) else {
            return Ok(None);
        };
        let mut guard = q.lock();
        if let Some(entry) = guard.iter_mut().find(|e| e.claimed_at.is_none()) {
            entry.claimed_at = Some(Utc::now());
            entry.attempt += 1;
            return Ok(Some(ClaimedTask {
                engine_workflow_id: entry.task.engine_workflow_id.clone(),
                engine_run_id: entry.task.engine_run_id.clone(),
                workflow_type: entry.task.workflow_type.clone(),
                attempt: entry.attempt,
            }));
        }
        Ok(None)
    }

    async fn complete_task(&self, engine_workflow_id: &str, engine_run_id: &str) -> Result<(), StoreError> {
        for entry in self.queues.iter() {
            entry.lock().retain(|e| {
                !(e.task.engine_workflow_id == engine_workflow_id && e.task.engine_run_id == engine_run_id)
            });
        }
        Ok(())
    }

    async fn reclaim_stale(&self, queue: &str, older_than: chrono::Duration) -> Result<usize, StoreError> {
        let Some(q) = self.queues.get(queue) else {
            return Ok(0);
        };
        let mut guard = q.lock();
        let now = Utc::now();
        let mut reclaimed = 0;
        for entry in guard.iter_mut() {
            if let Some(claimed_at) = entry.claimed_at {
                if now - claimed_at > older_than {
                    entry.claimed_at = None;
                    reclaimed += 1;
                }
            }
        }
        Ok(reclaimed)
    }

    async fn record_heartbeat(
        &self,
        engine_workflow_id: &str,
        engine_run_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let key = (engine_workflow_id.to_string(), engine_run_id.to_string());
        if let Some(mut record) = self.runs.get_mut(&key) {
            record.last_heartbeat = Some(at);
        }
        Ok(())
    }
}

/// In-memory implementation of [`DurableStore`].
pub struct InMemoryDurableStore {
    workflows: DashMap<Uuid, Workflow>,
    steps: DashMap<Uuid, Vec<WorkflowStep>>,
    agents: DashMap<Uuid, Agent>,
    agent_designs: DashMap<Uuid, AgentDesign>,
    performance_records: DashMap<(Uuid, u32), PerformanceRecord>,
    artifacts: DashMap<Uuid, Vec<Artifact>>,
}

impl InMemoryDurableStore {
    pub fn new() -> Self {
        Self {
            workflows: DashMap::new(),
            steps: DashMap::new(),
            agents: DashMap::new(),
            agent_designs: DashMap::new(),
            performance_records: DashMap::new(),
            artifacts: DashMap::new(),
        }
    }
}

impl Default for InMemoryDurableStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DurableStore for InMemoryDurableStore {
    async fn create_workflow(&self, workflow: Workflow) -> Result<Workflow, StoreError> {
        self.workflows.insert(workflow.id, workflow.clone());
        Ok(workflow)
    }

    async fn update_workflow_status(
        &self,
        id: Uuid,
        status: WorkflowStatus,
        output: Option<serde_json::Value>,
        error: Option<meridian_core::WorkflowError>,
    ) -> Result<Workflow, StoreError> {
        let mut entry = self
            .workflows
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if !entry.status.can_transition_to(status) {
            return Err(StoreError::Conflict(format!(
                "illegal transition {:?} -> {:?}",
                entry.status, status
            )));
        }
        entry.status = status;
        if status == WorkflowStatus::Running && entry.started_at.is_none() {
            entry.started_at = Some(Utc::now());
        }
        if status.is_terminal() {
            entry.completed_at = Some(Utc::now());
            if let (Some(started), Some(completed)) = (entry.started_at, entry.completed_at) {
                entry.duration_ms = Some((completed - started).num_milliseconds());
            }
        }
        if output.is_some() {
            entry.output = output;
        }
        if error.is_some() {
            entry.error = error;
        }
        entry
            .check_invariants()
            .map_err(|e| StoreError::Internal(anyhow::anyhow!(e)))?;
        Ok(entry.clone())
    }

    async fn get_workflow(&self, id: Uuid) -> Result<Workflow, StoreError> {
        self.workflows
            .get(&id)
            .map(|w| w.clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn list_workflows(&self, filter: WorkflowFilter, page: Page) -> Result<Vec<Workflow>, StoreError> {
        let mut results: Vec<Workflow> = self
            .workflows
            .iter()
            .map(|e| e.value().clone())
            .filter(|w| {
                filter
                    .project_id
                    .as_ref()
                    .map(|p| w.project_id.as_deref() == Some(p.as_str()))
                    .unwrap_or(true)
                    && filter.status.map(|s| w.status == s).unwrap_or(true)
                    && filter.workflow_type.map(|t| w.workflow_type == t).unwrap_or(true)
                    && filter
                        .created_by
                        .as_ref()
                        .map(|c| w.created_by.as_deref() == Some(c.as_str()))
                        .unwrap_or(true)
                    && filter.created_after.map(|after| w.created_at >= after).unwrap_or(true)
                    && filter.created_before.map(|before| w.created_at <= before).unwrap_or(true)
            })
            .collect();
        match filter.sort {
            SortOrder::CreatedAtAsc => results.sort_by_key(|w| w.created_at),
            SortOrder::CreatedAtDesc => results.sort_by_key(|w| std::cmp::Reverse(w.created_at)),
        }
        let limit = if page.limit == 0 { results.len() } else { page.limit };
        Ok(results.into_iter().skip(page.offset).take(limit).collect())
    }

    async fn append_step(&self, step: WorkflowStep) -> Result<WorkflowStep, StoreError> {
        let workflow = self
            .workflows
            .get(&step.workflow_id)
            .ok_or_else(|| StoreError::NotFound(step.workflow_id.to_string()))?;
        if workflow.status.is_terminal() {
            return Err(StoreError::Conflict(
                "cannot append step to terminal workflow".to_string(),
            ));
        }
        drop(workflow);
        self.steps.entry(step.workflow_id).or_default().push(step.clone());
        Ok(step)
    }

    async fn list_steps(&self, workflow_id: Uuid) -> Result<Vec<WorkflowStep>, StoreError> {
        Ok(self.steps.get(&workflow_id).map(|s| s.clone()).unwrap_or_default())
    }

    async fn upsert_agent(&self, agent: Agent) -> Result<Agent, StoreError> {
        self.agents.insert(agent.id, agent.clone());
        Ok(agent)
    }

    async fn get_agent(&self, id: Uuid) -> Result<Agent, StoreError> {
        self.agents
            .get(&id)
            .map(|a| a.clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn list_agents(&self, filter: AgentFilter) -> Result<Vec<Agent>, StoreError> {
        Ok(self
            .agents
            .iter()
            .map(|e| e.value().clone())
            .filter(|a| {
                filter.status.map(|s| a.status == s).unwrap_or(true)
                    && filter
                        .project_id
                        .as_ref()
                        .map(|p| a.project_id.as_deref() == Some(p.as_str()))
                        .unwrap_or(true)
                    && filter
                        .required_capabilities
                        .iter()
                        .all(|c| a.capabilities.contains(c))
            })
            .collect())
    }

    async fn delete_agent(&self, id: Uuid) -> Result<(), StoreError> {
        self.agents.remove(&id);
        Ok(())
    }

    async fn create_agent_design(&self, design: AgentDesign) -> Result<AgentDesign, StoreError> {
        self.agent_designs.insert(design.id, design.clone());
        Ok(design)
    }

    async fn get_agent_design(&self, id: Uuid) -> Result<AgentDesign, StoreError> {
        self.agent_designs
            .get(&id)
            .map(|d| d.clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn list_agent_designs(&self, agent_type: &str) -> Result<Vec<AgentDesign>, StoreError> {
        Ok(self
            .agent_designs
            .iter()
            .map(|e| e.value().clone())
            .filter(|d| d.agent_type == agent_type)
            .collect())
    }

    async fn latest_agent_design(&self, agent_type: &str) -> Result<Option<AgentDesign>, StoreError> {
        Ok(self
            .agent_designs
            .iter()
            .map(|e| e.value().clone())
            .filter(|d| d.agent_type == agent_type)
            .max_by_key(|d| d.generation))
    }

    async fn upsert_performance_record(&self, record: PerformanceRecord) -> Result<PerformanceRecord, StoreError> {
        self.performance_records
            .insert((record.agent_id, record.design_version), record.clone());
        Ok(record)
    }

    async fn get_performance_record(
        &self,
        agent_id: Uuid,
        design_version: u32,
    ) -> Result<Option<PerformanceRecord>, StoreError> {
        Ok(self
            .performance_records
            .get(&(agent_id, design_version))
            .map(|r| r.clone()))
    }

    async fn create_artifact(&self, artifact: Artifact) -> Result<Artifact, StoreError> {
        self.artifacts.entry(artifact.task_id).or_default().push(artifact.clone());
        Ok(artifact)
    }

    async fn list_artifacts(&self, task_id: Uuid) -> Result<Vec<Artifact>, StoreError> {
        Ok(self.artifacts.get(&task_id).map(|a| a.clone()).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::WorkflowType;

    #[tokio::test]
    async fn event_store_append_enforces_optimistic_concurrency() {
        let store = InMemoryEventStore::new();
        store
            .create_run("wf-1", "run-1", "custom", serde_json::json!({}))
            .await
            .unwrap();
        let event = WorkflowEvent::WorkflowStarted {
            input: serde_json::json!({}),
            timestamp: Utc::now(),
        };
        let seq = store.append_event("wf-1", "run-1", event.clone(), 0).await.unwrap();
        assert_eq!(seq, 1);
        let err = store.append_event("wf-1", "run-1", event, 0).await;
        assert!(matches!(err, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn claim_next_makes_task_invisible_until_reclaimed() {
        let store = InMemoryEventStore::new();
        store
            .enqueue(TaskDefinition {
                engine_workflow_id: "wf-1".into(),
                engine_run_id: "run-1".into(),
                workflow_type: "custom".into(),
                input: serde_json::json!({}),
                queue: "q".into(),
            })
            .await
            .unwrap();
        let claimed = store.claim_next("q").await.unwrap();
        assert!(claimed.is_some());
        assert!(store.claim_next("q").await.unwrap().is_none());
        let reclaimed = store.reclaim_stale("q", chrono::Duration::zero()).await.unwrap();
        assert_eq!(reclaimed, 1);
        assert!(store.claim_next("q").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn domain_store_rejects_illegal_status_transition() {
        let store = InMemoryDurableStore::new();
        let wf = Workflow::new("t", WorkflowType::Custom, serde_json::json!({}), serde_json::json!({}));
        store.create_workflow(wf.clone()).await.unwrap();
        let err = store
            .update_workflow_status(wf.id, WorkflowStatus::Completed, None, None)
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn append_step_rejected_after_workflow_terminal() {
        let store = InMemoryDurableStore::new();
        let mut wf = Workflow::new("t", WorkflowType::Custom, serde_json::json!({}), serde_json::json!({}));
        wf.status = WorkflowStatus::Completed;
        wf.started_at = Some(Utc::now());
        wf.completed_at = Some(Utc::now());
        store.create_workflow(wf.clone()).await.unwrap();
        let step = WorkflowStep::new(wf.id, "s1", "activity", serde_json::json!({}));
        let err = store.append_step(step).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn latest_agent_design_picks_highest_generation() {
        let store = InMemoryDurableStore::new();
        let root = AgentDesign::new_root("backend-agent", "backend", "v1 prompt");
        let evolved = root.evolve("v2 prompt");
        store.create_agent_design(root.clone()).await.unwrap();
        store.create_agent_design(evolved.clone()).await.unwrap();
        let latest = store.latest_agent_design("backend").await.unwrap().unwrap();
        assert_eq!(latest.id, evolved.id);
        assert_eq!(latest.generation, 1);
    }

    #[tokio::test]
    async fn performance_record_upsert_overwrites_same_key() {
        let store = InMemoryDurableStore::new();
        let agent_id = Uuid::now_v7();
        let mut record = PerformanceRecord::new(agent_id, 1);
        record.record_run(100, 50, false, None);
        store.upsert_performance_record(record.clone()).await.unwrap();
        record.record_run(100, 50, true, Some("slow".into()));
        store.upsert_performance_record(record.clone()).await.unwrap();
        let fetched = store.get_performance_record(agent_id, 1).await.unwrap().unwrap();
        assert_eq!(fetched.total_runs, 2);
        assert_eq!(fetched.error_count, 1);
    }

    #[tokio::test]
    async fn artifacts_are_appended_per_task() {
        let store = InMemoryDurableStore::new();
        let task_id = Uuid::now_v7();
        let artifact = Artifact::new(task_id, "report.md", "doc", "text/markdown", "s3://bucket/report.md", 128, "sha256:abc");
        store.create_artifact(artifact).await.unwrap();
        let listed = store.list_artifacts(task_id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "report.md");
    }
}
