//! Postgres-backed implementation of [`super::store::WorkflowEventStore`] and
//! [`super::domain::DurableStore`], gated behind the `postgres` feature.
//!
//! Schema (see `migrations/`):
//! - `durable_workflow_runs(engine_workflow_id, engine_run_id, status, last_heartbeat)`
//! - `durable_workflow_events(engine_workflow_id, engine_run_id, sequence, event)`
//! - `durable_tasks(queue, engine_workflow_id, engine_run_id, workflow_type, claimed_at, attempt)`
//! - `workflows`, `workflow_steps`, `agents` (domain rows; see `DurableStore`)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use meridian_core::{Agent, AgentDesign, Artifact, PerformanceRecord, Workflow, WorkflowStatus, WorkflowStep};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::domain::{AgentFilter, DurableStore, Page, SortOrder, WorkflowFilter};
use super::store::{ClaimedTask, StoreError, TaskDefinition, WorkflowEventStore, WorkflowRunStatus};
use crate::workflow::WorkflowEvent;

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row not found".to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => StoreError::Transient(err.to_string()),
            other => StoreError::Internal(other.into()),
        }
    }
}

pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkflowEventStore for PostgresEventStore {
    async fn create_run(
        &self,
        engine_workflow_id: &str,
        engine_run_id: &str,
        workflow_type: &str,
        input: serde_json::Value,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO durable_workflow_runs (engine_workflow_id, engine_run_id, workflow_type, input, status)
             VALUES ($1, $2, $3, $4, 'pending')
             ON CONFLICT (engine_workflow_id, engine_run_id) DO NOTHING",
        )
        .bind(engine_workflow_id)
        .bind(engine_run_id)
        .bind(workflow_type)
        .bind(input)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_event(
        &self,
        engine_workflow_id: &str,
        engine_run_id: &str,
        event: WorkflowEvent,
        expected_sequence: usize,
    ) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await?;
        let current: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM durable_workflow_events WHERE engine_workflow_id = $1 AND engine_run_id = $2",
        )
        .bind(engine_workflow_id)
        .bind(engine_run_id)
        .fetch_one(&mut *tx)
        .await?;
        if current as usize != expected_sequence {
            return Err(StoreError::Conflict(format!(
                "expected sequence {}, found {}",
                expected_sequence, current
            )));
        }
        let payload = serde_json::to_value(&event).map_err(|e| StoreError::Internal(e.into()))?;
        sqlx::query(
            "INSERT INTO durable_workflow_events (engine_workflow_id, engine_run_id, sequence, event)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(engine_workflow_id)
        .bind(engine_run_id)
        .bind(current + 1)
        .bind(payload)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(current as usize + 1)
    }

    async fn load_history(
        &self,
        engine_workflow_id: &str,
        engine_run_id: &str,
    ) -> Result<Vec<WorkflowEvent>, StoreError> {
        let rows = sqlx::query(
            "SELECT event FROM durable_workflow_events
             WHERE engine_workflow_id = $1 AND engine_run_id = $2
             ORDER BY sequence ASC",
        )
        .bind(engine_workflow_id)
        .bind(engine_run_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                let value: serde_json::Value = row.try_get("event")?;
                serde_json::from_value(value).map_err(|e| sqlx::Error::Decode(e.into()))
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }

    async fn set_status(
        &self,
        engine_workflow_id: &str,
        engine_run_id: &str,
        status: WorkflowRunStatus,
    ) -> Result<(), StoreError> {
        let status_str = serde_json::to_value(status)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "pending".to_string());
        sqlx::query(
            "UPDATE durable_workflow_runs SET status = $3 WHERE engine_workflow_id = $1 AND engine_run_id = $2",
        )
        .bind(engine_workflow_id)
        .bind(engine_run_id)
        .bind(status_str)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_status(
        &self,
        engine_workflow_id: &str,
        engine_run_id: &str,
    ) -> Result<WorkflowRunStatus, StoreError> {
        let row = sqlx::query(
            "SELECT status FROM durable_workflow_runs WHERE engine_workflow_id = $1 AND engine_run_id = $2",
        )
        .bind(engine_workflow_id)
        .bind(engine_run_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("{}/{}", engine_workflow_id, engine_run_id)))?;
        let status_str: String = row.try_get("status")?;
        serde_json::from_value(serde_json::Value::String(status_str))
            .map_err(|e| StoreError::Internal(e.into()))
    }

    async fn enqueue(&self, task: TaskDefinition) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO durable_tasks (queue, engine_workflow_id, engine_run_id, workflow_type, attempt)
             VALUES ($1, $2, $3, $4, 0)",
        )
        .bind(&task.queue)
        .bind(&task.engine_workflow_id)
        .bind(&task.engine_run_id)
        .bind(&task.workflow_type)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn claim_next(&self, queue: &str) -> Result<Option<ClaimedTask>, StoreError> {
        let row = sqlx::query(
            "UPDATE durable_tasks SET claimed_at = now(), attempt = attempt + 1
             WHERE id = (
                 SELECT id FROM durable_tasks
                 WHERE queue = $1 AND claimed_at IS NULL
                 ORDER BY id ASC
                 FOR UPDATE SKIP LOCKED
                 LIMIT 1
             )
             RETURNING engine_workflow_id, engine_run_id, workflow_type, attempt",
        )
        .bind(queue)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| ClaimedTask {
            engine_workflow_id: r.get("engine_workflow_id"),
            engine_run_id: r.get("engine_run_id"),
            workflow_type: r.get("workflow_type"),
            attempt: r.get::<i32, _>("attempt") as u32,
        }))
    }

    async fn complete_task(&self, engine_workflow_id: &str, engine_run_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM durable_tasks WHERE engine_workflow_id = $1 AND engine_run_id = $2")
            .bind(engine_workflow_id)
            .bind(engine_run_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn reclaim_stale(&self, queue: &str, older_than: chrono::Duration) -> Result<usize, StoreError> {
        let interval = format!("{} seconds", older_than.num_seconds());
        let result = sqlx::query(
            "UPDATE durable_tasks SET claimed_at = NULL
             WHERE queue = $1 AND claimed_at IS NOT NULL AND claimed_at < now() - $2::interval",
        )
        .bind(queue)
        .bind(interval)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn record_heartbeat(
        &self,
        engine_workflow_id: &str,
        engine_run_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE durable_workflow_runs SET last_heartbeat = $3
             WHERE engine_workflow_id = $1 AND engine_run_id = $2",
        )
        .bind(engine_workflow_id)
        .bind(engine_run_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

pub struct PostgresDurableStore {
    pool: PgPool,
}

impl PostgresDurableStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_workflow(row: &sqlx::postgres::PgRow) -> Result<Workflow, StoreError> {
    let raw: serde_json::Value = row.try_get("data")?;
    serde_json::from_value(raw).map_err(|e| StoreError::Internal(e.into()))
}

#[async_trait]
impl DurableStore for PostgresDurableStore {
    async fn create_workflow(&self, workflow: Workflow) -> Result<Workflow, StoreError> {
        let data = serde_json::to_value(&workflow).map_err(|e| StoreError::Internal(e.into()))?;
        sqlx::query(
            "INSERT INTO workflows (id, project_id, status, data) VALUES ($1, $2, $3, $4)",
        )
        .bind(workflow.id)
        .bind(&workflow.project_id)
        .bind(serde_json::to_value(workflow.status).unwrap())
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(workflow)
    }

    async fn update_workflow_status(
        &self,
        id: Uuid,
        status: WorkflowStatus,
        output: Option<serde_json::Value>,
        error: Option<meridian_core::WorkflowError>,
    ) -> Result<Workflow, StoreError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT data FROM workflows WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let mut workflow = row_to_workflow(&row)?;
        if !workflow.status.can_transition_to(status) {
            return Err(StoreError::Conflict(format!(
                "illegal transition {:?} -> {:?}",
                workflow.status, status
            )));
        }
        workflow.status = status;
        if status == WorkflowStatus::Running && workflow.started_at.is_none() {
            workflow.started_at = Some(Utc::now());
        }
        if status.is_terminal() {
            workflow.completed_at = Some(Utc::now());
        }
        if let Some(out) = output {
            workflow.output = Some(out);
        }
        if let Some(err) = error {
            workflow.error = Some(err);
        }
        workflow
            .check_invariants()
            .map_err(|e| StoreError::Internal(anyhow::anyhow!(e)))?;
        let data = serde_json::to_value(&workflow).map_err(|e| StoreError::Internal(e.into()))?;
        sqlx::query("UPDATE workflows SET status = $2, data = $3 WHERE id = $1")
            .bind(id)
            .bind(serde_json::to_value(status).unwrap())
            .bind(data)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(workflow)
    }

    async fn get_workflow(&self, id: Uuid) -> Result<Workflow, StoreError> {
        let row = sqlx::query("SELECT data FROM workflows WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        row_to_workflow(&row)
    }

    async fn list_workflows(&self, filter: WorkflowFilter, page: Page) -> Result<Vec<Workflow>, StoreError> {
        let limit = if page.limit == 0 { 100 } else { page.limit as i64 };
        let order_by = match filter.sort {
            SortOrder::CreatedAtAsc => "(data->>'created_at')::timestamptz ASC",
            SortOrder::CreatedAtDesc => "(data->>'created_at')::timestamptz DESC",
        };
        // `project_id`/`status` are dedicated columns; the rest live only in
        // `data`, so they're matched via jsonb text accessors.
        let query = format!(
            "SELECT data FROM workflows
             WHERE ($1::text IS NULL OR project_id = $1)
               AND ($2::jsonb IS NULL OR status = $2)
               AND ($3::text IS NULL OR data->>'workflow_type' = $3)
               AND ($4::text IS NULL OR data->>'created_by' = $4)
               AND ($5::timestamptz IS NULL OR (data->>'created_at')::timestamptz >= $5)
               AND ($6::timestamptz IS NULL OR (data->>'created_at')::timestamptz <= $6)
             ORDER BY {order_by}
             OFFSET $7 LIMIT $8"
        );
        let rows = sqlx::query(&query)
            .bind(&filter.project_id)
            .bind(filter.status.map(|s| serde_json::to_value(s).unwrap()))
            .bind(filter.workflow_type.map(|t| serde_json::to_value(t).unwrap().as_str().unwrap().to_string()))
            .bind(&filter.created_by)
            .bind(filter.created_after)
            .bind(filter.created_before)
            .bind(page.offset as i64)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_workflow).collect()
    }

    async fn append_step(&self, step: WorkflowStep) -> Result<WorkflowStep, StoreError> {
        let status_row = sqlx::query("SELECT status FROM workflows WHERE id = $1")
            .bind(step.workflow_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(step.workflow_id.to_string()))?;
        let status: WorkflowStatus = serde_json::from_value(status_row.get("status"))
            .map_err(|e| StoreError::Internal(e.into()))?;
        if status.is_terminal() {
            return Err(StoreError::Conflict(
                "cannot append step to terminal workflow".to_string(),
            ));
        }
        let data = serde_json::to_value(&step).map_err(|e| StoreError::Internal(e.into()))?;
        sqlx::query(
            "INSERT INTO workflow_steps (id, workflow_id, started_at, data) VALUES ($1, $2, $3, $4)",
        )
        .bind(step.id)
        .bind(step.workflow_id)
        .bind(step.started_at)
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(step)
    }

    async fn list_steps(&self, workflow_id: Uuid) -> Result<Vec<WorkflowStep>, StoreError> {
        let rows = sqlx::query(
            "SELECT data FROM workflow_steps WHERE workflow_id = $1 ORDER BY started_at ASC",
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                let raw: serde_json::Value = row.try_get("data")?;
                serde_json::from_value(raw).map_err(|e| sqlx::Error::Decode(e.into()))
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }

    async fn upsert_agent(&self, agent: Agent) -> Result<Agent, StoreError> {
        let data = serde_json::to_value(&agent).map_err(|e| StoreError::Internal(e.into()))?;
        let capabilities: Vec<String> = agent.capabilities.iter().cloned().collect();
        sqlx::query(
            "INSERT INTO agents (id, status, capabilities, data) VALUES ($1, $2, $3, $4)
             ON CONFLICT (id) DO UPDATE SET status = $2, capabilities = $3, data = $4",
        )
        .bind(agent.id)
        .bind(serde_json::to_value(agent.status).unwrap())
        .bind(&capabilities)
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(agent)
    }

    async fn get_agent(&self, id: Uuid) -> Result<Agent, StoreError> {
        let row = sqlx::query("SELECT data FROM agents WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let raw: serde_json::Value = row.try_get("data")?;
        serde_json::from_value(raw).map_err(|e| StoreError::Internal(e.into()))
    }

    async fn list_agents(&self, filter: AgentFilter) -> Result<Vec<Agent>, StoreError> {
        let rows = sqlx::query(
            "SELECT data FROM agents
             WHERE ($1::jsonb IS NULL OR status = $1)
               AND ($2::text[] IS NULL OR capabilities @> $2)",
        )
        .bind(filter.status.map(|s| serde_json::to_value(s).unwrap()))
        .bind(if filter.required_capabilities.is_empty() {
            None
        } else {
            Some(filter.required_capabilities.clone())
        })
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                let raw: serde_json::Value = row.try_get("data")?;
                serde_json::from_value(raw).map_err(|e| sqlx::Error::Decode(e.into()))
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }

    async fn delete_agent(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM agents WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_agent_design(&self, design: AgentDesign) -> Result<AgentDesign, StoreError> {
        let data = serde_json::to_value(&design).map_err(|e| StoreError::Internal(e.into()))?;
        sqlx::query(
            "INSERT INTO agent_designs (id, agent_type, generation, data) VALUES ($1, $2, $3, $4)",
        )
        .bind(design.id)
        .bind(&design.agent_type)
        .bind(design.generation as i32)
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(design)
    }

    async fn get_agent_design(&self, id: Uuid) -> Result<AgentDesign, StoreError> {
        let row = sqlx::query("SELECT data FROM agent_designs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let raw: serde_json::Value = row.try_get("data")?;
        serde_json::from_value(raw).map_err(|e| StoreError::Internal(e.into()))
    }

    async fn list_agent_designs(&self, agent_type: &str) -> Result<Vec<AgentDesign>, StoreError> {
        let rows = sqlx::query("SELECT data FROM agent_designs WHERE agent_type = $1 ORDER BY generation ASC")
            .bind(agent_type)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| {
                let raw: serde_json::Value = row.try_get("data")?;
                serde_json::from_value(raw).map_err(|e| sqlx::Error::Decode(e.into()))
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }

    async fn latest_agent_design(&self, agent_type: &str) -> Result<Option<AgentDesign>, StoreError> {
        let row = sqlx::query(
            "SELECT data FROM agent_designs WHERE agent_type = $1 ORDER BY generation DESC LIMIT 1",
        )
        .bind(agent_type)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| {
            let raw: serde_json::Value = row.try_get("data")?;
            serde_json::from_value(raw).map_err(|e| sqlx::Error::Decode(e.into()))
        })
        .transpose()
        .map_err(StoreError::from)
    }

    async fn upsert_performance_record(&self, record: PerformanceRecord) -> Result<PerformanceRecord, StoreError> {
        let data = serde_json::to_value(&record).map_err(|e| StoreError::Internal(e.into()))?;
        sqlx::query(
            "INSERT INTO performance_records (agent_id, design_version, data) VALUES ($1, $2, $3)
             ON CONFLICT (agent_id, design_version) DO UPDATE SET data = $3",
        )
        .bind(record.agent_id)
        .bind(record.design_version as i32)
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(record)
    }

    async fn get_performance_record(
        &self,
        agent_id: Uuid,
        design_version: u32,
    ) -> Result<Option<PerformanceRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT data FROM performance_records WHERE agent_id = $1 AND design_version = $2",
        )
        .bind(agent_id)
        .bind(design_version as i32)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| {
            let raw: serde_json::Value = row.try_get("data")?;
            serde_json::from_value(raw).map_err(|e| sqlx::Error::Decode(e.into()))
        })
        .transpose()
        .map_err(StoreError::from)
    }

    async fn create_artifact(&self, artifact: Artifact) -> Result<Artifact, StoreError> {
        let data = serde_json::to_value(&artifact).map_err(|e| StoreError::Internal(e.into()))?;
        sqlx::query("INSERT INTO artifacts (id, task_id, data) VALUES ($1, $2, $3)")
            .bind(artifact.id)
            .bind(artifact.task_id)
            .bind(data)
            .execute(&self.pool)
            .await?;
        Ok(artifact)
    }

    async fn list_artifacts(&self, task_id: Uuid) -> Result<Vec<Artifact>, StoreError> {
        let rows = sqlx::query("SELECT data FROM artifacts WHERE task_id = $1 ORDER BY id ASC")
            .bind(task_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| {
                let raw: serde_json::Value = row.try_get("data")?;
                serde_json::from_value(raw).map_err(|e| sqlx::Error::Decode(e.into()))
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }
}
