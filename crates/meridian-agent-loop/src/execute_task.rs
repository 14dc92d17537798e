//! `ExecuteTaskWithAgent`: the second Meta-Agent Loop activity (spec
//! §4.5b). Dispatches a task to the agent `FindOrCreateAgentForTask`
//! selected, waits for its result over the transport, and records the
//! observation against that agent's current design version via
//! `PerformanceStore`.

use crate::performance_store::PerformanceStore;
use async_trait::async_trait;
use meridian_core::{Agent, AgentKind, AgentStatus, Task};
use meridian_durable::{Activity, ActivityContext, ActivityError};
use meridian_registry::{AgentRegistry, AgentTransport, InboundMessage, OutboundMessage};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecutionResult {
    pub task_id: Uuid,
    pub agent_id: Uuid,
    pub status: String,
    pub output: Value,
    pub error: Option<String>,
    pub duration_ms: u64,
}

pub struct ExecuteTaskWithAgent {
    transport: Arc<AgentTransport>,
    registry: Arc<AgentRegistry>,
    performance: Arc<PerformanceStore>,
}

impl ExecuteTaskWithAgent {
    pub fn new(transport: Arc<AgentTransport>, registry: Arc<AgentRegistry>, performance: Arc<PerformanceStore>) -> Self {
        Self { transport, registry, performance }
    }

    fn design_version(agent: &Agent) -> u32 {
        match &agent.kind {
            AgentKind::Dynamic { .. } => agent
                .metadata
                .get("design_version")
                .and_then(|v| v.as_u64())
                .map(|v| v as u32)
                .unwrap_or(1),
            _ => 1,
        }
    }
}

#[async_trait]
impl Activity for ExecuteTaskWithAgent {
    fn activity_type(&self) -> &'static str {
        "execute_task_with_agent"
    }

    async fn execute(&self, _ctx: &ActivityContext, input: Value) -> Result<Value, ActivityError> {
        let agent_id: Uuid = serde_json::from_value(
            input.get("agent_id").cloned().ok_or_else(|| ActivityError::validation("missing `agent_id`"))?,
        )
        .map_err(|e| ActivityError::validation(format!("invalid agent_id: {e}")))?;
        let task: Task = serde_json::from_value(
            input.get("task").cloned().ok_or_else(|| ActivityError::validation("missing `task`"))?,
        )
        .map_err(|e| ActivityError::validation(format!("invalid task: {e}")))?;

        let agent = self.registry.get(agent_id).ok_or_else(|| ActivityError::not_found(format!("agent {agent_id} not registered")))?;

        let _ = self.registry.set_status(agent_id, AgentStatus::Busy);
        let start = Instant::now();
        let outcome = self.run(agent_id, &task).await;
        let duration_ms = start.elapsed().as_millis() as u64;
        let restore_status = if matches!(outcome, Err(ref e) if e.kind == "unavailable") {
            AgentStatus::Offline
        } else {
            AgentStatus::Available
        };
        let _ = self.registry.set_status(agent_id, restore_status);

        let failed = outcome.is_err();
        let feedback = outcome.as_ref().err().map(|e: &ActivityError| e.message.clone());
        let _ = self
            .performance
            .record_run(agent_id, Self::design_version(&agent), 0, duration_ms, failed, feedback.clone())
            .await;

        let result = match outcome {
            Ok(output) => TaskExecutionResult {
                task_id: task.id,
                agent_id,
                status: "completed".to_string(),
                output,
                error: None,
                duration_ms,
            },
            Err(err) => return Err(err),
        };
        serde_json::to_value(result).map_err(|e| ActivityError::internal(e.to_string()))
    }
}

impl ExecuteTaskWithAgent {
    async fn run(&self, agent_id: Uuid, task: &Task) -> Result<Value, ActivityError> {
        self.transport
            .send(
                agent_id,
                OutboundMessage::DispatchTask { task_id: task.id, payload: serde_json::to_value(task).unwrap_or(Value::Null) },
            )
            .await
            .map_err(ActivityError::from)?;

        let timeout = Duration::from_secs(task.dispatch_timeout_secs());
        let inbound = tokio::time::timeout(timeout, self.transport.recv(agent_id))
            .await
            .map_err(|_| ActivityError::timeout(format!("agent {agent_id} did not respond within {}s", timeout.as_secs())))?
            .map_err(ActivityError::from)?;

        match inbound {
            InboundMessage::TaskResult { result, .. } => Ok(result),
            InboundMessage::TaskFailed { kind, message, .. } => Err(ActivityError::new(kind, message, false)),
            other => Err(ActivityError::internal(format!("unexpected message while awaiting task result: {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_durable::persistence::InMemoryDurableStore;
    use serde_json::json;

    fn registered_agent(registry: &AgentRegistry) -> Uuid {
        let mut a = Agent::new_static("exec-agent", ["api".to_string()]);
        a.status = AgentStatus::Available;
        let id = a.id;
        registry.register(a).unwrap();
        id
    }

    #[tokio::test]
    async fn successful_dispatch_returns_completed_result() {
        let registry = Arc::new(AgentRegistry::new());
        let transport = Arc::new(AgentTransport::new(Default::default()));
        let store = Arc::new(InMemoryDurableStore::new());
        let performance = Arc::new(PerformanceStore::new(store));

        let agent_id = registered_agent(&registry);
        let (mut outbound_rx, inbound_tx) = transport.connect(agent_id);
        let activity = ExecuteTaskWithAgent::new(transport, registry, performance);

        let task = Task::new("backend", "wire up endpoint");
        let handle = tokio::spawn(async move {
            activity.execute(&ActivityContext::new("a1".into(), 1), json!({"agent_id": agent_id, "task": task})).await
        });

        let _ = outbound_rx.recv().await.unwrap();
        inbound_tx
            .send(InboundMessage::TaskResult { task_id: Uuid::now_v7(), result: json!({"ok": true}) })
            .await
            .unwrap();

        let out = handle.await.unwrap().unwrap();
        assert_eq!(out["status"], json!("completed"));
    }

    #[tokio::test]
    async fn task_failed_message_surfaces_as_activity_error() {
        let registry = Arc::new(AgentRegistry::new());
        let transport = Arc::new(AgentTransport::new(Default::default()));
        let store = Arc::new(InMemoryDurableStore::new());
        let performance = Arc::new(PerformanceStore::new(store));

        let agent_id = registered_agent(&registry);
        let (mut outbound_rx, inbound_tx) = transport.connect(agent_id);
        let activity = ExecuteTaskWithAgent::new(transport, registry, performance);

        let task = Task::new("backend", "wire up endpoint");
        let handle = tokio::spawn(async move {
            activity.execute(&ActivityContext::new("a1".into(), 1), json!({"agent_id": agent_id, "task": task})).await
        });

        let _ = outbound_rx.recv().await.unwrap();
        inbound_tx
            .send(InboundMessage::TaskFailed { task_id: Uuid::now_v7(), kind: "internal".to_string(), message: "agent crashed".to_string() })
            .await
            .unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert_eq!(err.kind, "internal");
    }
}
