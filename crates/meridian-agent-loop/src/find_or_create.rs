//! `FindOrCreateAgentForTask`: the first Meta-Agent Loop activity (spec
//! §4.5a). Scores already-registered agents by raw capability overlap
//! (deliberately not `AgentRegistry::find_by_capabilities`, which requires
//! every capability and would reject an 80%-match agent outright). If no
//! registered agent meets the score floor, spawns a fresh dynamic agent
//! from the design catalog; only if spawning is disabled or itself fails
//! does it fall back to an available meta-prompt agent, and only if that
//! also comes up empty does the activity fail as `no_agent_available`.

use crate::capability::{required_capabilities, score_floor};
use crate::design_catalog::design_for_task;
use async_trait::async_trait;
use chrono::Utc;
use meridian_core::{clamp_ttl_ms, Agent, AgentStatus, Task, TTL_DEFAULT_MS};
use meridian_durable::{Activity, ActivityContext, ActivityError};
use meridian_registry::AgentRegistry;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

pub struct FindOrCreateAgentForTask {
    registry: Arc<AgentRegistry>,
    store: Arc<dyn meridian_durable::DurableStore>,
}

impl FindOrCreateAgentForTask {
    pub fn new(registry: Arc<AgentRegistry>, store: Arc<dyn meridian_durable::DurableStore>) -> Self {
        Self { registry, store }
    }

    fn best_match(&self, required: &[String]) -> Option<(Agent, usize)> {
        let required_set: std::collections::BTreeSet<&String> = required.iter().collect();
        self.registry
            .list()
            .into_iter()
            .filter(|a| a.status == AgentStatus::Available && !a.is_meta_prompt())
            .map(|a| {
                let score = a.capabilities.iter().filter(|c| required_set.contains(c)).count();
                (a, score)
            })
            .max_by_key(|(_, score)| *score)
    }

    fn meta_prompt_fallback(&self) -> Option<Agent> {
        self.registry
            .list()
            .into_iter()
            .find(|a| a.status == AgentStatus::Available && a.is_meta_prompt())
    }

    async fn spawn(&self, task: &Task, ttl_ms: i64) -> Result<Agent, ActivityError> {
        let design = design_for_task(task);
        let design = self.store.create_agent_design(design).await.map_err(|e| ActivityError::internal(e.to_string()))?;

        let mut agent = Agent::new_dynamic(design.name.clone(), design.capabilities.clone(), design.id, ttl_ms, Utc::now());
        agent.metadata.insert("design_version".to_string(), json!(design.version));
        let mut agent = self.store.upsert_agent(agent).await.map_err(|e| ActivityError::internal(e.to_string()))?;
        agent.status = AgentStatus::Available;
        let agent = self.store.upsert_agent(agent).await.map_err(|e| ActivityError::internal(e.to_string()))?;
        self.registry.register(agent.clone()).map_err(|e| ActivityError::internal(e.to_string()))?;
        Ok(agent)
    }
}

#[async_trait]
impl Activity for FindOrCreateAgentForTask {
    fn activity_type(&self) -> &'static str {
        "find_or_create_agent_for_task"
    }

    async fn execute(&self, _ctx: &ActivityContext, input: Value) -> Result<Value, ActivityError> {
        let task: Task = serde_json::from_value(
            input.get("task").cloned().ok_or_else(|| ActivityError::validation("missing `task`"))?,
        )
        .map_err(|e| ActivityError::validation(format!("invalid task: {e}")))?;
        let allow_spawn = input.get("allow_spawn").and_then(|v| v.as_bool()).unwrap_or(true);
        let ttl_ms = input
            .get("ttl_ms")
            .and_then(|v| v.as_i64())
            .map(clamp_ttl_ms)
            .unwrap_or(TTL_DEFAULT_MS);

        let required = required_capabilities(&task);
        let floor = score_floor(required.len());

        if let Some((agent, score)) = self.best_match(&required) {
            if score >= floor {
                return Ok(Self::result_for(&agent, false, Some(score)));
            }
        }

        if allow_spawn {
            match self.spawn(&task, ttl_ms).await {
                Ok(agent) => return Ok(Self::result_for(&agent, true, None)),
                Err(e) => warn!(kind = %e.kind, message = %e.message, "spawning a dynamic agent failed, falling back to a meta-prompt agent"),
            }
        }

        if let Some(agent) = self.meta_prompt_fallback() {
            return Ok(Self::result_for(&agent, false, None));
        }

        Err(ActivityError::no_agent_available(format!(
            "no agent satisfies {} required capabilities, spawning did not yield a usable agent, and no meta-prompt agent is available",
            required.len()
        )))
    }
}

impl FindOrCreateAgentForTask {
    /// `design_id`/`design_version` are only present for dynamic agents —
    /// downstream `OptimizeAgentPerformance` is skipped entirely for static
    /// and meta-prompt agents, which have no design to evolve.
    fn result_for(agent: &Agent, spawned: bool, score: Option<usize>) -> Value {
        let (design_id, design_version) = match &agent.kind {
            meridian_core::AgentKind::Dynamic { design_id, .. } => (
                Some(*design_id),
                agent.metadata.get("design_version").and_then(|v| v.as_u64()).map(|v| v as u32),
            ),
            _ => (None, None),
        };
        json!({
            "agent_id": agent.id,
            "spawned": spawned,
            "score": score,
            "meta_prompt": agent.is_meta_prompt(),
            "design_id": design_id,
            "design_version": design_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_durable::persistence::InMemoryDurableStore;

    fn available_agent(caps: &[&str]) -> Agent {
        let mut a = Agent::new_static("matched", caps.iter().map(|s| s.to_string()));
        a.status = AgentStatus::Available;
        a
    }

    #[tokio::test]
    async fn picks_existing_agent_meeting_the_score_floor() {
        let registry = Arc::new(AgentRegistry::new());
        let store = Arc::new(InMemoryDurableStore::new());
        registry.register(available_agent(&["api", "database", "server"])).unwrap();
        let activity = FindOrCreateAgentForTask::new(registry, store);

        let task = Task::new("backend", "wire up endpoint");
        let out = activity
            .execute(&ActivityContext::new("a1".into(), 1), json!({"task": task}))
            .await
            .unwrap();
        assert_eq!(out["spawned"], json!(false));
    }

    #[tokio::test]
    async fn spawns_a_dynamic_agent_before_falling_back_to_meta_prompt() {
        let registry = Arc::new(AgentRegistry::new());
        let store = Arc::new(InMemoryDurableStore::new());
        let mut meta = Agent::new_static("meta", Vec::<String>::new());
        meta.kind = meridian_core::AgentKind::MetaPrompt;
        meta.status = AgentStatus::Available;
        registry.register(meta).unwrap();
        let activity = FindOrCreateAgentForTask::new(registry.clone(), store);

        let task = Task::new("backend", "wire up endpoint");
        let out = activity
            .execute(&ActivityContext::new("a1".into(), 1), json!({"task": task}))
            .await
            .unwrap();
        assert_eq!(out["spawned"], json!(true));
        assert_eq!(out["meta_prompt"], json!(false));
        assert_eq!(registry.list().len(), 2, "both the meta-prompt agent and the newly spawned one should be registered");
    }

    #[tokio::test]
    async fn falls_back_to_meta_prompt_agent_when_spawning_is_disabled() {
        let registry = Arc::new(AgentRegistry::new());
        let store = Arc::new(InMemoryDurableStore::new());
        let mut meta = Agent::new_static("meta", Vec::<String>::new());
        meta.kind = meridian_core::AgentKind::MetaPrompt;
        meta.status = AgentStatus::Available;
        registry.register(meta).unwrap();
        let activity = FindOrCreateAgentForTask::new(registry, store);

        let task = Task::new("backend", "wire up endpoint");
        let out = activity
            .execute(&ActivityContext::new("a1".into(), 1), json!({"task": task, "allow_spawn": false}))
            .await
            .unwrap();
        assert_eq!(out["meta_prompt"], json!(true));
    }

    #[tokio::test]
    async fn spawns_a_dynamic_agent_as_last_resort() {
        let registry = Arc::new(AgentRegistry::new());
        let store = Arc::new(InMemoryDurableStore::new());
        let activity = FindOrCreateAgentForTask::new(registry.clone(), store);

        let task = Task::new("backend", "wire up endpoint");
        let out = activity
            .execute(&ActivityContext::new("a1".into(), 1), json!({"task": task}))
            .await
            .unwrap();
        assert_eq!(out["spawned"], json!(true));
        assert_eq!(registry.list().len(), 1);
    }

    #[tokio::test]
    async fn no_agent_available_when_spawning_disabled() {
        let registry = Arc::new(AgentRegistry::new());
        let store = Arc::new(InMemoryDurableStore::new());
        let activity = FindOrCreateAgentForTask::new(registry, store);

        let task = Task::new("backend", "wire up endpoint");
        let err = activity
            .execute(&ActivityContext::new("a1".into(), 1), json!({"task": task, "allow_spawn": false}))
            .await
            .unwrap_err();
        assert_eq!(err.kind, "no_agent_available");
    }
}
