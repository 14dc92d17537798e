//! Agent Registry: tracks which agents are known to the orchestrator and
//! which capabilities each one serves, so dispatch can answer "which agents
//! can handle capability X" without a full scan.

use dashmap::DashMap;
use dashmap::DashSet;
use meridian_core::{Agent, AgentStatus};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("agent not found: {0}")]
    NotFound(Uuid),
}

/// In-process agent directory with a capability inverted index. This sits in
/// front of the durable `Agent` rows (see `meridian_durable::DurableStore`):
/// it is the fast path dispatch consults, rebuilt from the store on startup
/// and kept in sync as agents register/heartbeat/unregister.
pub struct AgentRegistry {
    agents: DashMap<Uuid, Agent>,
    by_capability: DashMap<String, Arc<DashSet<Uuid>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: DashMap::new(),
            by_capability: DashMap::new(),
        }
    }

    /// Idempotent on `agent.id`: a second call for an already-registered
    /// agent replaces the stored row and refreshes the capability index
    /// (dropping entries for capabilities the agent no longer advertises,
    /// adding entries for new ones) rather than rejecting the call.
    pub fn register(&self, agent: Agent) -> Result<(), RegistryError> {
        if let Some((_, previous)) = self.agents.remove(&agent.id) {
            self.deindex_capabilities(&previous);
            info!(agent_id = %agent.id, name = %agent.name, "agent re-registered, capabilities refreshed");
        } else {
            info!(agent_id = %agent.id, name = %agent.name, "agent registered");
        }
        self.index_capabilities(&agent);
        self.agents.insert(agent.id, agent);
        Ok(())
    }

    pub fn unregister(&self, agent_id: Uuid) -> Result<Agent, RegistryError> {
        let (_, agent) = self
            .agents
            .remove(&agent_id)
            .ok_or(RegistryError::NotFound(agent_id))?;
        self.deindex_capabilities(&agent);
        info!(agent_id = %agent_id, "agent unregistered");
        Ok(agent)
    }

    pub fn get(&self, agent_id: Uuid) -> Option<Agent> {
        self.agents.get(&agent_id).map(|a| a.clone())
    }

    pub fn list(&self) -> Vec<Agent> {
        self.agents.iter().map(|e| e.value().clone()).collect()
    }

    /// Agents currently `Available` that carry every one of `required`.
    pub fn find_by_capabilities(&self, required: &[String]) -> Vec<Agent> {
        if required.is_empty() {
            return self
                .agents
                .iter()
                .filter(|e| e.value().status == AgentStatus::Available)
                .map(|e| e.value().clone())
                .collect();
        }
        let mut candidates: Option<Vec<Uuid>> = None;
        for capability in required {
            let ids: Vec<Uuid> = self
                .by_capability
                .get(capability)
                .map(|set| set.iter().map(|id| *id).collect())
                .unwrap_or_default();
            candidates = Some(match candidates {
                None => ids,
                Some(existing) => existing.into_iter().filter(|id| ids.contains(id)).collect(),
            });
        }
        candidates
            .unwrap_or_default()
            .into_iter()
            .filter_map(|id| self.agents.get(&id).map(|a| a.clone()))
            .filter(|a| a.status == AgentStatus::Available)
            .collect()
    }

    pub fn record_heartbeat(&self, agent_id: Uuid, at: chrono::DateTime<chrono::Utc>) -> Result<(), RegistryError> {
        let mut entry = self.agents.get_mut(&agent_id).ok_or(RegistryError::NotFound(agent_id))?;
        entry.last_heartbeat = Some(at);
        if entry.status == AgentStatus::Offline {
            entry.status = AgentStatus::Available;
        }
        Ok(())
    }

    pub fn set_status(&self, agent_id: Uuid, status: AgentStatus) -> Result<(), RegistryError> {
        let mut entry = self.agents.get_mut(&agent_id).ok_or(RegistryError::NotFound(agent_id))?;
        entry.status = status;
        Ok(())
    }

    /// Sweep for agents whose heartbeat has gone stale and mark them
    /// offline. Returns the ids flipped to offline this pass.
    pub fn sweep_stale_heartbeats(&self, now: chrono::DateTime<chrono::Utc>, period: Duration, miss_threshold: u32) -> Vec<Uuid> {
        let mut flipped = Vec::new();
        for mut entry in self.agents.iter_mut() {
            if entry.status != AgentStatus::Offline && entry.is_heartbeat_stale(now, period, miss_threshold) {
                entry.status = AgentStatus::Offline;
                flipped.push(entry.id);
                warn!(agent_id = %entry.id, "agent heartbeat stale, marked offline");
            }
        }
        flipped
    }

    /// Sweep for expired dynamic agents (TTL elapsed). Returns reaped ids;
    /// the caller is responsible for removing the durable row and any open
    /// transport connection.
    pub fn sweep_expired(&self, now: chrono::DateTime<chrono::Utc>) -> Vec<Uuid> {
        let expired: Vec<Uuid> = self
            .agents
            .iter()
            .filter(|e| e.value().is_expired(now))
            .map(|e| *e.key())
            .collect();
        for id in &expired {
            let _ = self.unregister(*id);
        }
        expired
    }

    fn index_capabilities(&self, agent: &Agent) {
        for capability in &agent.capabilities {
            self.by_capability
                .entry(capability.clone())
                .or_insert_with(|| Arc::new(DashSet::new()))
                .insert(agent.id);
        }
    }

    fn deindex_capabilities(&self, agent: &Agent) {
        for capability in &agent.capabilities {
            if let Some(set) = self.by_capability.get(capability) {
                set.remove(&agent.id);
            }
        }
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(name: &str, caps: &[&str]) -> Agent {
        let mut a = Agent::new_static(name, caps.iter().map(|s| s.to_string()));
        a.status = AgentStatus::Available;
        a
    }

    #[test]
    fn find_by_capabilities_requires_all() {
        let registry = AgentRegistry::new();
        registry.register(agent("a1", &["code", "review"])).unwrap();
        registry.register(agent("a2", &["code"])).unwrap();

        let found = registry.find_by_capabilities(&["code".to_string(), "review".to_string()]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "a1");
    }

    #[test]
    fn unregister_removes_from_capability_index() {
        let registry = AgentRegistry::new();
        let a = agent("a1", &["code"]);
        let id = a.id;
        registry.register(a).unwrap();
        registry.unregister(id).unwrap();
        assert!(registry.find_by_capabilities(&["code".to_string()]).is_empty());
    }

    #[test]
    fn re_registering_the_same_id_upserts_and_refreshes_capabilities() {
        let registry = AgentRegistry::new();
        let mut a = agent("a1", &["code"]);
        let id = a.id;
        registry.register(a.clone()).unwrap();

        a.capabilities = std::collections::BTreeSet::from(["review".to_string()]);
        registry.register(a).unwrap();

        assert_eq!(registry.list().len(), 1, "re-registration must not create a second row");
        assert!(registry.find_by_capabilities(&["code".to_string()]).is_empty(), "dropped capability must leave the index");
        assert_eq!(registry.find_by_capabilities(&["review".to_string()]).len(), 1, "new capability must be indexed");
        assert_eq!(registry.get(id).unwrap().capabilities, std::collections::BTreeSet::from(["review".to_string()]));
    }

    #[test]
    fn heartbeat_sweep_marks_offline() {
        let registry = AgentRegistry::new();
        let mut a = agent("a1", &["code"]);
        a.last_heartbeat = Some(chrono::Utc::now() - chrono::Duration::minutes(10));
        registry.register(a).unwrap();
        let flipped = registry.sweep_stale_heartbeats(chrono::Utc::now(), Duration::from_secs(30), 3);
        assert_eq!(flipped.len(), 1);
    }

    #[test]
    fn empty_requirements_returns_all_available() {
        let registry = AgentRegistry::new();
        registry.register(agent("a1", &[])).unwrap();
        assert_eq!(registry.find_by_capabilities(&[]).len(), 1);
    }
}
