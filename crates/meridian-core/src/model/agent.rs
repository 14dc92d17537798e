//! Agent and AgentDesign entities.
//!
//! Agent is modeled as a tagged variant (static / dynamic / meta-prompt) per
//! the design notes: dispatch is by capability, never by matching on this
//! tag directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Initializing,
    Available,
    Busy,
    Offline,
}

/// The agent's origin. Dynamic agents always carry a TTL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentKind {
    Static,
    Dynamic { design_id: Uuid, ttl_ms: i64 },
    MetaPrompt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub name: String,
    pub kind: AgentKind,
    pub capabilities: BTreeSet<String>,
    pub status: AgentStatus,
    pub endpoint: Option<String>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub tasks_processed: u64,
    /// Free-form metadata, e.g. `spawned_at` for dynamic agents and
    /// `design_id` / `design_generation` for traceability.
    pub metadata: HashMap<String, serde_json::Value>,
    pub project_id: Option<String>,
}

impl Agent {
    pub fn new_static(name: impl Into<String>, capabilities: impl IntoIterator<Item = String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            kind: AgentKind::Static,
            capabilities: capabilities.into_iter().collect(),
            status: AgentStatus::Initializing,
            endpoint: None,
            last_heartbeat: None,
            tasks_processed: 0,
            metadata: HashMap::new(),
            project_id: None,
        }
    }

    pub fn new_dynamic(
        name: impl Into<String>,
        capabilities: impl IntoIterator<Item = String>,
        design_id: Uuid,
        ttl_ms: i64,
        spawned_at: DateTime<Utc>,
    ) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert(
            "spawned_at".to_string(),
            serde_json::Value::String(spawned_at.to_rfc3339()),
        );
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            kind: AgentKind::Dynamic { design_id, ttl_ms },
            capabilities: capabilities.into_iter().collect(),
            status: AgentStatus::Initializing,
            endpoint: None,
            last_heartbeat: None,
            tasks_processed: 0,
            metadata,
            project_id: None,
        }
    }

    pub fn is_meta_prompt(&self) -> bool {
        matches!(self.kind, AgentKind::MetaPrompt)
    }

    /// Whether a TTL-reaper scan (using only persisted fields, never an
    /// in-process timer) should reap this agent.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        if let AgentKind::Dynamic { ttl_ms, .. } = self.kind {
            if let Some(spawned_raw) = self.metadata.get("spawned_at").and_then(|v| v.as_str()) {
                if let Ok(spawned_at) = DateTime::parse_from_rfc3339(spawned_raw) {
                    let spawned_at = spawned_at.with_timezone(&Utc);
                    return now >= spawned_at + chrono::Duration::milliseconds(ttl_ms);
                }
            }
        }
        false
    }

    /// Liveness check for the registry's heartbeat-expiry sweep:
    /// offline after `miss_threshold` missed heartbeat periods.
    pub fn is_heartbeat_stale(&self, now: DateTime<Utc>, period: std::time::Duration, miss_threshold: u32) -> bool {
        match self.last_heartbeat {
            Some(last) => {
                let window = chrono::Duration::from_std(period * miss_threshold).unwrap_or_default();
                now - last > window
            }
            None => false,
        }
    }
}

/// Dynamic-agent TTL bounds from the specification.
pub const TTL_DEFAULT_MS: i64 = 3_600_000;
pub const TTL_MIN_MS: i64 = 60_000;
pub const TTL_MAX_MS: i64 = 86_400_000;

pub fn clamp_ttl_ms(requested: i64) -> i64 {
    requested.clamp(TTL_MIN_MS, TTL_MAX_MS)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorParams {
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
}

impl Default for BehaviorParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 4096,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPolicy {
    pub retry_strategy: String,
    pub max_retries: u32,
    pub fallback: Option<String>,
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        Self {
            retry_strategy: "exponential".to_string(),
            max_retries: 3,
            fallback: None,
        }
    }
}

/// An immutable design for an agent's behavior. Evolving a design produces a
/// new row with an incremented generation; existing rows are never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDesign {
    pub id: Uuid,
    pub name: String,
    pub agent_type: String,
    pub system_prompt: String,
    pub capabilities: BTreeSet<String>,
    pub behavior_params: BehaviorParams,
    pub input_schema: serde_json::Value,
    pub output_schema: serde_json::Value,
    pub error_policy: ErrorPolicy,
    pub version: u32,
    pub parent_design_id: Option<Uuid>,
    pub generation: u32,
    pub created_at: DateTime<Utc>,
}

impl AgentDesign {
    pub fn new_root(name: impl Into<String>, agent_type: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            agent_type: agent_type.into(),
            system_prompt: system_prompt.into(),
            capabilities: BTreeSet::new(),
            behavior_params: BehaviorParams::default(),
            input_schema: serde_json::json!({}),
            output_schema: serde_json::json!({}),
            error_policy: ErrorPolicy::default(),
            version: 1,
            parent_design_id: None,
            generation: 0,
            created_at: Utc::now(),
        }
    }

    /// Produce the next generation of this design with a new prompt, e.g.
    /// from `OptimizeAgentPerformance`.
    pub fn evolve(&self, new_system_prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: self.name.clone(),
            agent_type: self.agent_type.clone(),
            system_prompt: new_system_prompt.into(),
            capabilities: self.capabilities.clone(),
            behavior_params: self.behavior_params.clone(),
            input_schema: self.input_schema.clone(),
            output_schema: self.output_schema.clone(),
            error_policy: self.error_policy.clone(),
            version: self.version + 1,
            parent_design_id: Some(self.id),
            generation: self.generation + 1,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_clamped_to_bounds() {
        assert_eq!(clamp_ttl_ms(10), TTL_MIN_MS);
        assert_eq!(clamp_ttl_ms(999_999_999), TTL_MAX_MS);
        assert_eq!(clamp_ttl_ms(TTL_DEFAULT_MS), TTL_DEFAULT_MS);
    }

    #[test]
    fn dynamic_agent_expires_after_ttl() {
        let spawned_at = Utc::now() - chrono::Duration::milliseconds(TTL_MIN_MS + 1000);
        let agent = Agent::new_dynamic("worker", ["api".to_string()], Uuid::now_v7(), TTL_MIN_MS, spawned_at);
        assert!(agent.is_expired(Utc::now()));
    }

    #[test]
    fn static_agent_never_expires() {
        let agent = Agent::new_static("static-1", ["api".to_string()]);
        assert!(!agent.is_expired(Utc::now() + chrono::Duration::days(365)));
    }

    #[test]
    fn evolve_increments_generation_and_links_parent() {
        let root = AgentDesign::new_root("backend-agent", "backend", "You are a backend agent.");
        let evolved = root.evolve("You are a faster backend agent.");
        assert_eq!(evolved.generation, 1);
        assert_eq!(evolved.parent_design_id, Some(root.id));
        assert_ne!(evolved.id, root.id);
    }
}
