//! `OptimizeAgentPerformance`: the third Meta-Agent Loop activity (spec
//! §4.5c). Evaluated every `MetaAgentConfig::evaluation_cadence` completed
//! runs for a design; evolves the design when the error rate exceeds
//! `error_rate_threshold` or the average duration has drifted past
//! `avg_duration_multiplier` times the design's first-observed baseline.
//!
//! The baseline is captured in-process (a `DashMap`, not persisted) the
//! first time a design crosses the cadence — it is a tuning heuristic, not
//! correctness-critical state, so losing it across a restart only delays
//! the next evolution by one cadence window rather than corrupting
//! anything.

use crate::config::MetaAgentConfig;
use async_trait::async_trait;
use dashmap::DashMap;
use meridian_durable::{Activity, ActivityContext, ActivityError, DurableStore};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

pub struct OptimizeAgentPerformance {
    store: Arc<dyn DurableStore>,
    config: MetaAgentConfig,
    baselines: DashMap<(Uuid, u32), f64>,
}

impl OptimizeAgentPerformance {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self::with_config(store, MetaAgentConfig::default())
    }

    pub fn with_config(store: Arc<dyn DurableStore>, config: MetaAgentConfig) -> Self {
        Self { store, config, baselines: DashMap::new() }
    }
}

#[async_trait]
impl Activity for OptimizeAgentPerformance {
    fn activity_type(&self) -> &'static str {
        "optimize_agent_performance"
    }

    async fn execute(&self, _ctx: &ActivityContext, input: Value) -> Result<Value, ActivityError> {
        let agent_id: Uuid = serde_json::from_value(
            input.get("agent_id").cloned().ok_or_else(|| ActivityError::validation("missing `agent_id`"))?,
        )
        .map_err(|e| ActivityError::validation(format!("invalid agent_id: {e}")))?;
        let design_id: Uuid = serde_json::from_value(
            input.get("design_id").cloned().ok_or_else(|| ActivityError::validation("missing `design_id`"))?,
        )
        .map_err(|e| ActivityError::validation(format!("invalid design_id: {e}")))?;
        let design_version: u32 = input
            .get("design_version")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| ActivityError::validation("missing `design_version`"))? as u32;

        let record = self
            .store
            .get_performance_record(agent_id, design_version)
            .await
            .map_err(|e| ActivityError::internal(e.to_string()))?;
        let Some(record) = record else {
            return Ok(json!({"evolved": false, "reason": "no performance data yet"}));
        };
        if record.total_runs == 0 || record.total_runs % self.config.evaluation_cadence != 0 {
            return Ok(json!({"evolved": false, "reason": "not at an evaluation checkpoint"}));
        }

        let error_rate = record.error_rate();
        let avg_duration = record.average_duration_ms();
        let baseline = *self.baselines.entry((agent_id, design_version)).or_insert(avg_duration);

        let error_rate_exceeded = error_rate > self.config.error_rate_threshold;
        let duration_exceeded = avg_duration > baseline * self.config.avg_duration_multiplier;
        if !error_rate_exceeded && !duration_exceeded {
            return Ok(json!({"evolved": false, "reason": "within thresholds"}));
        }

        let design = self.store.get_agent_design(design_id).await.map_err(|e| ActivityError::internal(e.to_string()))?;
        let mut notes = Vec::new();
        if error_rate_exceeded {
            notes.push(format!(
                "observed error rate {:.0}% exceeded the {:.0}% threshold over the last {} runs; be more conservative and double-check work before reporting completion",
                error_rate * 100.0,
                self.config.error_rate_threshold * 100.0,
                self.config.evaluation_cadence
            ));
        }
        if duration_exceeded {
            notes.push(format!(
                "observed average duration {avg_duration:.0}ms exceeded {}x its baseline of {baseline:.0}ms; prefer the smallest change that satisfies the task",
                self.config.avg_duration_multiplier
            ));
        }
        let new_prompt = format!("{}\n\n{}", design.system_prompt, notes.join("\n"));
        let evolved = design.evolve(new_prompt);
        let evolved = self.store.create_agent_design(evolved).await.map_err(|e| ActivityError::internal(e.to_string()))?;
        self.baselines.remove(&(agent_id, design_version));

        Ok(json!({"evolved": true, "new_design_id": evolved.id, "generation": evolved.generation}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::{AgentDesign, PerformanceRecord};
    use meridian_durable::persistence::InMemoryDurableStore;

    fn config_with_cadence(cadence: u64) -> MetaAgentConfig {
        MetaAgentConfig { evaluation_cadence: cadence, ..MetaAgentConfig::default() }
    }

    #[tokio::test]
    async fn off_cadence_run_count_is_a_no_op() {
        let store = Arc::new(InMemoryDurableStore::new());
        let design = store.create_agent_design(AgentDesign::new_root("backend-agent", "backend", "You are a backend agent.")).await.unwrap();
        let mut record = PerformanceRecord::new(Uuid::now_v7(), design.version);
        for _ in 0..3 {
            record.record_run(10, 100, true, None);
        }
        store.upsert_performance_record(record.clone()).await.unwrap();

        let activity = OptimizeAgentPerformance::with_config(store, config_with_cadence(5));
        let out = activity
            .execute(
                &ActivityContext::new("a1".into(), 1),
                json!({"agent_id": record.agent_id, "design_id": design.id, "design_version": design.version}),
            )
            .await
            .unwrap();
        assert_eq!(out["evolved"], json!(false));
    }

    #[tokio::test]
    async fn high_error_rate_at_cadence_triggers_evolution() {
        let store = Arc::new(InMemoryDurableStore::new());
        let design = store.create_agent_design(AgentDesign::new_root("backend-agent", "backend", "You are a backend agent.")).await.unwrap();
        let agent_id = Uuid::now_v7();
        let mut record = PerformanceRecord::new(agent_id, design.version);
        for _ in 0..5 {
            record.record_run(10, 100, true, None);
        }
        store.upsert_performance_record(record).await.unwrap();

        let activity = OptimizeAgentPerformance::with_config(store, config_with_cadence(5));
        let out = activity
            .execute(
                &ActivityContext::new("a1".into(), 1),
                json!({"agent_id": agent_id, "design_id": design.id, "design_version": design.version}),
            )
            .await
            .unwrap();
        assert_eq!(out["evolved"], json!(true));
    }

    #[tokio::test]
    async fn duration_drift_past_baseline_triggers_evolution() {
        let store = Arc::new(InMemoryDurableStore::new());
        let design = store.create_agent_design(AgentDesign::new_root("backend-agent", "backend", "You are a backend agent.")).await.unwrap();
        let agent_id = Uuid::now_v7();
        let activity = OptimizeAgentPerformance::with_config(store.clone(), config_with_cadence(2));

        let mut first_batch = PerformanceRecord::new(agent_id, design.version);
        first_batch.record_run(10, 100, false, None);
        first_batch.record_run(10, 100, false, None);
        store.upsert_performance_record(first_batch).await.unwrap();
        let baseline_out = activity
            .execute(&ActivityContext::new("a1".into(), 1), json!({"agent_id": agent_id, "design_id": design.id, "design_version": design.version}))
            .await
            .unwrap();
        assert_eq!(baseline_out["evolved"], json!(false));

        let mut drifted = store.get_performance_record(agent_id, design.version).await.unwrap().unwrap();
        drifted.record_run(10, 1000, false, None);
        drifted.record_run(10, 1000, false, None);
        store.upsert_performance_record(drifted).await.unwrap();
        let out = activity
            .execute(&ActivityContext::new("a1".into(), 1), json!({"agent_id": agent_id, "design_id": design.id, "design_version": design.version}))
            .await
            .unwrap();
        assert_eq!(out["evolved"], json!(true));
    }
}
