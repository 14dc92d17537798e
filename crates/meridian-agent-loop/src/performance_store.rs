//! Explicit performance tracking for `OptimizeAgentPerformance`, kept as a
//! struct owned by the Meta-Agent Loop rather than a process-global
//! singleton (design note §9): callers construct one against a
//! `DurableStore` and thread it through, which keeps the loop testable
//! against an in-memory store without any hidden global state.

use meridian_core::PerformanceRecord;
use meridian_durable::{DurableStore, StoreError};
use std::sync::Arc;
use uuid::Uuid;

pub struct PerformanceStore {
    store: Arc<dyn DurableStore>,
}

impl PerformanceStore {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self { store }
    }

    /// Read-modify-write: loads the current record (creating one at
    /// `total_runs = 0` if this is the design's first observed run), applies
    /// the observation, and persists the result.
    pub async fn record_run(
        &self,
        agent_id: Uuid,
        design_version: u32,
        tokens: u64,
        duration_ms: u64,
        failed: bool,
        feedback: Option<String>,
    ) -> Result<PerformanceRecord, StoreError> {
        let mut record = self
            .store
            .get_performance_record(agent_id, design_version)
            .await?
            .unwrap_or_else(|| PerformanceRecord::new(agent_id, design_version));
        record.record_run(tokens, duration_ms, failed, feedback);
        self.store.upsert_performance_record(record).await
    }

    pub async fn get(&self, agent_id: Uuid, design_version: u32) -> Result<Option<PerformanceRecord>, StoreError> {
        self.store.get_performance_record(agent_id, design_version).await
    }
}
