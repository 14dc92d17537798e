//! Artifact and PerformanceRecord entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An append-only artifact produced by a task. Storage backend is
/// deliberately unspecified beyond an opaque path and content digest — see
/// `ArtifactSink` in `meridian-activities` for the pluggable write side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    pub task_id: Uuid,
    pub name: String,
    pub artifact_type: String,
    pub content_type: String,
    pub path: String,
    pub size: u64,
    pub content_digest: String,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(
        task_id: Uuid,
        name: impl Into<String>,
        artifact_type: impl Into<String>,
        content_type: impl Into<String>,
        path: impl Into<String>,
        size: u64,
        content_digest: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            task_id,
            name: name.into(),
            artifact_type: artifact_type.into(),
            content_type: content_type.into(),
            path: path.into(),
            size,
            content_digest: content_digest.into(),
            created_at: Utc::now(),
        }
    }
}

/// Rolling aggregate of one agent design's observed performance, consulted by
/// `OptimizeAgentPerformance`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub agent_id: Uuid,
    pub design_version: u32,
    pub total_runs: u64,
    pub total_tokens: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
    pub feedback: Vec<String>,
}

impl PerformanceRecord {
    pub fn new(agent_id: Uuid, design_version: u32) -> Self {
        Self {
            agent_id,
            design_version,
            total_runs: 0,
            total_tokens: 0,
            total_duration_ms: 0,
            error_count: 0,
            feedback: Vec::new(),
        }
    }

    pub fn record_run(&mut self, tokens: u64, duration_ms: u64, failed: bool, feedback: Option<String>) {
        self.total_runs += 1;
        self.total_tokens += tokens;
        self.total_duration_ms += duration_ms;
        if failed {
            self.error_count += 1;
        }
        if let Some(note) = feedback {
            self.feedback.push(note);
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.total_runs == 0 {
            0.0
        } else {
            self.error_count as f64 / self.total_runs as f64
        }
    }

    pub fn average_duration_ms(&self) -> f64 {
        if self.total_runs == 0 {
            0.0
        } else {
            self.total_duration_ms as f64 / self.total_runs as f64
        }
    }
}
