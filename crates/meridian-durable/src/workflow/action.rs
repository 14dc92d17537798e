//! Actions a workflow function's `decide` call can request of the engine.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Per-activity scheduling options. Defaults match the specification's
/// retry-policy and timeout defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityOptions {
    #[serde(with = "duration_millis")]
    pub start_to_close_timeout: Duration,
    #[serde(with = "duration_millis")]
    pub heartbeat_timeout: Duration,
    pub max_retries: u32,
    #[serde(with = "duration_millis")]
    pub initial_retry_interval: Duration,
    pub backoff_coefficient: f64,
    #[serde(with = "duration_millis")]
    pub max_retry_interval: Duration,
    #[serde(default)]
    pub non_retryable_error_kinds: Vec<String>,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            start_to_close_timeout: Duration::from_secs(300),
            heartbeat_timeout: Duration::from_secs(30),
            max_retries: 3,
            initial_retry_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            max_retry_interval: Duration::from_secs(60),
            non_retryable_error_kinds: vec![
                "validation".to_string(),
                "not_found".to_string(),
                "conflict".to_string(),
                "cancelled".to_string(),
            ],
        }
    }
}

/// An action the engine must carry out on behalf of a workflow's decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowAction {
    ScheduleActivity {
        activity_id: String,
        activity_type: String,
        input: Value,
        options: ActivityOptions,
    },
    StartTimer {
        timer_id: String,
        #[serde(with = "duration_millis")]
        duration: Duration,
    },
    CompleteWorkflow {
        result: Value,
    },
    FailWorkflow {
        kind: String,
        message: String,
    },
    /// Used by fan-out workflow shapes (CodeAnalysis, IntentProcessing) to
    /// schedule several activities in one decision pass; the engine tracks
    /// each independently and the workflow's next `decide` call sees
    /// whichever completions/failures have landed.
    ScheduleActivities(Vec<Box<WorkflowAction>>),
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
