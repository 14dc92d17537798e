//! The append-only event history a workflow function replays over.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutType {
    StartToClose,
    Heartbeat,
    ScheduleToStart,
    WorkflowExecution,
}

/// One entry in a workflow's durable event history. The engine appends
/// events as activities are scheduled, complete, fail, or time out, and as
/// timers fire or signals arrive; replaying this sequence through
/// `Workflow::decide` must always reach the same decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    WorkflowStarted {
        input: Value,
        timestamp: DateTime<Utc>,
    },
    ActivityScheduled {
        activity_id: String,
        activity_type: String,
        input: Value,
        options: crate::workflow::ActivityOptions,
        timestamp: DateTime<Utc>,
    },
    ActivityCompleted {
        activity_id: String,
        result: Value,
        timestamp: DateTime<Utc>,
    },
    ActivityFailed {
        activity_id: String,
        kind: String,
        message: String,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },
    ActivityTimedOut {
        activity_id: String,
        timeout_type: TimeoutType,
        timestamp: DateTime<Utc>,
    },
    TimerStarted {
        timer_id: String,
        timestamp: DateTime<Utc>,
    },
    TimerFired {
        timer_id: String,
        timestamp: DateTime<Utc>,
    },
    SignalReceived {
        signal_name: String,
        payload: Value,
        timestamp: DateTime<Utc>,
    },
    WorkflowCompleted {
        result: Value,
        timestamp: DateTime<Utc>,
    },
    WorkflowFailed {
        kind: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
    WorkflowCancelled {
        reason: String,
        timestamp: DateTime<Utc>,
    },
    WorkflowTimedOut {
        timestamp: DateTime<Utc>,
    },
}

impl WorkflowEvent {
    /// The activity this event concerns, if any. Used by the executor to
    /// correlate completions/failures back to a scheduled activity.
    pub fn activity_id(&self) -> Option<&str> {
        match self {
            WorkflowEvent::ActivityScheduled { activity_id, .. }
            | WorkflowEvent::ActivityCompleted { activity_id, .. }
            | WorkflowEvent::ActivityFailed { activity_id, .. }
            | WorkflowEvent::ActivityTimedOut { activity_id, .. } => Some(activity_id),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowEvent::WorkflowCompleted { .. }
                | WorkflowEvent::WorkflowFailed { .. }
                | WorkflowEvent::WorkflowCancelled { .. }
                | WorkflowEvent::WorkflowTimedOut { .. }
        )
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            WorkflowEvent::WorkflowStarted { timestamp, .. }
            | WorkflowEvent::ActivityScheduled { timestamp, .. }
            | WorkflowEvent::ActivityCompleted { timestamp, .. }
            | WorkflowEvent::ActivityFailed { timestamp, .. }
            | WorkflowEvent::ActivityTimedOut { timestamp, .. }
            | WorkflowEvent::TimerStarted { timestamp, .. }
            | WorkflowEvent::TimerFired { timestamp, .. }
            | WorkflowEvent::SignalReceived { timestamp, .. }
            | WorkflowEvent::WorkflowCompleted { timestamp, .. }
            | WorkflowEvent::WorkflowFailed { timestamp, .. }
            | WorkflowEvent::WorkflowCancelled { timestamp, .. }
            | WorkflowEvent::WorkflowTimedOut { timestamp } => *timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_id_extracted_from_relevant_variants() {
        let event = WorkflowEvent::ActivityCompleted {
            activity_id: "a1".to_string(),
            result: Value::Null,
            timestamp: Utc::now(),
        };
        assert_eq!(event.activity_id(), Some("a1"));

        let event = WorkflowEvent::TimerFired {
            timer_id: "t1".to_string(),
            timestamp: Utc::now(),
        };
        assert_eq!(event.activity_id(), None);
    }

    #[test]
    fn terminal_events_identified() {
        assert!(WorkflowEvent::WorkflowCompleted {
            result: Value::Null,
            timestamp: Utc::now()
        }
        .is_terminal());
        assert!(!WorkflowEvent::TimerFired {
            timer_id: "t1".into(),
            timestamp: Utc::now()
        }
        .is_terminal());
    }
}
