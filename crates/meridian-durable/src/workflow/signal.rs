//! Signals delivered into a running workflow: cancellation plus user-defined
//! names carrying arbitrary payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSignal {
    pub name: String,
    pub payload: Value,
}

impl WorkflowSignal {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    pub fn is_cancel(&self) -> bool {
        self.name == signal_types::CANCEL
    }
}

/// Well-known signal names. `CANCEL` is handled by the engine itself (it
/// delivers a cancellation token and appends a `WorkflowCancelled` event on
/// the next checkpoint); other names are forwarded to the workflow's
/// `on_signal` hook unmodified.
pub mod signal_types {
    pub const CANCEL: &str = "cancel";
    pub const PAUSE: &str = "pause";
    pub const RESUME: &str = "resume";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_signal_detected_by_name() {
        let signal = WorkflowSignal::new(signal_types::CANCEL, serde_json::json!({"reason": "user"}));
        assert!(signal.is_cancel());
    }

    #[test]
    fn other_signals_are_not_cancel() {
        let signal = WorkflowSignal::new("custom", Value::Null);
        assert!(!signal.is_cancel());
    }
}
