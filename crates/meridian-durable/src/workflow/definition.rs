//! The `Workflow` trait every registered workflow function implements.

use serde_json::Value;

use super::action::WorkflowAction;
use super::event::WorkflowEvent;
use super::signal::WorkflowSignal;

/// Error returned by a workflow function.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WorkflowError {
    pub kind: String,
    pub message: String,
}

impl WorkflowError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new("cancelled", message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal", message)
    }
}

impl std::fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for WorkflowError {}

/// A deterministic, replayable workflow function.
///
/// `decide` is called once per replay pass with the full event history
/// observed so far; it must be a pure function of that history (no
/// wall-clock reads, no randomness, no unrecorded environment access) so
/// that replaying the same history always produces the same sequence of
/// actions. Time and randomness needed by workflow logic must come from the
/// event history itself (e.g. a `TimerFired` event), never from `SystemTime`
/// or `rand` called directly inside `decide`.
pub trait Workflow: Send + Sync + 'static {
    /// Workflow type name, matched against `Workflow.workflow_type` at
    /// dispatch time.
    fn workflow_type(&self) -> &'static str;

    /// Produce the next batch of actions given the event history replayed so
    /// far. Returning an empty `Vec` with no terminal action means "wait for
    /// more events" (the engine suspends and persists state).
    fn decide(
        &self,
        workflow_input: &Value,
        history: &[WorkflowEvent],
    ) -> Result<Vec<WorkflowAction>, WorkflowError>;

    /// Optional hook for signal-driven behavior (e.g. cancellation). Default
    /// implementation folds a `Cancel` signal into a `CompleteWorkflow`
    /// action carrying a `cancelled` error on the next `decide` pass by
    /// appending a `WorkflowCancelled` event to history — callers that need
    /// bespoke signal handling override this.
    fn on_signal(&self, _signal: &WorkflowSignal, _history: &[WorkflowEvent]) -> Vec<WorkflowAction> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::action::ActivityOptions;

    struct EchoWorkflow;

    impl Workflow for EchoWorkflow {
        fn workflow_type(&self) -> &'static str {
            "echo"
        }

        fn decide(
            &self,
            input: &Value,
            history: &[WorkflowEvent],
        ) -> Result<Vec<WorkflowAction>, WorkflowError> {
            if history.iter().any(|e| matches!(e, WorkflowEvent::ActivityCompleted { .. })) {
                return Ok(vec![WorkflowAction::CompleteWorkflow {
                    result: input.clone(),
                }]);
            }
            Ok(vec![WorkflowAction::ScheduleActivity {
                activity_id: "echo-1".to_string(),
                activity_type: "echo".to_string(),
                input: input.clone(),
                options: ActivityOptions::default(),
            }])
        }
    }

    #[test]
    fn first_decide_schedules_an_activity() {
        let wf = EchoWorkflow;
        let actions = wf.decide(&serde_json::json!({"x": 1}), &[]).unwrap();
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], WorkflowAction::ScheduleActivity { .. }));
    }

    #[test]
    fn workflow_error_display_includes_kind() {
        let err = WorkflowError::cancelled("user requested");
        assert_eq!(err.to_string(), "cancelled: user requested");
    }
}
