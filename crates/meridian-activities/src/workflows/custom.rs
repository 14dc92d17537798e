//! `Custom`: iterates over a user-provided step list (`input.steps`), each
//! `{name, payload, timeout_s?, max_retries?, continue_on_error?}`. Per-step
//! `timeout_s`/`max_retries` become that step's `ActivityOptions`;
//! `continue_on_error` (default `false`) determines whether a failed step
//! fails the whole workflow or is skipped in favor of the next step.

use meridian_durable::engine::{activity_statuses, ActivityStatus};
use meridian_durable::{ActivityOptions, Workflow, WorkflowAction, WorkflowError, WorkflowEvent};
use serde_json::{json, Value};
use std::time::Duration;

pub struct CustomWorkflow;

fn step_id(i: usize) -> String {
    format!("custom-step-{i}")
}

fn options_for(step: &Value) -> ActivityOptions {
    let mut options = ActivityOptions::default();
    if let Some(timeout_s) = step.get("timeout_s").and_then(|v| v.as_u64()) {
        options.start_to_close_timeout = Duration::from_secs(timeout_s);
    }
    if let Some(max_retries) = step.get("max_retries").and_then(|v| v.as_u64()) {
        options.max_retries = max_retries as u32;
    }
    options
}

impl Workflow for CustomWorkflow {
    fn workflow_type(&self) -> &'static str {
        "custom"
    }

    fn decide(&self, input: &Value, history: &[WorkflowEvent]) -> Result<Vec<WorkflowAction>, WorkflowError> {
        let statuses = activity_statuses(history);
        let steps = input.get("steps").and_then(|v| v.as_array()).cloned().unwrap_or_default();
        if steps.is_empty() {
            return Ok(vec![WorkflowAction::CompleteWorkflow { result: json!({"ran": []}) }]);
        }

        let mut outputs = Vec::new();
        for (i, step) in steps.iter().enumerate() {
            let id = step_id(i);
            let continue_on_error = step.get("continue_on_error").and_then(|v| v.as_bool()).unwrap_or(false);

            match statuses.get(&id) {
                None => {
                    let name = step.get("name").and_then(|v| v.as_str()).unwrap_or("step");
                    return Ok(vec![WorkflowAction::ScheduleActivity {
                        activity_id: id,
                        activity_type: "run_custom_step".to_string(),
                        input: json!({"step_name": name, "payload": step.get("payload").cloned().unwrap_or(Value::Null)}),
                        options: options_for(step),
                    }]);
                }
                Some(ActivityStatus::Scheduled) => return Ok(vec![]),
                Some(ActivityStatus::Completed(result)) => outputs.push(result.clone()),
                Some(ActivityStatus::Failed(kind, message)) => {
                    if continue_on_error {
                        outputs.push(json!({"step_failed": true, "kind": kind, "message": message}));
                        continue;
                    }
                    return Ok(vec![WorkflowAction::FailWorkflow { kind: kind.clone(), message: message.clone() }]);
                }
            }
        }

        Ok(vec![WorkflowAction::CompleteWorkflow { result: json!({"ran": outputs}) }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_step_list_completes_immediately() {
        let wf = CustomWorkflow;
        let actions = wf.decide(&json!({"steps": []}), &[]).unwrap();
        assert!(matches!(&actions[0], WorkflowAction::CompleteWorkflow { .. }));
    }

    #[test]
    fn failed_step_with_continue_on_error_keeps_going() {
        let wf = CustomWorkflow;
        let input = json!({"steps": [
            {"name": "flaky", "payload": {}, "continue_on_error": true},
            {"name": "final", "payload": {}},
        ]});
        let history = vec![WorkflowEvent::ActivityFailed {
            activity_id: step_id(0),
            kind: "internal".to_string(),
            message: "boom".to_string(),
            attempt: 1,
            timestamp: chrono::Utc::now(),
        }];
        let actions = wf.decide(&input, &history).unwrap();
        assert!(matches!(&actions[0], WorkflowAction::ScheduleActivity { activity_id, .. } if activity_id == &step_id(1)));
    }

    #[test]
    fn failed_step_without_continue_on_error_fails_workflow() {
        let wf = CustomWorkflow;
        let input = json!({"steps": [{"name": "critical", "payload": {}}]});
        let history = vec![WorkflowEvent::ActivityFailed {
            activity_id: step_id(0),
            kind: "internal".to_string(),
            message: "boom".to_string(),
            attempt: 1,
            timestamp: chrono::Utc::now(),
        }];
        let actions = wf.decide(&input, &history).unwrap();
        assert!(matches!(&actions[0], WorkflowAction::FailWorkflow { .. }));
    }

    #[test]
    fn per_step_timeout_and_retries_carried_into_options() {
        let wf = CustomWorkflow;
        let input = json!({"steps": [{"name": "slow", "payload": {}, "timeout_s": 10, "max_retries": 1}]});
        let actions = wf.decide(&input, &[]).unwrap();
        match &actions[0] {
            WorkflowAction::ScheduleActivity { options, .. } => {
                assert_eq!(options.start_to_close_timeout, Duration::from_secs(10));
                assert_eq!(options.max_retries, 1);
            }
            other => panic!("expected ScheduleActivity, got {other:?}"),
        }
    }
}
