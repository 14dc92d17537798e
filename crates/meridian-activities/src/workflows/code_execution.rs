//! `CodeExecution`: `select_agent -> prepare_env -> execute_code ->
//! process_results -> cleanup_env`, where `cleanup_env` is scheduled on
//! every exit path — including after a failure in any earlier step, so an
//! environment is never leaked.

use meridian_durable::engine::{activity_statuses, ActivityStatus};
use meridian_durable::{ActivityOptions, Workflow, WorkflowAction, WorkflowError, WorkflowEvent};
use serde_json::{json, Value};

pub struct CodeExecutionWorkflow;

const SELECT: &str = "select-agent";
const PREPARE: &str = "prepare-env";
const EXECUTE: &str = "execute-code";
const PROCESS: &str = "process-results";
const CLEANUP: &str = "cleanup-env";

fn schedule(activity_id: &str, activity_type: &str, input: Value) -> WorkflowAction {
    WorkflowAction::ScheduleActivity {
        activity_id: activity_id.to_string(),
        activity_type: activity_type.to_string(),
        input,
        options: ActivityOptions::default(),
    }
}

impl Workflow for CodeExecutionWorkflow {
    fn workflow_type(&self) -> &'static str {
        "execution"
    }

    fn decide(&self, input: &Value, history: &[WorkflowEvent]) -> Result<Vec<WorkflowAction>, WorkflowError> {
        let statuses = activity_statuses(history);

        let Some(select) = statuses.get(SELECT) else {
            return Ok(vec![schedule(SELECT, "select_agent", input.clone())]);
        };
        let agent_id = match select {
            ActivityStatus::Completed(r) => r.clone(),
            ActivityStatus::Failed(kind, message) => return Ok(vec![WorkflowAction::FailWorkflow { kind: kind.clone(), message: message.clone() }]),
            ActivityStatus::Scheduled => return Ok(vec![]),
        };

        let Some(prepare) = statuses.get(PREPARE) else {
            return Ok(vec![schedule(PREPARE, "prepare_env", agent_id)]);
        };
        let env = match prepare {
            ActivityStatus::Completed(r) => r.clone(),
            ActivityStatus::Failed(kind, message) => {
                return Ok(vec![WorkflowAction::FailWorkflow { kind: kind.clone(), message: message.clone() }])
            }
            ActivityStatus::Scheduled => return Ok(vec![]),
        };
        let env_id = env.get("env_id").cloned().unwrap_or(Value::Null);

        let terminal_failure = |kind: &str, message: &str, env_id: &Value| -> Vec<WorkflowAction> {
            if statuses.contains_key(CLEANUP) {
                return vec![WorkflowAction::FailWorkflow { kind: kind.to_string(), message: message.to_string() }];
            }
            vec![WorkflowAction::ScheduleActivities(vec![
                Box::new(schedule(CLEANUP, "cleanup_env", json!({"env_id": env_id}))),
            ])]
        };

        let Some(execute) = statuses.get(EXECUTE) else {
            return Ok(vec![schedule(
                EXECUTE,
                "execute_code",
                json!({"env_id": env_id, "code": input.get("code").cloned().unwrap_or(Value::Null)}),
            )]);
        };
        let exec_result = match execute {
            ActivityStatus::Completed(r) => r.clone(),
            ActivityStatus::Failed(kind, message) => return Ok(terminal_failure(kind, message, &env_id)),
            ActivityStatus::Scheduled => return Ok(vec![]),
        };

        let Some(process) = statuses.get(PROCESS) else {
            return Ok(vec![schedule(PROCESS, "process_results", exec_result)]);
        };
        let process_result = match process {
            ActivityStatus::Completed(r) => r.clone(),
            ActivityStatus::Failed(kind, message) => return Ok(terminal_failure(kind, message, &env_id)),
            ActivityStatus::Scheduled => return Ok(vec![]),
        };

        let Some(cleanup) = statuses.get(CLEANUP) else {
            return Ok(vec![schedule(CLEANUP, "cleanup_env", json!({"env_id": env_id}))]);
        };
        match cleanup {
            ActivityStatus::Completed(_) => Ok(vec![WorkflowAction::CompleteWorkflow { result: process_result }]),
            ActivityStatus::Failed(kind, message) => Ok(vec![WorkflowAction::FailWorkflow { kind: kind.clone(), message: message.clone() }]),
            ActivityStatus::Scheduled => Ok(vec![]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_decide_schedules_select_agent() {
        let wf = CodeExecutionWorkflow;
        let actions = wf.decide(&json!({"code": "fn main() {}"}), &[]).unwrap();
        assert!(matches!(&actions[0], WorkflowAction::ScheduleActivity { activity_type, .. } if activity_type == "select_agent"));
    }

    #[test]
    fn execute_failure_still_schedules_cleanup_before_failing() {
        let wf = CodeExecutionWorkflow;
        let history = vec![
            WorkflowEvent::ActivityCompleted { activity_id: SELECT.to_string(), result: json!({"agent_id": "a1"}), timestamp: chrono::Utc::now() },
            WorkflowEvent::ActivityCompleted { activity_id: PREPARE.to_string(), result: json!({"env_id": "e1"}), timestamp: chrono::Utc::now() },
            WorkflowEvent::ActivityFailed { activity_id: EXECUTE.to_string(), kind: "internal".to_string(), message: "boom".to_string(), attempt: 3, timestamp: chrono::Utc::now() },
        ];
        let actions = wf.decide(&json!({}), &history).unwrap();
        assert!(matches!(&actions[0], WorkflowAction::ScheduleActivities(_)));
    }
}
