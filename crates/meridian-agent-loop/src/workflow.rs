//! `TaskExecution`: the meta-agent-driven workflow shape (spec §4.3 item 6).
//! `find_or_create_agent_for_task -> execute_task_with_agent -> (if the
//! selected agent has a design) optimize_agent_performance`. The optimize
//! step is skipped for static and meta-prompt agents, which carry no
//! `AgentDesign` to evolve.

use meridian_durable::engine::{activity_statuses, ActivityStatus};
use meridian_durable::{ActivityOptions, Workflow, WorkflowAction, WorkflowError, WorkflowEvent};
use serde_json::{json, Value};

pub struct TaskExecutionWorkflow;

const FIND_OR_CREATE: &str = "find-or-create-agent";
const EXECUTE: &str = "execute-task";
const OPTIMIZE: &str = "optimize-performance";

fn schedule(activity_id: &str, activity_type: &str, input: Value) -> WorkflowAction {
    WorkflowAction::ScheduleActivity {
        activity_id: activity_id.to_string(),
        activity_type: activity_type.to_string(),
        input,
        options: ActivityOptions::default(),
    }
}

impl Workflow for TaskExecutionWorkflow {
    fn workflow_type(&self) -> &'static str {
        "task_execution"
    }

    fn decide(&self, input: &Value, history: &[WorkflowEvent]) -> Result<Vec<WorkflowAction>, WorkflowError> {
        let statuses = activity_statuses(history);
        let task = input.get("task").cloned().unwrap_or(Value::Null);

        let Some(selection_status) = statuses.get(FIND_OR_CREATE) else {
            return Ok(vec![schedule(
                FIND_OR_CREATE,
                "find_or_create_agent_for_task",
                json!({"task": task, "allow_spawn": input.get("allow_spawn").cloned().unwrap_or(json!(true))}),
            )]);
        };
        let selection = match selection_status {
            ActivityStatus::Completed(r) => r.clone(),
            ActivityStatus::Failed(kind, message) => return Ok(vec![WorkflowAction::FailWorkflow { kind: kind.clone(), message: message.clone() }]),
            ActivityStatus::Scheduled => return Ok(vec![]),
        };
        let agent_id = selection.get("agent_id").cloned().unwrap_or(Value::Null);

        let Some(execute_status) = statuses.get(EXECUTE) else {
            return Ok(vec![schedule(EXECUTE, "execute_task_with_agent", json!({"agent_id": agent_id, "task": task}))]);
        };
        let execution_result = match execute_status {
            ActivityStatus::Completed(r) => r.clone(),
            ActivityStatus::Failed(kind, message) => return Ok(vec![WorkflowAction::FailWorkflow { kind: kind.clone(), message: message.clone() }]),
            ActivityStatus::Scheduled => return Ok(vec![]),
        };

        let design_id = selection.get("design_id").cloned().unwrap_or(Value::Null);
        if design_id.is_null() {
            return Ok(vec![WorkflowAction::CompleteWorkflow { result: execution_result }]);
        }

        let Some(optimize_status) = statuses.get(OPTIMIZE) else {
            return Ok(vec![schedule(
                OPTIMIZE,
                "optimize_agent_performance",
                json!({"agent_id": agent_id, "design_id": design_id, "design_version": selection.get("design_version").cloned().unwrap_or(json!(1))}),
            )]);
        };
        match optimize_status {
            ActivityStatus::Completed(_) => Ok(vec![WorkflowAction::CompleteWorkflow { result: execution_result }]),
            ActivityStatus::Failed(_, _) => Ok(vec![WorkflowAction::CompleteWorkflow { result: execution_result }]),
            ActivityStatus::Scheduled => Ok(vec![]),
        }
    }
}
