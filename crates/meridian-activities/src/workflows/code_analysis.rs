//! `CodeAnalysis`: `fetch_code -> run_static + run_security + run_performance`
//! (parallel fan-out with a joining selector) `-> generate_report`.

use meridian_durable::engine::{activity_statuses, ActivityStatus};
use meridian_durable::{ActivityOptions, Workflow, WorkflowAction, WorkflowError, WorkflowEvent};
use serde_json::{json, Value};

pub struct CodeAnalysisWorkflow;

const FETCH: &str = "fetch-code";
const STATIC: &str = "run-static";
const SECURITY: &str = "run-security";
const PERFORMANCE: &str = "run-performance";
const REPORT: &str = "generate-report";

fn schedule(activity_id: &str, activity_type: &str, input: Value) -> WorkflowAction {
    WorkflowAction::ScheduleActivity {
        activity_id: activity_id.to_string(),
        activity_type: activity_type.to_string(),
        input,
        options: ActivityOptions::default(),
    }
}

impl Workflow for CodeAnalysisWorkflow {
    fn workflow_type(&self) -> &'static str {
        "analysis"
    }

    fn decide(&self, input: &Value, history: &[WorkflowEvent]) -> Result<Vec<WorkflowAction>, WorkflowError> {
        let statuses = activity_statuses(history);

        let Some(fetch) = statuses.get(FETCH) else {
            return Ok(vec![schedule(FETCH, "fetch_code", input.clone())]);
        };
        let code = match fetch {
            ActivityStatus::Completed(r) => r.clone(),
            ActivityStatus::Failed(kind, message) => {
                return Ok(vec![WorkflowAction::FailWorkflow { kind: kind.clone(), message: message.clone() }])
            }
            ActivityStatus::Scheduled => return Ok(vec![]),
        };

        let fan_out = [(STATIC, "run_static"), (SECURITY, "run_security"), (PERFORMANCE, "run_performance")];
        let unscheduled: Vec<_> = fan_out.iter().filter(|(id, _)| !statuses.contains_key(*id)).collect();
        if !unscheduled.is_empty() {
            let actions = unscheduled
                .into_iter()
                .map(|(id, activity_type)| Box::new(schedule(id, activity_type, code.clone())))
                .collect();
            return Ok(vec![WorkflowAction::ScheduleActivities(actions)]);
        }

        for (id, _) in &fan_out {
            if let Some(ActivityStatus::Failed(kind, message)) = statuses.get(*id) {
                return Ok(vec![WorkflowAction::FailWorkflow { kind: kind.clone(), message: message.clone() }]);
            }
        }
        let all_completed = fan_out.iter().all(|(id, _)| matches!(statuses.get(*id), Some(ActivityStatus::Completed(_))));
        if !all_completed {
            return Ok(vec![]);
        }

        if statuses.get(REPORT).is_none() {
            let get = |id: &str| match statuses.get(id) {
                Some(ActivityStatus::Completed(r)) => r.clone(),
                _ => Value::Null,
            };
            return Ok(vec![schedule(
                REPORT,
                "generate_report",
                json!({"static": get(STATIC), "security": get(SECURITY), "performance": get(PERFORMANCE)}),
            )]);
        }

        match statuses.get(REPORT).unwrap() {
            ActivityStatus::Completed(result) => Ok(vec![WorkflowAction::CompleteWorkflow { result: result.clone() }]),
            ActivityStatus::Failed(kind, message) => Ok(vec![WorkflowAction::FailWorkflow { kind: kind.clone(), message: message.clone() }]),
            ActivityStatus::Scheduled => Ok(vec![]),
        }
    }
}
