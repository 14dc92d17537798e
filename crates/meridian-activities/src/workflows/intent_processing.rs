//! `IntentProcessing`: `analyze_intent -> create_plan -> execute_plan_steps
//! (possibly in parallel) -> aggregate`.

use meridian_durable::engine::{activity_statuses, ActivityStatus};
use meridian_durable::{ActivityOptions, Workflow, WorkflowAction, WorkflowError, WorkflowEvent};
use serde_json::{json, Value};

pub struct IntentProcessingWorkflow;

const ANALYZE: &str = "analyze-intent";
const PLAN: &str = "create-plan";
const AGGREGATE: &str = "aggregate";

fn plan_step_id(i: usize) -> String {
    format!("plan-step-{i}")
}

impl Workflow for IntentProcessingWorkflow {
    fn workflow_type(&self) -> &'static str {
        "intent"
    }

    fn decide(&self, input: &Value, history: &[WorkflowEvent]) -> Result<Vec<WorkflowAction>, WorkflowError> {
        let statuses = activity_statuses(history);

        let analyze = statuses.get(ANALYZE);
        if analyze.is_none() {
            return Ok(vec![WorkflowAction::ScheduleActivity {
                activity_id: ANALYZE.to_string(),
                activity_type: "analyze_intent".to_string(),
                input: input.clone(),
                options: ActivityOptions::default(),
            }]);
        }
        let analyze_result = match analyze.unwrap() {
            ActivityStatus::Completed(result) => result.clone(),
            ActivityStatus::Failed(kind, message) => {
                return Ok(vec![WorkflowAction::FailWorkflow { kind: kind.clone(), message: message.clone() }])
            }
            ActivityStatus::Scheduled => return Ok(vec![]),
        };

        let plan = statuses.get(PLAN);
        if plan.is_none() {
            return Ok(vec![WorkflowAction::ScheduleActivity {
                activity_id: PLAN.to_string(),
                activity_type: "create_plan".to_string(),
                input: analyze_result,
                options: ActivityOptions::default(),
            }]);
        }
        let plan_result = match plan.unwrap() {
            ActivityStatus::Completed(result) => result.clone(),
            ActivityStatus::Failed(kind, message) => {
                return Ok(vec![WorkflowAction::FailWorkflow { kind: kind.clone(), message: message.clone() }])
            }
            ActivityStatus::Scheduled => return Ok(vec![]),
        };

        let steps = plan_result.get("steps").and_then(|v| v.as_array()).cloned().unwrap_or_default();
        let any_step_unscheduled = steps
            .iter()
            .enumerate()
            .any(|(i, _)| !statuses.contains_key(&plan_step_id(i)));
        if any_step_unscheduled {
            let actions = steps
                .iter()
                .enumerate()
                .filter(|(i, _)| !statuses.contains_key(&plan_step_id(*i)))
                .map(|(i, step)| {
                    Box::new(WorkflowAction::ScheduleActivity {
                        activity_id: plan_step_id(i),
                        activity_type: "run_custom_step".to_string(),
                        input: json!({"step_name": plan_step_id(i), "payload": step}),
                        options: ActivityOptions::default(),
                    })
                })
                .collect();
            return Ok(vec![WorkflowAction::ScheduleActivities(actions)]);
        }

        let all_steps_settled = (0..steps.len()).all(|i| matches!(statuses.get(&plan_step_id(i)), Some(ActivityStatus::Completed(_)) | Some(ActivityStatus::Failed(_, _))));
        if !all_steps_settled {
            return Ok(vec![]);
        }

        if statuses.get(AGGREGATE).is_none() {
            let step_results: Vec<Value> = (0..steps.len())
                .map(|i| match statuses.get(&plan_step_id(i)) {
                    Some(ActivityStatus::Completed(result)) => json!({"status": "completed", "output": result}),
                    Some(ActivityStatus::Failed(kind, message)) => json!({"status": "failed", "kind": kind, "message": message}),
                    _ => json!({"status": "unknown"}),
                })
                .collect();
            return Ok(vec![WorkflowAction::ScheduleActivity {
                activity_id: AGGREGATE.to_string(),
                activity_type: "aggregate".to_string(),
                input: json!({"step_results": step_results}),
                options: ActivityOptions::default(),
            }]);
        }

        match statuses.get(AGGREGATE).unwrap() {
            ActivityStatus::Completed(result) => Ok(vec![WorkflowAction::CompleteWorkflow { result: result.clone() }]),
            ActivityStatus::Failed(kind, message) => Ok(vec![WorkflowAction::FailWorkflow { kind: kind.clone(), message: message.clone() }]),
            ActivityStatus::Scheduled => Ok(vec![]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_decide_schedules_analyze_intent() {
        let wf = IntentProcessingWorkflow;
        let actions = wf.decide(&json!({"intent": "fix the bug"}), &[]).unwrap();
        assert_eq!(actions.len(), 1);
        assert!(matches!(&actions[0], WorkflowAction::ScheduleActivity { activity_type, .. } if activity_type == "analyze_intent"));
    }

    #[test]
    fn schedules_plan_after_analyze_completes() {
        let wf = IntentProcessingWorkflow;
        let history = vec![WorkflowEvent::ActivityCompleted {
            activity_id: ANALYZE.to_string(),
            result: json!({"intent_type": "bug_fix"}),
            timestamp: chrono::Utc::now(),
        }];
        let actions = wf.decide(&json!({}), &history).unwrap();
        assert!(matches!(&actions[0], WorkflowAction::ScheduleActivity { activity_type, .. } if activity_type == "create_plan"));
    }
}
