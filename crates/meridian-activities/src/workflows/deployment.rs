//! `Deployment`: `validate -> build -> test -> (optional) deploy_staging ->
//! smoke_test -> deploy_production -> health_check`. Any failure after
//! staging triggers `rollback`; a failed health check triggers `rollback`
//! then fails the workflow. `input.config.use_staging` (default `true`)
//! controls whether `deploy_staging`/`smoke_test` run.

use meridian_durable::engine::{activity_statuses, ActivityStatus};
use meridian_durable::{ActivityOptions, Workflow, WorkflowAction, WorkflowError, WorkflowEvent};
use serde_json::{json, Value};

pub struct DeploymentWorkflow;

const VALIDATE: &str = "validate";
const BUILD: &str = "build";
const TEST: &str = "test";
const DEPLOY_STAGING: &str = "deploy-staging";
const SMOKE_TEST: &str = "smoke-test";
const DEPLOY_PRODUCTION: &str = "deploy-production";
const HEALTH_CHECK: &str = "health-check";
const ROLLBACK: &str = "rollback";

fn schedule(activity_id: &str, activity_type: &str, input: Value) -> WorkflowAction {
    WorkflowAction::ScheduleActivity {
        activity_id: activity_id.to_string(),
        activity_type: activity_type.to_string(),
        input,
        options: ActivityOptions::default(),
    }
}

/// Past this point (staging deployed), any failure must roll back rather
/// than just fail outright.
fn past_staging_gate(statuses: &std::collections::HashMap<String, ActivityStatus>) -> bool {
    matches!(statuses.get(DEPLOY_STAGING), Some(ActivityStatus::Completed(_)))
}

fn rollback_or_fail(statuses: &std::collections::HashMap<String, ActivityStatus>, kind: &str, message: &str, past_staging: bool) -> Vec<WorkflowAction> {
    if !past_staging {
        return vec![WorkflowAction::FailWorkflow { kind: kind.to_string(), message: message.to_string() }];
    }
    match statuses.get(ROLLBACK) {
        None => vec![schedule(ROLLBACK, "rollback", json!({"reason": message}))],
        Some(ActivityStatus::Scheduled) => vec![],
        Some(_) => vec![WorkflowAction::FailWorkflow { kind: kind.to_string(), message: message.to_string() }],
    }
}

impl Workflow for DeploymentWorkflow {
    fn workflow_type(&self) -> &'static str {
        "deployment"
    }

    fn decide(&self, input: &Value, history: &[WorkflowEvent]) -> Result<Vec<WorkflowAction>, WorkflowError> {
        let statuses = activity_statuses(history);
        let use_staging = input.get("config").and_then(|c| c.get("use_staging")).and_then(|v| v.as_bool()).unwrap_or(true);
        let past_staging = !use_staging || past_staging_gate(&statuses);

        let Some(validate) = statuses.get(VALIDATE) else {
            return Ok(vec![schedule(VALIDATE, "validate", input.clone())]);
        };
        match validate {
            ActivityStatus::Failed(kind, message) => return Ok(vec![WorkflowAction::FailWorkflow { kind: kind.clone(), message: message.clone() }]),
            ActivityStatus::Scheduled => return Ok(vec![]),
            ActivityStatus::Completed(_) => {}
        }

        let Some(build) = statuses.get(BUILD) else {
            return Ok(vec![schedule(BUILD, "build", input.clone())]);
        };
        let build_result = match build {
            ActivityStatus::Completed(r) => r.clone(),
            ActivityStatus::Failed(kind, message) => return Ok(rollback_or_fail(&statuses, kind, message, past_staging)),
            ActivityStatus::Scheduled => return Ok(vec![]),
        };
        let artifact_ref = build_result.get("artifact_ref").cloned().unwrap_or(Value::Null);

        let Some(test) = statuses.get(TEST) else {
            return Ok(vec![schedule(TEST, "test", json!({"artifact_ref": artifact_ref}))]);
        };
        match test {
            ActivityStatus::Completed(r) if r.get("passed").and_then(|v| v.as_bool()) == Some(false) => {
                return Ok(rollback_or_fail(&statuses, "internal", "tests failed", past_staging));
            }
            ActivityStatus::Completed(_) => {}
            ActivityStatus::Failed(kind, message) => return Ok(rollback_or_fail(&statuses, kind, message, past_staging)),
            ActivityStatus::Scheduled => return Ok(vec![]),
        }

        if use_staging {
            let Some(deploy_staging) = statuses.get(DEPLOY_STAGING) else {
                return Ok(vec![schedule(DEPLOY_STAGING, "deploy_staging", json!({"artifact_ref": artifact_ref}))]);
            };
            let staging_result = match deploy_staging {
                ActivityStatus::Completed(r) => r.clone(),
                ActivityStatus::Failed(kind, message) => return Ok(vec![WorkflowAction::FailWorkflow { kind: kind.clone(), message: message.clone() }]),
                ActivityStatus::Scheduled => return Ok(vec![]),
            };
            let staging_url = staging_result.get("staging_url").cloned().unwrap_or(Value::Null);

            let Some(smoke_test) = statuses.get(SMOKE_TEST) else {
                return Ok(vec![schedule(SMOKE_TEST, "smoke_test", json!({"staging_url": staging_url}))]);
            };
            match smoke_test {
                ActivityStatus::Completed(r) if r.get("passed").and_then(|v| v.as_bool()) == Some(false) => {
                    return Ok(rollback_or_fail(&statuses, "internal", "smoke test failed", true));
                }
                ActivityStatus::Completed(_) => {}
                ActivityStatus::Failed(kind, message) => return Ok(rollback_or_fail(&statuses, kind, message, true)),
                ActivityStatus::Scheduled => return Ok(vec![]),
            }
        }

        let past_staging = true;
        let Some(deploy_production) = statuses.get(DEPLOY_PRODUCTION) else {
            return Ok(vec![schedule(DEPLOY_PRODUCTION, "deploy_production", json!({"artifact_ref": artifact_ref}))]);
        };
        let production_result = match deploy_production {
            ActivityStatus::Completed(r) => r.clone(),
            ActivityStatus::Failed(kind, message) => return Ok(rollback_or_fail(&statuses, kind, message, past_staging)),
            ActivityStatus::Scheduled => return Ok(vec![]),
        };
        let production_url = production_result.get("production_url").cloned().unwrap_or(Value::Null);

        let Some(health_check) = statuses.get(HEALTH_CHECK) else {
            return Ok(vec![schedule(HEALTH_CHECK, "health_check", json!({"production_url": production_url}))]);
        };
        match health_check {
            ActivityStatus::Completed(r) if r.get("healthy").and_then(|v| v.as_bool()) == Some(false) => {
                return Ok(rollback_or_fail(&statuses, "unavailable", "health check failed", true));
            }
            ActivityStatus::Completed(_) => {}
            ActivityStatus::Failed(kind, message) => return Ok(rollback_or_fail(&statuses, kind, message, true)),
            ActivityStatus::Scheduled => return Ok(vec![]),
        }

        Ok(vec![WorkflowAction::CompleteWorkflow { result: production_result }])
    }
}
