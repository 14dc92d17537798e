//! `CodeReview`: `fetch_changes -> automated_checks -> ai_review -> summary
//! -> (if configured) post_comments`. Whether to post is read from
//! `input.config.post_comments` (default `false`).

use meridian_durable::engine::{activity_statuses, ActivityStatus};
use meridian_durable::{ActivityOptions, Workflow, WorkflowAction, WorkflowError, WorkflowEvent};
use serde_json::{json, Value};

pub struct CodeReviewWorkflow;

const FETCH: &str = "fetch-changes";
const CHECKS: &str = "automated-checks";
const REVIEW: &str = "ai-review";
const SUMMARY: &str = "summary";
const POST: &str = "post-comments";

fn schedule(activity_id: &str, activity_type: &str, input: Value) -> WorkflowAction {
    WorkflowAction::ScheduleActivity {
        activity_id: activity_id.to_string(),
        activity_type: activity_type.to_string(),
        input,
        options: ActivityOptions::default(),
    }
}

/// Caller must have already ruled out `ActivityStatus::Scheduled`.
fn settled(status: &ActivityStatus) -> Result<Value, WorkflowAction> {
    match status {
        ActivityStatus::Completed(r) => Ok(r.clone()),
        ActivityStatus::Failed(kind, message) => Err(WorkflowAction::FailWorkflow { kind: kind.clone(), message: message.clone() }),
        ActivityStatus::Scheduled => unreachable!("caller must check for Scheduled before calling settled"),
    }
}

impl Workflow for CodeReviewWorkflow {
    fn workflow_type(&self) -> &'static str {
        "review"
    }

    fn decide(&self, input: &Value, history: &[WorkflowEvent]) -> Result<Vec<WorkflowAction>, WorkflowError> {
        let statuses = activity_statuses(history);
        let post_enabled = input.get("config").and_then(|c| c.get("post_comments")).and_then(|v| v.as_bool()).unwrap_or(false);

        let Some(fetch) = statuses.get(FETCH) else {
            return Ok(vec![schedule(FETCH, "fetch_changes", input.clone())]);
        };
        let changes = match fetch {
            ActivityStatus::Completed(r) => r.clone(),
            ActivityStatus::Failed(kind, message) => return Ok(vec![WorkflowAction::FailWorkflow { kind: kind.clone(), message: message.clone() }]),
            ActivityStatus::Scheduled => return Ok(vec![]),
        };

        let Some(checks_status) = statuses.get(CHECKS) else {
            return Ok(vec![schedule(CHECKS, "automated_checks", changes.clone())]);
        };
        if matches!(checks_status, ActivityStatus::Scheduled) {
            return Ok(vec![]);
        }
        let checks = match settled(checks_status) {
            Ok(r) => r,
            Err(action) => return Ok(vec![action]),
        };

        let Some(review_status) = statuses.get(REVIEW) else {
            return Ok(vec![schedule(REVIEW, "ai_review", changes.clone())]);
        };
        if matches!(review_status, ActivityStatus::Scheduled) {
            return Ok(vec![]);
        }
        let review = match settled(review_status) {
            Ok(r) => r,
            Err(action) => return Ok(vec![action]),
        };

        let Some(summary_status) = statuses.get(SUMMARY) else {
            return Ok(vec![schedule(SUMMARY, "summary", json!({"checks": checks, "review": review}))]);
        };
        if matches!(summary_status, ActivityStatus::Scheduled) {
            return Ok(vec![]);
        }
        let summary = match settled(summary_status) {
            Ok(r) => r,
            Err(action) => return Ok(vec![action]),
        };

        if !post_enabled {
            return Ok(vec![WorkflowAction::CompleteWorkflow { result: summary }]);
        }

        let Some(post_status) = statuses.get(POST) else {
            let comments = review.get("comments").cloned().unwrap_or(json!([]));
            return Ok(vec![schedule(POST, "post_comments", json!({"comments": comments}))]);
        };
        match post_status {
            ActivityStatus::Completed(_) => Ok(vec![WorkflowAction::CompleteWorkflow { result: summary }]),
            ActivityStatus::Failed(kind, message) => Ok(vec![WorkflowAction::FailWorkflow { kind: kind.clone(), message: message.clone() }]),
            ActivityStatus::Scheduled => Ok(vec![]),
        }
    }
}
