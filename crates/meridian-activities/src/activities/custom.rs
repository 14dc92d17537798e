//! The generic step executor backing the `Custom` workflow shape, which
//! iterates over a user-provided step list. Per-step `timeout_s`,
//! `max_retries`, and `continue_on_error` are not this activity's concern —
//! the `Custom` workflow function translates them into the `ActivityOptions`
//! and branching logic it uses when scheduling each step, so this activity
//! only needs to execute one step's payload and report what ran.

use async_trait::async_trait;
use meridian_durable::{Activity, ActivityContext, ActivityError};
use serde_json::{json, Value};

use super::require_str;

pub struct RunCustomStep;

#[async_trait]
impl Activity for RunCustomStep {
    fn activity_type(&self) -> &'static str {
        "run_custom_step"
    }

    async fn execute(&self, _ctx: &ActivityContext, input: Value) -> Result<Value, ActivityError> {
        let step_name = require_str(&input, "step_name")?;
        let payload = input.get("payload").cloned().unwrap_or(Value::Null);

        if payload.get("force_error").and_then(|v| v.as_str()).is_some() {
            let kind = payload["force_error"].as_str().unwrap();
            return Err(ActivityError::new(kind, format!("step `{step_name}` forced error"), kind == "unavailable" || kind == "timeout"));
        }

        Ok(json!({ "step_name": step_name, "ran": true, "echo": payload }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ActivityContext {
        ActivityContext::new("a1".into(), 1)
    }

    #[tokio::test]
    async fn runs_step_and_echoes_payload() {
        let out = RunCustomStep
            .execute(&ctx(), json!({"step_name": "notify", "payload": {"channel": "ops"}}))
            .await
            .unwrap();
        assert_eq!(out["step_name"], "notify");
        assert_eq!(out["echo"]["channel"], "ops");
    }

    #[tokio::test]
    async fn forced_error_surfaces_requested_kind() {
        let err = RunCustomStep
            .execute(&ctx(), json!({"step_name": "flaky", "payload": {"force_error": "unavailable"}}))
            .await
            .unwrap_err();
        assert_eq!(err.kind, "unavailable");
        assert!(err.retryable);
    }
}
