//! Activities backing the `CodeExecution` workflow shape:
//! `select_agent -> prepare_env -> execute_code -> process_results -> cleanup_env`
//! (`cleanup_env` is scheduled on every exit path by the workflow function,
//! not by this activity itself). Container build/runtime is out of scope,
//! so `execute_code` simulates execution rather than shelling out.

use async_trait::async_trait;
use meridian_durable::{Activity, ActivityContext, ActivityError};
use serde_json::{json, Value};
use uuid::Uuid;

use super::require_str;

pub struct SelectAgent;

#[async_trait]
impl Activity for SelectAgent {
    fn activity_type(&self) -> &'static str {
        "select_agent"
    }

    async fn execute(&self, _ctx: &ActivityContext, input: Value) -> Result<Value, ActivityError> {
        let required: Vec<String> = input
            .get("capabilities_required")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();
        let candidates = input
            .get("available_agents")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let best = candidates
            .iter()
            .filter_map(|c| {
                let id = c.get("id")?.as_str()?;
                let caps: Vec<&str> = c.get("capabilities")?.as_array()?.iter().filter_map(|v| v.as_str()).collect();
                let score = required.iter().filter(|r| caps.contains(&r.as_str())).count();
                Some((id, score))
            })
            .max_by_key(|(_, score)| *score);

        match best {
            Some((id, _)) => Ok(json!({ "agent_id": id })),
            None => Err(ActivityError::no_agent_available("no candidate agent satisfies any required capability")),
        }
    }
}

pub struct PrepareEnv;

#[async_trait]
impl Activity for PrepareEnv {
    fn activity_type(&self) -> &'static str {
        "prepare_env"
    }

    async fn execute(&self, ctx: &ActivityContext, input: Value) -> Result<Value, ActivityError> {
        let _agent_id = require_str(&input, "agent_id")?;
        ctx.heartbeat(None).await.map_err(|_| ActivityError::cancelled("prepare_env cancelled"))?;
        Ok(json!({ "env_id": Uuid::now_v7().to_string() }))
    }
}

pub struct ExecuteCode;

#[async_trait]
impl Activity for ExecuteCode {
    fn activity_type(&self) -> &'static str {
        "execute_code"
    }

    async fn execute(&self, ctx: &ActivityContext, input: Value) -> Result<Value, ActivityError> {
        let _env_id = require_str(&input, "env_id")?;
        let code = require_str(&input, "code")?;
        ctx.heartbeat(Some(json!({"phase": "running"})))
            .await
            .map_err(|_| ActivityError::cancelled("execute_code cancelled"))?;

        let (exit_code, stdout) = if code.contains("panic") {
            (1, "runtime panic".to_string())
        } else {
            (0, format!("executed {} bytes", code.len()))
        };

        Ok(json!({ "exit_code": exit_code, "stdout": stdout }))
    }
}

pub struct ProcessResults;

#[async_trait]
impl Activity for ProcessResults {
    fn activity_type(&self) -> &'static str {
        "process_results"
    }

    async fn execute(&self, _ctx: &ActivityContext, input: Value) -> Result<Value, ActivityError> {
        let exit_code = input.get("exit_code").and_then(|v| v.as_i64()).unwrap_or(-1);
        let status = if exit_code == 0 { "success" } else { "failure" };
        Ok(json!({
            "status": status,
            "output": input.get("stdout").cloned().unwrap_or(Value::Null),
        }))
    }
}

pub struct CleanupEnv;

#[async_trait]
impl Activity for CleanupEnv {
    fn activity_type(&self) -> &'static str {
        "cleanup_env"
    }

    async fn execute(&self, _ctx: &ActivityContext, input: Value) -> Result<Value, ActivityError> {
        let env_id = require_str(&input, "env_id")?;
        Ok(json!({ "env_id": env_id, "cleaned": true }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ActivityContext {
        ActivityContext::new("a1".into(), 1)
    }

    #[tokio::test]
    async fn select_agent_picks_highest_capability_overlap() {
        let out = SelectAgent
            .execute(
                &ctx(),
                json!({
                    "capabilities_required": ["backend", "api"],
                    "available_agents": [
                        {"id": "a1", "capabilities": ["backend"]},
                        {"id": "a2", "capabilities": ["backend", "api"]},
                    ],
                }),
            )
            .await
            .unwrap();
        assert_eq!(out["agent_id"], "a2");
    }

    #[tokio::test]
    async fn select_agent_fails_without_candidates() {
        let err = SelectAgent
            .execute(&ctx(), json!({"capabilities_required": ["backend"], "available_agents": []}))
            .await
            .unwrap_err();
        assert_eq!(err.kind, "no_agent_available");
    }

    #[tokio::test]
    async fn execute_code_reports_failure_on_panic_marker() {
        let out = ExecuteCode
            .execute(&ctx(), json!({"env_id": "e1", "code": "panic!()"}))
            .await
            .unwrap();
        assert_eq!(out["exit_code"], 1);
    }

    #[tokio::test]
    async fn process_results_maps_nonzero_exit_to_failure() {
        let out = ProcessResults
            .execute(&ctx(), json!({"exit_code": 1, "stdout": "boom"}))
            .await
            .unwrap();
        assert_eq!(out["status"], "failure");
    }

    #[tokio::test]
    async fn cleanup_env_is_idempotent_shaped() {
        let out = CleanupEnv.execute(&ctx(), json!({"env_id": "e1"})).await.unwrap();
        assert_eq!(out["cleaned"], true);
    }
}
