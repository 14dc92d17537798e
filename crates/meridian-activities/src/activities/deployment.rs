//! Activities backing the `Deployment` workflow shape:
//! `validate -> build -> test -> (optional) deploy_staging -> smoke_test ->
//! deploy_production -> health_check`, with `rollback` scheduled by the
//! workflow function on any failure after staging, or after a failed
//! health check. A step's JSON input may carry `"simulate_failure": true`
//! so tests can deterministically drive the failure/rollback path without
//! a real deploy target.

use async_trait::async_trait;
use meridian_durable::{Activity, ActivityContext, ActivityError};
use serde_json::{json, Value};
use uuid::Uuid;

use super::require_str;

fn simulate_failure(input: &Value) -> bool {
    input.get("simulate_failure").and_then(|v| v.as_bool()).unwrap_or(false)
}

pub struct Validate;

#[async_trait]
impl Activity for Validate {
    fn activity_type(&self) -> &'static str {
        "validate"
    }

    async fn execute(&self, _ctx: &ActivityContext, input: Value) -> Result<Value, ActivityError> {
        let config = input
            .get("config")
            .ok_or_else(|| ActivityError::validation("deployment config missing"))?;
        if config.get("target").is_none() {
            return Err(ActivityError::validation("deployment config missing `target`"));
        }
        Ok(json!({ "validated": true }))
    }
}

pub struct Build;

#[async_trait]
impl Activity for Build {
    fn activity_type(&self) -> &'static str {
        "build"
    }

    async fn execute(&self, ctx: &ActivityContext, input: Value) -> Result<Value, ActivityError> {
        let _source = require_str(&input, "source")?;
        ctx.heartbeat(Some(json!({"phase": "build"})))
            .await
            .map_err(|_| ActivityError::cancelled("build cancelled"))?;
        if simulate_failure(&input) {
            return Err(ActivityError::internal("build failed"));
        }
        Ok(json!({ "artifact_ref": Uuid::now_v7().to_string() }))
    }
}

pub struct Test;

#[async_trait]
impl Activity for Test {
    fn activity_type(&self) -> &'static str {
        "test"
    }

    async fn execute(&self, _ctx: &ActivityContext, input: Value) -> Result<Value, ActivityError> {
        let _artifact_ref = require_str(&input, "artifact_ref")?;
        Ok(json!({ "passed": !simulate_failure(&input) }))
    }
}

pub struct DeployStaging;

#[async_trait]
impl Activity for DeployStaging {
    fn activity_type(&self) -> &'static str {
        "deploy_staging"
    }

    async fn execute(&self, _ctx: &ActivityContext, input: Value) -> Result<Value, ActivityError> {
        let artifact_ref = require_str(&input, "artifact_ref")?;
        if simulate_failure(&input) {
            return Err(ActivityError::unavailable("staging deploy failed"));
        }
        Ok(json!({ "staging_url": format!("https://staging.internal/{artifact_ref}") }))
    }
}

pub struct SmokeTest;

#[async_trait]
impl Activity for SmokeTest {
    fn activity_type(&self) -> &'static str {
        "smoke_test"
    }

    async fn execute(&self, _ctx: &ActivityContext, input: Value) -> Result<Value, ActivityError> {
        let _staging_url = require_str(&input, "staging_url")?;
        Ok(json!({ "passed": !simulate_failure(&input) }))
    }
}

pub struct DeployProduction;

#[async_trait]
impl Activity for DeployProduction {
    fn activity_type(&self) -> &'static str {
        "deploy_production"
    }

    async fn execute(&self, _ctx: &ActivityContext, input: Value) -> Result<Value, ActivityError> {
        let artifact_ref = require_str(&input, "artifact_ref")?;
        if simulate_failure(&input) {
            return Err(ActivityError::unavailable("production deploy failed"));
        }
        Ok(json!({ "production_url": format!("https://prod.internal/{artifact_ref}") }))
    }
}

pub struct HealthCheck;

#[async_trait]
impl Activity for HealthCheck {
    fn activity_type(&self) -> &'static str {
        "health_check"
    }

    async fn execute(&self, _ctx: &ActivityContext, input: Value) -> Result<Value, ActivityError> {
        let _production_url = require_str(&input, "production_url")?;
        Ok(json!({ "healthy": !simulate_failure(&input) }))
    }
}

pub struct Rollback;

#[async_trait]
impl Activity for Rollback {
    fn activity_type(&self) -> &'static str {
        "rollback"
    }

    async fn execute(&self, _ctx: &ActivityContext, input: Value) -> Result<Value, ActivityError> {
        let reason = require_str(&input, "reason")?;
        Ok(json!({ "rolled_back": true, "reason": reason }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ActivityContext {
        ActivityContext::new("a1".into(), 1)
    }

    #[tokio::test]
    async fn validate_rejects_missing_target() {
        let err = Validate.execute(&ctx(), json!({"config": {}})).await.unwrap_err();
        assert_eq!(err.kind, "validation");
    }

    #[tokio::test]
    async fn build_failure_is_not_retryable_by_default_kind() {
        let err = Build
            .execute(&ctx(), json!({"source": "repo@main", "simulate_failure": true}))
            .await
            .unwrap_err();
        assert_eq!(err.kind, "internal");
    }

    #[tokio::test]
    async fn health_check_reports_unhealthy_on_simulated_failure() {
        let out = HealthCheck
            .execute(&ctx(), json!({"production_url": "https://x", "simulate_failure": true}))
            .await
            .unwrap();
        assert_eq!(out["healthy"], false);
    }

    #[tokio::test]
    async fn rollback_echoes_reason() {
        let out = Rollback.execute(&ctx(), json!({"reason": "health check failed"})).await.unwrap();
        assert_eq!(out["reason"], "health check failed");
    }
}
