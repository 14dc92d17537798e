//! Activities backing the `IntentProcessing` workflow shape:
//! `analyze_intent -> create_plan -> execute_plan_steps -> aggregate`.
//! Natural-language intent parsing proper is out of scope; these implement
//! the orchestration contract (structured input/output, deterministic
//! behavior) over a simple keyword heuristic rather than an LLM call.

use async_trait::async_trait;
use meridian_durable::{Activity, ActivityContext, ActivityError};
use serde_json::{json, Value};

use super::require_str;

const KNOWN_INTENT_TYPES: &[(&str, &[&str])] = &[
    ("code_generation", &["generate", "write", "create", "implement"]),
    ("bug_fix", &["fix", "bug", "broken", "error"]),
    ("refactor", &["refactor", "clean up", "restructure"]),
    ("analysis", &["analyze", "review", "audit", "inspect"]),
];

pub struct AnalyzeIntent;

#[async_trait]
impl Activity for AnalyzeIntent {
    fn activity_type(&self) -> &'static str {
        "analyze_intent"
    }

    async fn execute(&self, _ctx: &ActivityContext, input: Value) -> Result<Value, ActivityError> {
        let text = require_str(&input, "intent")?.to_lowercase();

        let intent_type = KNOWN_INTENT_TYPES
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| text.contains(k)))
            .map(|(name, _)| *name)
            .unwrap_or("general");

        let entities: Vec<&str> = text.split_whitespace().filter(|w| w.len() > 6).collect();
        let confidence = if intent_type == "general" { 0.4 } else { 0.85 };

        Ok(json!({
            "intent_type": intent_type,
            "entities": entities,
            "confidence": confidence,
        }))
    }
}

pub struct CreatePlan;

#[async_trait]
impl Activity for CreatePlan {
    fn activity_type(&self) -> &'static str {
        "create_plan"
    }

    async fn execute(&self, _ctx: &ActivityContext, input: Value) -> Result<Value, ActivityError> {
        let intent_type = require_str(&input, "intent_type")?;

        let step_types: &[&str] = match intent_type {
            "code_generation" => &["design", "implement", "test"],
            "bug_fix" => &["reproduce", "diagnose", "patch", "verify"],
            "refactor" => &["survey", "transform", "verify"],
            "analysis" => &["collect", "evaluate", "report"],
            _ => &["investigate", "respond"],
        };

        let steps: Vec<Value> = step_types
            .iter()
            .enumerate()
            .map(|(i, step_type)| {
                json!({
                    "step_id": format!("plan-step-{i}"),
                    "task_type": step_type,
                    "description": format!("{step_type} for {intent_type}"),
                })
            })
            .collect();

        Ok(json!({ "steps": steps }))
    }
}

pub struct Aggregate;

#[async_trait]
impl Activity for Aggregate {
    fn activity_type(&self) -> &'static str {
        "aggregate"
    }

    async fn execute(&self, _ctx: &ActivityContext, input: Value) -> Result<Value, ActivityError> {
        let results = input
            .get("step_results")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let success_count = results
            .iter()
            .filter(|r| r.get("status").and_then(|s| s.as_str()) == Some("completed"))
            .count();
        let failure_count = results.len() - success_count;

        Ok(json!({
            "summary": format!("{success_count}/{} plan steps completed", results.len()),
            "success_count": success_count,
            "failure_count": failure_count,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ActivityContext {
        ActivityContext::new("a1".into(), 1)
    }

    #[tokio::test]
    async fn analyze_intent_classifies_bug_fix() {
        let out = AnalyzeIntent
            .execute(&ctx(), json!({"intent": "please fix the broken login flow"}))
            .await
            .unwrap();
        assert_eq!(out["intent_type"], "bug_fix");
    }

    #[tokio::test]
    async fn analyze_intent_rejects_missing_field() {
        let err = AnalyzeIntent.execute(&ctx(), json!({})).await.unwrap_err();
        assert_eq!(err.kind, "validation");
    }

    #[tokio::test]
    async fn create_plan_produces_steps_for_known_intent() {
        let out = CreatePlan
            .execute(&ctx(), json!({"intent_type": "bug_fix"}))
            .await
            .unwrap();
        assert_eq!(out["steps"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn aggregate_counts_successes_and_failures() {
        let out = Aggregate
            .execute(
                &ctx(),
                json!({"step_results": [{"status": "completed"}, {"status": "failed"}]}),
            )
            .await
            .unwrap();
        assert_eq!(out["success_count"], 1);
        assert_eq!(out["failure_count"], 1);
    }
}
