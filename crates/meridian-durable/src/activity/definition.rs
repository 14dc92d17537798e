//! The `Activity` trait: named units of work scheduled outside the
//! replaying workflow function.

use async_trait::async_trait;
use serde_json::Value;

use super::context::ActivityContext;

/// Error surfaced by an activity execution, carrying the taxonomy kind from
/// the specification's error handling design so the engine's retry policy
/// can decide whether to retry without inspecting message text.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ActivityError {
    pub kind: String,
    pub message: String,
    pub retryable: bool,
}

impl ActivityError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            retryable,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation", message, false)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message, false)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("conflict", message, false)
    }

    pub fn queue_full(message: impl Into<String>) -> Self {
        Self::new("queue_full", message, true)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new("timeout", message, true)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new("unavailable", message, true)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new("cancelled", message, false)
    }

    pub fn no_agent_available(message: impl Into<String>) -> Self {
        Self::new("no_agent_available", message, false)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal", message, true)
    }
}

impl std::fmt::Display for ActivityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ActivityError {}

impl From<meridian_core::CoreError> for ActivityError {
    fn from(err: meridian_core::CoreError) -> Self {
        let retryable = err.is_retryable();
        ActivityError::new(err.kind().as_str(), err.to_string(), retryable)
    }
}

/// A named, serializable unit of work executed at-most-once per attempt.
/// Implementers receive an [`ActivityContext`] for heartbeating and
/// cooperative cancellation.
#[async_trait]
pub trait Activity: Send + Sync + 'static {
    fn activity_type(&self) -> &'static str;

    async fn execute(&self, ctx: &ActivityContext, input: Value) -> Result<Value, ActivityError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::context::ActivityContext;

    struct EchoActivity;

    #[async_trait]
    impl Activity for EchoActivity {
        fn activity_type(&self) -> &'static str {
            "echo"
        }

        async fn execute(&self, _ctx: &ActivityContext, input: Value) -> Result<Value, ActivityError> {
            Ok(input)
        }
    }

    #[tokio::test]
    async fn echo_activity_returns_input() {
        let activity = EchoActivity;
        let ctx = ActivityContext::new("a1".to_string(), 1);
        let out = activity
            .execute(&ctx, serde_json::json!({"x": 1}))
            .await
            .unwrap();
        assert_eq!(out, serde_json::json!({"x": 1}));
    }

    #[test]
    fn core_error_converts_with_retryability_preserved() {
        let core_err = meridian_core::CoreError::queue_full("outbound full");
        let activity_err: ActivityError = core_err.into();
        assert_eq!(activity_err.kind, "queue_full");
        assert!(activity_err.retryable);
    }
}
