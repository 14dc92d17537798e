//! Wraps an `Activity` with a per-activity-type circuit breaker (spec §11
//! Supplemented Feature): once an activity type has failed
//! `failure_threshold` times in a row, further dispatch is short-circuited
//! to an `unavailable` error rather than retried against a known-bad
//! dependency. Disabled by default; `App` only wraps `execute_task_with_agent`,
//! the one activity that calls out to a remote agent transport.

use async_trait::async_trait;
use meridian_durable::reliability::{CircuitBreaker, CircuitBreakerConfig};
use meridian_durable::{Activity, ActivityContext, ActivityError};
use serde_json::Value;
use std::sync::Arc;

pub struct GuardedActivity {
    inner: Arc<dyn Activity>,
    breaker: CircuitBreaker,
}

impl GuardedActivity {
    pub fn new(inner: Arc<dyn Activity>, config: CircuitBreakerConfig) -> Self {
        Self { inner, breaker: CircuitBreaker::new(config) }
    }
}

#[async_trait]
impl Activity for GuardedActivity {
    fn activity_type(&self) -> &'static str {
        self.inner.activity_type()
    }

    async fn execute(&self, ctx: &ActivityContext, input: Value) -> Result<Value, ActivityError> {
        if !self.breaker.allow_request() {
            return Err(ActivityError::unavailable(format!(
                "circuit open for activity `{}`, dependency considered down",
                self.inner.activity_type()
            )));
        }
        match self.inner.execute(ctx, input).await {
            Ok(value) => {
                self.breaker.record_success();
                Ok(value)
            }
            Err(e) => {
                self.breaker.record_failure();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysFails;

    #[async_trait]
    impl Activity for AlwaysFails {
        fn activity_type(&self) -> &'static str {
            "always_fails"
        }

        async fn execute(&self, _ctx: &ActivityContext, _input: Value) -> Result<Value, ActivityError> {
            Err(ActivityError::unavailable("nope"))
        }
    }

    #[tokio::test]
    async fn trips_open_after_repeated_failures() {
        let guarded = GuardedActivity::new(Arc::new(AlwaysFails), CircuitBreakerConfig::default().with_failure_threshold(2));
        let ctx = ActivityContext::new("a1".into(), 1);
        assert!(guarded.execute(&ctx, Value::Null).await.is_err());
        assert!(guarded.execute(&ctx, Value::Null).await.is_err());

        let err = guarded.execute(&ctx, Value::Null).await.unwrap_err();
        assert_eq!(err.kind, "unavailable");
        assert!(err.message.contains("circuit open"));
    }
}
