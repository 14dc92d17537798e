//! Environment-driven configuration, grouped the way the teacher groups
//! `ExecutorConfig`/`WorkerPoolConfig`: a plain struct of tunables with a
//! `Default` impl and an `from_env` loader.

use std::time::Duration;

fn env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Top-level runtime configuration for the orchestration core.
///
/// Every field corresponds to one of the "Environment inputs" the
/// specification calls out for this component: durable store address,
/// cache/event-bus address, task queue name, agent transport parameters,
/// reconcile interval, heartbeat period, and retry defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub durable_store_url: String,
    pub cache_bus_url: String,
    pub task_queue: String,
    pub reconcile_interval: Duration,
    pub heartbeat_period: Duration,
    pub heartbeat_miss_threshold: u32,
    pub retry: RetryDefaults,
    pub transport_outbound_capacity: usize,
    pub transport_reconnect_base: Duration,
    pub transport_reconnect_cap: Duration,
    pub transport_pong_timeout: Duration,
    pub max_concurrent_workflows: usize,
    pub max_concurrent_activities: usize,
}

#[derive(Debug, Clone)]
pub struct RetryDefaults {
    pub initial_interval: Duration,
    pub backoff_coefficient: f64,
    pub maximum_interval: Duration,
    pub maximum_attempts: u32,
}

impl Default for RetryDefaults {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            maximum_interval: Duration::from_secs(60),
            maximum_attempts: 3,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            durable_store_url: "memory://".to_string(),
            cache_bus_url: "memory://".to_string(),
            task_queue: "orchestrator-task-queue".to_string(),
            reconcile_interval: Duration::from_secs(5),
            heartbeat_period: Duration::from_secs(30),
            heartbeat_miss_threshold: 3,
            retry: RetryDefaults::default(),
            transport_outbound_capacity: 100,
            transport_reconnect_base: Duration::from_secs(5),
            transport_reconnect_cap: Duration::from_secs(300),
            transport_pong_timeout: Duration::from_secs(10),
            max_concurrent_workflows: 50,
            max_concurrent_activities: 200,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// documented defaults for anything unset. Does not read a `.env` file
    /// itself — callers load one with `dotenvy::dotenv()` first if desired.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            durable_store_url: env_string("MERIDIAN_DURABLE_STORE_URL", &defaults.durable_store_url),
            cache_bus_url: env_string("MERIDIAN_CACHE_BUS_URL", &defaults.cache_bus_url),
            task_queue: env_string("MERIDIAN_TASK_QUEUE", &defaults.task_queue),
            reconcile_interval: env_duration_secs(
                "MERIDIAN_RECONCILE_INTERVAL_SECS",
                defaults.reconcile_interval,
            ),
            heartbeat_period: env_duration_secs(
                "MERIDIAN_HEARTBEAT_PERIOD_SECS",
                defaults.heartbeat_period,
            ),
            heartbeat_miss_threshold: env_u32(
                "MERIDIAN_HEARTBEAT_MISS_THRESHOLD",
                defaults.heartbeat_miss_threshold,
            ),
            retry: RetryDefaults {
                initial_interval: env_duration_secs(
                    "MERIDIAN_RETRY_INITIAL_INTERVAL_SECS",
                    defaults.retry.initial_interval,
                ),
                backoff_coefficient: std::env::var("MERIDIAN_RETRY_BACKOFF_COEFFICIENT")
                    .ok()
                    .and_then(|v| v.parse::<f64>().ok())
                    .unwrap_or(defaults.retry.backoff_coefficient),
                maximum_interval: env_duration_secs(
                    "MERIDIAN_RETRY_MAX_INTERVAL_SECS",
                    defaults.retry.maximum_interval,
                ),
                maximum_attempts: env_u32(
                    "MERIDIAN_RETRY_MAX_ATTEMPTS",
                    defaults.retry.maximum_attempts,
                ),
            },
            transport_outbound_capacity: env_u32(
                "MERIDIAN_TRANSPORT_OUTBOUND_CAPACITY",
                defaults.transport_outbound_capacity as u32,
            ) as usize,
            transport_reconnect_base: env_duration_secs(
                "MERIDIAN_TRANSPORT_RECONNECT_BASE_SECS",
                defaults.transport_reconnect_base,
            ),
            transport_reconnect_cap: env_duration_secs(
                "MERIDIAN_TRANSPORT_RECONNECT_CAP_SECS",
                defaults.transport_reconnect_cap,
            ),
            transport_pong_timeout: env_duration_secs(
                "MERIDIAN_TRANSPORT_PONG_TIMEOUT_SECS",
                defaults.transport_pong_timeout,
            ),
            max_concurrent_workflows: env_u32(
                "MERIDIAN_MAX_CONCURRENT_WORKFLOWS",
                defaults.max_concurrent_workflows as u32,
            ) as usize,
            max_concurrent_activities: env_u32(
                "MERIDIAN_MAX_CONCURRENT_ACTIVITIES",
                defaults.max_concurrent_activities as u32,
            ) as usize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_specification() {
        let cfg = Config::default();
        assert_eq!(cfg.task_queue, "orchestrator-task-queue");
        assert_eq!(cfg.reconcile_interval, Duration::from_secs(5));
        assert_eq!(cfg.heartbeat_period, Duration::from_secs(30));
        assert_eq!(cfg.transport_outbound_capacity, 100);
        assert_eq!(cfg.retry.maximum_attempts, 3);
    }
}
