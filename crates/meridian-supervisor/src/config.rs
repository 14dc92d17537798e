//! Runtime configuration: environment variables with typed defaults,
//! following the `ExecutorConfig`/`WorkerPoolConfig` pattern (a struct of
//! tunables with a `Default` impl) rather than the teacher's
//! `TelemetryConfig::from_env`/`RunnerConfig::from_env` free functions,
//! since this workspace has no single canonical config type to extend.

use meridian_agent_loop::MetaAgentConfig;
use meridian_durable::engine::ExecutorConfig;
use meridian_durable::reliability::RetryPolicy;
use meridian_durable::worker::WorkerPoolConfig;
use meridian_reconciler::ReconcilerConfig;
use meridian_registry::TransportConfig;
use std::time::Duration;

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Top-level process configuration, assembled from environment variables
/// (with a local `.env` loaded first via `dotenvy`, matching the teacher's
/// `control-plane`/`worker` binaries) and threaded into every wired
/// component's own config struct.
#[derive(Debug, Clone)]
pub struct Config {
    pub task_queue: String,
    pub reconcile_interval: Duration,
    pub heartbeat_period: Duration,
    pub retry_policy: RetryPolicy,
    pub transport: TransportConfig,
    pub meta_agent: MetaAgentConfig,
}

impl Config {
    /// Reads `MERIDIAN_*` environment variables, falling back to the
    /// documented default for anything unset or unparseable.
    pub fn from_env() -> Self {
        let task_queue = std::env::var("MERIDIAN_TASK_QUEUE").unwrap_or_else(|_| "orchestrator-task-queue".to_string());
        let reconcile_interval = Duration::from_secs(env_or("MERIDIAN_RECONCILE_INTERVAL_SECS", 5));
        let heartbeat_period = Duration::from_secs(env_or("MERIDIAN_HEARTBEAT_PERIOD_SECS", 30));

        let retry_policy = RetryPolicy::exponential()
            .with_max_attempts(env_or("MERIDIAN_RETRY_MAX_ATTEMPTS", 3))
            .with_initial_interval(Duration::from_millis(env_or("MERIDIAN_RETRY_INITIAL_INTERVAL_MS", 1_000)))
            .with_max_interval(Duration::from_millis(env_or("MERIDIAN_RETRY_MAX_INTERVAL_MS", 60_000)));

        let transport = TransportConfig {
            outbound_capacity: env_or("MERIDIAN_TRANSPORT_OUTBOUND_CAPACITY", 100),
            ..TransportConfig::default()
        };

        let meta_agent = MetaAgentConfig {
            error_rate_threshold: env_or("MERIDIAN_ERROR_RATE_THRESHOLD", 0.2),
            avg_duration_multiplier: env_or("MERIDIAN_AVG_DURATION_MULTIPLIER", 2.0),
            evaluation_cadence: env_or("MERIDIAN_EVALUATION_CADENCE", 50),
            default_ttl_ms: env_or("MERIDIAN_DEFAULT_TTL_MS", meridian_core::TTL_DEFAULT_MS),
            ttl_sweep_interval: Duration::from_secs(env_or("MERIDIAN_TTL_SWEEP_INTERVAL_SECS", 60)),
        };

        Self { task_queue, reconcile_interval, heartbeat_period, retry_policy, transport, meta_agent }
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig { task_queue: self.task_queue.clone(), default_retry_policy: self.retry_policy.clone(), ..ExecutorConfig::default() }
    }

    pub fn worker_pool_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig { queue: self.task_queue.clone(), ..WorkerPoolConfig::default() }
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig { reconcile_interval: self.reconcile_interval }
    }
}
