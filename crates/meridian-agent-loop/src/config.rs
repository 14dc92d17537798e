//! Tunables for `OptimizeAgentPerformance`, left undetermined by the
//! specification and pinned here per the recorded Open Question Decision:
//! evaluate every `evaluation_cadence` completed runs, evolve when the
//! error rate exceeds `error_rate_threshold` or the average duration
//! exceeds `avg_duration_multiplier` times the design's first-observed
//! baseline.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct MetaAgentConfig {
    pub error_rate_threshold: f64,
    pub avg_duration_multiplier: f64,
    pub evaluation_cadence: u64,
    pub default_ttl_ms: i64,
    pub ttl_sweep_interval: Duration,
}

impl Default for MetaAgentConfig {
    fn default() -> Self {
        Self {
            error_rate_threshold: 0.2,
            avg_duration_multiplier: 2.0,
            evaluation_cadence: 50,
            default_ttl_ms: meridian_core::TTL_DEFAULT_MS,
            ttl_sweep_interval: Duration::from_secs(60),
        }
    }
}
