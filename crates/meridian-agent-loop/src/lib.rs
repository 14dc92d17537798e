//! Meta-Agent Loop: finds or spawns an agent for a task, dispatches the
//! task and waits for its result, and evolves underperforming agent
//! designs. Exposed as three `Activity` impls plus the `task_execution`
//! workflow shape that sequences them (spec §4.5).

pub mod capability;
pub mod config;
pub mod design_catalog;
pub mod execute_task;
pub mod find_or_create;
pub mod optimize;
pub mod performance_store;
pub mod ttl_reaper;
pub mod workflow;

pub use config::MetaAgentConfig;
pub use execute_task::{ExecuteTaskWithAgent, TaskExecutionResult};
pub use find_or_create::FindOrCreateAgentForTask;
pub use optimize::OptimizeAgentPerformance;
pub use performance_store::PerformanceStore;
pub use ttl_reaper::{TtlReaper, TtlReaperConfig};
pub use workflow::TaskExecutionWorkflow;

use meridian_durable::engine::{ActivityRegistry, ActivityRegistryError};
use meridian_durable::engine::{RegistryError as WorkflowRegistryError, WorkflowRegistry};
use meridian_durable::DurableStore;
use meridian_registry::{AgentRegistry, AgentTransport};
use std::sync::Arc;

/// Registers the three Meta-Agent Loop activities against an
/// `ActivityRegistry`. Mirrors `meridian_activities::register_all`'s shape
/// so callers wire both crates' activities the same way.
pub fn register_activities(
    registry: &mut ActivityRegistry,
    agent_registry: Arc<AgentRegistry>,
    store: Arc<dyn DurableStore>,
    transport: Arc<AgentTransport>,
    performance: Arc<PerformanceStore>,
    config: MetaAgentConfig,
) -> Result<(), ActivityRegistryError> {
    registry.register("find_or_create_agent_for_task", FindOrCreateAgentForTask::new(agent_registry.clone(), store.clone()))?;
    registry.register("execute_task_with_agent", ExecuteTaskWithAgent::new(transport, agent_registry, performance))?;
    registry.register("optimize_agent_performance", OptimizeAgentPerformance::with_config(store, config))?;
    Ok(())
}

pub fn register_workflow(registry: &mut WorkflowRegistry) -> Result<(), WorkflowRegistryError> {
    registry.register("task_execution", || TaskExecutionWorkflow)
}
