mod agent;
mod artifact;
mod task;
mod workflow;

pub use agent::{
    clamp_ttl_ms, Agent, AgentDesign, AgentKind, AgentStatus, BehaviorParams, ErrorPolicy,
    TTL_DEFAULT_MS, TTL_MAX_MS, TTL_MIN_MS,
};
pub use artifact::{Artifact, PerformanceRecord};
pub use task::{Task, TaskComplexity};
pub use workflow::{Priority, Workflow, WorkflowError, WorkflowStatus, WorkflowStep, WorkflowType};
