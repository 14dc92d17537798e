//! `Workflow` implementations for the workflow function shapes that are not
//! meta-agent driven. `TaskExecution` lives in `meridian-agent-loop`.

pub mod code_analysis;
pub mod code_execution;
pub mod code_review;
pub mod custom;
pub mod deployment;
pub mod intent_processing;

pub use code_analysis::CodeAnalysisWorkflow;
pub use code_execution::CodeExecutionWorkflow;
pub use code_review::CodeReviewWorkflow;
pub use custom::CustomWorkflow;
pub use deployment::DeploymentWorkflow;
pub use intent_processing::IntentProcessingWorkflow;

/// Register every workflow this crate provides into a [`meridian_durable::engine::WorkflowRegistry`].
pub fn register_all(registry: &mut meridian_durable::engine::WorkflowRegistry) -> Result<(), meridian_durable::engine::RegistryError> {
    registry.register("intent", || IntentProcessingWorkflow)?;
    registry.register("execution", || CodeExecutionWorkflow)?;
    registry.register("analysis", || CodeAnalysisWorkflow)?;
    registry.register("review", || CodeReviewWorkflow)?;
    registry.register("deployment", || DeploymentWorkflow)?;
    registry.register("custom", || CustomWorkflow)?;
    Ok(())
}
