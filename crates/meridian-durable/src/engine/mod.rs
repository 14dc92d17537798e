mod activity_registry;
mod executor;
mod registry;

pub use activity_registry::{ActivityRegistry, ActivityRegistryError};
pub use executor::{activity_statuses, pending_activities, ActivityStatus, ExecutorConfig, ExecutorError, PendingActivity, StepOutcome, WorkflowExecutor};
pub use registry::{AnyWorkflow, RegistryError, WorkflowFactory, WorkflowRegistry, WorkflowWrapper};
