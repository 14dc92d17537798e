mod domain;
mod memory;
#[cfg(feature = "postgres")]
mod postgres;
mod store;

pub use domain::{AgentFilter, DurableStore, Page, SortOrder, WorkflowFilter};
pub use memory::{InMemoryDurableStore, InMemoryEventStore};
#[cfg(feature = "postgres")]
pub use postgres::{PostgresDurableStore, PostgresEventStore};
pub use store::{ClaimedTask, StoreError, TaskDefinition, WorkflowEventStore, WorkflowRunStatus};
