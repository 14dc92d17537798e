//! Durable workflow execution engine.
//!
//! ```text
//!        +----------------+     decide()     +-----------------+
//!        |  WorkflowEvent | <--------------- |  Workflow impl  |
//!        |     history    |  WorkflowAction  | (user-supplied) |
//!        +----------------+ ---------------> +-----------------+
//!                 ^                                   ^
//!                 | append/load                       | create()
//!        +----------------+                  +-----------------+
//!        | WorkflowEventStore |               | WorkflowRegistry |
//!        +----------------+                  +-----------------+
//!                 ^
//!                 | claim_next / enqueue
//!        +----------------+
//!        |   WorkerPool   |
//!        +----------------+
//! ```
//!
//! [`WorkflowExecutor`] is the only piece that understands how to turn a
//! [`WorkflowAction`] into store writes; everything above it (workflow
//! authors) and below it (storage backends) is pluggable behind the
//! [`Workflow`]/[`Activity`] and [`WorkflowEventStore`]/[`DurableStore`]
//! traits respectively.

pub mod activity;
pub mod engine;
pub mod persistence;
pub mod reliability;
pub mod worker;
pub mod workflow;

pub use activity::{Activity, ActivityContext, ActivityError, CancellationHandle, HeartbeatError, HeartbeatPayload};
pub use engine::{ExecutorConfig, ExecutorError, StepOutcome, WorkflowExecutor, WorkflowRegistry};
pub use persistence::{DurableStore, StoreError, WorkflowEventStore};
pub use reliability::{CircuitBreaker, CircuitBreakerConfig, CircuitState, RetryPolicy};
pub use worker::{Backpressure, BackpressureConfig, WorkerPool, WorkerPoolConfig};
pub use workflow::{ActivityOptions, Workflow, WorkflowAction, WorkflowError, WorkflowEvent, WorkflowSignal};

pub mod prelude {
    pub use crate::activity::{Activity, ActivityContext, ActivityError};
    pub use crate::engine::{ExecutorConfig, StepOutcome, WorkflowExecutor, WorkflowRegistry};
    pub use crate::persistence::{DurableStore, WorkflowEventStore};
    pub use crate::reliability::RetryPolicy;
    pub use crate::workflow::{ActivityOptions, Workflow, WorkflowAction, WorkflowError, WorkflowEvent, WorkflowSignal};
}
