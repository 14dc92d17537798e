//! Cache & Event Bus: a short-TTL hot cache in front of `DurableStore`
//! reads, plus a per-project pub/sub channel for workflow lifecycle events.

mod bus;
mod cache;

pub use bus::{EventBus, WorkflowEventMessage};
pub use cache::WorkflowCache;
