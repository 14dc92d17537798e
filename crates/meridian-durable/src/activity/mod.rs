mod context;
mod definition;

pub use context::{ActivityContext, CancellationHandle, HeartbeatError, HeartbeatPayload};
pub use definition::{Activity, ActivityError};
