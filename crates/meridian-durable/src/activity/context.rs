//! Per-attempt activity context: heartbeating and cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HeartbeatPayload {
    pub activity_id: String,
    pub attempt: u32,
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum HeartbeatError {
    #[error("activity was cancelled")]
    Cancelled,
    #[error("heartbeat channel closed")]
    ChannelClosed,
}

/// A cooperative cancellation flag shared between the engine and a running
/// activity. The engine flips it and the activity observes it at its own
/// pace (between heartbeats, between loop iterations) — there is no
/// preemption.
#[derive(Debug, Clone)]
pub struct CancellationHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancellationHandle {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Default for CancellationHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Context passed to every `Activity::execute` call.
pub struct ActivityContext {
    pub activity_id: String,
    pub attempt: u32,
    cancellation: CancellationHandle,
    heartbeat_tx: Option<mpsc::Sender<HeartbeatPayload>>,
}

impl ActivityContext {
    pub fn new(activity_id: String, attempt: u32) -> Self {
        Self {
            activity_id,
            attempt,
            cancellation: CancellationHandle::new(),
            heartbeat_tx: None,
        }
    }

    pub fn with_heartbeat(mut self, tx: mpsc::Sender<HeartbeatPayload>) -> Self {
        self.heartbeat_tx = Some(tx);
        self
    }

    pub fn with_cancellation(mut self, handle: CancellationHandle) -> Self {
        self.cancellation = handle;
        self
    }

    pub fn cancellation_handle(&self) -> CancellationHandle {
        self.cancellation.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Report liveness to the worker pool's loss-detection window. Returns
    /// `Err(HeartbeatError::Cancelled)` if the engine has since requested
    /// cancellation, so the activity can return promptly instead of
    /// discovering cancellation only at its next checkpoint.
    pub async fn heartbeat(&self, details: Option<serde_json::Value>) -> Result<(), HeartbeatError> {
        if self.is_cancelled() {
            return Err(HeartbeatError::Cancelled);
        }
        if let Some(tx) = &self.heartbeat_tx {
            tx.send(HeartbeatPayload {
                activity_id: self.activity_id.clone(),
                attempt: self.attempt,
                details,
            })
            .await
            .map_err(|_| HeartbeatError::ChannelClosed)?;
        }
        Ok(())
    }
}
