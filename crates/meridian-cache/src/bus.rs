//! Event bus: a per-project broadcast channel carrying workflow lifecycle
//! events, so watchers (CLI `status --follow`, the reconciler, future
//! streaming surfaces) can subscribe without polling the store.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEventMessage {
    pub workflow_id: Uuid,
    pub event: String,
    pub payload: Value,
}

fn channel_name(project_id: &str) -> String {
    format!("workflow:events:{project_id}")
}

/// One broadcast channel per project id, created lazily on first publish or
/// subscribe. Slow subscribers that fall behind the channel's buffer see a
/// `Lagged` error on their next `recv` rather than stalling publishers.
pub struct EventBus {
    capacity: usize,
    channels: DashMap<String, broadcast::Sender<WorkflowEventMessage>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            channels: DashMap::new(),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(256)
    }

    pub fn subscribe(&self, project_id: &str) -> broadcast::Receiver<WorkflowEventMessage> {
        self.channels
            .entry(channel_name(project_id))
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Publish an event. No-op (but not an error) if nobody is subscribed:
    /// the bus is a best-effort notification layer, not a durable log —
    /// callers needing replay should read workflow history instead.
    pub fn publish(&self, project_id: &str, message: WorkflowEventMessage) {
        let channel = channel_name(project_id);
        let sender = self
            .channels
            .entry(channel.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        if sender.send(message).is_err() {
            debug!(channel = %channel, "published with no subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::with_default_capacity();
        let mut rx = bus.subscribe("proj-1");
        bus.publish(
            "proj-1",
            WorkflowEventMessage {
                workflow_id: Uuid::now_v7(),
                event: "workflow_completed".to_string(),
                payload: serde_json::json!({}),
            },
        );
        let received = rx.recv().await.unwrap();
        assert_eq!(received.event, "workflow_completed");
    }

    #[tokio::test]
    async fn channels_are_isolated_per_project() {
        let bus = EventBus::with_default_capacity();
        let mut rx_a = bus.subscribe("proj-a");
        let _rx_b = bus.subscribe("proj-b");
        bus.publish(
            "proj-b",
            WorkflowEventMessage {
                workflow_id: Uuid::now_v7(),
                event: "workflow_started".to_string(),
                payload: serde_json::json!({}),
            },
        );
        assert!(rx_a.try_recv().is_err());
    }

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::with_default_capacity();
        bus.publish(
            "proj-1",
            WorkflowEventMessage {
                workflow_id: Uuid::now_v7(),
                event: "workflow_started".to_string(),
                payload: serde_json::json!({}),
            },
        );
    }
}
