//! Agent Transport: a bidirectional channel per connected agent. Outbound
//! messages (dispatched tasks, pings) queue on a bounded `mpsc` sender that
//! rejects once full rather than growing unbounded; inbound messages
//! (results, pongs, heartbeats) arrive on a receiver the caller drains.

use dashmap::DashMap;
use meridian_core::{CoreError, ErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    DispatchTask { task_id: Uuid, payload: Value },
    Ping,
    Cancel { task_id: Uuid },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    TaskResult { task_id: Uuid, result: Value },
    TaskFailed { task_id: Uuid, kind: String, message: String },
    Pong,
    Heartbeat,
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub outbound_capacity: usize,
    pub reconnect_base: Duration,
    pub reconnect_cap: Duration,
    pub pong_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: 100,
            reconnect_base: Duration::from_secs(5),
            reconnect_cap: Duration::from_secs(300),
            pong_timeout: Duration::from_secs(10),
        }
    }
}

struct Connection {
    outbound_tx: mpsc::Sender<OutboundMessage>,
    inbound_rx: tokio::sync::Mutex<mpsc::Receiver<InboundMessage>>,
}

/// Owns one bidirectional channel pair per connected agent. Dispatch calls
/// `send` to enqueue work; a driver task per agent (owned by the caller,
/// typically the reconciler or meta-agent loop) drains `inbound_rx` via
/// `recv`.
pub struct AgentTransport {
    config: TransportConfig,
    connections: DashMap<Uuid, Connection>,
}

impl AgentTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            connections: DashMap::new(),
        }
    }

    /// Establish (or replace) the channel pair for an agent, returning the
    /// inbound sender half the agent's own connection handler should use to
    /// push results back in.
    pub fn connect(&self, agent_id: Uuid) -> (mpsc::Receiver<OutboundMessage>, mpsc::Sender<InboundMessage>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.outbound_capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel(self.config.outbound_capacity);
        self.connections.insert(
            agent_id,
            Connection {
                outbound_tx,
                inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            },
        );
        info!(agent_id = %agent_id, "agent transport connected");
        (outbound_rx, inbound_tx)
    }

    pub fn disconnect(&self, agent_id: Uuid) {
        self.connections.remove(&agent_id);
        info!(agent_id = %agent_id, "agent transport disconnected");
    }

    pub fn is_connected(&self, agent_id: Uuid) -> bool {
        self.connections.contains_key(&agent_id)
    }

    /// Enqueue an outbound message. Returns `queue_full` immediately rather
    /// than waiting for capacity — callers fall back to another agent or
    /// surface dispatch failure, they never block on a stalled connection.
    pub async fn send(&self, agent_id: Uuid, message: OutboundMessage) -> Result<(), CoreError> {
        let conn = self
            .connections
            .get(&agent_id)
            .ok_or_else(|| CoreError::not_found(format!("no transport connection for agent {agent_id}")))?;
        conn.outbound_tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => CoreError::queue_full(format!("outbound queue full for agent {agent_id}")),
            mpsc::error::TrySendError::Closed(_) => CoreError::unavailable(format!("agent {agent_id} disconnected")),
        })
    }

    /// Wait for the next inbound message from this agent, bounded by the
    /// configured pong timeout on read. A timeout surfaces as `unavailable`
    /// so the caller can treat the connection as dead and reconnect.
    pub async fn recv(&self, agent_id: Uuid) -> Result<InboundMessage, CoreError> {
        let conn = self
            .connections
            .get(&agent_id)
            .ok_or_else(|| CoreError::not_found(format!("no transport connection for agent {agent_id}")))?;
        let mut rx = conn.inbound_rx.lock().await;
        match tokio::time::timeout(self.config.pong_timeout, rx.recv()).await {
            Ok(Some(message)) => Ok(message),
            Ok(None) => Err(CoreError::unavailable(format!("agent {agent_id} channel closed"))),
            Err(_) => {
                warn!(agent_id = %agent_id, "no inbound message within pong timeout");
                Err(CoreError::timeout(format!("agent {agent_id} did not respond")))
            }
        }
    }

    /// Next reconnect backoff delay, exponential with a hard cap.
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let base = self.config.reconnect_base.as_secs_f64();
        let scaled = base * 2f64.powi(attempt.saturating_sub(1) as i32);
        Duration::from_secs_f64(scaled.min(self.config.reconnect_cap.as_secs_f64()))
    }

    pub fn error_kind_for(&self, error: &CoreError) -> ErrorKind {
        error.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_without_connection_is_not_found() {
        let transport = AgentTransport::new(TransportConfig::default());
        let err = transport.send(Uuid::now_v7(), OutboundMessage::Ping).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn connect_then_send_delivers_to_outbound_receiver() {
        let transport = AgentTransport::new(TransportConfig::default());
        let agent_id = Uuid::now_v7();
        let (mut outbound_rx, _inbound_tx) = transport.connect(agent_id);
        transport.send(agent_id, OutboundMessage::Ping).await.unwrap();
        let received = outbound_rx.recv().await.unwrap();
        assert!(matches!(received, OutboundMessage::Ping));
    }

    #[tokio::test]
    async fn outbound_queue_full_is_reported() {
        let transport = AgentTransport::new(TransportConfig {
            outbound_capacity: 1,
            ..Default::default()
        });
        let agent_id = Uuid::now_v7();
        let (_rx, _tx) = transport.connect(agent_id);
        transport.send(agent_id, OutboundMessage::Ping).await.unwrap();
        let err = transport.send(agent_id, OutboundMessage::Ping).await;
        assert!(matches!(err, Err(CoreError::QueueFull(_))));
    }

    #[tokio::test]
    async fn inbound_recv_delivers_pushed_message() {
        let transport = AgentTransport::new(TransportConfig::default());
        let agent_id = Uuid::now_v7();
        let (_outbound_rx, inbound_tx) = transport.connect(agent_id);
        inbound_tx.send(InboundMessage::Pong).await.unwrap();
        let received = transport.recv(agent_id).await.unwrap();
        assert!(matches!(received, InboundMessage::Pong));
    }

    #[test]
    fn reconnect_delay_grows_then_caps() {
        let transport = AgentTransport::new(TransportConfig {
            reconnect_base: Duration::from_secs(1),
            reconnect_cap: Duration::from_secs(4),
            ..Default::default()
        });
        assert_eq!(transport.reconnect_delay(1), Duration::from_secs(1));
        assert_eq!(transport.reconnect_delay(2), Duration::from_secs(2));
        assert_eq!(transport.reconnect_delay(3), Duration::from_secs(4));
        assert_eq!(transport.reconnect_delay(4), Duration::from_secs(4));
    }

    #[test]
    fn disconnect_clears_connection() {
        let transport = AgentTransport::new(TransportConfig::default());
        let agent_id = Uuid::now_v7();
        transport.connect(agent_id);
        assert!(transport.is_connected(agent_id));
        transport.disconnect(agent_id);
        assert!(!transport.is_connected(agent_id));
    }
}
