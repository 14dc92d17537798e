//! TTL Reaper: periodically sweeps dynamic agents whose `spawned_at +
//! ttl_ms` has elapsed. Sweeps are driven entirely from persisted state
//! (`Agent::is_expired`), never an in-process timer, so a crash and
//! restart never lets an expired agent keep running — the next sweep after
//! restart reaps it exactly as it would have before the crash.

use meridian_durable::DurableStore;
use meridian_registry::{AgentRegistry, AgentTransport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct TtlReaperConfig {
    pub sweep_interval: Duration,
}

impl Default for TtlReaperConfig {
    fn default() -> Self {
        Self { sweep_interval: Duration::from_secs(60) }
    }
}

pub struct TtlReaper {
    registry: Arc<AgentRegistry>,
    store: Arc<dyn DurableStore>,
    transport: Arc<AgentTransport>,
    config: TtlReaperConfig,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl TtlReaper {
    pub fn new(registry: Arc<AgentRegistry>, store: Arc<dyn DurableStore>, transport: Arc<AgentTransport>, config: TtlReaperConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self { registry, store, transport, config, shutdown_tx, shutdown_rx }
    }

    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown_tx.clone()
    }

    pub async fn run(&self) {
        let mut tick = tokio::time::interval(self.config.sweep_interval);
        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = tick.tick() => {
                    self.sweep_once().await;
                }
            }
        }
    }

    /// One sweep pass, exposed separately so tests and the reconciler's
    /// on-demand path don't need to wait on the interval.
    pub async fn sweep_once(&self) {
        let expired = self.registry.sweep_expired(chrono::Utc::now());
        for agent_id in expired {
            self.transport.disconnect(agent_id);
            match self.store.delete_agent(agent_id).await {
                Ok(()) => info!(agent_id = %agent_id, "reaped expired dynamic agent"),
                Err(e) => error!(agent_id = %agent_id, error = %e, "failed to delete expired agent row"),
            }
        }
    }

    /// Rebuild the in-memory registry's view of TTL-bearing agents from the
    /// durable store, reaping any that already expired while this process
    /// was down. Callers run this once at startup before serving traffic.
    pub async fn reconcile_on_startup(&self) {
        let filter = meridian_durable::persistence::AgentFilter::default();
        let agents = match self.store.list_agents(filter).await {
            Ok(agents) => agents,
            Err(e) => {
                error!(error = %e, "failed to list agents for TTL reconciliation");
                return;
            }
        };
        let now = chrono::Utc::now();
        for agent in agents {
            if agent.is_expired(now) {
                warn!(agent_id = %agent.id, "agent expired while process was down, reaping");
                self.transport.disconnect(agent.id);
                let _ = self.store.delete_agent(agent.id).await;
            } else if self.registry.get(agent.id).is_none() {
                let _ = self.registry.register(agent);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::{Agent, TTL_MIN_MS};
    use meridian_durable::persistence::InMemoryDurableStore;

    #[tokio::test]
    async fn sweep_once_reaps_expired_dynamic_agents() {
        let registry = Arc::new(AgentRegistry::new());
        let store = Arc::new(InMemoryDurableStore::new());
        let transport = Arc::new(AgentTransport::new(Default::default()));

        let spawned_at = chrono::Utc::now() - chrono::Duration::milliseconds(TTL_MIN_MS + 5_000);
        let agent = Agent::new_dynamic("ephemeral", ["api".to_string()], uuid::Uuid::now_v7(), TTL_MIN_MS, spawned_at);
        let agent_id = agent.id;
        store.upsert_agent(agent.clone()).await.unwrap();
        registry.register(agent).unwrap();

        let reaper = TtlReaper::new(registry.clone(), store.clone(), transport, TtlReaperConfig::default());
        reaper.sweep_once().await;

        assert!(registry.get(agent_id).is_none());
        assert!(store.get_agent(agent_id).await.is_err());
    }

    #[tokio::test]
    async fn reconcile_on_startup_reaps_agents_expired_while_down() {
        let registry = Arc::new(AgentRegistry::new());
        let store = Arc::new(InMemoryDurableStore::new());
        let transport = Arc::new(AgentTransport::new(Default::default()));

        let spawned_at = chrono::Utc::now() - chrono::Duration::milliseconds(TTL_MIN_MS + 5_000);
        let agent = Agent::new_dynamic("ephemeral", ["api".to_string()], uuid::Uuid::now_v7(), TTL_MIN_MS, spawned_at);
        let agent_id = agent.id;
        store.upsert_agent(agent).await.unwrap();

        let reaper = TtlReaper::new(registry.clone(), store.clone(), transport, TtlReaperConfig::default());
        reaper.reconcile_on_startup().await;

        assert!(registry.get(agent_id).is_none());
        assert!(store.get_agent(agent_id).await.is_err());
    }
}
