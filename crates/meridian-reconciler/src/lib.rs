//! Status Reconciler (C8): a periodic background pass that closes any
//! divergence between the durable store's view of a workflow and the
//! engine's own authoritative run status (spec §4.6). The reconciler is a
//! safety net, not the primary writer — `WorkflowExecutor` updates the
//! store directly on every transition; this loop only catches cases where
//! that write was lost (crash between engine commit and store write,
//! missed event, etc).

use chrono::Utc;
use meridian_cache::{EventBus, WorkflowCache, WorkflowEventMessage};
use meridian_core::{Workflow, WorkflowStatus};
use meridian_durable::persistence::{DurableStore, Page, WorkflowFilter};
use meridian_durable::{WorkflowEvent, WorkflowEventStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub reconcile_interval: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self { reconcile_interval: Duration::from_secs(5) }
    }
}

pub struct StatusReconciler {
    store: Arc<dyn DurableStore>,
    event_store: Arc<dyn WorkflowEventStore>,
    cache: Arc<WorkflowCache>,
    bus: Arc<EventBus>,
    config: ReconcilerConfig,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

fn engine_status_to_workflow_status(status: meridian_durable::persistence::WorkflowRunStatus) -> WorkflowStatus {
    use meridian_durable::persistence::WorkflowRunStatus as Engine;
    match status {
        Engine::Pending => WorkflowStatus::Pending,
        Engine::Running => WorkflowStatus::Running,
        Engine::Completed => WorkflowStatus::Completed,
        Engine::Failed => WorkflowStatus::Failed,
        Engine::Cancelled => WorkflowStatus::Cancelled,
        Engine::Terminated => WorkflowStatus::Terminated,
        Engine::TimedOut => WorkflowStatus::TimedOut,
    }
}

impl StatusReconciler {
    pub fn new(
        store: Arc<dyn DurableStore>,
        event_store: Arc<dyn WorkflowEventStore>,
        cache: Arc<WorkflowCache>,
        bus: Arc<EventBus>,
        config: ReconcilerConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self { store, event_store, cache, bus, config, shutdown_tx, shutdown_rx }
    }

    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown_tx.clone()
    }

    pub async fn run(&self) {
        let mut tick = tokio::time::interval(self.config.reconcile_interval);
        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = tick.tick() => {
                    self.reconcile_once().await;
                }
            }
        }
    }

    /// One reconcile pass. Returns the number of workflows corrected, so
    /// callers and tests can assert on convergence without timing a loop.
    pub async fn reconcile_once(&self) -> usize {
        let mut in_flight = Vec::new();
        for status in [WorkflowStatus::Pending, WorkflowStatus::Running] {
            let filter = WorkflowFilter { status: Some(status), ..Default::default() };
            match self.store.list_workflows(filter, Page::default()).await {
                Ok(workflows) => in_flight.extend(workflows),
                Err(e) => {
                    error!(error = %e, ?status, "failed to list in-flight workflows for reconciliation");
                }
            }
        }

        let mut corrected = 0;
        for workflow in in_flight {
            match self.reconcile_one(&workflow).await {
                Ok(true) => corrected += 1,
                Ok(false) => {}
                Err(e) => error!(workflow_id = %workflow.id, error = %e, "reconciliation failed for workflow"),
            }
        }
        corrected
    }

    async fn reconcile_one(&self, workflow: &Workflow) -> Result<bool, meridian_durable::persistence::StoreError> {
        let (Some(engine_workflow_id), Some(engine_run_id)) = (&workflow.engine_workflow_id, &workflow.engine_run_id) else {
            return Ok(false);
        };

        let engine_status = match self.event_store.get_status(engine_workflow_id, engine_run_id).await {
            Ok(status) => engine_status_to_workflow_status(status),
            Err(e) => {
                warn!(workflow_id = %workflow.id, error = %e, "engine has no run status for this workflow yet");
                return Ok(false);
            }
        };

        if engine_status == workflow.status {
            return Ok(false);
        }
        if !workflow.status.can_transition_to(engine_status) {
            warn!(workflow_id = %workflow.id, from = ?workflow.status, to = ?engine_status, "engine-reported status is not a legal transition, skipping");
            return Ok(false);
        }

        let (output, error) = if engine_status.is_terminal() {
            self.terminal_outcome(engine_workflow_id, engine_run_id).await
        } else {
            (None, None)
        };

        let updated = self.store.update_workflow_status(workflow.id, engine_status, output, error).await?;

        self.cache.invalidate(updated.id);
        if let Some(project_id) = &updated.project_id {
            self.bus.publish(
                project_id,
                WorkflowEventMessage {
                    workflow_id: updated.id,
                    event: format!("status_reconciled:{engine_status:?}"),
                    payload: updated.output.clone().unwrap_or(serde_json::Value::Null),
                },
            );
        }
        info!(workflow_id = %updated.id, from = ?workflow.status, to = ?engine_status, "reconciled workflow status from engine truth");
        Ok(true)
    }

    async fn terminal_outcome(
        &self,
        engine_workflow_id: &str,
        engine_run_id: &str,
    ) -> (Option<serde_json::Value>, Option<meridian_core::WorkflowError>) {
        let history = match self.event_store.load_history(engine_workflow_id, engine_run_id).await {
            Ok(history) => history,
            Err(_) => return (None, None),
        };
        for event in history.into_iter().rev() {
            match event {
                WorkflowEvent::WorkflowCompleted { result, .. } => return (Some(result), None),
                WorkflowEvent::WorkflowFailed { kind, message, .. } => {
                    return (None, Some(meridian_core::WorkflowError { kind, message }))
                }
                WorkflowEvent::WorkflowCancelled { reason, .. } => {
                    return (None, Some(meridian_core::WorkflowError { kind: "cancelled".to_string(), message: reason }))
                }
                WorkflowEvent::WorkflowTimedOut { .. } => {
                    return (None, Some(meridian_core::WorkflowError { kind: "timeout".to_string(), message: "workflow timed out".to_string() }))
                }
                _ => continue,
            }
        }
        (None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::WorkflowType;
    use meridian_durable::persistence::{InMemoryDurableStore, InMemoryEventStore};
    use serde_json::json;

    fn now() -> chrono::DateTime<chrono::Utc> {
        Utc::now()
    }

    async fn seeded_running_workflow(
        store: &InMemoryDurableStore,
        event_store: &InMemoryEventStore,
    ) -> Workflow {
        let mut workflow = Workflow::new("t", WorkflowType::Custom, json!({}), json!({}));
        workflow.engine_workflow_id = Some(workflow.id.to_string());
        workflow.engine_run_id = Some("run-1".to_string());
        let created = store.create_workflow(workflow).await.unwrap();
        let running = store.update_workflow_status(created.id, WorkflowStatus::Running, None, None).await.unwrap();

        event_store
            .create_run(&created.id.to_string(), "run-1", "custom", json!({}))
            .await
            .unwrap();
        running
    }

    #[tokio::test]
    async fn converges_store_status_to_engine_completion() {
        let store = Arc::new(InMemoryDurableStore::new());
        let event_store = Arc::new(InMemoryEventStore::new());
        let cache = Arc::new(WorkflowCache::with_default_ttl());
        let bus = Arc::new(EventBus::with_default_capacity());

        let workflow = seeded_running_workflow(&store, &event_store).await;
        event_store
            .append_event(
                &workflow.id.to_string(),
                "run-1",
                WorkflowEvent::WorkflowCompleted { result: json!({"ok": true}), timestamp: now() },
                0,
            )
            .await
            .unwrap();
        event_store.set_status(&workflow.id.to_string(), "run-1", meridian_durable::persistence::WorkflowRunStatus::Completed).await.unwrap();

        let reconciler = StatusReconciler::new(store.clone(), event_store, cache, bus, ReconcilerConfig::default());
        let corrected = reconciler.reconcile_once().await;
        assert_eq!(corrected, 1);

        let updated = store.get_workflow(workflow.id).await.unwrap();
        assert_eq!(updated.status, WorkflowStatus::Completed);
        assert_eq!(updated.output, Some(json!({"ok": true})));
    }

    #[tokio::test]
    async fn no_divergence_is_a_no_op() {
        let store = Arc::new(InMemoryDurableStore::new());
        let event_store = Arc::new(InMemoryEventStore::new());
        let cache = Arc::new(WorkflowCache::with_default_ttl());
        let bus = Arc::new(EventBus::with_default_capacity());

        seeded_running_workflow(&store, &event_store).await;

        let reconciler = StatusReconciler::new(store, event_store, cache, bus, ReconcilerConfig::default());
        let corrected = reconciler.reconcile_once().await;
        assert_eq!(corrected, 0);
    }

    #[tokio::test]
    async fn workflow_without_engine_ids_is_skipped() {
        let store = Arc::new(InMemoryDurableStore::new());
        let event_store = Arc::new(InMemoryEventStore::new());
        let cache = Arc::new(WorkflowCache::with_default_ttl());
        let bus = Arc::new(EventBus::with_default_capacity());

        let mut workflow = Workflow::new("t", WorkflowType::Custom, json!({}), json!({}));
        workflow.status = WorkflowStatus::Pending;
        store.create_workflow(workflow).await.unwrap();

        let reconciler = StatusReconciler::new(store, event_store, cache, bus, ReconcilerConfig::default());
        assert_eq!(reconciler.reconcile_once().await, 0);
    }
}
