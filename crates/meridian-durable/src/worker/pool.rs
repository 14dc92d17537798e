//! Bounded-concurrency worker pool: polls the task queue, drives claimed
//! runs through the executor (dispatching each unresolved activity through
//! the activity registry along the way), and supports graceful
//! drain-then-exit shutdown.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::activity::ActivityContext;
use crate::engine::{pending_activities, ActivityRegistry, ExecutorError, StepOutcome, WorkflowExecutor};
use crate::persistence::WorkflowEventStore;

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub queue: String,
    pub max_concurrent_tasks: usize,
    pub poll_interval: Duration,
    pub stale_claim_timeout: chrono::Duration,
    pub reclaim_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            queue: "orchestrator-task-queue".to_string(),
            max_concurrent_tasks: 32,
            poll_interval: Duration::from_millis(250),
            stale_claim_timeout: chrono::Duration::seconds(60),
            reclaim_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkerPoolError {
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    #[error(transparent)]
    Store(#[from] crate::persistence::StoreError),
}

/// Drives claimed runs to their next suspension point, executing any
/// activities the workflow scheduled along the way. Many `WorkerPool`s (one
/// per process) can share a single durable store; claims make their work
/// mutually exclusive.
pub struct WorkerPool<S: WorkflowEventStore + 'static> {
    executor: Arc<WorkflowExecutor<S>>,
    store: Arc<S>,
    activities: Arc<ActivityRegistry>,
    config: WorkerPoolConfig,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl<S: WorkflowEventStore + 'static> WorkerPool<S> {
    pub fn new(
        executor: Arc<WorkflowExecutor<S>>,
        store: Arc<S>,
        activities: Arc<ActivityRegistry>,
        config: WorkerPoolConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            executor,
            store,
            activities,
            config,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Signal the run loop to stop claiming new tasks; in-flight tasks are
    /// allowed to reach their next suspension point before `run` returns.
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown_tx.clone()
    }

    pub async fn run(&self) -> Result<(), WorkerPoolError> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_tasks));
        let mut in_flight: JoinSet<()> = JoinSet::new();
        let mut reclaim_tick = tokio::time::interval(self.config.reclaim_interval);

        loop {
            if *self.shutdown_rx.borrow() {
                break;
            }

            let mut shutdown_rx = self.shutdown_rx.clone();
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = reclaim_tick.tick() => {
                    match self.store.reclaim_stale(&self.config.queue, self.config.stale_claim_timeout).await {
                        Ok(0) => {}
                        Ok(n) => warn!(reclaimed = n, queue = %self.config.queue, "reclaimed stale task claims"),
                        Err(e) => error!(error = %e, "stale task reclamation failed"),
                    }
                }
                permit = Arc::clone(&semaphore).acquire_owned() => {
                    let permit = permit.expect("semaphore never closed");
                    match self.store.claim_next(&self.config.queue).await {
                        Ok(Some(task)) => {
                            let executor = Arc::clone(&self.executor);
                            let store = Arc::clone(&self.store);
                            let activities = Arc::clone(&self.activities);
                            in_flight.spawn(async move {
                                let _permit = permit;
                                drive_to_suspension(&executor, &store, &activities, &task.engine_workflow_id, &task.engine_run_id, &task.workflow_type).await;
                            });
                        }
                        Ok(None) => {
                            drop(permit);
                            tokio::time::sleep(self.config.poll_interval).await;
                        }
                        Err(e) => {
                            drop(permit);
                            error!(error = %e, "failed to claim next task");
                            tokio::time::sleep(self.config.poll_interval).await;
                        }
                    }
                }
            }
        }

        while in_flight.join_next().await.is_some() {}
        Ok(())
    }
}

/// Repeatedly replays and dispatches activities for one run until it either
/// reaches a terminal state or genuinely has nothing left to do (waiting on
/// a timer or signal with no unresolved activity).
async fn drive_to_suspension<S: WorkflowEventStore>(
    executor: &WorkflowExecutor<S>,
    store: &S,
    activities: &ActivityRegistry,
    engine_workflow_id: &str,
    engine_run_id: &str,
    workflow_type: &str,
) {
    loop {
        let outcome = executor.process_workflow(engine_workflow_id, engine_run_id, workflow_type).await;
        match outcome {
            Ok(StepOutcome::Suspended) => {
                let history = match store.load_history(engine_workflow_id, engine_run_id).await {
                    Ok(h) => h,
                    Err(e) => {
                        error!(workflow_id = %engine_workflow_id, run_id = %engine_run_id, error = %e, "failed to load history");
                        return;
                    }
                };
                let Some(pending) = pending_activities(&history).into_iter().next() else {
                    info!(workflow_id = %engine_workflow_id, run_id = %engine_run_id, "suspended, awaiting external event");
                    return;
                };
                let ctx = ActivityContext::new(pending.activity_id.clone(), pending.next_attempt);
                let result = activities.execute(&pending.activity_type, &ctx, pending.input.clone()).await;
                let follow_up = match result {
                    Ok(value) => {
                        executor
                            .on_activity_completed(engine_workflow_id, engine_run_id, workflow_type, &pending.activity_id, value)
                            .await
                    }
                    Err(e) => {
                        warn!(activity_id = %pending.activity_id, kind = %e.kind, "activity execution failed");
                        executor
                            .on_activity_failed(
                                engine_workflow_id,
                                engine_run_id,
                                workflow_type,
                                &pending.activity_id,
                                &e.kind,
                                &e.message,
                                pending.next_attempt,
                            )
                            .await
                    }
                };
                if let Err(e) = follow_up {
                    error!(workflow_id = %engine_workflow_id, run_id = %engine_run_id, error = %e, "failed to record activity outcome");
                    return;
                }
            }
            Ok(outcome) => {
                info!(workflow_id = %engine_workflow_id, run_id = %engine_run_id, ?outcome, "workflow reached terminal state");
                return;
            }
            Err(e) => {
                error!(workflow_id = %engine_workflow_id, run_id = %engine_run_id, error = %e, "workflow processing failed");
                return;
            }
        }
    }
}
