//! Wires the Durable Store, Workflow Cache, Event Bus, Agent Registry,
//! Agent Transport, Workflow Engine, Worker Pool, Meta-Agent Loop, TTL
//! Reaper, and Status Reconciler into a single running process (spec
//! §10.4). Mirrors `everruns-worker`'s main: plain component construction
//! plus `tokio::signal::ctrl_c` for graceful shutdown, with no HTTP surface.

use crate::guarded_activity::GuardedActivity;
use meridian_agent_loop::{ExecuteTaskWithAgent, FindOrCreateAgentForTask, MetaAgentConfig, OptimizeAgentPerformance, PerformanceStore, TtlReaper, TtlReaperConfig};
use meridian_core::{Workflow, WorkflowStatus, WorkflowType};
use meridian_durable::engine::{pending_activities, ActivityRegistry, StepOutcome, WorkflowExecutor, WorkflowRegistry};
use meridian_durable::{ActivityContext, WorkflowSignal};
use meridian_durable::persistence::{InMemoryDurableStore, InMemoryEventStore};
use meridian_durable::reliability::CircuitBreakerConfig;
use meridian_durable::worker::WorkerPool;
use meridian_durable::DurableStore;
use meridian_durable::WorkflowEventStore;
use meridian_registry::{AgentRegistry, AgentTransport};
use meridian_cache::{EventBus, WorkflowCache};
use meridian_reconciler::StatusReconciler;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Registry(#[from] meridian_durable::engine::RegistryError),
    #[error(transparent)]
    ActivityRegistry(#[from] meridian_durable::engine::ActivityRegistryError),
    #[error(transparent)]
    Store(#[from] meridian_durable::StoreError),
    #[error(transparent)]
    Executor(#[from] meridian_durable::engine::ExecutorError),
}

/// Maps a domain `WorkflowType` onto the string key the engine's
/// `WorkflowRegistry`/`ActivityRegistry` were registered under.
pub fn workflow_type_key(workflow_type: WorkflowType) -> &'static str {
    match workflow_type {
        WorkflowType::Intent => "intent",
        WorkflowType::Execution => "execution",
        WorkflowType::Analysis => "analysis",
        WorkflowType::Review => "review",
        WorkflowType::Deployment => "deployment",
        WorkflowType::TaskExecution => "task_execution",
        WorkflowType::Custom => "custom",
    }
}

/// The fully wired, in-process runtime. Every component shares the same
/// `Arc<InMemoryDurableStore>`/`Arc<InMemoryEventStore>` pair; swapping in
/// `PostgresDurableStore`/`PostgresEventStore` (behind the `postgres`
/// feature) needs no change outside this module.
pub struct App {
    pub store: Arc<InMemoryDurableStore>,
    pub event_store: Arc<InMemoryEventStore>,
    pub cache: Arc<WorkflowCache>,
    pub bus: Arc<EventBus>,
    pub agent_registry: Arc<AgentRegistry>,
    pub transport: Arc<AgentTransport>,
    pub executor: Arc<WorkflowExecutor<InMemoryEventStore>>,
    pub activities: Arc<ActivityRegistry>,
    pub worker_pool: Arc<WorkerPool<InMemoryEventStore>>,
    pub ttl_reaper: Arc<TtlReaper>,
    pub reconciler: Arc<StatusReconciler>,
    heartbeat_period: std::time::Duration,
    heartbeat_shutdown_tx: tokio::sync::watch::Sender<bool>,
    heartbeat_shutdown_rx: tokio::sync::watch::Receiver<bool>,
}

impl App {
    pub async fn build(config: &crate::config::Config) -> Result<Self, AppError> {
        let meta_agent_config = config.meta_agent.clone();
        let store = Arc::new(InMemoryDurableStore::new());
        let event_store = Arc::new(InMemoryEventStore::new());
        let cache = Arc::new(WorkflowCache::with_default_ttl());
        let bus = Arc::new(EventBus::with_default_capacity());
        let agent_registry = Arc::new(AgentRegistry::new());
        let transport = Arc::new(AgentTransport::new(config.transport.clone()));
        let performance = Arc::new(PerformanceStore::new(store.clone() as Arc<dyn DurableStore>));

        let mut workflow_registry = WorkflowRegistry::new();
        meridian_activities::workflows::register_all(&mut workflow_registry)?;
        meridian_agent_loop::register_workflow(&mut workflow_registry)?;

        let mut activity_registry = ActivityRegistry::new();
        meridian_activities::register_all(&mut activity_registry)?;

        // Registered by hand rather than via `meridian_agent_loop::register_activities`
        // so `execute_task_with_agent` - the one activity that calls out over the
        // agent transport - can be wrapped in a circuit breaker (spec §11).
        activity_registry.register(
            "find_or_create_agent_for_task",
            FindOrCreateAgentForTask::new(agent_registry.clone(), store.clone() as Arc<dyn DurableStore>),
        )?;
        activity_registry.register(
            "execute_task_with_agent",
            GuardedActivity::new(
                Arc::new(ExecuteTaskWithAgent::new(transport.clone(), agent_registry.clone(), performance)),
                CircuitBreakerConfig::default(),
            ),
        )?;
        activity_registry.register(
            "optimize_agent_performance",
            OptimizeAgentPerformance::with_config(store.clone() as Arc<dyn DurableStore>, meta_agent_config.clone()),
        )?;
        let activity_registry = Arc::new(activity_registry);

        let executor = Arc::new(WorkflowExecutor::new(event_store.clone(), workflow_registry, config.executor_config()));
        let worker_pool = Arc::new(WorkerPool::new(executor.clone(), event_store.clone(), activity_registry.clone(), config.worker_pool_config()));

        let ttl_reaper = Arc::new(TtlReaper::new(
            agent_registry.clone(),
            store.clone() as Arc<dyn DurableStore>,
            transport.clone(),
            TtlReaperConfig { sweep_interval: meta_agent_config.ttl_sweep_interval },
        ));

        let reconciler = Arc::new(StatusReconciler::new(
            store.clone() as Arc<dyn DurableStore>,
            event_store.clone() as Arc<dyn meridian_durable::WorkflowEventStore>,
            cache.clone(),
            bus.clone(),
            config.reconciler_config(),
        ));

        let (heartbeat_shutdown_tx, heartbeat_shutdown_rx) = tokio::sync::watch::channel(false);

        Ok(Self {
            store,
            event_store,
            cache,
            bus,
            agent_registry,
            transport,
            executor,
            activities: activity_registry,
            worker_pool,
            ttl_reaper,
            reconciler,
            heartbeat_period: config.heartbeat_period,
            heartbeat_shutdown_tx,
            heartbeat_shutdown_rx,
        })
    }

    /// Creates the domain `Workflow` row, starts the engine run, and
    /// enqueues it for the worker pool. The domain row is advanced to
    /// `Running` as soon as the engine accepts the run, mirroring the
    /// engine's own status (acceptance happens synchronously inside
    /// `start_workflow`) — leaving it at `Pending` would make the first
    /// reconciler pass reject the eventual terminal status as an illegal
    /// `Pending -> Completed` jump.
    pub async fn submit_workflow(&self, name: &str, workflow_type: WorkflowType, input: serde_json::Value, project_id: Option<String>) -> Result<Workflow, AppError> {
        let mut workflow = Workflow::new(name, workflow_type, input.clone(), serde_json::json!({}));
        workflow.project_id = project_id;
        let engine_id = workflow.id.to_string();
        workflow.engine_workflow_id = Some(engine_id.clone());
        workflow.engine_run_id = Some("run-1".to_string());
        let created = self.store.create_workflow(workflow).await?;

        self.executor.start_workflow(&engine_id, "run-1", workflow_type_key(workflow_type), input).await?;
        let running = self.store.update_workflow_status(created.id, WorkflowStatus::Running, None, None).await?;
        info!(workflow_id = %running.id, workflow_type = ?workflow_type, "submitted workflow");
        Ok(running)
    }

    /// Drives a just-submitted run to its next suspension point in the
    /// calling task, the same activity-dispatch loop the worker pool runs in
    /// the background (`drive_to_suspension` in `meridian_durable::worker`),
    /// then reconciles the domain row against the engine's resulting
    /// status. Used by the `submit` CLI command so a single invocation can
    /// both start and observe a run without standing up the full daemon.
    pub async fn drive_and_reconcile(&self, workflow: &Workflow) -> Result<Workflow, AppError> {
        let engine_workflow_id = workflow.engine_workflow_id.as_deref().unwrap_or_default();
        let engine_run_id = workflow.engine_run_id.as_deref().unwrap_or_default();
        let workflow_type = workflow_type_key(workflow.workflow_type);

        loop {
            let outcome = self.executor.process_workflow(engine_workflow_id, engine_run_id, workflow_type).await?;
            match outcome {
                StepOutcome::Suspended => {
                    let history = self.event_store.load_history(engine_workflow_id, engine_run_id).await?;
                    let Some(pending) = pending_activities(&history).into_iter().next() else {
                        break;
                    };
                    let ctx = ActivityContext::new(pending.activity_id.clone(), pending.next_attempt);
                    let result = self.activities.execute(&pending.activity_type, &ctx, pending.input.clone()).await;
                    match result {
                        Ok(value) => {
                            self.executor
                                .on_activity_completed(engine_workflow_id, engine_run_id, workflow_type, &pending.activity_id, value)
                                .await?;
                        }
                        Err(e) => {
                            self.executor
                                .on_activity_failed(
                                    engine_workflow_id,
                                    engine_run_id,
                                    workflow_type,
                                    &pending.activity_id,
                                    &e.kind,
                                    &e.message,
                                    pending.next_attempt,
                                )
                                .await?;
                        }
                    }
                }
                _ => break,
            }
        }

        self.reconciler.reconcile_once().await;
        Ok(self.store.get_workflow(workflow.id).await?)
    }

    /// Delivers a `cancel` signal to the engine run and reconciles the
    /// domain row so the cancellation is immediately visible.
    pub async fn cancel_workflow(&self, workflow: &Workflow, reason: &str) -> Result<Workflow, AppError> {
        let engine_workflow_id = workflow.engine_workflow_id.as_deref().unwrap_or_default();
        let engine_run_id = workflow.engine_run_id.as_deref().unwrap_or_default();
        let workflow_type = workflow_type_key(workflow.workflow_type);

        self.executor
            .send_signal(
                engine_workflow_id,
                engine_run_id,
                workflow_type,
                WorkflowSignal::new("cancel", serde_json::json!({"reason": reason})),
            )
            .await?;
        self.reconciler.reconcile_once().await;
        Ok(self.store.get_workflow(workflow.id).await?)
    }

    pub async fn get_workflow(&self, id: uuid::Uuid) -> Result<Workflow, AppError> {
        Ok(self.store.get_workflow(id).await?)
    }

    pub async fn list_workflows(&self, filter: meridian_durable::persistence::WorkflowFilter) -> Result<Vec<Workflow>, AppError> {
        Ok(self.store.list_workflows(filter, meridian_durable::persistence::Page::default()).await?)
    }

    /// Spawns the worker pool, reconciler, and TTL reaper as background
    /// tasks, reconciles any agents expired while the process was down, and
    /// blocks until `ctrl_c` (or `shutdown`) fires, then waits for each task
    /// to drain.
    pub async fn run_until_shutdown(self: Arc<Self>) -> Result<(), AppError> {
        self.ttl_reaper.reconcile_on_startup().await;

        let worker_pool = self.worker_pool.clone();
        let worker_handle = tokio::spawn(async move {
            if let Err(e) = worker_pool.run().await {
                tracing::error!(error = %e, "worker pool exited with an error");
            }
        });

        let reconciler = self.reconciler.clone();
        let reconciler_handle = tokio::spawn(async move {
            reconciler.run().await;
        });

        let ttl_reaper = self.ttl_reaper.clone();
        let reaper_handle = tokio::spawn(async move {
            ttl_reaper.run().await;
        });

        let agent_registry = self.agent_registry.clone();
        let heartbeat_period = self.heartbeat_period;
        let mut heartbeat_shutdown_rx = self.heartbeat_shutdown_rx.clone();
        let heartbeat_handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(heartbeat_period);
            loop {
                tokio::select! {
                    _ = heartbeat_shutdown_rx.changed() => {
                        if *heartbeat_shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = tick.tick() => {
                        let stale = agent_registry.sweep_stale_heartbeats(chrono::Utc::now(), heartbeat_period, 3);
                        if !stale.is_empty() {
                            tracing::warn!(count = stale.len(), "agents marked offline after missed heartbeats");
                        }
                    }
                }
            }
        });

        tokio::signal::ctrl_c().await.ok();
        info!("shutdown signal received, draining in-flight work");

        let _ = self.worker_pool.shutdown_handle().send(true);
        let _ = self.reconciler.shutdown_handle().send(true);
        let _ = self.ttl_reaper.shutdown_handle().send(true);
        let _ = self.heartbeat_shutdown_tx.send(true);

        let _ = tokio::join!(worker_handle, reconciler_handle, reaper_handle, heartbeat_handle);
        Ok(())
    }
}
