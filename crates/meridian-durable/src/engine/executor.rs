//! The replay-driven workflow executor: the heart of the Workflow Engine
//! component. Each call into the executor loads (or continues to hold) the
//! run's event history, replays it through the registered `Workflow`'s
//! `decide`, and turns the resulting actions into further store writes —
//! scheduling activities/timers, or recording a terminal outcome.

use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

use crate::persistence::{StoreError, TaskDefinition, WorkflowEventStore, WorkflowRunStatus};
use crate::reliability::RetryPolicy;
use crate::workflow::{ActivityOptions, WorkflowAction, WorkflowEvent, WorkflowSignal};

use super::registry::{RegistryError, WorkflowRegistry};

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("workflow function error: {0}")]
    Workflow(String),
    #[error("run already terminal")]
    AlreadyTerminal,
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub task_queue: String,
    pub default_retry_policy: RetryPolicy,
    pub max_concurrent_workflows: usize,
    pub max_concurrent_activities: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            task_queue: "orchestrator-task-queue".to_string(),
            default_retry_policy: RetryPolicy::exponential(),
            max_concurrent_workflows: 50,
            max_concurrent_activities: 200,
        }
    }
}

/// Outcome of advancing one run by one decision pass.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// The workflow scheduled more work and is waiting on it.
    Suspended,
    /// The workflow reached a terminal state.
    Completed { result: Value },
    Failed { kind: String, message: String },
    Cancelled { reason: String },
    TimedOut,
}

pub struct WorkflowExecutor<S: WorkflowEventStore> {
    store: Arc<S>,
    registry: WorkflowRegistry,
    config: ExecutorConfig,
}

impl<S: WorkflowEventStore> WorkflowExecutor<S> {
    pub fn new(store: Arc<S>, registry: WorkflowRegistry, config: ExecutorConfig) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// Start a new run: create it in the store, append `WorkflowStarted`,
    /// run the first decision pass, and enqueue it on the task queue for a
    /// worker to pick up and drive to completion.
    #[instrument(skip(self, input), fields(workflow_id = %engine_workflow_id, run_id = %engine_run_id))]
    pub async fn start_workflow(
        &self,
        engine_workflow_id: &str,
        engine_run_id: &str,
        workflow_type: &str,
        input: Value,
    ) -> Result<StepOutcome, ExecutorError> {
        if !self.registry.is_registered(workflow_type) {
            return Err(ExecutorError::Registry(RegistryError::Unknown(
                workflow_type.to_string(),
            )));
        }
        self.store
            .create_run(engine_workflow_id, engine_run_id, workflow_type, input.clone())
            .await?;
        self.store
            .append_event(
                engine_workflow_id,
                engine_run_id,
                WorkflowEvent::WorkflowStarted {
                    input: input.clone(),
                    timestamp: Utc::now(),
                },
                0,
            )
            .await?;
        self.store
            .set_status(engine_workflow_id, engine_run_id, WorkflowRunStatus::Running)
            .await?;
        self.store
            .enqueue(TaskDefinition {
                engine_workflow_id: engine_workflow_id.to_string(),
                engine_run_id: engine_run_id.to_string(),
                workflow_type: workflow_type.to_string(),
                input,
                queue: self.config.task_queue.clone(),
            })
            .await?;
        self.process_workflow(engine_workflow_id, engine_run_id, workflow_type)
            .await
    }

    /// Replay the current history through the workflow function and process
    /// whatever actions it returns. Idempotent: calling this again before
    /// new events land produces the same `StepOutcome`.
    #[instrument(skip(self), fields(workflow_id = %engine_workflow_id, run_id = %engine_run_id))]
    pub async fn process_workflow(
        &self,
        engine_workflow_id: &str,
        engine_run_id: &str,
        workflow_type: &str,
    ) -> Result<StepOutcome, ExecutorError> {
        let status = self.store.get_status(engine_workflow_id, engine_run_id).await?;
        if status.is_terminal() {
            return Err(ExecutorError::AlreadyTerminal);
        }
        let history = self.store.load_history(engine_workflow_id, engine_run_id).await?;
        let input = workflow_input(&history);
        let workflow = self.registry.create(workflow_type)?;

        let actions = workflow
            .decide(&input, &history)
            .map_err(|e| ExecutorError::Workflow(e.to_string()))?;

        self.process_actions(engine_workflow_id, engine_run_id, &history, actions)
            .await
    }

    async fn process_actions(
        &self,
        engine_workflow_id: &str,
        engine_run_id: &str,
        history: &[WorkflowEvent],
        actions: Vec<WorkflowAction>,
    ) -> Result<StepOutcome, ExecutorError> {
        let mut sequence = history.len();
        let mut already_scheduled: std::collections::HashSet<String> = history
            .iter()
            .filter_map(|e| e.activity_id().map(str::to_string))
            .collect();

        for action in flatten(actions) {
            match action {
                WorkflowAction::ScheduleActivity {
                    activity_id,
                    activity_type,
                    input,
                    options,
                } => {
                    if already_scheduled.contains(&activity_id) {
                        continue;
                    }
                    already_scheduled.insert(activity_id.clone());
                    sequence = self
                        .store
                        .append_event(
                            engine_workflow_id,
                            engine_run_id,
                            WorkflowEvent::ActivityScheduled {
                                activity_id,
                                activity_type,
                                input,
                                options,
                                timestamp: Utc::now(),
                            },
                            sequence,
                        )
                        .await?;
                }
                WorkflowAction::StartTimer { timer_id, duration } => {
                    sequence = self
                        .store
                        .append_event(
                            engine_workflow_id,
                            engine_run_id,
                            WorkflowEvent::TimerStarted {
                                timer_id,
                                timestamp: Utc::now(),
                            },
                            sequence,
                        )
                        .await?;
                    let _ = duration; // scheduling the real timer is the caller's (worker pool's) job
                }
                WorkflowAction::CompleteWorkflow { result } => {
                    self.store
                        .append_event(
                            engine_workflow_id,
                            engine_run_id,
                            WorkflowEvent::WorkflowCompleted {
                                result: result.clone(),
                                timestamp: Utc::now(),
                            },
                            sequence,
                        )
                        .await?;
                    self.store
                        .set_status(engine_workflow_id, engine_run_id, WorkflowRunStatus::Completed)
                        .await?;
                    self.store.complete_task(engine_workflow_id, engine_run_id).await?;
                    return Ok(StepOutcome::Completed { result });
                }
                WorkflowAction::FailWorkflow { kind, message } => {
                    self.store
                        .append_event(
                            engine_workflow_id,
                            engine_run_id,
                            WorkflowEvent::WorkflowFailed {
                                kind: kind.clone(),
                                message: message.clone(),
                                timestamp: Utc::now(),
                            },
                            sequence,
                        )
                        .await?;
                    self.store
                        .set_status(engine_workflow_id, engine_run_id, WorkflowRunStatus::Failed)
                        .await?;
                    self.store.complete_task(engine_workflow_id, engine_run_id).await?;
                    return Ok(StepOutcome::Failed { kind, message });
                }
                WorkflowAction::ScheduleActivities(_) => unreachable!("flattened above"),
            }
        }

        Ok(StepOutcome::Suspended)
    }

    /// Record an activity's successful result and re-run the decision pass.
    #[instrument(skip(self, result), fields(workflow_id = %engine_workflow_id, run_id = %engine_run_id))]
    pub async fn on_activity_completed(
        &self,
        engine_workflow_id: &str,
        engine_run_id: &str,
        workflow_type: &str,
        activity_id: &str,
        result: Value,
    ) -> Result<StepOutcome, ExecutorError> {
        let history = self.store.load_history(engine_workflow_id, engine_run_id).await?;
        self.store
            .append_event(
                engine_workflow_id,
                engine_run_id,
                WorkflowEvent::ActivityCompleted {
                    activity_id: activity_id.to_string(),
                    result,
                    timestamp: Utc::now(),
                },
                history.len(),
            )
            .await?;
        self.process_workflow(engine_workflow_id, engine_run_id, workflow_type)
            .await
    }

    /// Record an activity failure. Consults the activity's `ActivityOptions`
    /// (taken from its `ActivityScheduled` event) to decide whether to
    /// retry — by re-scheduling the same `activity_id` so the workflow's
    /// next `decide` call sees neither a completion nor a terminal
    /// failure — or to let the failure propagate to `decide` as-is.
    #[instrument(skip(self), fields(workflow_id = %engine_workflow_id, run_id = %engine_run_id))]
    pub async fn on_activity_failed(
        &self,
        engine_workflow_id: &str,
        engine_run_id: &str,
        workflow_type: &str,
        activity_id: &str,
        kind: &str,
        message: &str,
        attempt: u32,
    ) -> Result<StepOutcome, ExecutorError> {
        let history = self.store.load_history(engine_workflow_id, engine_run_id).await?;
        let options = find_activity_options(&history, activity_id).unwrap_or_default();

        let mut policy = self.config.default_retry_policy.clone();
        policy.max_attempts = options.max_retries + 1;
        policy.initial_interval = options.initial_retry_interval;
        policy.max_interval = options.max_retry_interval;
        policy.backoff_coefficient = options.backoff_coefficient;
        policy.non_retryable_error_kinds = options.non_retryable_error_kinds.clone();

        self.store
            .append_event(
                engine_workflow_id,
                engine_run_id,
                WorkflowEvent::ActivityFailed {
                    activity_id: activity_id.to_string(),
                    kind: kind.to_string(),
                    message: message.to_string(),
                    attempt,
                    timestamp: Utc::now(),
                },
                history.len(),
            )
            .await?;

        if policy.should_retry(Some(kind)) && policy.has_attempts_remaining(attempt) {
            // Re-enqueue for another attempt; the workflow function's next
            // `decide` call still sees an unresolved activity and will not
            // re-schedule it (idempotent scheduling dedupes on activity_id).
            self.store
                .enqueue(TaskDefinition {
                    engine_workflow_id: engine_workflow_id.to_string(),
                    engine_run_id: engine_run_id.to_string(),
                    workflow_type: workflow_type.to_string(),
                    input: Value::Null,
                    queue: self.config.task_queue.clone(),
                })
                .await?;
            return Ok(StepOutcome::Suspended);
        }

        self.process_workflow(engine_workflow_id, engine_run_id, workflow_type)
            .await
    }

    pub async fn on_timer_fired(
        &self,
        engine_workflow_id: &str,
        engine_run_id: &str,
        workflow_type: &str,
        timer_id: &str,
    ) -> Result<StepOutcome, ExecutorError> {
        let history = self.store.load_history(engine_workflow_id, engine_run_id).await?;
        self.store
            .append_event(
                engine_workflow_id,
                engine_run_id,
                WorkflowEvent::TimerFired {
                    timer_id: timer_id.to_string(),
                    timestamp: Utc::now(),
                },
                history.len(),
            )
            .await?;
        self.process_workflow(engine_workflow_id, engine_run_id, workflow_type)
            .await
    }

    /// Deliver a signal. A `cancel` signal is handled by the engine itself:
    /// it is recorded as `WorkflowCancelled` and the run is marked
    /// cancelled without waiting for the next scheduled checkpoint's
    /// `decide` call, since cancellation must never be silent. Other
    /// signals are appended as `SignalReceived` and folded into history for
    /// the workflow's `on_signal` hook on the next decision pass.
    #[instrument(skip(self, signal), fields(workflow_id = %engine_workflow_id, run_id = %engine_run_id))]
    pub async fn send_signal(
        &self,
        engine_workflow_id: &str,
        engine_run_id: &str,
        workflow_type: &str,
        signal: WorkflowSignal,
    ) -> Result<StepOutcome, ExecutorError> {
        let history = self.store.load_history(engine_workflow_id, engine_run_id).await?;
        if signal.is_cancel() {
            let reason = signal
                .payload
                .get("reason")
                .and_then(|v| v.as_str())
                .unwrap_or("cancelled")
                .to_string();
            self.store
                .append_event(
                    engine_workflow_id,
                    engine_run_id,
                    WorkflowEvent::WorkflowCancelled {
                        reason: reason.clone(),
                        timestamp: Utc::now(),
                    },
                    history.len(),
                )
                .await?;
            self.store
                .set_status(engine_workflow_id, engine_run_id, WorkflowRunStatus::Cancelled)
                .await?;
            self.store.complete_task(engine_workflow_id, engine_run_id).await?;
            return Ok(StepOutcome::Cancelled { reason });
        }

        self.store
            .append_event(
                engine_workflow_id,
                engine_run_id,
                WorkflowEvent::SignalReceived {
                    signal_name: signal.name,
                    payload: signal.payload,
                    timestamp: Utc::now(),
                },
                history.len(),
            )
            .await?;
        self.process_workflow(engine_workflow_id, engine_run_id, workflow_type)
            .await
    }

    /// Mark a run timed out once the workflow-level `timeout_s` has elapsed.
    /// No further activities are scheduled after this call.
    pub async fn time_out(
        &self,
        engine_workflow_id: &str,
        engine_run_id: &str,
    ) -> Result<StepOutcome, ExecutorError> {
        let history = self.store.load_history(engine_workflow_id, engine_run_id).await?;
        self.store
            .append_event(
                engine_workflow_id,
                engine_run_id,
                WorkflowEvent::WorkflowTimedOut { timestamp: Utc::now() },
                history.len(),
            )
            .await?;
        self.store
            .set_status(engine_workflow_id, engine_run_id, WorkflowRunStatus::TimedOut)
            .await?;
        self.store.complete_task(engine_workflow_id, engine_run_id).await?;
        Ok(StepOutcome::TimedOut)
    }
}

fn flatten(actions: Vec<WorkflowAction>) -> Vec<WorkflowAction> {
    let mut out = Vec::with_capacity(actions.len());
    for action in actions {
        match action {
            WorkflowAction::ScheduleActivities(nested) => {
                out.extend(flatten(nested.into_iter().map(|b| *b).collect()));
            }
            other => out.push(other),
        }
    }
    out
}

fn workflow_input(history: &[WorkflowEvent]) -> Value {
    history
        .iter()
        .find_map(|e| match e {
            WorkflowEvent::WorkflowStarted { input, .. } => Some(input.clone()),
            _ => None,
        })
        .unwrap_or(Value::Null)
}

fn find_activity_options(history: &[WorkflowEvent], activity_id: &str) -> Option<ActivityOptions> {
    history.iter().find_map(|e| match e {
        WorkflowEvent::ActivityScheduled {
            activity_id: id,
            options,
            ..
        } if id == activity_id => Some(options.clone()),
        _ => None,
    })
}

/// Indexes the most recent status of every activity seen in a run's
/// history. Convenience for workflow functions that want to inspect
/// fan-out progress without re-scanning the whole slice by hand.
pub fn activity_statuses(history: &[WorkflowEvent]) -> HashMap<String, ActivityStatus> {
    let mut statuses = HashMap::new();
    for event in history {
        match event {
            WorkflowEvent::ActivityScheduled { activity_id, .. } => {
                statuses.entry(activity_id.clone()).or_insert(ActivityStatus::Scheduled);
            }
            WorkflowEvent::ActivityCompleted { activity_id, result, .. } => {
                statuses.insert(activity_id.clone(), ActivityStatus::Completed(result.clone()));
            }
            WorkflowEvent::ActivityFailed {
                activity_id,
                kind,
                message,
                ..
            } => {
                statuses.insert(
                    activity_id.clone(),
                    ActivityStatus::Failed(kind.clone(), message.clone()),
                );
            }
            _ => {}
        }
    }
    statuses
}

#[derive(Debug, Clone)]
pub enum ActivityStatus {
    Scheduled,
    Completed(Value),
    Failed(String, String),
}

/// A scheduled activity with no recorded completion or failure yet, along
/// with the attempt number the next execution would be (1-based).
#[derive(Debug, Clone)]
pub struct PendingActivity {
    pub activity_id: String,
    pub activity_type: String,
    pub input: Value,
    pub options: ActivityOptions,
    pub next_attempt: u32,
}

/// Scheduled activities history shows no terminal outcome for yet. Driven by
/// the worker pool: each is dispatched through the [`ActivityRegistry`](super::ActivityRegistry)
/// and its result fed back via `on_activity_completed`/`on_activity_failed`.
pub fn pending_activities(history: &[WorkflowEvent]) -> Vec<PendingActivity> {
    let mut pending: HashMap<String, PendingActivity> = HashMap::new();
    for event in history {
        match event {
            WorkflowEvent::ActivityScheduled {
                activity_id,
                activity_type,
                input,
                options,
                ..
            } => {
                pending.insert(
                    activity_id.clone(),
                    PendingActivity {
                        activity_id: activity_id.clone(),
                        activity_type: activity_type.clone(),
                        input: input.clone(),
                        options: options.clone(),
                        next_attempt: 1,
                    },
                );
            }
            WorkflowEvent::ActivityFailed { activity_id, .. } => {
                if let Some(p) = pending.get_mut(activity_id) {
                    p.next_attempt += 1;
                }
            }
            WorkflowEvent::ActivityCompleted { activity_id, .. } => {
                pending.remove(activity_id);
            }
            _ => {}
        }
    }
    pending.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryEventStore;
    use crate::workflow::{Workflow, WorkflowError};

    struct CounterWorkflow;

    impl Workflow for CounterWorkflow {
        fn workflow_type(&self) -> &'static str {
            "counter"
        }

        fn decide(&self, input: &Value, history: &[WorkflowEvent]) -> Result<Vec<WorkflowAction>, WorkflowError> {
            let statuses = activity_statuses(history);
            if let Some(ActivityStatus::Completed(result)) = statuses.get("step-1") {
                return Ok(vec![WorkflowAction::CompleteWorkflow { result: result.clone() }]);
            }
            if let Some(ActivityStatus::Failed(kind, message)) = statuses.get("step-1") {
                return Ok(vec![WorkflowAction::FailWorkflow {
                    kind: kind.clone(),
                    message: message.clone(),
                }]);
            }
            if statuses.contains_key("step-1") {
                return Ok(vec![]);
            }
            Ok(vec![WorkflowAction::ScheduleActivity {
                activity_id: "step-1".to_string(),
                activity_type: "increment".to_string(),
                input: input.clone(),
                options: ActivityOptions::default(),
            }])
        }
    }

    fn registry() -> WorkflowRegistry {
        let mut r = WorkflowRegistry::new();
        r.register("counter", || CounterWorkflow).unwrap();
        r
    }

    #[tokio::test]
    async fn start_workflow_schedules_first_activity() {
        let store = Arc::new(InMemoryEventStore::new());
        let executor = WorkflowExecutor::new(store, registry(), ExecutorConfig::default());
        let outcome = executor
            .start_workflow("wf-1", "run-1", "counter", serde_json::json!({"n": 1}))
            .await
            .unwrap();
        assert!(matches!(outcome, StepOutcome::Suspended));
    }

    #[tokio::test]
    async fn activity_completion_drives_workflow_to_completion() {
        let store = Arc::new(InMemoryEventStore::new());
        let executor = WorkflowExecutor::new(store, registry(), ExecutorConfig::default());
        executor
            .start_workflow("wf-2", "run-2", "counter", serde_json::json!({"n": 1}))
            .await
            .unwrap();
        let outcome = executor
            .on_activity_completed("wf-2", "run-2", "counter", "step-1", serde_json::json!({"n": 2}))
            .await
            .unwrap();
        assert!(matches!(outcome, StepOutcome::Completed { .. }));
    }

    #[tokio::test]
    async fn exhausted_retries_fail_the_workflow() {
        let store = Arc::new(InMemoryEventStore::new());
        let mut config = ExecutorConfig::default();
        config.default_retry_policy = RetryPolicy::exponential().with_max_attempts(2);
        let executor = WorkflowExecutor::new(store, registry(), config);
        executor
            .start_workflow("wf-3", "run-3", "counter", serde_json::json!({}))
            .await
            .unwrap();

        // first failure (attempt 1 of options.max_retries+1=4 by default) retries
        let outcome = executor
            .on_activity_failed("wf-3", "run-3", "counter", "step-1", "unavailable", "down", 1)
            .await
            .unwrap();
        assert!(matches!(outcome, StepOutcome::Suspended));

        // drive attempts until exhausted (default options allow 4 attempts)
        let mut last = outcome;
        for attempt in 2..=4 {
            last = executor
                .on_activity_failed("wf-3", "run-3", "counter", "step-1", "unavailable", "down", attempt)
                .await
                .unwrap();
        }
        assert!(matches!(last, StepOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn cancel_signal_is_immediate_and_terminal() {
        let store = Arc::new(InMemoryEventStore::new());
        let executor = WorkflowExecutor::new(store, registry(), ExecutorConfig::default());
        executor
            .start_workflow("wf-4", "run-4", "counter", serde_json::json!({}))
            .await
            .unwrap();
        let outcome = executor
            .send_signal(
                "wf-4",
                "run-4",
                "counter",
                WorkflowSignal::new(crate::workflow::signal_types::CANCEL, serde_json::json!({"reason": "user"})),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, StepOutcome::Cancelled { .. }));
    }

    #[tokio::test]
    async fn replaying_same_history_reaches_identical_decision() {
        let store = Arc::new(InMemoryEventStore::new());
        let executor = WorkflowExecutor::new(store, registry(), ExecutorConfig::default());
        executor
            .start_workflow("wf-5", "run-5", "counter", serde_json::json!({"n": 1}))
            .await
            .unwrap();
        let first = executor.process_workflow("wf-5", "run-5", "counter").await.unwrap();
        let second = executor.process_workflow("wf-5", "run-5", "counter").await.unwrap();
        assert!(matches!(first, StepOutcome::Suspended));
        assert!(matches!(second, StepOutcome::Suspended));
    }

    #[tokio::test]
    async fn double_scheduling_same_activity_id_is_deduped() {
        let store = Arc::new(InMemoryEventStore::new());
        let executor = WorkflowExecutor::new(store.clone(), registry(), ExecutorConfig::default());
        executor
            .start_workflow("wf-6", "run-6", "counter", serde_json::json!({}))
            .await
            .unwrap();
        executor.process_workflow("wf-6", "run-6", "counter").await.unwrap();
        let history = store.load_history("wf-6", "run-6").await.unwrap();
        let scheduled_count = history
            .iter()
            .filter(|e| matches!(e, WorkflowEvent::ActivityScheduled { .. }))
            .count();
        assert_eq!(scheduled_count, 1);
    }
}
