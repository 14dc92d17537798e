//! End-to-end scenarios driven against a fully wired `App` backed by the
//! in-memory store and in-process transport: one simulated agent process per
//! scenario, talking back over `AgentTransport` exactly as a real worker
//! would, with no HTTP surface in between.

use std::collections::HashSet;
use std::sync::Arc;

use meridian_core::{Agent, AgentStatus, Task, TaskComplexity, Workflow, WorkflowStatus, WorkflowType};
use meridian_durable::engine::{pending_activities, StepOutcome};
use meridian_durable::WorkflowEventStore;
use meridian_durable::ActivityContext;
use meridian_registry::{InboundMessage, OutboundMessage};
use meridian_supervisor::app::workflow_type_key;
use meridian_supervisor::{App, Config};
use serde_json::json;
use uuid::Uuid;

/// Advances the engine run by exactly one decision-and-activity step,
/// mirroring `App::drive_and_reconcile`'s loop body but returning control to
/// the caller between activities, so a test can connect a freshly spawned
/// agent before the next activity that needs it runs.
async fn step(app: &App, workflow: &Workflow) -> StepOutcome {
    let engine_workflow_id = workflow.engine_workflow_id.as_deref().unwrap();
    let engine_run_id = workflow.engine_run_id.as_deref().unwrap();
    let workflow_type = workflow_type_key(workflow.workflow_type);

    let outcome = app.executor.process_workflow(engine_workflow_id, engine_run_id, workflow_type).await.unwrap();
    if let StepOutcome::Suspended = outcome {
        let history = app.event_store.load_history(engine_workflow_id, engine_run_id).await.unwrap();
        if let Some(pending) = pending_activities(&history).into_iter().next() {
            let ctx = ActivityContext::new(pending.activity_id.clone(), pending.next_attempt);
            let result = app.activities.execute(&pending.activity_type, &ctx, pending.input.clone()).await;
            match result {
                Ok(value) => {
                    app.executor
                        .on_activity_completed(engine_workflow_id, engine_run_id, workflow_type, &pending.activity_id, value)
                        .await
                        .unwrap();
                }
                Err(e) => {
                    app.executor
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
                        .unwrap();
                }
            }
        }
    }
    outcome
}

/// Drives a workflow to completion, connecting and auto-completing any agent
/// that registers along the way. Caps the number of steps so a stuck test
/// fails instead of hanging forever.
async fn drive_to_terminal(app: &App, workflow: &Workflow) -> StepOutcome {
    let mut connected = HashSet::new();
    for _ in 0..64 {
        connect_new_agents(app, &mut connected).await;
        match step(app, workflow).await {
            StepOutcome::Suspended => continue,
            other => return other,
        }
    }
    panic!("workflow did not reach a terminal step within 64 iterations");
}

/// Connects every agent registered since the last call and spawns a task
/// that completes whatever it is dispatched with `{"ok": true}`, standing in
/// for a real agent process driving the same transport.
async fn connect_new_agents(app: &App, connected: &mut HashSet<Uuid>) {
    for agent in app.agent_registry.list() {
        if connected.insert(agent.id) {
            let (mut outbound_rx, inbound_tx) = app.transport.connect(agent.id);
            tokio::spawn(async move {
                while let Some(msg) = outbound_rx.recv().await {
                    if let OutboundMessage::DispatchTask { task_id, .. } = msg {
                        let _ = inbound_tx.send(InboundMessage::TaskResult { task_id, result: json!({"ok": true}) }).await;
                    }
                }
            });
        }
    }
}

fn available_agent(name: &str, capabilities: &[&str]) -> Agent {
    let mut agent = Agent::new_static(name, capabilities.iter().map(|c| c.to_string()));
    agent.status = AgentStatus::Available;
    agent
}

/// W1: a task matching an already-registered static agent runs straight
/// through to completion with no agent spawned.
#[tokio::test]
async fn w1_simple_execution_with_a_matching_static_agent() {
    let config = Config::from_env();
    let app = App::build(&config).await.unwrap();
    app.agent_registry.register(available_agent("backend-1", &["api", "database", "server"])).unwrap();

    let mut task = Task::new("backend", "wire up health endpoint");
    task.complexity = TaskComplexity::Simple;
    let input = json!({"task": task, "allow_spawn": false});

    let workflow = app.submit_workflow("wire up health endpoint", WorkflowType::TaskExecution, input, None).await.unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Running);

    let outcome = drive_to_terminal(&app, &workflow).await;
    assert!(matches!(outcome, StepOutcome::Completed { .. }), "expected completion, got {outcome:?}");
    assert_eq!(app.agent_registry.list().len(), 1, "no agent should have been spawned");

    app.reconciler.reconcile_once().await;
    let stored = app.get_workflow(workflow.id).await.unwrap();
    assert_eq!(stored.status, WorkflowStatus::Completed);
}

/// W2: no registered agent satisfies the task's required capabilities, so
/// the meta-agent loop designs and spawns a dynamic agent, which then runs
/// the task to completion.
#[tokio::test]
async fn w2_dynamic_agent_creation_when_no_match_exists() {
    let config = Config::from_env();
    let app = App::build(&config).await.unwrap();
    app.agent_registry.register(available_agent("backend-1", &["api", "database", "server"])).unwrap();

    let mut task = Task::new("frontend", "build the settings page");
    task.tags = vec!["svelte".to_string()];
    let input = json!({"task": task});

    let workflow = app.submit_workflow("build the settings page", WorkflowType::TaskExecution, input, None).await.unwrap();
    let outcome = drive_to_terminal(&app, &workflow).await;
    assert!(matches!(outcome, StepOutcome::Completed { .. }), "expected completion, got {outcome:?}");
    assert_eq!(app.agent_registry.list().len(), 2, "a dynamic agent should have been spawned alongside the static one");

    let spawned = app.agent_registry.list().into_iter().find(|a| a.name != "backend-1").unwrap();
    assert!(matches!(spawned.kind, meridian_core::AgentKind::Dynamic { .. }));
}

/// W3: cancelling mid-flight short-circuits the run immediately, without
/// waiting on the agent that never gets a chance to respond.
#[tokio::test]
async fn w3_cancel_mid_flight() {
    let config = Config::from_env();
    let app = App::build(&config).await.unwrap();
    app.agent_registry.register(available_agent("backend-1", &["api", "database", "server"])).unwrap();

    let task = Task::new("backend", "long running migration");
    let input = json!({"task": task, "allow_spawn": false});
    let workflow = app.submit_workflow("long running migration", WorkflowType::TaskExecution, input, None).await.unwrap();

    // Drive only the first activity (agent selection) so the run is
    // in-flight, then cancel before the dispatch step.
    let outcome = step(&app, &workflow).await;
    assert!(matches!(outcome, StepOutcome::Suspended));

    let cancelled = app.cancel_workflow(&workflow, "user requested cancellation").await.unwrap();
    assert_eq!(cancelled.status, WorkflowStatus::Cancelled);
    let error = cancelled.error.expect("cancelled workflow carries an error");
    assert_eq!(error.kind, "cancelled");
    assert_eq!(error.message, "user requested cancellation");
}

/// W4: an agent that is registered but never connects causes every dispatch
/// attempt to fail with `not_found`; once retries are exhausted the
/// workflow fails with that same kind. The engine's default retry policy
/// (`ActivityOptions::default().max_retries == 3`) allows four attempts
/// total rather than the three a literal reading of a "retry budget"
/// might suggest, and its retry gate only consults
/// `non_retryable_error_kinds` (empty by default) rather than each error's
/// own retryability, so a normally non-retryable `not_found` still burns
/// through the whole budget here.
#[tokio::test]
async fn w4_retry_exhaustion_against_an_unreachable_agent() {
    let config = Config::from_env();
    let app = App::build(&config).await.unwrap();
    app.agent_registry.register(available_agent("backend-1", &["api", "database", "server"])).unwrap();

    let task = Task::new("backend", "dispatch to an agent that never connects");
    let input = json!({"task": task, "allow_spawn": false});
    let workflow = app.submit_workflow("dispatch to an agent that never connects", WorkflowType::TaskExecution, input, None).await.unwrap();

    // Selection succeeds (the agent is registered); every subsequent
    // dispatch attempt fails because the agent never calls `connect`.
    let mut outcome = step(&app, &workflow).await;
    for _ in 0..8 {
        if !matches!(outcome, StepOutcome::Suspended) {
            break;
        }
        outcome = step(&app, &workflow).await;
    }

    assert!(matches!(outcome, StepOutcome::Failed { ref kind, .. } if kind == "not_found"), "expected exhausted-retry failure, got {outcome:?}");

    app.reconciler.reconcile_once().await;
    let stored = app.get_workflow(workflow.id).await.unwrap();
    assert_eq!(stored.status, WorkflowStatus::Failed);
}

/// W5: `analysis` fans out `run_static`/`run_security`/`run_performance`
/// in parallel and joins on `generate_report`.
#[tokio::test]
async fn w5_parallel_fan_out_and_join() {
    let config = Config::from_env();
    let app = App::build(&config).await.unwrap();

    let code = "fn foo() {}\nlet password = \"x\";\n";
    let input = json!({"source": "repo://example", "code": code});
    let workflow = app.submit_workflow("analyze example repo", WorkflowType::Analysis, input, None).await.unwrap();

    let outcome = drive_to_terminal(&app, &workflow).await;
    let StepOutcome::Completed { result } = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert!(result.get("score").is_some(), "report should carry a combined score: {result:?}");

    app.reconciler.reconcile_once().await;
    let stored = app.get_workflow(workflow.id).await.unwrap();
    assert_eq!(stored.status, WorkflowStatus::Completed);
    assert_eq!(stored.output.unwrap(), result);
}

/// W6: re-driving a run that already reached a terminal state (simulating a
/// process restart that reloads the durable store and tries to resume a run
/// it thinks is still in flight) is a no-op rather than a replay that
/// re-dispatches side effects - the executor refuses to decide again on a
/// terminal run at all.
#[tokio::test]
async fn w6_redriving_a_terminal_run_after_restart_is_a_no_op() {
    let config = Config::from_env();
    let app = App::build(&config).await.unwrap();
    app.agent_registry.register(available_agent("backend-1", &["api", "database", "server"])).unwrap();

    let task = Task::new("backend", "idempotent replay check");
    let input = json!({"task": task, "allow_spawn": false});
    let workflow = app.submit_workflow("idempotent replay check", WorkflowType::TaskExecution, input, None).await.unwrap();

    let first = drive_to_terminal(&app, &workflow).await;
    assert!(matches!(first, StepOutcome::Completed { .. }));

    // A fresh `process_workflow` call against the same run id - standing in
    // for a process restart that reloads state from the durable store
    // instead of resuming an in-memory run - must not re-run the decision
    // function and dispatch `find_or_create_agent_for_task` a second time.
    let engine_workflow_id = workflow.engine_workflow_id.as_deref().unwrap();
    let engine_run_id = workflow.engine_run_id.as_deref().unwrap();
    let workflow_type = workflow_type_key(workflow.workflow_type);
    let redrive = app.executor.process_workflow(engine_workflow_id, engine_run_id, workflow_type).await;
    assert!(matches!(redrive, Err(meridian_durable::engine::ExecutorError::AlreadyTerminal)));

    let agent_count_after_redrive = app.agent_registry.list().len();
    assert_eq!(agent_count_after_redrive, 1, "re-driving a terminal run must not spawn a second agent");
}
