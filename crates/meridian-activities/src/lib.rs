//! Activity Library (C6): the side-effecting steps the seven registered
//! workflow shapes schedule, plus the `Workflow` implementations for the
//! six shapes that are not meta-agent driven (`TaskExecution` lives in
//! `meridian-agent-loop`, since it needs the Registry/Transport it drives).
//!
//! Activities here intentionally do not reach out to a real LLM provider or
//! container runtime — those are explicitly out of scope. Each activity
//! still performs real, deterministic work over its input so the workflow
//! shapes are genuinely exercised rather than stubbed into no-ops.

pub mod activities;
pub mod artifact_sink;
pub mod workflows;

pub use artifact_sink::{ArtifactSink, ArtifactSinkError, LocalArtifactSink, WrittenArtifact};

/// Register every activity this crate provides into an [`meridian_durable::engine::ActivityRegistry`].
pub fn register_all(registry: &mut meridian_durable::engine::ActivityRegistry) -> Result<(), meridian_durable::engine::ActivityRegistryError> {
    use activities::*;

    registry.register("analyze_intent", intent::AnalyzeIntent)?;
    registry.register("create_plan", intent::CreatePlan)?;
    registry.register("aggregate", intent::Aggregate)?;

    registry.register("select_agent", execution::SelectAgent)?;
    registry.register("prepare_env", execution::PrepareEnv)?;
    registry.register("execute_code", execution::ExecuteCode)?;
    registry.register("process_results", execution::ProcessResults)?;
    registry.register("cleanup_env", execution::CleanupEnv)?;

    registry.register("fetch_code", analysis::FetchCode)?;
    registry.register("run_static", analysis::RunStatic)?;
    registry.register("run_security", analysis::RunSecurity)?;
    registry.register("run_performance", analysis::RunPerformance)?;
    registry.register("generate_report", analysis::GenerateReport)?;

    registry.register("fetch_changes", review::FetchChanges)?;
    registry.register("automated_checks", review::AutomatedChecks)?;
    registry.register("ai_review", review::AiReview)?;
    registry.register("summary", review::Summary)?;
    registry.register("post_comments", review::PostComments)?;

    registry.register("validate", deployment::Validate)?;
    registry.register("build", deployment::Build)?;
    registry.register("test", deployment::Test)?;
    registry.register("deploy_staging", deployment::DeployStaging)?;
    registry.register("smoke_test", deployment::SmokeTest)?;
    registry.register("deploy_production", deployment::DeployProduction)?;
    registry.register("health_check", deployment::HealthCheck)?;
    registry.register("rollback", deployment::Rollback)?;

    registry.register("run_custom_step", custom::RunCustomStep)?;

    Ok(())
}
