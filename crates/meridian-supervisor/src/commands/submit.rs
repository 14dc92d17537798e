use crate::app::App;
use crate::output::{print_field, OutputFormat};
use anyhow::{Context, Result};
use meridian_core::WorkflowType;

pub fn parse_workflow_type(s: &str) -> Option<WorkflowType> {
    match s {
        "intent" => Some(WorkflowType::Intent),
        "execution" => Some(WorkflowType::Execution),
        "analysis" => Some(WorkflowType::Analysis),
        "review" => Some(WorkflowType::Review),
        "deployment" => Some(WorkflowType::Deployment),
        "task_execution" => Some(WorkflowType::TaskExecution),
        "custom" => Some(WorkflowType::Custom),
        _ => None,
    }
}

pub const WORKFLOW_TYPE_NAMES: &[&str] = &["intent", "execution", "analysis", "review", "deployment", "task_execution", "custom"];

#[allow(clippy::too_many_arguments)]
pub async fn run(
    app: &App,
    workflow_type: &str,
    name: Option<String>,
    input: String,
    project: Option<String>,
    wait: bool,
    output: OutputFormat,
) -> Result<()> {
    let workflow_type = parse_workflow_type(workflow_type).with_context(|| format!("unknown workflow type `{workflow_type}`"))?;
    let input: serde_json::Value = serde_json::from_str(&input).context("--input must be valid JSON")?;
    let name = name.unwrap_or_else(|| format!("{workflow_type:?}"));

    let created = app.submit_workflow(&name, workflow_type, input, project).await?;
    let result = if wait { app.drive_and_reconcile(&created).await? } else { created };

    if output.is_text() {
        print_field("id", &result.id.to_string());
        print_field("name", &result.name);
        print_field("status", &format!("{:?}", result.status));
        if let Some(err) = &result.error {
            print_field("error", &format!("{}: {}", err.kind, err.message));
        }
    } else {
        output.print_value(&result);
    }
    Ok(())
}
