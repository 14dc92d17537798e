use crate::app::App;
use crate::output::{print_table_header, print_table_row, OutputFormat};
use anyhow::{Context, Result};
use meridian_durable::persistence::WorkflowFilter;

pub async fn run(app: &App, status: Option<String>, project: Option<String>, output: OutputFormat) -> Result<()> {
    let status = status
        .map(|s| {
            parse_status(&s).with_context(|| format!("unknown status `{s}`"))
        })
        .transpose()?;
    let filter = WorkflowFilter { project_id: project, status, ..Default::default() };

    let workflows = app.list_workflows(filter).await?;
    if output.is_text() {
        print_table_header(&[("ID", 36), ("TYPE", 14), ("STATUS", 11), ("NAME", 24)]);
        for w in &workflows {
            print_table_row(&[
                (w.id.to_string().as_str(), 36),
                (format!("{:?}", w.workflow_type).as_str(), 14),
                (format!("{:?}", w.status).as_str(), 11),
                (w.name.as_str(), 24),
            ]);
        }
    } else {
        output.print_value(&workflows);
    }
    Ok(())
}

fn parse_status(s: &str) -> Option<meridian_core::WorkflowStatus> {
    use meridian_core::WorkflowStatus::*;
    match s {
        "pending" => Some(Pending),
        "running" => Some(Running),
        "completed" => Some(Completed),
        "failed" => Some(Failed),
        "cancelled" => Some(Cancelled),
        "terminated" => Some(Terminated),
        "timed_out" => Some(TimedOut),
        _ => None,
    }
}
