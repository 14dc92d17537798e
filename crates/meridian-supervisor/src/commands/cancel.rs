use crate::app::App;
use crate::output::{print_field, OutputFormat};
use anyhow::Result;
use uuid::Uuid;

pub async fn run(app: &App, id: Uuid, reason: Option<String>, output: OutputFormat) -> Result<()> {
    let workflow = app.get_workflow(id).await?;
    let reason = reason.unwrap_or_else(|| "cancelled by operator".to_string());
    let cancelled = app.cancel_workflow(&workflow, &reason).await?;

    if output.is_text() {
        print_field("id", &cancelled.id.to_string());
        print_field("status", &format!("{:?}", cancelled.status));
    } else {
        output.print_value(&cancelled);
    }
    Ok(())
}
