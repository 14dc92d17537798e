use crate::app::App;
use crate::output::{print_field, OutputFormat};
use anyhow::Result;
use uuid::Uuid;

pub async fn run(app: &App, id: Uuid, output: OutputFormat) -> Result<()> {
    let workflow = app.get_workflow(id).await?;
    if output.is_text() {
        print_field("id", &workflow.id.to_string());
        print_field("name", &workflow.name);
        print_field("type", &format!("{:?}", workflow.workflow_type));
        print_field("status", &format!("{:?}", workflow.status));
        print_field("retries", &workflow.retry_count.to_string());
        if let Some(output_value) = &workflow.output {
            print_field("output", &output_value.to_string());
        }
        if let Some(err) = &workflow.error {
            print_field("error", &format!("{}: {}", err.kind, err.message));
        }
    } else {
        output.print_value(&workflow);
    }
    Ok(())
}
