// Meridian Supervisor
//
// Design Decision: a single in-process binary wires every component and
// drives the CLI directly against it - no HTTP surface, unlike the
// teacher's `control-plane`/`cli` split (spec explicitly has no API layer).
// Design Decision: clap derive for ergonomic argument parsing, following
// the teacher's `everruns` CLI.

use anyhow::Result;
use clap::{Parser, Subcommand};
use meridian_supervisor::output::OutputFormat;
use meridian_supervisor::{commands, App, Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "meridian")]
#[command(about = "Meridian workflow engine - local operator CLI")]
#[command(version)]
pub struct Cli {
    /// Output format
    #[arg(long, short, default_value = "text", value_parser = ["text", "json"])]
    pub output: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the supervisor: worker pool, status reconciler, TTL reaper, and
    /// heartbeat sweeper, until a shutdown signal is received.
    Serve,

    /// Submit a new workflow run.
    Submit {
        /// Workflow type
        #[arg(long, short = 't', value_parser = ["intent", "execution", "analysis", "review", "deployment", "task_execution", "custom"])]
        workflow_type: String,

        /// Workflow name (defaults to the type name)
        #[arg(long)]
        name: Option<String>,

        /// JSON input payload
        #[arg(long, default_value = "{}")]
        input: String,

        /// Project id
        #[arg(long)]
        project: Option<String>,

        /// Drive the run to its first suspension point before returning
        #[arg(long)]
        wait: bool,
    },

    /// Get a workflow's current status.
    Status {
        #[arg(long, short)]
        id: Uuid,
    },

    /// List workflows, optionally filtered.
    List {
        #[arg(long)]
        status: Option<String>,

        #[arg(long)]
        project: Option<String>,
    },

    /// Cancel a running or pending workflow.
    Cancel {
        #[arg(long, short)]
        id: Uuid,

        #[arg(long)]
        reason: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "meridian_supervisor=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let output = OutputFormat::from_str(&cli.output);
    let config = Config::from_env();
    let app = App::build(&config).await?;

    match cli.command {
        Commands::Serve => {
            tracing::info!("meridian supervisor starting...");
            std::sync::Arc::new(app).run_until_shutdown().await?;
        }
        Commands::Submit { workflow_type, name, input, project, wait } => {
            commands::submit::run(&app, &workflow_type, name, input, project, wait, output).await?;
        }
        Commands::Status { id } => {
            commands::status::run(&app, id, output).await?;
        }
        Commands::List { status, project } => {
            commands::list::run(&app, status, project, output).await?;
        }
        Commands::Cancel { id, reason } => {
            commands::cancel::run(&app, id, reason, output).await?;
        }
    }

    Ok(())
}
