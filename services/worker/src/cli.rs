use crate::check::{run_check, CheckArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use codegate::config::AppConfig;
use codegate::error::AppError;
use codegate::telemetry;
use codegate::workflows::submissions::{
    QueueBackend, QueueBackendKind, SubmissionId, SubmissionQueue,
};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "codegate-worker",
    about = "Evaluate submitted code archives against project rule sets",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Consume submission jobs until interrupted (default command)
    Work(WorkArgs),
    /// Publish submission jobs onto the configured queue
    Enqueue(EnqueueArgs),
    /// Evaluate a single archive against a rules file and print the verdict
    Check(CheckArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct WorkArgs {
    /// Override the configured host for the probe server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the probe server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// JSON file seeding the in-memory submission and rule set stores
    #[arg(long)]
    pub(crate) fixtures: Option<PathBuf>,
    /// Queue every PENDING fixture submission before consuming
    #[arg(long)]
    pub(crate) enqueue_pending: bool,
}

#[derive(Args, Debug)]
pub(crate) struct EnqueueArgs {
    /// Submission ids to publish
    #[arg(long = "submission-id", required = true)]
    pub(crate) submission_ids: Vec<String>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Work(WorkArgs::default()));

    match command {
        Command::Work(args) => server::run(args).await,
        Command::Enqueue(args) => run_enqueue(args).await,
        Command::Check(args) => run_check(args).await,
    }
}

async fn run_enqueue(args: EnqueueArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry, config.environment)?;

    let queue = QueueBackend::from_config(&config.queue).await?;
    if queue.kind() != QueueBackendKind::Broker {
        warn!("no broker configured; jobs will be dropped when this command exits");
    }

    for id in args.submission_ids {
        queue.enqueue(SubmissionId(id.clone())).await?;
        info!(submission_id = %id, backend = queue.kind().label(), "submission enqueued");
    }
    Ok(())
}
