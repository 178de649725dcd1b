use clap::{Parser, Subcommand};

use ielts_assess::WorkerCommand;

#[derive(Parser)]
#[command(name = "ielts-worker", version, about = "IELTS assessment queue worker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process one batch of queued assessment requests and exit
    Process {
        /// Overrides QUEUE_MAX_REQUESTS
        #[arg(long)]
        max_requests: Option<u32>,
    },
    /// Keep processing the queue on an interval until interrupted
    Daemon {
        #[arg(long)]
        max_requests: Option<u32>,
        /// Seconds between cycles; overrides QUEUE_INTERVAL_SECONDS
        #[arg(long = "interval")]
        interval_seconds: Option<u64>,
    },
    /// Requeue failed requests whose retry time has passed
    RetryFailed,
    /// Fail requests stuck in processing
    RecoverStale,
}

impl From<Commands> for WorkerCommand {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Process { max_requests } => WorkerCommand::Process { max_requests },
            Commands::Daemon { max_requests, interval_seconds } => {
                WorkerCommand::Daemon { max_requests, interval_seconds }
            }
            Commands::RetryFailed => WorkerCommand::RetryFailed,
            Commands::RecoverStale => WorkerCommand::RecoverStale,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if let Err(e) = ielts_assess::run_worker(cli.command.into()).await {
        eprintln!("ielts-worker fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
