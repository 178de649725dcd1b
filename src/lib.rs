pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use crate::core::{config::Settings, state::AppState, telemetry};
use crate::services::credits::PgCreditGate;
use crate::services::scoring::AnthropicScorer;
use crate::tasks::scheduler::DaemonOptions;

/// Worker subcommands, one per maintenance or processing entry point.
#[derive(Debug, Clone, Copy)]
pub enum WorkerCommand {
    /// Run a single queue cycle and exit.
    Process { max_requests: Option<u32> },
    /// Process the queue on an interval until shutdown.
    Daemon { max_requests: Option<u32>, interval_seconds: Option<u64> },
    /// Requeue failed requests whose retry time has passed.
    RetryFailed,
    /// Fail requests stuck in processing past the AI timeout.
    RecoverStale,
}

async fn build_state() -> anyhow::Result<AppState> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    let scorer = AnthropicScorer::from_settings(&settings)?;
    let credits = PgCreditGate::new(db_pool.clone(), settings.billing().credits_enforced);

    Ok(AppState::new(settings, db_pool, Arc::new(scorer), Arc::new(credits)))
}

pub async fn run() -> anyhow::Result<()> {
    let state = build_state().await?;

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        model = %state.scorer().model_name(),
        "IELTS assessment API listening"
    );

    axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await?;

    tracing::info!("IELTS assessment API stopped");
    Ok(())
}

pub async fn run_worker(command: WorkerCommand) -> anyhow::Result<()> {
    let state = build_state().await?;
    let queue = state.settings().queue().clone();

    match command {
        WorkerCommand::Process { max_requests } => {
            let report =
                tasks::processor::run_cycle(&state, max_requests.unwrap_or(queue.max_requests))
                    .await?;
            tracing::info!(
                claimed = report.claimed,
                processed = report.processed(),
                failed = report.failed,
                "Queue processing finished"
            );
        }
        WorkerCommand::Daemon { max_requests, interval_seconds } => {
            let options = DaemonOptions {
                max_requests: max_requests.unwrap_or(queue.max_requests),
                interval: tokio::time::Duration::from_secs(
                    interval_seconds.unwrap_or(queue.interval_seconds).max(1),
                ),
            };
            tasks::scheduler::run(state, options).await?;
        }
        WorkerCommand::RetryFailed => {
            let requeued = tasks::maintenance::retry_failed_requests(&state).await?;
            tracing::info!(requeued, "Failed request retry finished");
        }
        WorkerCommand::RecoverStale => {
            let recovered = tasks::maintenance::recover_stale_requests(&state).await?;
            tracing::info!(recovered, "Stale request recovery finished");
        }
    }

    Ok(())
}
