use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::core::state::AppState;
use crate::tasks::{maintenance, processor};

#[derive(Debug, Clone, Copy)]
pub(crate) struct DaemonOptions {
    pub(crate) max_requests: u32,
    pub(crate) interval: Duration,
}

/// Processes the queue on a fixed interval until a shutdown signal arrives.
pub(crate) async fn run(state: AppState, options: DaemonOptions) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tracing::info!(
        max_requests = options.max_requests,
        interval_seconds = options.interval.as_secs(),
        auto_retry_failed = state.settings().queue().auto_retry_failed,
        "Assessment worker started"
    );

    let handles = vec![
        tokio::spawn(queue_loop(state.clone(), options, shutdown_rx.clone())),
        tokio::spawn(maintenance_loop(state.clone(), shutdown_rx.clone())),
    ];

    crate::core::shutdown::shutdown_signal().await;
    if shutdown_tx.send(true).is_err() {
        tracing::warn!("Failed to broadcast shutdown signal to background tasks");
    }

    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Background task join failed");
        }
    }

    tracing::info!("Assessment worker stopped");
    Ok(())
}

async fn queue_loop(state: AppState, options: DaemonOptions, mut shutdown: watch::Receiver<bool>) {
    let mut tick = interval(options.interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                // The in-flight cycle finishes before the next shutdown check.
                if let Err(err) = processor::run_cycle(&state, options.max_requests).await {
                    tracing::error!(error = %err, "run_cycle failed");
                }
            }
        }
    }
}

async fn maintenance_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let period = Duration::from_secs(state.settings().queue().maintenance_interval_seconds);
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = maintenance::recover_stale_requests(&state).await {
                    tracing::error!(error = %err, "recover_stale_requests failed");
                }
                if state.settings().queue().auto_retry_failed {
                    if let Err(err) = maintenance::retry_failed_requests(&state).await {
                        tracing::error!(error = %err, "retry_failed_requests failed");
                    }
                }
            }
        }
    }
}
