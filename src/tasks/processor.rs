use anyhow::{Context, Result};
use time::Duration;

use crate::core::state::AppState;
use crate::core::time::{elapsed_seconds, primitive_now_utc};
use crate::core::metrics as app_metrics;
use crate::db::models::AssessmentRequest;
use crate::repositories::{assessment_requests, assessments};
use crate::services::assessment::{self, AssessOutcome};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CycleReport {
    pub(crate) claimed: usize,
    pub(crate) completed: usize,
    pub(crate) failed: usize,
}

impl CycleReport {
    pub(crate) fn processed(&self) -> usize {
        self.completed
    }
}

/// Claims up to `max_count` queued requests and scores them one after another.
///
/// A failing entry is recorded and the cycle moves on to the next one.
pub(crate) async fn run_cycle(state: &AppState, max_count: u32) -> Result<CycleReport> {
    let mut report = CycleReport::default();
    if max_count == 0 {
        return Ok(report);
    }

    let claimed_at = primitive_now_utc();
    let batch = assessment_requests::claim_batch(state.db(), i64::from(max_count), claimed_at)
        .await
        .context("Failed to claim assessment requests")?;
    report.claimed = batch.len();

    if batch.is_empty() {
        tracing::debug!("No queued assessment requests");
        return Ok(report);
    }

    tracing::info!(claimed = batch.len(), max_count, "Processing assessment queue");

    for request in &batch {
        metrics::histogram!(app_metrics::QUEUE_LATENCY_SECONDS)
            .record(elapsed_seconds(request.created_at, claimed_at));

        if process_request(state, request).await {
            report.completed += 1;
        } else {
            report.failed += 1;
        }
    }

    tracing::info!(
        claimed = report.claimed,
        completed = report.completed,
        failed = report.failed,
        "Assessment queue cycle finished"
    );

    Ok(report)
}

/// Returns true when the request ended `completed`.
async fn process_request(state: &AppState, request: &AssessmentRequest) -> bool {
    let pool = state.db();

    let error = match assessment::assess_submission(pool, state.scorer(), &request.submission_id)
        .await
    {
        Ok(outcome) => {
            if let AssessOutcome::AlreadyCompleted(_) = &outcome {
                tracing::info!(
                    request_id = %request.id,
                    submission_id = %request.submission_id,
                    "Request resolved by an earlier assessment"
                );
            }
            let assessment_id = outcome.assessment().id.clone();
            match assessment_requests::mark_completed(pool, &request.id, &assessment_id, primitive_now_utc())
                .await
            {
                Ok(_) => return true,
                Err(err) => format!("failed to mark request completed: {err}"),
            }
        }
        Err(err) => err.to_string(),
    };

    record_failure(state, request, &error).await;
    false
}

async fn record_failure(state: &AppState, request: &AssessmentRequest, error: &str) {
    let pool = state.db();
    let now = primitive_now_utc();
    let retry_after = now + retry_delay(state);

    let assessment_id = match assessments::find_by_submission(pool, &request.submission_id).await {
        Ok(found) => found.map(|assessment| assessment.id),
        Err(err) => {
            tracing::warn!(request_id = %request.id, error = %err, "Failed to look up assessment");
            None
        }
    };

    tracing::error!(
        request_id = %request.id,
        submission_id = %request.submission_id,
        error,
        "Assessment request failed"
    );

    if let Err(err) = assessment_requests::mark_failed(
        pool,
        &request.id,
        error,
        assessment_id.as_deref(),
        retry_after,
        now,
    )
    .await
    {
        tracing::error!(
            request_id = %request.id,
            error = %err,
            "Failed to mark assessment request failed"
        );
    }
}

pub(crate) fn retry_delay(state: &AppState) -> Duration {
    let minutes = state.settings().queue().retry_delay_minutes.min(i64::MAX as u64 / 60);
    Duration::minutes(minutes as i64)
}
