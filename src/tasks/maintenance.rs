use anyhow::{Context, Result};

use crate::core::metrics as app_metrics;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::repositories::{assessment_requests, assessments};
use crate::services::assessment::stale_before;
use crate::tasks::processor::retry_delay;

/// Requeues failed requests whose `retry_after` has elapsed.
pub(crate) async fn retry_failed_requests(state: &AppState) -> Result<usize> {
    let requeued = assessment_requests::requeue_due_failed(state.db(), primitive_now_utc())
        .await
        .context("Failed to requeue failed assessment requests")?;

    if !requeued.is_empty() {
        tracing::info!(requeued = requeued.len(), "Requeued failed assessment requests");
    }
    metrics::counter!(app_metrics::REQUESTS_RETRIED_TOTAL, "trigger" => "scheduled")
        .increment(requeued.len() as u64);

    Ok(requeued.len())
}

/// Fails requests (and their assessments) stuck in `processing` past the AI timeout,
/// then any `processing` assessment left behind without an open request.
pub(crate) async fn recover_stale_requests(state: &AppState) -> Result<usize> {
    let now = primitive_now_utc();
    let cutoff = stale_before(now, state.settings().ai().request_timeout);

    let stale = assessment_requests::list_stale_processing(state.db(), cutoff)
        .await
        .context("Failed to list stale assessment requests")?;

    let reason = "Assessment processing timed out while waiting for worker completion";
    let mut recovered = 0;

    for request in stale {
        let marked = assessment_requests::mark_failed(
            state.db(),
            &request.id,
            reason,
            None,
            now + retry_delay(state),
            now,
        )
        .await
        .context("Failed to mark stale assessment request failed")?;
        if !marked {
            continue;
        }

        assessments::fail_if_processing(state.db(), &request.submission_id, reason, now)
            .await
            .context("Failed to mark stale assessment failed")?;
        recovered += 1;
    }

    let orphans = assessments::fail_stale_orphans(state.db(), cutoff, reason, now)
        .await
        .context("Failed to fail orphaned assessments")?;
    for orphan in &orphans {
        tracing::warn!(
            assessment_id = %orphan.id,
            submission_id = %orphan.submission_id,
            error = %orphan.error_message,
            "Failed orphaned processing assessment"
        );
    }
    recovered += orphans.len();

    if recovered > 0 {
        tracing::warn!(recovered, "Recovered stale assessment requests");
    }
    metrics::counter!(app_metrics::REQUESTS_STALE_RECOVERED_TOTAL).increment(recovered as u64);

    Ok(recovered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::AssessmentRequest;
    use crate::db::types::{
        AssessmentStatus, FeedbackCategory, FeedbackSeverity, ModuleType, RequestStatus,
        SubmissionStatus,
    };
    use crate::services::{assessment, queue};
    use crate::test_support::{self, feedback_item, score_result, TestContext, TEST_MODEL};
    use time::Duration;

    async fn queued(ctx: &TestContext) -> AssessmentRequest {
        let user =
            test_support::insert_user(ctx.db(), &format!("u{}", uuid::Uuid::new_v4().simple()), false)
                .await;
        let task = test_support::insert_task(ctx.db(), 1, ModuleType::Academic).await;
        let submission =
            test_support::insert_submission(ctx.db(), &user.id, &task, 200, SubmissionStatus::Submitted)
                .await;
        queue::enqueue(ctx.db(), &submission.id, 0).await.expect("enqueue").0
    }

    async fn set_request(
        ctx: &TestContext,
        id: &str,
        status: RequestStatus,
        started: Option<time::PrimitiveDateTime>,
        retry_after: Option<time::PrimitiveDateTime>,
    ) {
        sqlx::query(
            "UPDATE assessment_requests
             SET status = $1, processing_started_at = $2, retry_after = $3
             WHERE id = $4",
        )
        .bind(status)
        .bind(started)
        .bind(retry_after)
        .bind(id)
        .execute(ctx.db())
        .await
        .expect("update request");
    }

    async fn status_of(ctx: &TestContext, id: &str) -> RequestStatus {
        assessment_requests::find_by_id(ctx.db(), id).await.unwrap().expect("request").status
    }

    #[tokio::test]
    async fn stale_processing_requests_are_failed() {
        let ctx = test_support::setup_test_context().await;
        let now = primitive_now_utc();
        let stale = queued(&ctx).await;
        let fresh = queued(&ctx).await;
        set_request(&ctx, &stale.id, RequestStatus::Processing, Some(now - Duration::hours(1)), None)
            .await;
        set_request(&ctx, &fresh.id, RequestStatus::Processing, Some(now), None).await;
        assessment::get_or_create(ctx.db(), &stale.submission_id, TEST_MODEL, now)
            .await
            .expect("processing assessment");

        let recovered = recover_stale_requests(&ctx.state).await.expect("recover");

        assert_eq!(recovered, 1);
        let failed = assessment_requests::find_by_id(ctx.db(), &stale.id).await.unwrap().unwrap();
        assert_eq!(failed.status, RequestStatus::Failed);
        assert!(failed.error_details.contains("timed out"));
        assert!(failed.retry_after.is_some());
        let stale_assessment =
            assessments::find_by_submission(ctx.db(), &stale.submission_id).await.unwrap().unwrap();
        assert_eq!(stale_assessment.status, AssessmentStatus::Failed);
        assert_eq!(stale_assessment.retry_count, 1);

        assert_eq!(status_of(&ctx, &fresh.id).await, RequestStatus::Processing);
    }

    async fn backdate_assessment(ctx: &TestContext, submission_id: &str, started: time::PrimitiveDateTime) {
        sqlx::query("UPDATE assessments SET started_at = $1 WHERE submission_id = $2")
            .bind(started)
            .bind(submission_id)
            .execute(ctx.db())
            .await
            .expect("backdate assessment");
    }

    #[tokio::test]
    async fn storage_failure_is_noted_then_recovered() {
        let ctx = test_support::setup_test_context().await;
        let user = test_support::insert_user(ctx.db(), "orphan", false).await;
        let task = test_support::insert_task(ctx.db(), 2, ModuleType::Academic).await;
        let submission =
            test_support::insert_submission(ctx.db(), &user.id, &task, 260, SubmissionStatus::Submitted)
                .await;

        ctx.scorer.push(Ok(score_result(
            [6.0, 6.0, 6.0, 6.0],
            0.8,
            vec![feedback_item(FeedbackCategory::Inline, FeedbackSeverity::Error, "Inverted", Some((9, 3)))],
        )));
        let err = assessment::assess_submission(ctx.db(), ctx.scorer.as_ref(), &submission.id)
            .await
            .expect_err("storage failure");
        assert!(matches!(err, assessment::AssessmentError::Transaction(_)));

        let noted = assessments::find_by_submission(ctx.db(), &submission.id).await.unwrap().unwrap();
        assert_eq!(noted.status, AssessmentStatus::Processing);
        assert!(noted.error_message.contains("failed to store assessment result"));

        // Still inside the in-flight window.
        assert_eq!(recover_stale_requests(&ctx.state).await.expect("recover"), 0);

        backdate_assessment(&ctx, &submission.id, primitive_now_utc() - Duration::hours(1)).await;
        assert_eq!(recover_stale_requests(&ctx.state).await.expect("recover"), 1);

        let failed = assessments::find_by_submission(ctx.db(), &submission.id).await.unwrap().unwrap();
        assert_eq!(failed.status, AssessmentStatus::Failed);
        assert_eq!(failed.retry_count, 1);
        assert!(failed.error_message.contains("failed to store assessment result"));
    }

    #[tokio::test]
    async fn orphan_recovery_skips_assessments_with_open_requests() {
        let ctx = test_support::setup_test_context().await;
        let request = queued(&ctx).await;
        let now = primitive_now_utc();
        assessment::get_or_create(ctx.db(), &request.submission_id, TEST_MODEL, now)
            .await
            .expect("processing assessment");
        backdate_assessment(&ctx, &request.submission_id, now - Duration::hours(1)).await;

        assert_eq!(recover_stale_requests(&ctx.state).await.expect("recover"), 0);

        let untouched =
            assessments::find_by_submission(ctx.db(), &request.submission_id).await.unwrap().unwrap();
        assert_eq!(untouched.status, AssessmentStatus::Processing);
        assert!(untouched.error_message.is_empty());
    }

    #[tokio::test]
    async fn due_failed_requests_are_requeued() {
        let ctx = test_support::setup_test_context().await;
        let now = primitive_now_utc();
        let due = queued(&ctx).await;
        let waiting = queued(&ctx).await;
        set_request(&ctx, &due.id, RequestStatus::Failed, None, Some(now - Duration::minutes(1))).await;
        set_request(&ctx, &waiting.id, RequestStatus::Failed, None, Some(now + Duration::minutes(20)))
            .await;

        let requeued = retry_failed_requests(&ctx.state).await.expect("retry");

        assert_eq!(requeued, 1);
        assert_eq!(status_of(&ctx, &due.id).await, RequestStatus::Queued);
        assert_eq!(status_of(&ctx, &waiting.id).await, RequestStatus::Failed);
    }

    #[tokio::test]
    async fn only_newest_failed_request_per_submission_is_requeued() {
        let ctx = test_support::setup_test_context().await;
        let past = primitive_now_utc() - Duration::minutes(5);
        let older = queued(&ctx).await;
        set_request(&ctx, &older.id, RequestStatus::Failed, None, Some(past)).await;
        let newer = queue::enqueue(ctx.db(), &older.submission_id, 0).await.expect("second").0;
        set_request(&ctx, &newer.id, RequestStatus::Failed, None, Some(past)).await;

        let requeued = retry_failed_requests(&ctx.state).await.expect("retry");

        assert_eq!(requeued, 1);
        assert_eq!(status_of(&ctx, &newer.id).await, RequestStatus::Queued);
        assert_eq!(status_of(&ctx, &older.id).await, RequestStatus::Failed);
    }
}
