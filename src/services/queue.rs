//! Request queue operations that carry policy on top of the repository.

use sqlx::PgPool;
use thiserror::Error;

use crate::core::{metrics as app_metrics, time::primitive_now_utc};
use crate::db::models::AssessmentRequest;
use crate::db::types::{RequestStatus, SubmissionStatus};
use crate::repositories::{assessment_requests, submissions};

#[derive(Debug, Error)]
pub(crate) enum QueueError {
    #[error("assessment request {0} not found")]
    NotFound(String),
    #[error("assessment request is {0}, expected {1}")]
    InvalidState(&'static str, &'static str),
    #[error("submission already has an open assessment request")]
    AlreadyOpen,
    #[error("submission is already assessed")]
    AlreadyAssessed,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Queues a submission for scoring, returning the existing open request if there is one.
pub(crate) async fn enqueue(
    pool: &PgPool,
    submission_id: &str,
    priority: i32,
) -> Result<(AssessmentRequest, bool), QueueError> {
    let (request, created) =
        assessment_requests::enqueue(pool, submission_id, priority, primitive_now_utc()).await?;

    if created {
        metrics::counter!(app_metrics::REQUESTS_ENQUEUED_TOTAL).increment(1);
        tracing::info!(
            submission_id,
            request_id = %request.id,
            priority,
            "Assessment request queued"
        );
    } else {
        tracing::debug!(
            submission_id,
            request_id = %request.id,
            status = request.status.as_str(),
            "Assessment request already open"
        );
    }

    Ok((request, created))
}

/// Administrative retry of a failed request.
pub(crate) async fn requeue_failed(
    pool: &PgPool,
    request_id: &str,
) -> Result<AssessmentRequest, QueueError> {
    let request = assessment_requests::find_by_id(pool, request_id)
        .await?
        .ok_or_else(|| QueueError::NotFound(request_id.to_string()))?;

    if request.status != RequestStatus::Failed {
        return Err(QueueError::InvalidState(request.status.as_str(), "failed"));
    }

    let submission = submissions::find_by_id(pool, &request.submission_id).await?;
    if submission.is_some_and(|submission| submission.status == SubmissionStatus::Assessed) {
        return Err(QueueError::AlreadyAssessed);
    }

    if assessment_requests::find_open_for_submission(pool, &request.submission_id)
        .await?
        .is_some()
    {
        return Err(QueueError::AlreadyOpen);
    }

    let requeued = match assessment_requests::requeue_failed(pool, request_id, primitive_now_utc())
        .await
    {
        Ok(Some(requeued)) => requeued,
        Ok(None) => return Err(QueueError::InvalidState("no longer failed", "failed")),
        Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
            return Err(QueueError::AlreadyOpen);
        }
        Err(err) => return Err(err.into()),
    };

    metrics::counter!(app_metrics::REQUESTS_RETRIED_TOTAL, "trigger" => "manual").increment(1);
    tracing::info!(
        request_id,
        submission_id = %requeued.submission_id,
        "Failed assessment request requeued"
    );

    Ok(requeued)
}

/// Cancels a request that has not been claimed yet.
pub(crate) async fn cancel(
    pool: &PgPool,
    request_id: &str,
) -> Result<AssessmentRequest, QueueError> {
    if let Some(cancelled) =
        assessment_requests::cancel(pool, request_id, primitive_now_utc()).await?
    {
        tracing::info!(request_id, submission_id = %cancelled.submission_id, "Assessment request cancelled");
        return Ok(cancelled);
    }

    match assessment_requests::find_by_id(pool, request_id).await? {
        Some(request) => Err(QueueError::InvalidState(request.status.as_str(), "queued")),
        None => Err(QueueError::NotFound(request_id.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::ModuleType;
    use crate::test_support;

    async fn submitted(ctx: &test_support::TestContext) -> String {
        let user = test_support::insert_user(ctx.db(), &format!("u{}", uuid::Uuid::new_v4().simple()), false)
            .await;
        let task = test_support::insert_task(ctx.db(), 2, ModuleType::Academic).await;
        test_support::insert_submission(ctx.db(), &user.id, &task, 280, SubmissionStatus::Submitted)
            .await
            .id
    }

    async fn force_status(pool: &PgPool, request_id: &str, status: RequestStatus) {
        sqlx::query("UPDATE assessment_requests SET status = $1 WHERE id = $2")
            .bind(status)
            .bind(request_id)
            .execute(pool)
            .await
            .expect("force status");
    }

    #[tokio::test]
    async fn enqueue_returns_existing_open_request() {
        let ctx = test_support::setup_test_context().await;
        let submission_id = submitted(&ctx).await;

        let (first, created) = enqueue(ctx.db(), &submission_id, 0).await.expect("first");
        let (second, created_again) = enqueue(ctx.db(), &submission_id, 5).await.expect("second");

        assert!(created);
        assert!(!created_again);
        assert_eq!(first.id, second.id);
        assert_eq!(second.priority, 0);
        assert_eq!(first.status, RequestStatus::Queued);
    }

    #[tokio::test]
    async fn concurrent_claims_never_share_an_entry() {
        let ctx = test_support::setup_test_context().await;
        for _ in 0..20 {
            let submission_id = submitted(&ctx).await;
            enqueue(ctx.db(), &submission_id, 0).await.expect("enqueue");
        }

        let mut claimers = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let pool = ctx.db().clone();
            claimers.spawn(async move {
                assessment_requests::claim_batch(&pool, 3, primitive_now_utc()).await.expect("claim")
            });
        }

        let mut claimed = Vec::new();
        while let Some(batch) = claimers.join_next().await {
            claimed.extend(batch.expect("claimer").into_iter().map(|request| request.id));
        }

        let unique: std::collections::HashSet<&String> = claimed.iter().collect();
        assert_eq!(claimed.len(), 20);
        assert_eq!(unique.len(), 20);
    }

    #[tokio::test]
    async fn enqueue_after_terminal_request_creates_new_one() {
        let ctx = test_support::setup_test_context().await;
        let submission_id = submitted(&ctx).await;

        let (first, _) = enqueue(ctx.db(), &submission_id, 0).await.expect("first");
        cancel(ctx.db(), &first.id).await.expect("cancel");

        let (second, created) = enqueue(ctx.db(), &submission_id, 0).await.expect("second");
        assert!(created);
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn cancel_only_applies_to_queued_requests() {
        let ctx = test_support::setup_test_context().await;
        let submission_id = submitted(&ctx).await;
        let (request, _) = enqueue(ctx.db(), &submission_id, 0).await.expect("enqueue");
        force_status(ctx.db(), &request.id, RequestStatus::Processing).await;

        let err = cancel(ctx.db(), &request.id).await.expect_err("processing");
        assert!(matches!(err, QueueError::InvalidState("processing", "queued")));

        let missing = cancel(ctx.db(), "missing").await.expect_err("missing");
        assert!(matches!(missing, QueueError::NotFound(_)));
    }

    #[tokio::test]
    async fn requeue_rules() {
        let ctx = test_support::setup_test_context().await;
        let submission_id = submitted(&ctx).await;
        let (failed, _) = enqueue(ctx.db(), &submission_id, 0).await.expect("enqueue");

        let not_failed = requeue_failed(ctx.db(), &failed.id).await.expect_err("queued");
        assert!(matches!(not_failed, QueueError::InvalidState("queued", "failed")));

        force_status(ctx.db(), &failed.id, RequestStatus::Failed).await;
        let (open, _) = enqueue(ctx.db(), &submission_id, 0).await.expect("second");
        let blocked = requeue_failed(ctx.db(), &failed.id).await.expect_err("open exists");
        assert!(matches!(blocked, QueueError::AlreadyOpen));

        cancel(ctx.db(), &open.id).await.expect("cancel open");
        let requeued = requeue_failed(ctx.db(), &failed.id).await.expect("requeue");
        assert_eq!(requeued.status, RequestStatus::Queued);
        assert!(requeued.error_details.is_empty());
        assert_eq!(requeued.retry_after, None);
    }

    #[tokio::test]
    async fn assessed_submission_is_not_requeued() {
        let ctx = test_support::setup_test_context().await;
        let submission_id = submitted(&ctx).await;
        let (request, _) = enqueue(ctx.db(), &submission_id, 0).await.expect("enqueue");
        force_status(ctx.db(), &request.id, RequestStatus::Failed).await;
        sqlx::query("UPDATE submissions SET status = 'assessed' WHERE id = $1")
            .bind(&submission_id)
            .execute(ctx.db())
            .await
            .unwrap();

        let err = requeue_failed(ctx.db(), &request.id).await.expect_err("assessed");
        assert!(matches!(err, QueueError::AlreadyAssessed));
    }
}
