use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::AssessmentRequest;
use crate::db::types::{RequestStatus, SubmissionStatus};

pub(crate) const COLUMNS: &str = "\
    id, submission_id, status, priority, processing_started_at, processing_completed_at, \
    error_details, retry_after, assessment_id, created_at, updated_at";

const ENQUEUE_ATTEMPTS: usize = 3;

/// Returns the open request for the submission, creating one when none exists.
/// The flag is true only when this call inserted the row.
pub(crate) async fn enqueue(
    pool: &PgPool,
    submission_id: &str,
    priority: i32,
    now: PrimitiveDateTime,
) -> Result<(AssessmentRequest, bool), sqlx::Error> {
    for _ in 0..ENQUEUE_ATTEMPTS {
        if let Some(existing) = find_open_for_submission(pool, submission_id).await? {
            return Ok((existing, false));
        }

        let inserted = sqlx::query_as::<_, AssessmentRequest>(&format!(
            "INSERT INTO assessment_requests (
                id, submission_id, status, priority, created_at, updated_at
            ) VALUES ($1,$2,$3,$4,$5,$5)
            ON CONFLICT (submission_id) WHERE status IN ('queued', 'processing') DO NOTHING
            RETURNING {COLUMNS}"
        ))
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(submission_id)
        .bind(RequestStatus::Queued)
        .bind(priority)
        .bind(now)
        .fetch_optional(pool)
        .await?;

        if let Some(created) = inserted {
            return Ok((created, true));
        }
    }

    // The open request kept finishing between our read and insert.
    find_open_for_submission(pool, submission_id).await?.ok_or(sqlx::Error::RowNotFound).map(
        |existing| (existing, false),
    )
}

/// Moves up to `limit` queued rows to `processing`, highest priority then oldest first.
pub(crate) async fn claim_batch(
    pool: &PgPool,
    limit: i64,
    now: PrimitiveDateTime,
) -> Result<Vec<AssessmentRequest>, sqlx::Error> {
    let mut claimed = sqlx::query_as::<_, AssessmentRequest>(&format!(
        "WITH candidate AS (
            SELECT id
            FROM assessment_requests
            WHERE status = $1
            ORDER BY priority DESC, created_at ASC, id
            FOR UPDATE SKIP LOCKED
            LIMIT $2
        )
        UPDATE assessment_requests
        SET status = $3,
            processing_started_at = $4,
            processing_completed_at = NULL,
            updated_at = $4
        FROM candidate
        WHERE assessment_requests.id = candidate.id
        RETURNING {}",
        qualified_columns("assessment_requests")
    ))
    .bind(RequestStatus::Queued)
    .bind(limit.max(0))
    .bind(RequestStatus::Processing)
    .bind(now)
    .fetch_all(pool)
    .await?;

    // UPDATE ... RETURNING does not preserve the CTE order.
    claimed.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });

    Ok(claimed)
}

pub(crate) async fn mark_completed(
    pool: &PgPool,
    id: &str,
    assessment_id: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE assessment_requests
         SET status = $1,
             assessment_id = $2,
             error_details = '',
             retry_after = NULL,
             processing_completed_at = $3,
             updated_at = $3
         WHERE id = $4 AND status = $5",
    )
    .bind(RequestStatus::Completed)
    .bind(assessment_id)
    .bind(now)
    .bind(id)
    .bind(RequestStatus::Processing)
    .execute(pool)
    .await?;

    Ok(updated.rows_affected() > 0)
}

pub(crate) async fn mark_failed(
    pool: &PgPool,
    id: &str,
    error: &str,
    assessment_id: Option<&str>,
    retry_after: PrimitiveDateTime,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE assessment_requests
         SET status = $1,
             error_details = $2,
             assessment_id = COALESCE($3, assessment_id),
             retry_after = $4,
             processing_completed_at = $5,
             updated_at = $5
         WHERE id = $6 AND status = $7",
    )
    .bind(RequestStatus::Failed)
    .bind(error)
    .bind(assessment_id)
    .bind(retry_after)
    .bind(now)
    .bind(id)
    .bind(RequestStatus::Processing)
    .execute(pool)
    .await?;

    Ok(updated.rows_affected() > 0)
}

/// Resets a failed row to `queued`. `None` when the row is not failed.
/// Fails with a unique violation if another open request exists for the submission.
pub(crate) async fn requeue_failed(
    pool: &PgPool,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<Option<AssessmentRequest>, sqlx::Error> {
    sqlx::query_as::<_, AssessmentRequest>(&format!(
        "UPDATE assessment_requests
         SET status = $1,
             error_details = '',
             retry_after = NULL,
             processing_started_at = NULL,
             processing_completed_at = NULL,
             updated_at = $2
         WHERE id = $3 AND status = $4
         RETURNING {COLUMNS}"
    ))
    .bind(RequestStatus::Queued)
    .bind(now)
    .bind(id)
    .bind(RequestStatus::Failed)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn cancel(
    pool: &PgPool,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<Option<AssessmentRequest>, sqlx::Error> {
    sqlx::query_as::<_, AssessmentRequest>(&format!(
        "UPDATE assessment_requests
         SET status = $1,
             processing_completed_at = $2,
             updated_at = $2
         WHERE id = $3 AND status = $4
         RETURNING {COLUMNS}"
    ))
    .bind(RequestStatus::Cancelled)
    .bind(now)
    .bind(id)
    .bind(RequestStatus::Queued)
    .fetch_optional(pool)
    .await
}

/// Requeues failed rows whose `retry_after` has passed. Only the newest failed row per
/// submission is eligible, and only while the submission has no open request and is
/// not yet assessed.
pub(crate) async fn requeue_due_failed(
    pool: &PgPool,
    now: PrimitiveDateTime,
) -> Result<Vec<AssessmentRequest>, sqlx::Error> {
    sqlx::query_as::<_, AssessmentRequest>(&format!(
        "UPDATE assessment_requests r
         SET status = $1,
             error_details = '',
             retry_after = NULL,
             processing_started_at = NULL,
             processing_completed_at = NULL,
             updated_at = $2
         WHERE r.status = $3
           AND r.retry_after IS NOT NULL
           AND r.retry_after <= $2
           AND r.id = (
               SELECT f.id FROM assessment_requests f
               WHERE f.submission_id = r.submission_id AND f.status = $3
               ORDER BY f.created_at DESC, f.id DESC
               LIMIT 1
           )
           AND NOT EXISTS (
               SELECT 1 FROM assessment_requests o
               WHERE o.submission_id = r.submission_id AND o.status IN ($1, $4)
           )
           AND NOT EXISTS (
               SELECT 1 FROM submissions s
               WHERE s.id = r.submission_id AND s.status = $5
           )
         RETURNING {}",
        qualified_columns("r")
    ))
    .bind(RequestStatus::Queued)
    .bind(now)
    .bind(RequestStatus::Failed)
    .bind(RequestStatus::Processing)
    .bind(SubmissionStatus::Assessed)
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_stale_processing(
    pool: &PgPool,
    started_before: PrimitiveDateTime,
) -> Result<Vec<AssessmentRequest>, sqlx::Error> {
    sqlx::query_as::<_, AssessmentRequest>(&format!(
        "SELECT {COLUMNS} FROM assessment_requests
         WHERE status = $1
           AND (processing_started_at IS NULL OR processing_started_at < $2)
         ORDER BY processing_started_at NULLS FIRST, id"
    ))
    .bind(RequestStatus::Processing)
    .bind(started_before)
    .fetch_all(pool)
    .await
}

pub(crate) async fn find_by_id(
    pool: &PgPool,
    id: &str,
) -> Result<Option<AssessmentRequest>, sqlx::Error> {
    sqlx::query_as::<_, AssessmentRequest>(&format!(
        "SELECT {COLUMNS} FROM assessment_requests WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn find_open_for_submission(
    pool: &PgPool,
    submission_id: &str,
) -> Result<Option<AssessmentRequest>, sqlx::Error> {
    sqlx::query_as::<_, AssessmentRequest>(&format!(
        "SELECT {COLUMNS} FROM assessment_requests
         WHERE submission_id = $1 AND status IN ($2, $3)"
    ))
    .bind(submission_id)
    .bind(RequestStatus::Queued)
    .bind(RequestStatus::Processing)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn latest_for_submission(
    pool: &PgPool,
    submission_id: &str,
) -> Result<Option<AssessmentRequest>, sqlx::Error> {
    sqlx::query_as::<_, AssessmentRequest>(&format!(
        "SELECT {COLUMNS} FROM assessment_requests
         WHERE submission_id = $1
         ORDER BY created_at DESC, id DESC
         LIMIT 1"
    ))
    .bind(submission_id)
    .fetch_optional(pool)
    .await
}

fn qualified_columns(alias: &str) -> String {
    COLUMNS
        .split(',')
        .map(|column| format!("{alias}.{}", column.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}
