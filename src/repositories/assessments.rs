use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Assessment;
use crate::db::types::{AssessmentStatus, ModuleType, RequestStatus};

pub(crate) const COLUMNS: &str = "\
    id, submission_id, status, overall_band_score, task_achievement_score, \
    coherence_cohesion_score, lexical_resource_score, grammar_accuracy_score, ai_model_used, \
    processing_time_seconds, ai_confidence_score, error_message, retry_count, started_at, \
    completed_at, created_at, updated_at";

pub(crate) struct CompletionUpdate<'a> {
    pub(crate) overall_band_score: f64,
    pub(crate) task_achievement_score: f64,
    pub(crate) coherence_cohesion_score: f64,
    pub(crate) lexical_resource_score: f64,
    pub(crate) grammar_accuracy_score: f64,
    pub(crate) ai_confidence_score: f64,
    pub(crate) processing_time_seconds: f64,
    pub(crate) ai_model_used: &'a str,
    pub(crate) completed_at: PrimitiveDateTime,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct HistoryRow {
    pub(crate) assessment_id: String,
    pub(crate) submission_id: String,
    pub(crate) task_code: String,
    pub(crate) task_title: String,
    pub(crate) task_number: i32,
    pub(crate) module_type: ModuleType,
    pub(crate) overall_band_score: Option<f64>,
    pub(crate) task_achievement_score: Option<f64>,
    pub(crate) coherence_cohesion_score: Option<f64>,
    pub(crate) lexical_resource_score: Option<f64>,
    pub(crate) grammar_accuracy_score: Option<f64>,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Assessment>, sqlx::Error> {
    sqlx::query_as::<_, Assessment>(&format!("SELECT {COLUMNS} FROM assessments WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn find_by_submission(
    pool: &PgPool,
    submission_id: &str,
) -> Result<Option<Assessment>, sqlx::Error> {
    sqlx::query_as::<_, Assessment>(&format!(
        "SELECT {COLUMNS} FROM assessments WHERE submission_id = $1"
    ))
    .bind(submission_id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn lock_by_submission(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    submission_id: &str,
) -> Result<Option<Assessment>, sqlx::Error> {
    sqlx::query_as::<_, Assessment>(&format!(
        "SELECT {COLUMNS} FROM assessments WHERE submission_id = $1 FOR UPDATE"
    ))
    .bind(submission_id)
    .fetch_optional(&mut **tx)
    .await
}

/// Inserts a `processing` row; `None` when another transaction created one first.
pub(crate) async fn insert_processing(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: &str,
    submission_id: &str,
    model: &str,
    now: PrimitiveDateTime,
) -> Result<Option<Assessment>, sqlx::Error> {
    sqlx::query_as::<_, Assessment>(&format!(
        "INSERT INTO assessments (
            id, submission_id, status, ai_model_used, started_at, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$5,$5)
        ON CONFLICT (submission_id) DO NOTHING
        RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(submission_id)
    .bind(AssessmentStatus::Processing)
    .bind(model)
    .bind(now)
    .fetch_optional(&mut **tx)
    .await
}

pub(crate) async fn mark_processing(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: &str,
    model: &str,
    now: PrimitiveDateTime,
) -> Result<Option<Assessment>, sqlx::Error> {
    sqlx::query_as::<_, Assessment>(&format!(
        "UPDATE assessments
         SET status = $1,
             ai_model_used = $2,
             started_at = $3,
             completed_at = NULL,
             updated_at = $3
         WHERE id = $4 AND status <> $5
         RETURNING {COLUMNS}"
    ))
    .bind(AssessmentStatus::Processing)
    .bind(model)
    .bind(now)
    .bind(id)
    .bind(AssessmentStatus::Completed)
    .fetch_optional(&mut **tx)
    .await
}

/// Writes the final scores. `None` means the row was already completed elsewhere.
pub(crate) async fn complete(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: &str,
    update: CompletionUpdate<'_>,
) -> Result<Option<Assessment>, sqlx::Error> {
    sqlx::query_as::<_, Assessment>(&format!(
        "UPDATE assessments
         SET status = $1,
             overall_band_score = $2,
             task_achievement_score = $3,
             coherence_cohesion_score = $4,
             lexical_resource_score = $5,
             grammar_accuracy_score = $6,
             ai_confidence_score = $7,
             processing_time_seconds = $8,
             ai_model_used = $9,
             error_message = '',
             completed_at = $10,
             updated_at = $10
         WHERE id = $11 AND status <> $1
         RETURNING {COLUMNS}"
    ))
    .bind(AssessmentStatus::Completed)
    .bind(update.overall_band_score)
    .bind(update.task_achievement_score)
    .bind(update.coherence_cohesion_score)
    .bind(update.lexical_resource_score)
    .bind(update.grammar_accuracy_score)
    .bind(update.ai_confidence_score)
    .bind(update.processing_time_seconds)
    .bind(update.ai_model_used)
    .bind(update.completed_at)
    .bind(id)
    .fetch_optional(&mut **tx)
    .await
}

/// Records a failed attempt. Completed rows are left alone and yield `None`.
pub(crate) async fn fail(
    pool: &PgPool,
    id: &str,
    message: &str,
    now: PrimitiveDateTime,
) -> Result<Option<Assessment>, sqlx::Error> {
    sqlx::query_as::<_, Assessment>(&format!(
        "UPDATE assessments
         SET status = $1,
             error_message = $2,
             retry_count = retry_count + 1,
             updated_at = $3
         WHERE id = $4 AND status <> $5
         RETURNING {COLUMNS}"
    ))
    .bind(AssessmentStatus::Failed)
    .bind(message)
    .bind(now)
    .bind(id)
    .bind(AssessmentStatus::Completed)
    .fetch_optional(pool)
    .await
}

/// Leaves a `processing` row as it is apart from the error message.
pub(crate) async fn note_error(
    pool: &PgPool,
    id: &str,
    message: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE assessments
         SET error_message = $1,
             updated_at = $2
         WHERE id = $3 AND status = $4",
    )
    .bind(message)
    .bind(now)
    .bind(id)
    .bind(AssessmentStatus::Processing)
    .execute(pool)
    .await?;

    Ok(updated.rows_affected() > 0)
}

/// Fails `processing` rows started before `stale_before` that no open request covers.
///
/// An error message recorded by the abandoned attempt is kept.
pub(crate) async fn fail_stale_orphans(
    pool: &PgPool,
    stale_before: PrimitiveDateTime,
    message: &str,
    now: PrimitiveDateTime,
) -> Result<Vec<Assessment>, sqlx::Error> {
    sqlx::query_as::<_, Assessment>(&format!(
        "UPDATE assessments a
         SET status = $1,
             error_message = CASE WHEN a.error_message = '' THEN $2 ELSE a.error_message END,
             retry_count = a.retry_count + 1,
             updated_at = $3
         WHERE a.status = $4
           AND (a.started_at IS NULL OR a.started_at < $5)
           AND NOT EXISTS (
               SELECT 1 FROM assessment_requests r
               WHERE r.submission_id = a.submission_id AND r.status IN ($6, $7)
           )
         RETURNING {COLUMNS}"
    ))
    .bind(AssessmentStatus::Failed)
    .bind(message)
    .bind(now)
    .bind(AssessmentStatus::Processing)
    .bind(stale_before)
    .bind(RequestStatus::Queued)
    .bind(RequestStatus::Processing)
    .fetch_all(pool)
    .await
}

/// Fails the assessment of a submission only if it is still `processing`.
pub(crate) async fn fail_if_processing(
    pool: &PgPool,
    submission_id: &str,
    message: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE assessments
         SET status = $1,
             error_message = $2,
             retry_count = retry_count + 1,
             updated_at = $3
         WHERE submission_id = $4 AND status = $5",
    )
    .bind(AssessmentStatus::Failed)
    .bind(message)
    .bind(now)
    .bind(submission_id)
    .bind(AssessmentStatus::Processing)
    .execute(pool)
    .await?;

    Ok(updated.rows_affected() > 0)
}

pub(crate) async fn list_completed_for_user(
    pool: &PgPool,
    user_id: &str,
) -> Result<Vec<HistoryRow>, sqlx::Error> {
    sqlx::query_as::<_, HistoryRow>(
        "SELECT a.id AS assessment_id,
                a.submission_id,
                t.task_code,
                t.title AS task_title,
                t.task_number,
                t.module_type,
                a.overall_band_score,
                a.task_achievement_score,
                a.coherence_cohesion_score,
                a.lexical_resource_score,
                a.grammar_accuracy_score,
                a.completed_at
         FROM assessments a
         JOIN submissions s ON s.id = a.submission_id
         JOIN practice_tasks t ON t.id = s.task_id
         WHERE s.user_id = $1 AND a.status = $2
         ORDER BY a.completed_at DESC NULLS LAST, a.created_at DESC",
    )
    .bind(user_id)
    .bind(AssessmentStatus::Completed)
    .fetch_all(pool)
    .await
}
