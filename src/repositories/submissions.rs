use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Submission;
use crate::db::types::SubmissionStatus;

pub(crate) const COLUMNS: &str = "\
    id, user_id, task_id, content, word_count, status, submitted_at, created_at, updated_at";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!("SELECT {COLUMNS} FROM submissions WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Flips a submission to `assessed`. Returns false when it already was.
pub(crate) async fn mark_assessed(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE submissions
         SET status = $1,
             updated_at = $2
         WHERE id = $3 AND status <> $1",
    )
    .bind(SubmissionStatus::Assessed)
    .bind(now)
    .bind(id)
    .execute(&mut **tx)
    .await?;

    Ok(updated.rows_affected() > 0)
}
