use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Feedback;
use crate::db::types::{FeedbackCategory, FeedbackSeverity};

const COLUMNS: &str = "\
    id, assessment_id, category, severity, title, content, suggestion, highlighted_text, \
    text_start_position, text_end_position, ai_confidence, created_at";

pub(crate) struct NewFeedback<'a> {
    pub(crate) id: String,
    pub(crate) assessment_id: &'a str,
    pub(crate) category: FeedbackCategory,
    pub(crate) severity: FeedbackSeverity,
    pub(crate) title: &'a str,
    pub(crate) content: &'a str,
    pub(crate) suggestion: &'a str,
    pub(crate) highlighted_text: &'a str,
    pub(crate) text_start_position: Option<i32>,
    pub(crate) text_end_position: Option<i32>,
    pub(crate) ai_confidence: f64,
    pub(crate) created_at: PrimitiveDateTime,
}

pub(crate) async fn insert(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    params: NewFeedback<'_>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO assessment_feedback (
            id, assessment_id, category, severity, title, content, suggestion,
            highlighted_text, text_start_position, text_end_position, ai_confidence, created_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)",
    )
    .bind(params.id)
    .bind(params.assessment_id)
    .bind(params.category)
    .bind(params.severity)
    .bind(params.title)
    .bind(params.content)
    .bind(params.suggestion)
    .bind(params.highlighted_text)
    .bind(params.text_start_position)
    .bind(params.text_end_position)
    .bind(params.ai_confidence)
    .bind(params.created_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

pub(crate) async fn list_by_assessment(
    pool: &PgPool,
    assessment_id: &str,
) -> Result<Vec<Feedback>, sqlx::Error> {
    sqlx::query_as::<_, Feedback>(&format!(
        "SELECT {COLUMNS} FROM assessment_feedback
         WHERE assessment_id = $1
         ORDER BY category, text_start_position NULLS FIRST, created_at, id"
    ))
    .bind(assessment_id)
    .fetch_all(pool)
    .await
}
