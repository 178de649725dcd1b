use serde_json::Value;
use sqlx::types::Json;
use time::PrimitiveDateTime;

use crate::db::models::UserSubscription;

const COLUMNS: &str = "\
    id, user_id, status, current_period_start, current_period_end, assessment_credits_used, \
    assessment_credits_remaining, created_at, updated_at";

pub(crate) async fn lock_for_user(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: &str,
) -> Result<Option<UserSubscription>, sqlx::Error> {
    sqlx::query_as::<_, UserSubscription>(&format!(
        "SELECT {COLUMNS} FROM user_subscriptions WHERE user_id = $1 FOR UPDATE"
    ))
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await
}

/// Moves one credit from remaining to used. False when nothing was left.
pub(crate) async fn consume_assessment_credit(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    subscription_id: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE user_subscriptions
         SET assessment_credits_remaining = assessment_credits_remaining - 1,
             assessment_credits_used = assessment_credits_used + 1,
             updated_at = $1
         WHERE id = $2 AND assessment_credits_remaining > 0",
    )
    .bind(now)
    .bind(subscription_id)
    .execute(&mut **tx)
    .await?;

    Ok(updated.rows_affected() > 0)
}

/// True when the submission already carries a usage record of this type.
pub(crate) async fn has_usage_for_submission(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    usage_type: &str,
    submission_id: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS (
            SELECT 1 FROM usage_records
            WHERE usage_type = $1 AND metadata->>'submission_id' = $2
        )",
    )
    .bind(usage_type)
    .bind(submission_id)
    .fetch_one(&mut **tx)
    .await
}

pub(crate) struct NewUsageRecord<'a> {
    pub(crate) user_id: &'a str,
    pub(crate) subscription_id: &'a str,
    pub(crate) usage_type: &'a str,
    pub(crate) description: String,
    pub(crate) metadata: Value,
    pub(crate) created_at: PrimitiveDateTime,
}

pub(crate) async fn insert_usage_record(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    params: NewUsageRecord<'_>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO usage_records (
            id, user_id, subscription_id, usage_type, quantity, description, metadata, created_at
        ) VALUES ($1,$2,$3,$4,1,$5,$6,$7)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(params.user_id)
    .bind(params.subscription_id)
    .bind(params.usage_type)
    .bind(params.description)
    .bind(Json(params.metadata))
    .bind(params.created_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
