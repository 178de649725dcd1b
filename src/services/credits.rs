use async_trait::async_trait;
use serde_json::json;
use sqlx::PgPool;

use crate::core::time::primitive_now_utc;
use crate::db::types::SubscriptionStatus;
use crate::repositories::subscriptions;

const ASSESSMENT_USAGE: &str = "assessment";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CreditDecision {
    Granted,
    Denied(String),
}

/// Billing collaborator consulted by the HTTP layer before any scoring work is queued.
///
/// A submission is charged at most once; asking again for it is granted for free.
#[async_trait]
pub(crate) trait CreditGate: Send + Sync {
    async fn try_consume(
        &self,
        user_id: &str,
        submission_id: &str,
    ) -> Result<CreditDecision, sqlx::Error>;
}

/// Reads and decrements the billing subsystem's credit counters.
#[derive(Clone)]
pub(crate) struct PgCreditGate {
    pool: PgPool,
    enforced: bool,
}

impl PgCreditGate {
    pub(crate) fn new(pool: PgPool, enforced: bool) -> Self {
        Self { pool, enforced }
    }
}

#[async_trait]
impl CreditGate for PgCreditGate {
    async fn try_consume(
        &self,
        user_id: &str,
        submission_id: &str,
    ) -> Result<CreditDecision, sqlx::Error> {
        if !self.enforced {
            return Ok(CreditDecision::Granted);
        }

        let now = primitive_now_utc();
        let mut tx = self.pool.begin().await?;

        // The subscription lock serialises charges for one user.
        let subscription = subscriptions::lock_for_user(&mut tx, user_id).await?;
        if subscriptions::has_usage_for_submission(&mut tx, ASSESSMENT_USAGE, submission_id).await? {
            tracing::debug!(user_id, submission_id, "Submission already charged");
            return Ok(CreditDecision::Granted);
        }

        let Some(subscription) = subscription else {
            return Ok(CreditDecision::Denied("No active subscription".to_string()));
        };

        if subscription.status != SubscriptionStatus::Active
            || subscription.current_period_end <= now
        {
            return Ok(CreditDecision::Denied("Subscription is not active".to_string()));
        }

        if !subscriptions::consume_assessment_credit(&mut tx, &subscription.id, now).await? {
            return Ok(CreditDecision::Denied("No assessment credits remaining".to_string()));
        }

        subscriptions::insert_usage_record(
            &mut tx,
            subscriptions::NewUsageRecord {
                user_id,
                subscription_id: &subscription.id,
                usage_type: ASSESSMENT_USAGE,
                description: format!("AI Assessment for submission {submission_id}"),
                metadata: json!({"submission_id": submission_id}),
                created_at: now,
            },
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            user_id,
            submission_id,
            credits_remaining = subscription.assessment_credits_remaining - 1,
            "Assessment credit consumed"
        );

        Ok(CreditDecision::Granted)
    }
}
