use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{
    AssessmentStatus, FeedbackCategory, FeedbackSeverity, ModuleType, RequestStatus,
    SubmissionStatus, SubscriptionStatus,
};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct User {
    pub(crate) id: String,
    pub(crate) username: String,
    pub(crate) email: String,
    pub(crate) is_active: bool,
    pub(crate) is_staff: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct PracticeTask {
    pub(crate) id: String,
    pub(crate) task_code: String,
    pub(crate) title: String,
    pub(crate) module_type: ModuleType,
    pub(crate) task_number: i32,
    pub(crate) instruction: String,
    pub(crate) prompt: String,
    pub(crate) word_limit_min: i32,
    pub(crate) word_limit_max: i32,
    pub(crate) time_limit_minutes: i32,
    pub(crate) is_active: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Submission {
    pub(crate) id: String,
    pub(crate) user_id: String,
    pub(crate) task_id: String,
    pub(crate) content: String,
    pub(crate) word_count: i32,
    pub(crate) status: SubmissionStatus,
    pub(crate) submitted_at: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct UserSubscription {
    pub(crate) id: String,
    pub(crate) user_id: String,
    pub(crate) status: SubscriptionStatus,
    pub(crate) current_period_start: PrimitiveDateTime,
    pub(crate) current_period_end: PrimitiveDateTime,
    pub(crate) assessment_credits_used: i32,
    pub(crate) assessment_credits_remaining: i32,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Assessment {
    pub(crate) id: String,
    pub(crate) submission_id: String,
    pub(crate) status: AssessmentStatus,
    pub(crate) overall_band_score: Option<f64>,
    pub(crate) task_achievement_score: Option<f64>,
    pub(crate) coherence_cohesion_score: Option<f64>,
    pub(crate) lexical_resource_score: Option<f64>,
    pub(crate) grammar_accuracy_score: Option<f64>,
    pub(crate) ai_model_used: String,
    pub(crate) processing_time_seconds: Option<f64>,
    pub(crate) ai_confidence_score: Option<f64>,
    pub(crate) error_message: String,
    pub(crate) retry_count: i32,
    pub(crate) started_at: Option<PrimitiveDateTime>,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

impl Assessment {
    /// Criterion scores in rubric order, present only once all four are set.
    pub(crate) fn criterion_scores(&self) -> Option<[f64; 4]> {
        Some([
            self.task_achievement_score?,
            self.coherence_cohesion_score?,
            self.lexical_resource_score?,
            self.grammar_accuracy_score?,
        ])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Feedback {
    pub(crate) id: String,
    pub(crate) assessment_id: String,
    pub(crate) category: FeedbackCategory,
    pub(crate) severity: FeedbackSeverity,
    pub(crate) title: String,
    pub(crate) content: String,
    pub(crate) suggestion: String,
    pub(crate) highlighted_text: String,
    pub(crate) text_start_position: Option<i32>,
    pub(crate) text_end_position: Option<i32>,
    pub(crate) ai_confidence: Option<f64>,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct AssessmentRequest {
    pub(crate) id: String,
    pub(crate) submission_id: String,
    pub(crate) status: RequestStatus,
    pub(crate) priority: i32,
    pub(crate) processing_started_at: Option<PrimitiveDateTime>,
    pub(crate) processing_completed_at: Option<PrimitiveDateTime>,
    pub(crate) error_details: String,
    pub(crate) retry_after: Option<PrimitiveDateTime>,
    pub(crate) assessment_id: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}
