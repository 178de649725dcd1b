use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "moduletype", rename_all = "lowercase")]
pub(crate) enum ModuleType {
    Academic,
    General,
}

impl ModuleType {
    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::Academic => "Academic",
            Self::General => "General Training",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "submissionstatus", rename_all = "lowercase")]
pub(crate) enum SubmissionStatus {
    Draft,
    Submitted,
    Assessed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "subscriptionstatus", rename_all = "snake_case")]
pub(crate) enum SubscriptionStatus {
    Active,
    Canceled,
    PastDue,
    Unpaid,
    Paused,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "assessmentstatus", rename_all = "lowercase")]
pub(crate) enum AssessmentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Retry,
}

impl AssessmentStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Retry => "retry",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "feedbackcategory", rename_all = "snake_case")]
pub(crate) enum FeedbackCategory {
    Overall,
    TaskAchievement,
    CoherenceCohesion,
    LexicalResource,
    GrammarAccuracy,
    Inline,
    Suggestion,
}

impl FeedbackCategory {
    pub(crate) const ALL: [Self; 7] = [
        Self::Overall,
        Self::TaskAchievement,
        Self::CoherenceCohesion,
        Self::LexicalResource,
        Self::GrammarAccuracy,
        Self::Inline,
        Self::Suggestion,
    ];

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Overall => "overall",
            Self::TaskAchievement => "task_achievement",
            Self::CoherenceCohesion => "coherence_cohesion",
            Self::LexicalResource => "lexical_resource",
            Self::GrammarAccuracy => "grammar_accuracy",
            Self::Inline => "inline",
            Self::Suggestion => "suggestion",
        }
    }

    /// Accepts the wire names plus `task_response`, which models use for Task 2 essays.
    pub(crate) fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        if normalized == "task_response" {
            return Some(Self::TaskAchievement);
        }
        Self::ALL.into_iter().find(|category| category.as_str() == normalized)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "feedbackseverity", rename_all = "lowercase")]
pub(crate) enum FeedbackSeverity {
    Info,
    Suggestion,
    Warning,
    Error,
}

impl FeedbackSeverity {
    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "info" => Some(Self::Info),
            "suggestion" => Some(Self::Suggestion),
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "requeststatus", rename_all = "lowercase")]
pub(crate) enum RequestStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl RequestStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}
