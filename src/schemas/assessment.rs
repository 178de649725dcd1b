use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{Assessment, AssessmentRequest, Feedback, PracticeTask};
use crate::db::types::{
    AssessmentStatus, FeedbackCategory, FeedbackSeverity, ModuleType, RequestStatus,
};
use crate::repositories::assessments::HistoryRow;
use crate::services::insights::ScoreInsights;
use crate::tasks::processor::CycleReport;

#[derive(Debug, Serialize)]
pub(crate) struct AssessmentRequestResponse {
    pub(crate) status: &'static str,
    pub(crate) message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) request_id: Option<String>,
}

/// Polling view. `status` is the assessment status, `request_<status>` while only a
/// request exists, or `not_requested`.
#[derive(Debug, Default, Serialize)]
pub(crate) struct AssessmentStatusResponse {
    pub(crate) status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) overall_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) completed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) processing_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) processing_started_at: Option<String>,
}

impl AssessmentStatusResponse {
    pub(crate) fn from_assessment(assessment: &Assessment) -> Self {
        Self {
            status: assessment.status.as_str().to_string(),
            overall_score: assessment.overall_band_score,
            completed_at: assessment.completed_at.map(format_primitive),
            processing_time: assessment.processing_time_seconds,
            error_message: (assessment.status == AssessmentStatus::Failed
                && !assessment.error_message.is_empty())
            .then(|| assessment.error_message.clone()),
            ..Self::default()
        }
    }

    pub(crate) fn from_request(request: &AssessmentRequest) -> Self {
        Self {
            status: format!("request_{}", request.status.as_str()),
            created_at: Some(format_primitive(request.created_at)),
            processing_started_at: request.processing_started_at.map(format_primitive),
            ..Self::default()
        }
    }

    pub(crate) fn not_requested() -> Self {
        Self { status: "not_requested".to_string(), ..Self::default() }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AssessmentResponse {
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
    pub(crate) started_at: Option<String>,
    pub(crate) completed_at: Option<String>,
    pub(crate) created_at: String,
}

impl From<Assessment> for AssessmentResponse {
    fn from(assessment: Assessment) -> Self {
        Self {
            id: assessment.id,
            submission_id: assessment.submission_id,
            status: assessment.status,
            overall_band_score: assessment.overall_band_score,
            task_achievement_score: assessment.task_achievement_score,
            coherence_cohesion_score: assessment.coherence_cohesion_score,
            lexical_resource_score: assessment.lexical_resource_score,
            grammar_accuracy_score: assessment.grammar_accuracy_score,
            ai_model_used: assessment.ai_model_used,
            processing_time_seconds: assessment.processing_time_seconds,
            ai_confidence_score: assessment.ai_confidence_score,
            error_message: assessment.error_message,
            retry_count: assessment.retry_count,
            started_at: assessment.started_at.map(format_primitive),
            completed_at: assessment.completed_at.map(format_primitive),
            created_at: format_primitive(assessment.created_at),
        }
    }
}

/// Payload of one server-sent event on the streaming assessment route.
#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum AssessmentStreamEvent {
    Status {
        message: &'static str,
    },
    Scores {
        overall_score: Option<f64>,
        task_achievement: Option<f64>,
        coherence_cohesion: Option<f64>,
        lexical_resource: Option<f64>,
        grammar_accuracy: Option<f64>,
    },
    Complete {
        message: &'static str,
        assessment_id: String,
    },
    Error {
        message: String,
    },
}

impl AssessmentStreamEvent {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Scores { .. } => "scores",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }

    pub(crate) fn scores(assessment: &Assessment) -> Self {
        Self::Scores {
            overall_score: assessment.overall_band_score,
            task_achievement: assessment.task_achievement_score,
            coherence_cohesion: assessment.coherence_cohesion_score,
            lexical_resource: assessment.lexical_resource_score,
            grammar_accuracy: assessment.grammar_accuracy_score,
        }
    }

    pub(crate) fn complete(assessment: &Assessment, message: &'static str) -> Self {
        Self::Complete { message, assessment_id: assessment.id.clone() }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct FeedbackResponse {
    pub(crate) id: String,
    pub(crate) category: FeedbackCategory,
    pub(crate) severity: FeedbackSeverity,
    pub(crate) title: String,
    pub(crate) content: String,
    pub(crate) suggestion: String,
    pub(crate) highlighted_text: String,
    pub(crate) text_start_position: Option<i32>,
    pub(crate) text_end_position: Option<i32>,
    pub(crate) ai_confidence: Option<f64>,
}

impl From<Feedback> for FeedbackResponse {
    fn from(item: Feedback) -> Self {
        Self {
            id: item.id,
            category: item.category,
            severity: item.severity,
            title: item.title,
            content: item.content,
            suggestion: item.suggestion,
            highlighted_text: item.highlighted_text,
            text_start_position: item.text_start_position,
            text_end_position: item.text_end_position,
            ai_confidence: item.ai_confidence,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct TaskSummary {
    pub(crate) id: String,
    pub(crate) task_code: String,
    pub(crate) title: String,
    pub(crate) task_number: i32,
    pub(crate) module_type: ModuleType,
}

impl From<&PracticeTask> for TaskSummary {
    fn from(task: &PracticeTask) -> Self {
        Self {
            id: task.id.clone(),
            task_code: task.task_code.clone(),
            title: task.title.clone(),
            task_number: task.task_number,
            module_type: task.module_type,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AssessmentDetailResponse {
    pub(crate) assessment: AssessmentResponse,
    pub(crate) task: TaskSummary,
    pub(crate) word_count: i32,
    pub(crate) feedback_by_category: BTreeMap<FeedbackCategory, Vec<FeedbackResponse>>,
    pub(crate) insights: Option<ScoreInsights>,
}

#[derive(Debug, Serialize)]
pub(crate) struct HistoryItem {
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
    pub(crate) completed_at: Option<String>,
}

impl From<HistoryRow> for HistoryItem {
    fn from(row: HistoryRow) -> Self {
        Self {
            assessment_id: row.assessment_id,
            submission_id: row.submission_id,
            task_code: row.task_code,
            task_title: row.task_title,
            task_number: row.task_number,
            module_type: row.module_type,
            overall_band_score: row.overall_band_score,
            task_achievement_score: row.task_achievement_score,
            coherence_cohesion_score: row.coherence_cohesion_score,
            lexical_resource_score: row.lexical_resource_score,
            grammar_accuracy_score: row.grammar_accuracy_score,
            completed_at: row.completed_at.map(format_primitive),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct HistoryResponse {
    pub(crate) total_assessments: usize,
    pub(crate) average_score: Option<f64>,
    pub(crate) best_score: Option<f64>,
    pub(crate) assessments: Vec<HistoryItem>,
}

impl HistoryResponse {
    pub(crate) fn from_rows(rows: Vec<HistoryRow>) -> Self {
        let scores: Vec<f64> = rows.iter().filter_map(|row| row.overall_band_score).collect();
        let average_score = (!scores.is_empty())
            .then(|| (scores.iter().sum::<f64>() / scores.len() as f64 * 10.0).round() / 10.0);
        let best_score = scores.iter().copied().reduce(f64::max);

        Self {
            total_assessments: rows.len(),
            average_score,
            best_score,
            assessments: rows.into_iter().map(HistoryItem::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AssessmentRequestDetail {
    pub(crate) id: String,
    pub(crate) submission_id: String,
    pub(crate) status: RequestStatus,
    pub(crate) priority: i32,
    pub(crate) error_details: String,
    pub(crate) retry_after: Option<String>,
    pub(crate) processing_started_at: Option<String>,
    pub(crate) processing_completed_at: Option<String>,
    pub(crate) assessment_id: Option<String>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl From<AssessmentRequest> for AssessmentRequestDetail {
    fn from(request: AssessmentRequest) -> Self {
        Self {
            id: request.id,
            submission_id: request.submission_id,
            status: request.status,
            priority: request.priority,
            error_details: request.error_details,
            retry_after: request.retry_after.map(format_primitive),
            processing_started_at: request.processing_started_at.map(format_primitive),
            processing_completed_at: request.processing_completed_at.map(format_primitive),
            assessment_id: request.assessment_id,
            created_at: format_primitive(request.created_at),
            updated_at: format_primitive(request.updated_at),
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub(crate) struct ProcessQueueRequest {
    #[validate(range(min = 1, max = 100))]
    pub(crate) max_requests: Option<u32>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ProcessQueueResponse {
    pub(crate) claimed: usize,
    pub(crate) completed: usize,
    pub(crate) failed: usize,
}

impl From<CycleReport> for ProcessQueueResponse {
    fn from(report: CycleReport) -> Self {
        Self { claimed: report.claimed, completed: report.completed, failed: report.failed }
    }
}
