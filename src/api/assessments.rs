use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{Assessment, Submission, User};
use crate::db::types::{AssessmentStatus, SubmissionStatus};
use crate::repositories::{assessment_requests, assessments, feedback, practice_tasks, submissions};
use crate::schemas::assessment::{
    AssessmentDetailResponse, AssessmentRequestResponse, AssessmentResponse,
    AssessmentStatusResponse, AssessmentStreamEvent, FeedbackResponse, HistoryResponse,
    TaskSummary,
};
use crate::services::credits::CreditDecision;
use crate::services::{assessment, insights, queue};

/// User-initiated requests share the default priority.
const USER_REQUEST_PRIORITY: i32 = 0;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/history", get(history))
        .route("/submissions/:submission_id", get(assessment_detail))
        .route("/submissions/:submission_id/request", post(request_assessment))
        .route("/submissions/:submission_id/assess", post(assess_now))
        .route("/submissions/:submission_id/stream", get(stream_assessment))
        .route("/submissions/:submission_id/status", get(assessment_status))
}

async fn load_owned_submission(
    state: &AppState,
    user: &User,
    submission_id: &str,
) -> Result<Submission, ApiError> {
    let submission = submissions::find_by_id(state.db(), submission_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load submission"))?;

    match submission {
        Some(submission) if submission.user_id == user.id => Ok(submission),
        _ => Err(ApiError::NotFound("Submission not found".to_string())),
    }
}

fn ensure_submitted(submission: &Submission) -> Result<(), ApiError> {
    if submission.status == SubmissionStatus::Draft {
        return Err(ApiError::BadRequest(
            "Submission must be submitted before it can be assessed".to_string(),
        ));
    }
    Ok(())
}

async fn charge_credit(state: &AppState, user: &User, submission_id: &str) -> Result<(), ApiError> {
    let decision = state
        .credits()
        .try_consume(&user.id, submission_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to check assessment credits"))?;

    match decision {
        CreditDecision::Granted => Ok(()),
        CreditDecision::Denied(reason) => {
            tracing::info!(user_id = %user.id, submission_id, reason = %reason, "Assessment credit denied");
            Err(ApiError::PaymentRequired(reason))
        }
    }
}

async fn request_assessment(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(submission_id): Path<String>,
) -> Result<(StatusCode, Json<AssessmentRequestResponse>), ApiError> {
    let submission = load_owned_submission(&state, &user, &submission_id).await?;

    let existing = assessments::find_by_submission(state.db(), &submission.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load assessment"))?;

    if existing.as_ref().is_some_and(|a| a.status == AssessmentStatus::Completed) {
        return Ok((
            StatusCode::OK,
            Json(AssessmentRequestResponse {
                status: "completed",
                message: "Assessment already completed",
                request_id: None,
            }),
        ));
    }

    let open = assessment_requests::find_open_for_submission(state.db(), &submission.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load assessment request"))?;

    // A `processing` row past the in-flight window was abandoned and may be requested again.
    let cutoff = assessment::stale_before(primitive_now_utc(), state.scorer().timeout_seconds());
    if open.is_some() || existing.is_some_and(|a| assessment::is_in_flight(&a, cutoff)) {
        return Ok((StatusCode::OK, Json(in_progress(open.map(|request| request.id)))));
    }

    ensure_submitted(&submission)?;
    charge_credit(&state, &user, &submission.id).await?;

    let (request, created) = queue::enqueue(state.db(), &submission.id, USER_REQUEST_PRIORITY).await?;
    if !created {
        return Ok((StatusCode::OK, Json(in_progress(Some(request.id)))));
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(AssessmentRequestResponse {
            status: "requested",
            message: "Assessment has been requested and will be processed shortly",
            request_id: Some(request.id),
        }),
    ))
}

fn in_progress(request_id: Option<String>) -> AssessmentRequestResponse {
    AssessmentRequestResponse {
        status: "processing",
        message: "Assessment is already in progress",
        request_id,
    }
}

enum InlineStart {
    Completed(Assessment),
    Ready(Submission),
}

/// Checks shared by the inline scoring routes; charges the credit last.
async fn start_inline(
    state: &AppState,
    user: &User,
    submission_id: &str,
) -> Result<InlineStart, ApiError> {
    let submission = load_owned_submission(state, user, submission_id).await?;

    let existing = assessments::find_by_submission(state.db(), &submission.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load assessment"))?;
    if let Some(completed) = existing.as_ref().filter(|a| a.status == AssessmentStatus::Completed) {
        return Ok(InlineStart::Completed(completed.clone()));
    }

    let open = assessment_requests::find_open_for_submission(state.db(), &submission.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load assessment request"))?;
    if open.is_some() {
        return Err(ApiError::Conflict(
            "Assessment is already queued for this submission".to_string(),
        ));
    }

    let cutoff = assessment::stale_before(primitive_now_utc(), state.scorer().timeout_seconds());
    if existing.is_some_and(|a| assessment::is_in_flight(&a, cutoff)) {
        return Err(assessment::AssessmentError::InProgress.into());
    }

    ensure_submitted(&submission)?;
    charge_credit(state, user, &submission.id).await?;

    Ok(InlineStart::Ready(submission))
}

/// Scores the submission inline instead of going through the queue.
async fn assess_now(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(submission_id): Path<String>,
) -> Result<Json<AssessmentResponse>, ApiError> {
    let submission = match start_inline(&state, &user, &submission_id).await? {
        InlineStart::Completed(completed) => return Ok(Json(completed.into())),
        InlineStart::Ready(submission) => submission,
    };

    let outcome = assessment::assess_submission(state.db(), state.scorer(), &submission.id).await?;
    Ok(Json(outcome.into_assessment().into()))
}

type EventStream = ReceiverStream<Result<Event, Infallible>>;

fn sse_event(payload: &AssessmentStreamEvent) -> Event {
    let event = Event::default().event(payload.name());
    match serde_json::to_string(payload) {
        Ok(data) => event.data(data),
        Err(err) => {
            tracing::error!(error = %err, "Failed to encode assessment stream event");
            event.data(r#"{"type":"error","message":"event encoding failed"}"#)
        }
    }
}

/// Inline scoring reported as server-sent events.
///
/// The attempt runs on its own task, so a client that disconnects does not abort it.
async fn stream_assessment(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(submission_id): Path<String>,
) -> Result<Sse<EventStream>, ApiError> {
    let start = start_inline(&state, &user, &submission_id).await?;
    let (tx, rx) = mpsc::channel(4);

    tokio::spawn(async move {
        let events = match start {
            InlineStart::Completed(completed) => {
                vec![AssessmentStreamEvent::complete(&completed, "Assessment already completed")]
            }
            InlineStart::Ready(submission) => {
                let started = AssessmentStreamEvent::Status { message: "Starting AI assessment" };
                if tx.send(Ok(sse_event(&started))).await.is_err() {
                    tracing::debug!(submission_id = %submission.id, "Assessment stream closed by client");
                }

                match assessment::assess_submission(state.db(), state.scorer(), &submission.id).await {
                    Ok(outcome) => {
                        let assessment = outcome.into_assessment();
                        vec![
                            AssessmentStreamEvent::scores(&assessment),
                            AssessmentStreamEvent::complete(&assessment, "Assessment completed"),
                        ]
                    }
                    Err(err) => vec![AssessmentStreamEvent::Error { message: err.to_string() }],
                }
            }
        };

        for event in &events {
            if tx.send(Ok(sse_event(event))).await.is_err() {
                break;
            }
        }
    });

    Ok(Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default()))
}

async fn assessment_status(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(submission_id): Path<String>,
) -> Result<Json<AssessmentStatusResponse>, ApiError> {
    let submission = load_owned_submission(&state, &user, &submission_id).await?;

    let existing = assessments::find_by_submission(state.db(), &submission.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load assessment"))?;
    if let Some(assessment) = existing.as_ref().filter(|a| a.status == AssessmentStatus::Completed) {
        return Ok(Json(AssessmentStatusResponse::from_assessment(assessment)));
    }

    let open = assessment_requests::find_open_for_submission(state.db(), &submission.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load assessment request"))?;
    if let Some(request) = open {
        return Ok(Json(AssessmentStatusResponse::from_request(&request)));
    }

    if let Some(assessment) = existing {
        return Ok(Json(AssessmentStatusResponse::from_assessment(&assessment)));
    }

    let latest = assessment_requests::latest_for_submission(state.db(), &submission.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load assessment request"))?;

    Ok(Json(match latest {
        Some(request) => AssessmentStatusResponse::from_request(&request),
        None => AssessmentStatusResponse::not_requested(),
    }))
}

async fn assessment_detail(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(submission_id): Path<String>,
) -> Result<Json<AssessmentDetailResponse>, ApiError> {
    let submission = load_owned_submission(&state, &user, &submission_id).await?;

    let assessment = assessments::find_by_submission(state.db(), &submission.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load assessment"))?
        .ok_or_else(|| ApiError::NotFound("Assessment not found".to_string()))?;

    let task = practice_tasks::find_by_id(state.db(), &submission.task_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load practice task"))?
        .ok_or_else(|| ApiError::NotFound("Practice task not found".to_string()))?;

    let items = feedback::list_by_assessment(state.db(), &assessment.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load feedback"))?;

    let feedback_by_category = insights::group_feedback(items)
        .into_iter()
        .map(|(category, items)| {
            (category, items.into_iter().map(FeedbackResponse::from).collect::<Vec<_>>())
        })
        .collect();

    let score_insights = (assessment.status == AssessmentStatus::Completed)
        .then(|| insights::score_insights(&assessment, task.task_number));

    Ok(Json(AssessmentDetailResponse {
        assessment: assessment.into(),
        task: TaskSummary::from(&task),
        word_count: submission.word_count,
        feedback_by_category,
        insights: score_insights,
    }))
}

async fn history(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let rows = assessments::list_completed_for_user(state.db(), &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load assessment history"))?;

    Ok(Json(HistoryResponse::from_rows(rows)))
}
