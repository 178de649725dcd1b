use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentStaff;
use crate::core::state::AppState;
use crate::schemas::assessment::{
    AssessmentRequestDetail, ProcessQueueRequest, ProcessQueueResponse,
};
use crate::services::queue;
use crate::tasks::processor;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/assessment-requests/:request_id/retry", post(retry_request))
        .route("/assessment-requests/:request_id/cancel", post(cancel_request))
        .route("/assessment-queue/process", post(process_queue))
}

async fn retry_request(
    CurrentStaff(staff): CurrentStaff,
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<Json<AssessmentRequestDetail>, ApiError> {
    let request = queue::requeue_failed(state.db(), &request_id).await?;
    tracing::info!(staff_id = %staff.id, request_id = %request.id, "Staff requeued assessment request");
    Ok(Json(request.into()))
}

async fn cancel_request(
    CurrentStaff(staff): CurrentStaff,
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<Json<AssessmentRequestDetail>, ApiError> {
    let request = queue::cancel(state.db(), &request_id).await?;
    tracing::info!(staff_id = %staff.id, request_id = %request.id, "Staff cancelled assessment request");
    Ok(Json(request.into()))
}

/// Runs one processor cycle inside the request.
async fn process_queue(
    CurrentStaff(staff): CurrentStaff,
    State(state): State<AppState>,
    payload: Option<Json<ProcessQueueRequest>>,
) -> Result<Json<ProcessQueueResponse>, ApiError> {
    let payload = payload.map(|Json(payload)| payload).unwrap_or_default();
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let max_requests = payload.max_requests.unwrap_or(state.settings().queue().max_requests);
    tracing::info!(staff_id = %staff.id, max_requests, "Staff triggered queue processing");

    let report = processor::run_cycle(&state, max_requests)
        .await
        .map_err(|e| ApiError::internal(format!("{e:#}"), "Failed to process assessment queue"))?;

    Ok(Json(report.into()))
}
