use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::grading::model::ProblemId;
use crate::schemas::submission::{QueueQuery, SubmissionSummary, SubmissionView};
use crate::services::backend::GradingBackend;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(register_submission))
        .route("/:problem_id", get(list_submissions))
        .route("/:problem_id/navigate", post(navigate))
}

async fn register_submission(
    State(state): State<AppState>,
    Json(payload): Json<SubmissionSummary>,
) -> Result<(StatusCode, Json<SubmissionSummary>), ApiError> {
    if payload.student_name.as_deref().is_some_and(|name| name.trim().is_empty()) {
        return Err(ApiError::BadRequest("student_name must not be blank".to_string()));
    }

    let submission = state.repository().register_submission(payload).await?;
    Ok((StatusCode::CREATED, Json(submission)))
}

async fn list_submissions(
    State(state): State<AppState>,
    Path(problem_id): Path<ProblemId>,
) -> Result<Json<Vec<SubmissionSummary>>, ApiError> {
    let submissions = state.repository().list_submissions(problem_id).await?;
    Ok(Json(submissions))
}

async fn navigate(
    State(state): State<AppState>,
    Path(problem_id): Path<ProblemId>,
    Json(payload): Json<QueueQuery>,
) -> Result<Json<SubmissionView>, ApiError> {
    let view = state.repository().navigate(problem_id, payload).await?;
    Ok(Json(view))
}
