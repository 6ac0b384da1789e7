use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::grading::model::{ProblemId, SolutionState, SubmissionId};
use crate::schemas::solution::{SolutionPatch, ToggleRequest};
use crate::services::backend::GradingBackend;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:submission_id/:problem_id", get(fetch_solution).patch(update_solution))
        .route("/:submission_id/:problem_id/toggle", put(toggle_option))
}

async fn fetch_solution(
    State(state): State<AppState>,
    Path((submission_id, problem_id)): Path<(SubmissionId, ProblemId)>,
) -> Result<Json<SolutionState>, ApiError> {
    let solution = state.repository().fetch_solution(submission_id, problem_id).await?;
    Ok(Json(solution))
}

async fn toggle_option(
    State(state): State<AppState>,
    Path((submission_id, problem_id)): Path<(SubmissionId, ProblemId)>,
    Json(payload): Json<ToggleRequest>,
) -> Result<Json<SolutionState>, ApiError> {
    let solution = state
        .repository()
        .toggle_option(submission_id, problem_id, payload.option_id)
        .await?;
    Ok(Json(solution))
}

async fn update_solution(
    State(state): State<AppState>,
    Path((submission_id, problem_id)): Path<(SubmissionId, ProblemId)>,
    Json(payload): Json<SolutionPatch>,
) -> Result<Json<SolutionState>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let solution = state.repository().update_solution(submission_id, problem_id, payload).await?;
    Ok(Json(solution))
}
