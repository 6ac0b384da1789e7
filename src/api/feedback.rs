use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::grading::model::{FeedbackOption, OptionId, ProblemId};
use crate::schemas::feedback::{NewOption, OptionPatch, OptionUpdate, TreeSnapshot};
use crate::services::backend::GradingBackend;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:problem_id", get(fetch_tree).post(create_option))
        .route("/:problem_id/:option_id", patch(update_option).delete(delete_option))
}

async fn fetch_tree(
    State(state): State<AppState>,
    Path(problem_id): Path<ProblemId>,
) -> Result<Json<TreeSnapshot>, ApiError> {
    let snapshot = state.repository().fetch_tree(problem_id).await?;
    Ok(Json(snapshot))
}

async fn create_option(
    State(state): State<AppState>,
    Path(problem_id): Path<ProblemId>,
    Json(payload): Json<NewOption>,
) -> Result<(StatusCode, Json<FeedbackOption>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let option = state.repository().create_option(problem_id, payload).await?;
    Ok((StatusCode::CREATED, Json(option)))
}

async fn update_option(
    State(state): State<AppState>,
    Path((problem_id, option_id)): Path<(ProblemId, OptionId)>,
    Json(payload): Json<OptionPatch>,
) -> Result<Json<OptionUpdate>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let update = state.repository().update_option(problem_id, option_id, payload).await?;
    Ok(Json(update))
}

async fn delete_option(
    State(state): State<AppState>,
    Path((problem_id, option_id)): Path<(ProblemId, OptionId)>,
) -> Result<StatusCode, ApiError> {
    state.repository().delete_option(problem_id, option_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
