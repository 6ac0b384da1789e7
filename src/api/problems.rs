use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::grading::model::FeedbackOption;
use crate::schemas::feedback::ProblemCreate;

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/", post(create_problem))
}

/// Registers a problem and answers with the root of its empty feedback tree.
async fn create_problem(
    State(state): State<AppState>,
    Json(payload): Json<ProblemCreate>,
) -> Result<(StatusCode, Json<FeedbackOption>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let root = state.repository().create_problem(payload).await?;
    Ok((StatusCode::CREATED, Json(root)))
}
