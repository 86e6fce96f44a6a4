use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, instrument, warn};

use super::{
    dto::FeedbackRequest,
    repo_types::UserFeedback,
    services::{submit_feedback, FeedbackError, FEELING_SUGGESTIONS},
};
use crate::state::AppState;

pub fn feedback_routes() -> Router<AppState> {
    Router::new()
        .route("/feedback", post(create_feedback))
        .route("/feedback/feelings", get(feelings))
}

#[instrument(skip(state, body))]
pub async fn create_feedback(
    State(state): State<AppState>,
    Json(body): Json<FeedbackRequest>,
) -> Result<(StatusCode, Json<UserFeedback>), (StatusCode, String)> {
    match submit_feedback(&state.db, body.into(), crate::now_millis()).await {
        Ok(saved) => Ok((StatusCode::CREATED, Json(saved))),
        Err(e @ (FeedbackError::MissingFeeling | FeedbackError::MissingCustomFeeling)) => {
            warn!(error = %e, "invalid feedback");
            Err((StatusCode::BAD_REQUEST, e.to_string()))
        }
        Err(e @ FeedbackError::Storage(_)) => {
            error!(error = %e, "submit_feedback failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

pub async fn feelings() -> Json<Vec<&'static str>> {
    Json(FEELING_SUGGESTIONS.to_vec())
}
