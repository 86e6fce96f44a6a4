use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use serde::Serialize;
use tracing::{error, instrument, warn};

use super::{
    dto::{
        AnalysisResponse, AnalyzePhotoRequest, AnalyzeTextRequest, MealDetails, SaveMealRequest,
        ValidationResponse,
    },
    repo,
    repo_types::Meal,
    services::save_meal,
};
use crate::{
    analysis::AnalysisError,
    feedback::{
        repo::{list_feedback_for_meal, observe_feedback_for_meal},
        repo_types::UserFeedback,
    },
    state::AppState,
};

pub fn analysis_routes() -> Router<AppState> {
    Router::new()
        .route("/meals/analyze/text", post(analyze_text))
        .route("/meals/analyze/photo", post(analyze_photo))
        .route("/meals/validate/text", post(validate_text))
        .route("/meals/validate/photo", post(validate_photo))
}

pub fn meal_routes() -> Router<AppState> {
    Router::new()
        .route("/meals", post(create_meal).get(list_meals))
        .route("/meals/stream", get(stream_meals))
        .route("/meals/:id", get(get_meal).put(update_meal).delete(delete_meal))
        .route("/meals/:id/stream", get(stream_meal))
        .route("/meals/:id/feedback", get(meal_feedback))
        .route("/meals/:id/feedback/stream", get(stream_meal_feedback))
}

#[instrument(skip(state, body))]
pub async fn analyze_text(
    State(state): State<AppState>,
    Json(body): Json<AnalyzeTextRequest>,
) -> Result<Json<AnalysisResponse>, (StatusCode, String)> {
    let data = state
        .analyzer
        .analyze_from_text(&body.description)
        .await
        .map_err(analysis_failure)?;
    Ok(Json(data.into()))
}

#[instrument(skip(state))]
pub async fn analyze_photo(
    State(state): State<AppState>,
    Json(body): Json<AnalyzePhotoRequest>,
) -> Result<Json<AnalysisResponse>, (StatusCode, String)> {
    let data = state
        .analyzer
        .analyze_from_image(&body.photo_uri)
        .await
        .map_err(analysis_failure)?;
    Ok(Json(data.into()))
}

#[instrument(skip(state, body))]
pub async fn validate_text(
    State(state): State<AppState>,
    Json(body): Json<AnalyzeTextRequest>,
) -> Result<Json<ValidationResponse>, (StatusCode, String)> {
    verdict(state.analyzer.validate_description(&body.description).await)
}

#[instrument(skip(state))]
pub async fn validate_photo(
    State(state): State<AppState>,
    Json(body): Json<AnalyzePhotoRequest>,
) -> Result<Json<ValidationResponse>, (StatusCode, String)> {
    verdict(state.analyzer.validate_photo(&body.photo_uri).await)
}

fn verdict(
    outcome: Result<(), AnalysisError>,
) -> Result<Json<ValidationResponse>, (StatusCode, String)> {
    match outcome {
        Ok(()) => Ok(Json(ValidationResponse {
            valid: true,
            reason: None,
        })),
        Err(AnalysisError::Rejected(code)) => Ok(Json(ValidationResponse {
            valid: false,
            reason: Some(code.to_string()),
        })),
        Err(e) => Err(analysis_failure(e)),
    }
}

#[instrument(skip(state, body))]
pub async fn create_meal(
    State(state): State<AppState>,
    Json(body): Json<SaveMealRequest>,
) -> Result<(StatusCode, Json<Meal>), (StatusCode, String)> {
    let meal = body.into_meal(0, crate::now_millis());
    let saved = save_meal(&state.db, &state.reminders, meal)
        .await
        .map_err(|e| {
            error!(error = %e, "save_meal failed");
            internal(e)
        })?;
    Ok((StatusCode::CREATED, Json(saved)))
}

#[instrument(skip(state))]
pub async fn list_meals(
    State(state): State<AppState>,
) -> Result<Json<Vec<Meal>>, (StatusCode, String)> {
    let meals = repo::list_meals(&state.db).await.map_err(internal)?;
    Ok(Json(meals))
}

/// Server-sent events: one `meals` event with the full list now and after
/// every change to the table.
#[instrument(skip(state))]
pub async fn stream_meals(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    snapshot_events("meals", repo::observe_meals(&state.db))
}

/// Same as [`stream_meals`] for a single meal; the payload is `null` once the
/// meal is gone.
#[instrument(skip(state))]
pub async fn stream_meal(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    snapshot_events("meal", repo::observe_meal(&state.db, id))
}

#[instrument(skip(state))]
pub async fn stream_meal_feedback(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    snapshot_events("feedback", observe_feedback_for_meal(&state.db, id))
}

pub(crate) fn snapshot_events<T, S>(
    name: &'static str,
    snapshots: S,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    T: Serialize + 'static,
    S: Stream<Item = anyhow::Result<T>> + Send + 'static,
{
    let events = snapshots.map(move |snapshot| {
        Ok(match snapshot {
            Ok(value) => json_event(name, &value),
            Err(e) => {
                warn!(error = %e, stream = name, "snapshot failed");
                Event::default().event("error").data(e.to_string())
            }
        })
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

pub(crate) fn json_event<T: Serialize>(name: &str, value: &T) -> Event {
    match serde_json::to_string(value) {
        Ok(data) => Event::default().event(name).data(data),
        Err(e) => Event::default().event("error").data(e.to_string()),
    }
}

#[instrument(skip(state))]
pub async fn get_meal(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MealDetails>, (StatusCode, String)> {
    match repo::get_meal(&state.db, id).await {
        Ok(Some(meal)) => Ok(Json(meal.into())),
        Ok(None) => Err((StatusCode::NOT_FOUND, "Meal not found".into())),
        Err(e) => {
            error!(error = %e, %id, "get_meal failed");
            Err(internal(e))
        }
    }
}

#[instrument(skip(state, body))]
pub async fn update_meal(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<SaveMealRequest>,
) -> Result<Json<Meal>, (StatusCode, String)> {
    let meal = body.into_meal(id, crate::now_millis());
    match repo::update_meal(&state.db, &meal).await {
        Ok(true) => Ok(Json(meal)),
        Ok(false) => Err((StatusCode::NOT_FOUND, "Meal not found".into())),
        Err(e) => {
            error!(error = %e, %id, "update_meal failed");
            Err(internal(e))
        }
    }
}

/// Removes the meal, its feedback and its pending reminder.
#[instrument(skip(state))]
pub async fn delete_meal(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, (StatusCode, String)> {
    match repo::delete_meal(&state.db, id).await {
        Ok(true) => {
            state.reminders.cancel(id);
            Ok(StatusCode::NO_CONTENT)
        }
        Ok(false) => Err((StatusCode::NOT_FOUND, "Meal not found".into())),
        Err(e) => {
            error!(error = %e, %id, "delete_meal failed");
            Err(internal(e))
        }
    }
}

#[instrument(skip(state))]
pub async fn meal_feedback(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<UserFeedback>>, (StatusCode, String)> {
    let feedback = list_feedback_for_meal(&state.db, id)
        .await
        .map_err(internal)?;
    Ok(Json(feedback))
}

pub(crate) fn analysis_failure(e: AnalysisError) -> (StatusCode, String) {
    let status = match &e {
        AnalysisError::Offline => StatusCode::SERVICE_UNAVAILABLE,
        AnalysisError::EmptyResponse | AnalysisError::Gateway(_) => StatusCode::BAD_GATEWAY,
        AnalysisError::ImageDecode | AnalysisError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AnalysisError::ImageRead(_) => StatusCode::BAD_REQUEST,
    };
    (status, e.to_string())
}

pub(crate) fn internal(e: anyhow::Error) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

#[cfg(test)]
mod handlers_tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::{
        ai::{Capability, ValidationErrorCode},
        analysis::analyzer::analyzer_tests::FakeGateway,
        app::build_app,
        state::AppState,
    };

    const CHICKEN: &str = "Ingredients:\nGrilled Chicken | 150g\nRice | 80g\n\nTriggers:\nnone";

    async fn send(state: &AppState, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = build_app(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::String(
            String::from_utf8_lossy(&bytes).into_owned(),
        ));
        (status, value)
    }

    #[tokio::test]
    async fn analyze_text_returns_lists_and_display_rows() {
        let state = AppState::fake(FakeGateway::meal_text(CHICKEN), true).await;

        let (status, body) = send(
            &state,
            "POST",
            "/api/v1/meals/analyze/text",
            json!({ "description": "Grilled chicken with rice" }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ingredients"], json!(["Grilled Chicken | 150g", "Rice | 80g"]));
        assert_eq!(body["triggers"], json!(["none"]));
        assert_eq!(body["display"][0]["quantity"], "150");
        assert_eq!(body["display"][0]["unit"], "g");
    }

    #[tokio::test]
    async fn analyze_offline_is_unavailable() {
        let state = AppState::fake(FakeGateway::meal_text(CHICKEN), false).await;
        let (status, body) = send(
            &state,
            "POST",
            "/api/v1/meals/analyze/text",
            json!({ "description": "toast" }),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, json!("No internet connection"));
    }

    #[tokio::test]
    async fn photo_outside_the_media_root_is_a_bad_request() {
        let state = AppState::fake(FakeGateway::meal_text(CHICKEN), true).await;
        let (status, body) = send(
            &state,
            "POST",
            "/api/v1/meals/analyze/photo",
            json!({ "photo_uri": "/etc/hostname" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!("Failed to read image: photo is not available"));
    }

    #[tokio::test]
    async fn rejected_description_is_a_negative_verdict() {
        let gw = FakeGateway::default().reply(
            Capability::ProcessTextPrompt,
            json!({ "success": false, "error": "NOT_ENOUGH_INFORMATION" }),
        );
        let state = AppState::fake(gw, true).await;

        let (status, body) = send(
            &state,
            "POST",
            "/api/v1/meals/validate/text",
            json!({ "description": "food" }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["valid"], false);
        assert_eq!(body["reason"], ValidationErrorCode::NotEnoughInformation.to_string());
    }

    #[tokio::test]
    async fn create_then_read_and_update_a_meal() {
        let state = AppState::fake(FakeGateway::default(), true).await;

        let (status, created) = send(
            &state,
            "POST",
            "/api/v1/meals",
            json!({
                "timestamp": 1_000,
                "input_kind": "TEXT",
                "description": "rice",
                "confirmed_ingredients": ["Rice | 80g"]
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_i64().unwrap();
        assert!(id > 0);

        let (status, fetched) = send(&state, "GET", &format!("/api/v1/meals/{id}"), json!(null)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["description"], "rice");
        assert_eq!(fetched["confirmed_display"][0]["name"], "Rice");

        let (status, _) = send(
            &state,
            "PUT",
            &format!("/api/v1/meals/{id}"),
            json!({ "timestamp": 1_000, "input_kind": "TEXT", "description": "rice", "notes": "late" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, listed) = send(&state, "GET", "/api/v1/meals", json!(null)).await;
        assert_eq!(listed[0]["notes"], "late");
        assert_eq!(state.reminders.pending(), vec![format!("meal_feedback_reminder_{id}")]);
    }

    #[tokio::test]
    async fn delete_drops_the_meal_and_its_reminder() {
        let state = AppState::fake(FakeGateway::default(), true).await;
        let (_, created) = send(
            &state,
            "POST",
            "/api/v1/meals",
            json!({ "input_kind": "PHOTO", "photo_uri": "file:///x.jpg" }),
        )
        .await;
        let id = created["id"].as_i64().unwrap();
        assert_eq!(state.reminders.pending().len(), 1);

        let (status, _) = send(&state, "DELETE", &format!("/api/v1/meals/{id}"), json!(null)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(state.reminders.pending().is_empty());

        let (status, _) = send(&state, "DELETE", &format!("/api/v1/meals/{id}"), json!(null)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_meal_is_not_found() {
        let state = AppState::fake(FakeGateway::default(), true).await;
        let (status, _) = send(&state, "GET", "/api/v1/meals/99", json!(null)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(
            &state,
            "PUT",
            "/api/v1/meals/99",
            json!({ "input_kind": "PHOTO", "photo_uri": "file:///x.jpg" }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
