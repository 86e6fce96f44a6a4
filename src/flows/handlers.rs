use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use time::UtcOffset;
use tokio_stream::wrappers::WatchStream;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{ConfirmRequest, EntryRequest, EntryResponse, TimelineQuery, TimelineResponse},
    meal_entry::{FlowError, MealEntryFlow},
    timeline::build_timeline,
};
use crate::{
    feedback::repo::list_all_feedback,
    meals::{
        handlers::{internal, json_event},
        repo::list_meals,
    },
    state::AppState,
};

pub fn entry_routes() -> Router<AppState> {
    Router::new()
        .route("/entries", post(create_entry))
        .route("/entries/:id", get(get_entry).delete(delete_entry))
        .route("/entries/:id/events", get(entry_events))
        .route("/entries/:id/analyze", post(analyze_entry))
        .route("/entries/:id/confirm", post(confirm_entry))
        .route("/entries/:id/save", post(save_entry))
        .route("/entries/:id/reset", post(reset_entry))
}

pub fn timeline_routes() -> Router<AppState> {
    Router::new().route("/timeline", get(timeline))
}

fn find(state: &AppState, id: Uuid) -> Result<MealEntryFlow, (StatusCode, String)> {
    state
        .entries
        .get(&id)
        .ok_or((StatusCode::NOT_FOUND, "Entry not found".into()))
}

fn respond(id: Uuid, flow: &MealEntryFlow) -> Json<EntryResponse> {
    Json(EntryResponse {
        id,
        state: flow.state(),
    })
}

fn rejected(e: FlowError) -> (StatusCode, String) {
    warn!(error = %e, "entry action rejected");
    let status = match e {
        FlowError::NoInput => StatusCode::BAD_REQUEST,
        FlowError::InvalidTransition { .. } => StatusCode::CONFLICT,
    };
    (status, e.to_string())
}

#[instrument(skip(state, body))]
pub async fn create_entry(
    State(state): State<AppState>,
    Json(body): Json<EntryRequest>,
) -> (StatusCode, Json<EntryResponse>) {
    let flow = MealEntryFlow::new(
        body.input,
        state.analyzer.clone(),
        state.db.clone(),
        state.reminder_handle(),
    );
    let id = state.entries.insert(flow.clone());
    info!(%id, "entry started");
    (StatusCode::CREATED, respond(id, &flow))
}

#[instrument(skip(state))]
pub async fn get_entry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<EntryResponse>, (StatusCode, String)> {
    let flow = find(&state, id)?;
    Ok(respond(id, &flow))
}

#[instrument(skip(state))]
pub async fn delete_entry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> StatusCode {
    match state.entries.remove(&id) {
        Some(flow) => {
            flow.reset(None);
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

/// Server-sent events: one `state` event per state change, starting with the
/// current one.
#[instrument(skip(state))]
pub async fn entry_events(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)> {
    let flow = find(&state, id)?;
    let events = WatchStream::new(flow.subscribe()).map(|s| Ok(json_event("state", &s)));
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

#[instrument(skip(state))]
pub async fn analyze_entry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<EntryResponse>), (StatusCode, String)> {
    let flow = find(&state, id)?;
    flow.analyze().map_err(rejected)?;
    Ok((StatusCode::ACCEPTED, respond(id, &flow)))
}

#[instrument(skip(state, body))]
pub async fn confirm_entry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ConfirmRequest>,
) -> Result<Json<EntryResponse>, (StatusCode, String)> {
    let flow = find(&state, id)?;
    flow.confirm(body.into()).map_err(rejected)?;
    Ok(respond(id, &flow))
}

#[instrument(skip(state))]
pub async fn save_entry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<EntryResponse>), (StatusCode, String)> {
    let flow = find(&state, id)?;
    flow.save().map_err(rejected)?;
    Ok((StatusCode::ACCEPTED, respond(id, &flow)))
}

#[instrument(skip(state, body))]
pub async fn reset_entry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<EntryRequest>,
) -> Result<Json<EntryResponse>, (StatusCode, String)> {
    let flow = find(&state, id)?;
    flow.reset(body.input);
    Ok(respond(id, &flow))
}

#[instrument(skip(state))]
pub async fn timeline(
    State(state): State<AppState>,
    Query(q): Query<TimelineQuery>,
) -> Result<Json<TimelineResponse>, (StatusCode, String)> {
    let offset = q
        .utc_offset_minutes
        .checked_mul(60)
        .and_then(|secs| UtcOffset::from_whole_seconds(secs).ok())
        .ok_or((StatusCode::BAD_REQUEST, "utc_offset_minutes out of range".into()))?;

    let meals = list_meals(&state.db).await.map_err(|e| {
        error!(error = %e, "list_meals failed");
        internal(e)
    })?;
    let feedback = list_all_feedback(&state.db).await.map_err(|e| {
        error!(error = %e, "list_all_feedback failed");
        internal(e)
    })?;

    Ok(Json(TimelineResponse {
        days: build_timeline(meals, feedback, offset),
    }))
}
