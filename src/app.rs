use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::{feedback, flows, meals};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_routes())
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %req.method(),
                        path = %req.uri().path(),
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                        let status = res.status();
                        let latency_ms = latency.as_millis() as u64;
                        span.record("status", tracing::field::display(status));
                        span.record("latency_ms", latency_ms);
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(meals::router())
        .merge(feedback::router())
        .merge(flows::router())
        .route("/health", get(health))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "model": state.config.gemini.model,
        "notifications_enabled": state.config.reminders.notifications_enabled,
        "pending_reminders": state.reminders.pending().len(),
        "active_entries": state.entries.len(),
    }))
}

/// Serves until Ctrl-C, evicting stale meal entries in the background.
/// Reminders still pending at shutdown are lost.
pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let addr: SocketAddr = state
        .config
        .listen_addr
        .parse()
        .with_context(|| format!("invalid listen address {}", state.config.listen_addr))?;

    let sweeper = state
        .entries
        .spawn_sweeper(Duration::from_secs(state.config.entry_session_ttl_minutes * 60));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    let served = axum::serve(listener, build_app(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    sweeper.abort();
    let dropped = state.reminders.pending();
    if !dropped.is_empty() {
        tracing::warn!(count = dropped.len(), jobs = ?dropped, "dropping pending feedback reminders");
    }
    served.context("server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
