mod ai;
mod analysis;
mod app;
mod config;
mod db;
mod feedback;
mod flows;
mod meals;
mod reminders;
mod state;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "nuri=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let state = state::AppState::init().await?;
    tracing::info!(
        model = %state.config.gemini.model,
        reminder_delay_minutes = state.config.reminders.delay_minutes,
        media_root = %state.config.media.root.display(),
        remote_photo_hosts = state.config.media.remote_hosts.len(),
        "state initialised"
    );

    app::serve(state).await
}
