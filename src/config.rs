use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub safety_threshold: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReminderConfig {
    pub delay_minutes: u64,
    pub notifications_enabled: bool,
}

/// Where photo URIs may point.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    /// Local photos must resolve to a path under this directory.
    pub root: PathBuf,
    /// Hosts remote photos may be fetched from. Empty disables remote photos.
    pub remote_hosts: Vec<String>,
    pub max_bytes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// `APP_HOST:APP_PORT`.
    pub listen_addr: String,
    pub database_url: String,
    pub database_max_connections: u32,
    pub gemini: GeminiConfig,
    pub reminders: ReminderConfig,
    pub cache_dir: PathBuf,
    pub media: MediaConfig,
    pub connectivity_probe_addr: String,
    pub entry_session_ttl_minutes: u64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://nuri.db".into());
        let gemini = GeminiConfig {
            api_key: std::env::var("GEMINI_API_KEY")?,
            model: std::env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.0-flash".into()),
            base_url: std::env::var("GEMINI_BASE_URL").unwrap_or_else(|_| {
                "https://generativelanguage.googleapis.com/v1beta".into()
            }),
            temperature: parse_env("GEMINI_TEMPERATURE", 0.2),
            safety_threshold: std::env::var("GEMINI_SAFETY_THRESHOLD")
                .unwrap_or_else(|_| "BLOCK_ONLY_HIGH".into()),
        };
        let reminders = ReminderConfig {
            delay_minutes: parse_env("FEEDBACK_REMINDER_DELAY_MINUTES", 30),
            notifications_enabled: parse_env("NOTIFICATIONS_ENABLED", true),
        };
        let cache_dir = std::env::var("CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("nuri-cache"));
        let media = MediaConfig {
            root: std::env::var("MEDIA_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("media")),
            remote_hosts: split_list(&std::env::var("REMOTE_PHOTO_HOSTS").unwrap_or_default()),
            max_bytes: parse_env("PHOTO_MAX_BYTES", 10 * 1024 * 1024),
        };

        Ok(Self {
            listen_addr: format!(
                "{}:{}",
                std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
                std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
            ),
            database_url,
            database_max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 5),
            gemini,
            reminders,
            cache_dir,
            media,
            connectivity_probe_addr: std::env::var("CONNECTIVITY_PROBE_ADDR")
                .unwrap_or_else(|_| "generativelanguage.googleapis.com:443".into()),
            entry_session_ttl_minutes: parse_env("ENTRY_SESSION_TTL_MINUTES", 60),
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|h| h.trim().to_ascii_lowercase())
        .filter(|h| !h.is_empty())
        .collect()
}
