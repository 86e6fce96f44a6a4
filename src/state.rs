use std::{sync::Arc, time::Duration};

use crate::{
    ai::{GeminiGateway, TcpProbe},
    analysis::{HttpFetcher, ImageResolver, MealAnalyzer},
    config::AppConfig,
    db::Db,
    flows::EntrySessions,
    reminders::{LogNotifier, ReminderScheduler, ReminderScheduling},
};

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: Arc<AppConfig>,
    pub analyzer: Arc<MealAnalyzer>,
    pub reminders: ReminderScheduler,
    pub entries: EntrySessions,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = Db::connect(&config.database_url, config.database_max_connections).await?;

        tokio::fs::create_dir_all(&config.cache_dir).await?;
        let analyzer = MealAnalyzer::new(
            Arc::new(GeminiGateway::new(config.gemini.clone())),
            Arc::new(TcpProbe::new(
                config.connectivity_probe_addr.clone(),
                PROBE_TIMEOUT,
            )),
            ImageResolver::new(
                config.cache_dir.clone(),
                config.media.clone(),
                Arc::new(HttpFetcher::new()?),
            ),
        );

        let reminders = ReminderScheduler::new(
            Duration::from_secs(config.reminders.delay_minutes * 60),
            Arc::new(LogNotifier::new(config.reminders.notifications_enabled)),
        );

        Ok(Self::from_parts(db, config, Arc::new(analyzer), reminders))
    }

    pub fn from_parts(
        db: Db,
        config: Arc<AppConfig>,
        analyzer: Arc<MealAnalyzer>,
        reminders: ReminderScheduler,
    ) -> Self {
        Self {
            db,
            config,
            analyzer,
            reminders,
            entries: EntrySessions::default(),
        }
    }

    pub fn reminder_handle(&self) -> Arc<dyn ReminderScheduling> {
        Arc::new(self.reminders.clone())
    }

    /// In-memory database, canned AI replies and a fixed connectivity answer.
    #[cfg(test)]
    pub async fn fake(
        gateway: crate::analysis::analyzer::analyzer_tests::FakeGateway,
        online: bool,
    ) -> Self {
        use crate::{
            analysis::analyzer::analyzer_tests::analyzer_with,
            analysis::image_source::image_source_tests::{media_at, png_bytes},
            config::{GeminiConfig, ReminderConfig},
        };

        let db = Db::in_memory().await.expect("in-memory db");
        let config = Arc::new(AppConfig {
            listen_addr: "127.0.0.1:0".into(),
            database_url: "sqlite::memory:".into(),
            database_max_connections: 1,
            gemini: GeminiConfig {
                api_key: "test".into(),
                model: "test-model".into(),
                base_url: "http://localhost".into(),
                temperature: 0.2,
                safety_threshold: "BLOCK_ONLY_HIGH".into(),
            },
            reminders: ReminderConfig {
                delay_minutes: 30,
                notifications_enabled: false,
            },
            cache_dir: std::env::temp_dir(),
            media: media_at(std::env::temp_dir().join("nuri-test-media")),
            connectivity_probe_addr: "localhost:0".into(),
            entry_session_ttl_minutes: 60,
        });
        let analyzer = analyzer_with(Arc::new(gateway), online, png_bytes(8, 8));
        let reminders = ReminderScheduler::new(
            Duration::from_secs(30 * 60),
            Arc::new(LogNotifier::new(false)),
        );
        Self::from_parts(db, config, Arc::new(analyzer), reminders)
    }
}
