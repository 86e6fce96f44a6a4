use std::{future::Future, str::FromStr, sync::Arc};

use anyhow::Context;
use futures::{Stream, StreamExt};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// Tables whose changes can be observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Meals,
    UserFeedback,
}

/// Pool plus a per-table change counter. Every write bumps the counter of the
/// tables it touched so that observers re-run their query.
#[derive(Clone)]
pub struct Db {
    pub pool: SqlitePool,
    meals_changed: Arc<watch::Sender<u64>>,
    feedback_changed: Arc<watch::Sender<u64>>,
}

impl Db {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("parse database url {database_url}"))?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("connect to database")?;
        Self::from_pool(pool).await
    }

    /// Single-connection in-memory database; the connection is never recycled
    /// because the data would go with it.
    #[cfg(test)]
    pub async fn in_memory() -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("open in-memory database")?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> anyhow::Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("run migrations")?;
        let (meals_changed, _) = watch::channel(0);
        let (feedback_changed, _) = watch::channel(0);
        Ok(Self {
            pool,
            meals_changed: Arc::new(meals_changed),
            feedback_changed: Arc::new(feedback_changed),
        })
    }

    pub fn notify(&self, table: Table) {
        self.sender(table).send_modify(|version| *version += 1);
    }

    pub fn subscribe(&self, table: Table) -> watch::Receiver<u64> {
        self.sender(table).subscribe()
    }

    fn sender(&self, table: Table) -> &watch::Sender<u64> {
        match table {
            Table::Meals => &self.meals_changed,
            Table::UserFeedback => &self.feedback_changed,
        }
    }

    /// Runs `query` once immediately and again after every change to `table`.
    /// Bursts of writes may collapse into a single snapshot.
    pub fn snapshots<T, F, Fut>(
        &self,
        table: Table,
        mut query: F,
    ) -> impl Stream<Item = anyhow::Result<T>> + Send + 'static
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        WatchStream::new(self.subscribe(table)).then(move |_| query())
    }
}
