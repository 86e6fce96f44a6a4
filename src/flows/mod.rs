pub mod dto;
pub mod handlers;
pub mod meal_entry;
pub mod timeline;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::Router;
use tokio::{task::JoinHandle, time::Instant};
use uuid::Uuid;

use crate::state::AppState;
pub use meal_entry::{MealEntryFlow, MealEntryState, MealInput};

/// Saved entries stay readable this long after their last request.
const SAVED_RETENTION: Duration = Duration::from_secs(60);
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

struct Session {
    flow: MealEntryFlow,
    touched: Instant,
}

/// Meal entries in progress, keyed by the id handed to the client.
#[derive(Clone, Default)]
pub struct EntrySessions {
    inner: Arc<Mutex<HashMap<Uuid, Session>>>,
}

impl EntrySessions {
    pub fn insert(&self, flow: MealEntryFlow) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().insert(
            id,
            Session {
                flow,
                touched: Instant::now(),
            },
        );
        id
    }

    /// Looks up an entry and marks it as used.
    pub fn get(&self, id: &Uuid) -> Option<MealEntryFlow> {
        let mut sessions = self.lock();
        let session = sessions.get_mut(id)?;
        session.touched = Instant::now();
        Some(session.flow.clone())
    }

    pub fn remove(&self, id: &Uuid) -> Option<MealEntryFlow> {
        self.lock().remove(id).map(|s| s.flow)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Drops entries untouched for `idle_ttl`, and saved entries once they
    /// have been left alone for [`SAVED_RETENTION`]. Running analyses of
    /// dropped entries are cancelled. Returns how many were dropped.
    pub fn evict(&self, idle_ttl: Duration) -> usize {
        let now = Instant::now();
        let expired: Vec<MealEntryFlow> = {
            let mut sessions = self.lock();
            let ids: Vec<Uuid> = sessions
                .iter()
                .filter(|(_, s)| {
                    let idle = now.duration_since(s.touched);
                    idle >= idle_ttl
                        || (idle >= SAVED_RETENTION
                            && matches!(s.flow.state(), MealEntryState::Saved { .. }))
                })
                .map(|(id, _)| *id)
                .collect();
            ids.iter()
                .filter_map(|id| sessions.remove(id))
                .map(|s| s.flow)
                .collect()
        };
        for flow in &expired {
            flow.cancel_analysis();
        }
        expired.len()
    }

    /// Runs [`evict`](Self::evict) periodically until the handle is aborted.
    pub fn spawn_sweeper(&self, idle_ttl: Duration) -> JoinHandle<()> {
        let sessions = self.clone();
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                ticks.tick().await;
                let evicted = sessions.evict(idle_ttl);
                if evicted > 0 {
                    tracing::debug!(evicted, remaining = sessions.len(), "entry sessions evicted");
                }
            }
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Session>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::entry_routes())
        .merge(handlers::timeline_routes())
}
