//! Delayed "how do you feel?" reminders after a meal is logged.
//!
//! Jobs are unique by name; enqueuing a name that is already pending replaces
//! the pending job. Jobs live in memory only.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde::Serialize;
use tokio::task::AbortHandle;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub deep_link: String,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification permission denied")]
    PermissionDenied,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn post(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log. With `enabled == false` it behaves like a
/// device where the user refused notification permission.
#[derive(Debug, Clone)]
pub struct LogNotifier {
    enabled: bool,
}

impl LogNotifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn post(&self, n: &Notification) -> Result<(), NotifyError> {
        if !self.enabled {
            return Err(NotifyError::PermissionDenied);
        }
        info!(title = %n.title, body = %n.body, deep_link = %n.deep_link, "notification posted");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Success,
    Failure,
}

/// Something that can queue the post-meal reminder.
pub trait ReminderScheduling: Send + Sync {
    fn schedule_feedback_reminder(&self, meal_id: i64);
}

pub fn job_name(meal_id: i64) -> String {
    format!("meal_feedback_reminder_{meal_id}")
}

pub fn feedback_deep_link(meal_id: i64) -> String {
    format!("nuri://feedback?meal_id={meal_id}")
}

pub fn feedback_notification(meal_id: i64) -> Notification {
    Notification {
        title: "How are you feeling?".to_string(),
        body: "Tell us how you feel after your meal.".to_string(),
        deep_link: feedback_deep_link(meal_id),
    }
}

/// Body of the reminder job. A refused permission is a failed job, never a
/// panic.
pub async fn run_feedback_reminder(notifier: &dyn Notifier, meal_id: i64) -> JobOutcome {
    match notifier.post(&feedback_notification(meal_id)).await {
        Ok(()) => JobOutcome::Success,
        Err(e) => {
            warn!(error = %e, meal_id, "feedback reminder failed");
            JobOutcome::Failure
        }
    }
}

#[derive(Clone)]
pub struct ReminderScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    delay: Duration,
    notifier: Arc<dyn Notifier>,
    next_generation: AtomicU64,
    pending: Mutex<HashMap<String, (u64, AbortHandle)>>,
}

impl ReminderScheduler {
    pub fn new(delay: Duration, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            inner: Arc::new(Inner {
                delay,
                notifier,
                next_generation: AtomicU64::new(0),
                pending: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Queues the reminder for `meal_id`, replacing one already waiting.
    pub fn enqueue(&self, meal_id: i64) {
        let name = job_name(meal_id);
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let mut pending = lock(&self.inner.pending);

        if let Some((_, previous)) = pending.remove(&name) {
            previous.abort();
            info!(job = %name, "replaced pending reminder");
        }

        let inner = Arc::clone(&self.inner);
        let job = name.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(inner.delay).await;
            let outcome = run_feedback_reminder(inner.notifier.as_ref(), meal_id).await;
            info!(job = %job, ?outcome, "reminder finished");
            let mut pending = lock(&inner.pending);
            if pending.get(&job).is_some_and(|(g, _)| *g == generation) {
                pending.remove(&job);
            }
        });
        pending.insert(name.clone(), (generation, handle.abort_handle()));
        info!(job = %name, delay_secs = self.inner.delay.as_secs(), "reminder scheduled");
    }

    /// Drops the pending reminder for `meal_id`, if any.
    pub fn cancel(&self, meal_id: i64) -> bool {
        match lock(&self.inner.pending).remove(&job_name(meal_id)) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Names of the reminders still waiting, sorted.
    pub fn pending(&self) -> Vec<String> {
        let mut names: Vec<_> = lock(&self.inner.pending).keys().cloned().collect();
        names.sort();
        names
    }
}

impl ReminderScheduling for ReminderScheduler {
    fn schedule_feedback_reminder(&self, meal_id: i64) {
        self.enqueue(meal_id);
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
