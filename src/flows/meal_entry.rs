//! State machine behind the "log a meal" screens, for photo and text input.
//!
//! `transition` is pure; [`MealEntryFlow`] runs the side effects (analysis,
//! insert, reminder) and publishes every state through a `watch` channel.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

use serde::{Deserialize, Serialize};
use tokio::{sync::watch, task::JoinHandle};
use tracing::warn;

use crate::{
    analysis::{MealAnalysisData, MealAnalyzer},
    db::Db,
    meals::{
        repo_types::{InputKind, Meal},
        services::save_meal,
    },
    reminders::ReminderScheduling,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MealInput {
    Photo(String),
    Text(String),
}

impl MealInput {
    pub fn input_kind(&self) -> InputKind {
        match self {
            MealInput::Photo(_) => InputKind::Photo,
            MealInput::Text(_) => InputKind::Text,
        }
    }

    pub fn source(&self) -> &str {
        match self {
            MealInput::Photo(uri) => uri,
            MealInput::Text(text) => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MealEntryState {
    Idle {
        input: Option<MealInput>,
    },
    /// `attempt` tells apart results of earlier analyses.
    Loading {
        input: MealInput,
        #[serde(skip)]
        attempt: u64,
    },
    Success {
        input: MealInput,
        analysis: MealAnalysisData,
        confirmed: MealAnalysisData,
    },
    Error {
        input: Option<MealInput>,
        message: String,
    },
    Saving {
        input: MealInput,
        analysis: MealAnalysisData,
        confirmed: MealAnalysisData,
    },
    Saved {
        meal_id: i64,
    },
}

impl MealEntryState {
    pub fn input(&self) -> Option<&MealInput> {
        match self {
            MealEntryState::Idle { input } | MealEntryState::Error { input, .. } => input.as_ref(),
            MealEntryState::Loading { input, .. }
            | MealEntryState::Success { input, .. }
            | MealEntryState::Saving { input, .. } => Some(input),
            MealEntryState::Saved { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MealEntryEvent {
    Analyze { attempt: u64 },
    AnalysisSucceeded { attempt: u64, data: MealAnalysisData },
    AnalysisFailed { attempt: u64, message: String },
    Confirm(MealAnalysisData),
    Save,
    SaveSucceeded(i64),
    SaveFailed(String),
    Reset(Option<MealInput>),
}

/// Next state, or `None` when the event does not apply to `state`.
pub fn transition(state: &MealEntryState, event: MealEntryEvent) -> Option<MealEntryState> {
    use MealEntryEvent as E;
    use MealEntryState as S;

    match (state, event) {
        (S::Idle { input: Some(input) }, E::Analyze { attempt })
        | (S::Error { input: Some(input), .. }, E::Analyze { attempt })
        | (S::Loading { input, .. }, E::Analyze { attempt })
        | (S::Success { input, .. }, E::Analyze { attempt }) => Some(S::Loading {
            input: input.clone(),
            attempt,
        }),

        (S::Loading { input, attempt }, E::AnalysisSucceeded { attempt: done, data })
            if *attempt == done =>
        {
            Some(S::Success {
                input: input.clone(),
                confirmed: data.clone(),
                analysis: data,
            })
        }
        (S::Loading { input, attempt }, E::AnalysisFailed { attempt: done, message })
            if *attempt == done =>
        {
            Some(S::Error {
                input: Some(input.clone()),
                message,
            })
        }

        (S::Success { input, analysis, .. }, E::Confirm(confirmed)) => Some(S::Success {
            input: input.clone(),
            analysis: analysis.clone(),
            confirmed,
        }),

        (
            S::Success {
                input,
                analysis,
                confirmed,
            },
            E::Save,
        ) => Some(S::Saving {
            input: input.clone(),
            analysis: analysis.clone(),
            confirmed: confirmed.clone(),
        }),
        (S::Saving { .. }, E::SaveSucceeded(meal_id)) => Some(S::Saved { meal_id }),
        (S::Saving { input, .. }, E::SaveFailed(message)) => Some(S::Error {
            input: Some(input.clone()),
            message,
        }),

        (_, E::Reset(input)) => Some(S::Idle { input }),

        _ => None,
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FlowError {
    #[error("nothing to analyze yet")]
    NoInput,

    #[error("cannot {action} while {state}")]
    InvalidTransition { action: &'static str, state: &'static str },
}

fn state_name(state: &MealEntryState) -> &'static str {
    match state {
        MealEntryState::Idle { .. } => "idle",
        MealEntryState::Loading { .. } => "loading",
        MealEntryState::Success { .. } => "showing results",
        MealEntryState::Error { .. } => "in error",
        MealEntryState::Saving { .. } => "saving",
        MealEntryState::Saved { .. } => "saved",
    }
}

/// One meal being logged. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MealEntryFlow {
    state: Arc<watch::Sender<MealEntryState>>,
    analysis_job: Arc<Mutex<Option<JoinHandle<()>>>>,
    attempts: Arc<AtomicU64>,
    save_job: Arc<Mutex<Option<JoinHandle<()>>>>,
    analyzer: Arc<MealAnalyzer>,
    db: Db,
    reminders: Arc<dyn ReminderScheduling>,
}

impl MealEntryFlow {
    pub fn new(
        input: Option<MealInput>,
        analyzer: Arc<MealAnalyzer>,
        db: Db,
        reminders: Arc<dyn ReminderScheduling>,
    ) -> Self {
        let (state, _) = watch::channel(MealEntryState::Idle { input });
        Self {
            state: Arc::new(state),
            analysis_job: Arc::new(Mutex::new(None)),
            attempts: Arc::new(AtomicU64::new(0)),
            save_job: Arc::new(Mutex::new(None)),
            analyzer,
            db,
            reminders,
        }
    }

    pub fn state(&self) -> MealEntryState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MealEntryState> {
        self.state.subscribe()
    }

    /// Applies `event` if it is valid for the current state. Returns whether
    /// the state changed.
    fn apply(&self, event: MealEntryEvent) -> bool {
        self.state.send_if_modified(|current| match transition(current, event) {
            Some(next) => {
                *current = next;
                true
            }
            None => false,
        })
    }

    /// Starts analyzing the current input. An analysis already in flight is
    /// cancelled, and whatever it still reports is discarded.
    pub fn analyze(&self) -> Result<(), FlowError> {
        let current = self.state();
        let input = match (&current, current.input()) {
            (_, Some(input)) => input.clone(),
            (MealEntryState::Idle { .. } | MealEntryState::Error { .. }, None) => {
                return Err(FlowError::NoInput)
            }
            (_, None) => {
                return Err(FlowError::InvalidTransition {
                    action: "analyze",
                    state: state_name(&current),
                })
            }
        };

        let mut job = lock(&self.analysis_job);
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.apply(MealEntryEvent::Analyze { attempt }) {
            return Err(FlowError::InvalidTransition {
                action: "analyze",
                state: state_name(&current),
            });
        }
        if let Some(previous) = job.take() {
            previous.abort();
        }

        let flow = self.clone();
        *job = Some(tokio::spawn(async move {
            let outcome = match &input {
                MealInput::Photo(uri) => flow.analyzer.analyze_from_image(uri).await,
                MealInput::Text(text) => flow.analyzer.analyze_from_text(text).await,
            };
            let applied = flow.apply(match outcome {
                Ok(data) => MealEntryEvent::AnalysisSucceeded { attempt, data },
                Err(e) => MealEntryEvent::AnalysisFailed {
                    attempt,
                    message: e.to_string(),
                },
            });
            if !applied {
                tracing::debug!(attempt, "discarded stale analysis result");
            }
        }));
        Ok(())
    }

    /// Stops a running analysis without touching the state.
    pub fn cancel_analysis(&self) {
        if let Some(job) = lock(&self.analysis_job).take() {
            job.abort();
        }
    }

    /// Replaces the user-confirmed lists while results are shown.
    pub fn confirm(&self, confirmed: MealAnalysisData) -> Result<(), FlowError> {
        let current = self.state();
        if self.apply(MealEntryEvent::Confirm(confirmed)) {
            Ok(())
        } else {
            Err(FlowError::InvalidTransition {
                action: "confirm",
                state: state_name(&current),
            })
        }
    }

    /// Stores the meal and queues its feedback reminder. Only valid while
    /// results are shown. A meal that was inserted stays inserted even if a
    /// later step fails.
    pub fn save(&self) -> Result<(), FlowError> {
        let current = self.state();
        let mut job = lock(&self.save_job);
        if !self.apply(MealEntryEvent::Save) {
            return Err(FlowError::InvalidTransition {
                action: "save",
                state: state_name(&current),
            });
        }
        let MealEntryState::Saving {
            input,
            analysis,
            confirmed,
        } = self.state()
        else {
            return Ok(());
        };

        let flow = self.clone();
        *job = Some(tokio::spawn(async move {
            let meal = Meal::from_analysis(
                crate::now_millis(),
                input.input_kind(),
                Some(input.source().to_string()),
                &analysis,
                &confirmed,
            );
            match save_meal(&flow.db, flow.reminders.as_ref(), meal).await {
                Ok(saved) => {
                    flow.apply(MealEntryEvent::SaveSucceeded(saved.id));
                }
                Err(e) => {
                    warn!(error = %e, "saving meal failed");
                    flow.apply(MealEntryEvent::SaveFailed(format!("Failed to save meal: {e}")));
                }
            }
        }));
        Ok(())
    }

    /// Back to idle, dropping any results. A new input may be supplied;
    /// otherwise the current one is kept.
    pub fn reset(&self, input: Option<MealInput>) {
        self.cancel_analysis();
        let input = input.or_else(|| self.state().input().cloned());
        self.apply(MealEntryEvent::Reset(input));
    }

    /// Resolves once the state satisfies `done`.
    pub async fn wait_for(&self, done: impl Fn(&MealEntryState) -> bool) -> MealEntryState {
        let mut rx = self.subscribe();
        if let Ok(state) = rx.wait_for(|s| done(s)).await {
            return state.clone();
        }
        self.state()
    }
}

/// Convenience for the "analysis done" condition.
pub fn is_settled(state: &MealEntryState) -> bool {
    !matches!(
        state,
        MealEntryState::Loading { .. } | MealEntryState::Saving { .. }
    )
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
