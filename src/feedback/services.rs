use tracing::info;

use super::{repo, repo_types::UserFeedback};
use crate::db::Db;

pub const OTHER_FEELING: &str = "Other";

pub const FEELING_SUGGESTIONS: [&str; 8] = [
    "Great",
    "Good",
    "Okay",
    "Bloated",
    "Nauseous",
    "Tired",
    "Heartburn",
    OTHER_FEELING,
];

#[derive(Debug, thiserror::Error)]
pub enum FeedbackError {
    #[error("a feeling is required")]
    MissingFeeling,

    #[error("describe the feeling when choosing \"Other\"")]
    MissingCustomFeeling,

    #[error("failed to save feedback: {0}")]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct FeedbackDraft {
    pub meal_id: i64,
    pub feeling: String,
    pub custom_feeling: Option<String>,
    pub notes: Option<String>,
}

impl FeedbackDraft {
    /// Trims the text fields and checks the feeling.
    pub fn validate(self, feedback_timestamp: i64) -> Result<UserFeedback, FeedbackError> {
        let feeling = self.feeling.trim().to_string();
        if feeling.is_empty() {
            return Err(FeedbackError::MissingFeeling);
        }
        let custom_feeling = non_blank(self.custom_feeling);
        if feeling.eq_ignore_ascii_case(OTHER_FEELING) && custom_feeling.is_none() {
            return Err(FeedbackError::MissingCustomFeeling);
        }
        Ok(UserFeedback {
            id: 0,
            meal_id: self.meal_id,
            feedback_timestamp,
            feeling,
            custom_feeling,
            notes: non_blank(self.notes),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub async fn submit_feedback(
    db: &Db,
    draft: FeedbackDraft,
    feedback_timestamp: i64,
) -> Result<UserFeedback, FeedbackError> {
    let mut feedback = draft.validate(feedback_timestamp)?;
    feedback.id = repo::insert_feedback(db, &feedback).await?;
    info!(feedback_id = feedback.id, meal_id = feedback.meal_id, feeling = %feedback.feeling, "feedback saved");
    Ok(feedback)
}

#[cfg(test)]
mod services_tests {
    use super::*;
    use crate::meals::repo::{insert_meal, repo_tests::sample_meal};

    fn draft(feeling: &str, custom: Option<&str>) -> FeedbackDraft {
        FeedbackDraft {
            meal_id: 1,
            feeling: feeling.into(),
            custom_feeling: custom.map(str::to_string),
            notes: Some("   ".into()),
        }
    }

    #[test]
    fn blank_feeling_is_rejected() {
        assert!(matches!(
            draft("  ", None).validate(0),
            Err(FeedbackError::MissingFeeling)
        ));
    }

    #[test]
    fn other_needs_custom_text() {
        assert!(matches!(
            draft("Other", Some(" ")).validate(0),
            Err(FeedbackError::MissingCustomFeeling)
        ));
        let ok = draft("other", Some(" jittery ")).validate(5).unwrap();
        assert_eq!(ok.custom_feeling.as_deref(), Some("jittery"));
        assert_eq!(ok.notes, None);
        assert_eq!(ok.feedback_timestamp, 5);
    }

    #[test]
    fn free_text_feelings_are_allowed() {
        let ok = draft("Slightly dizzy", None).validate(0).unwrap();
        assert_eq!(ok.feeling, "Slightly dizzy");
    }

    #[tokio::test]
    async fn submit_persists_and_returns_the_id() {
        let db = Db::in_memory().await.unwrap();
        let meal_id = insert_meal(&db, &sample_meal(1_000, "rice")).await.unwrap();

        let mut d = draft("Good", None);
        d.meal_id = meal_id;
        let saved = submit_feedback(&db, d, 2_000).await.unwrap();

        assert!(saved.id > 0);
        let stored = repo::list_feedback_for_meal(&db, meal_id).await.unwrap();
        assert_eq!(stored, vec![saved]);
    }

    #[tokio::test]
    async fn submit_for_unknown_meal_is_a_storage_error() {
        let db = Db::in_memory().await.unwrap();
        let err = submit_feedback(&db, draft("Good", None), 2_000).await.unwrap_err();
        assert!(matches!(err, FeedbackError::Storage(_)));
    }
}
