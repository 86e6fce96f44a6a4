use serde::Deserialize;

use super::services::FeedbackDraft;

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub meal_id: i64,
    pub feeling: String,
    pub custom_feeling: Option<String>,
    pub notes: Option<String>,
}

impl From<FeedbackRequest> for FeedbackDraft {
    fn from(r: FeedbackRequest) -> Self {
        Self {
            meal_id: r.meal_id,
            feeling: r.feeling,
            custom_feeling: r.custom_feeling,
            notes: r.notes,
        }
    }
}
