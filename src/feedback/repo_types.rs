use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A wellbeing observation tied to a meal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UserFeedback {
    pub id: i64,
    pub meal_id: i64,
    pub feedback_timestamp: i64,
    pub feeling: String,
    pub custom_feeling: Option<String>,
    pub notes: Option<String>,
}
