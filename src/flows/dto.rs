use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::{IngredientDisplay, MealAnalysisData};

use super::{timeline::DayGroup, MealEntryState, MealInput};

#[derive(Debug, Deserialize)]
pub struct EntryRequest {
    pub input: Option<MealInput>,
}

#[derive(Debug, Serialize)]
pub struct EntryResponse {
    pub id: Uuid,
    pub state: MealEntryState,
}

#[derive(Debug, Deserialize)]
pub struct TimelineQuery {
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Serialize)]
pub struct TimelineResponse {
    pub days: Vec<DayGroup>,
}

/// Edited rows from the results screen.
#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub ingredients: Vec<IngredientDisplay>,
    #[serde(default)]
    pub triggers: Vec<String>,
}

impl From<ConfirmRequest> for MealAnalysisData {
    fn from(r: ConfirmRequest) -> Self {
        Self {
            ingredients: r
                .ingredients
                .iter()
                .filter(|row| !row.name.trim().is_empty())
                .map(IngredientDisplay::to_raw)
                .collect(),
            triggers: r
                .triggers
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }
}
