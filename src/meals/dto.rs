use serde::{Deserialize, Serialize};

use crate::analysis::{parser::to_display, IngredientDisplay, MealAnalysisData};
use crate::meals::repo_types::{InputKind, Meal};

#[derive(Debug, Deserialize)]
pub struct AnalyzeTextRequest {
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzePhotoRequest {
    pub photo_uri: String,
}

#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    pub ingredients: Vec<String>,
    pub triggers: Vec<String>,
    pub display: Vec<IngredientDisplay>,
}

impl From<MealAnalysisData> for AnalysisResponse {
    fn from(data: MealAnalysisData) -> Self {
        Self {
            display: to_display(&data.ingredients),
            ingredients: data.ingredients,
            triggers: data.triggers,
        }
    }
}

/// Outcome of a validation call. A rejection is a normal answer, not an error.
#[derive(Debug, Serialize)]
pub struct ValidationResponse {
    pub valid: bool,
    pub reason: Option<String>,
}

/// Body for `POST /meals` and `PUT /meals/:id`.
#[derive(Debug, Deserialize)]
pub struct SaveMealRequest {
    /// Epoch millis; defaults to now.
    pub timestamp: Option<i64>,
    pub input_kind: InputKind,
    pub photo_uri: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub raw_extracted_ingredients: Vec<String>,
    #[serde(default)]
    pub raw_extracted_triggers: Vec<String>,
    #[serde(default)]
    pub confirmed_ingredients: Vec<String>,
    #[serde(default)]
    pub confirmed_triggers: Vec<String>,
    pub notes: Option<String>,
}

impl SaveMealRequest {
    pub fn into_meal(self, id: i64, now: i64) -> Meal {
        Meal {
            id,
            timestamp: self.timestamp.unwrap_or(now),
            input_kind: self.input_kind,
            photo_uri: self.photo_uri,
            description: self.description,
            raw_extracted_ingredients: self.raw_extracted_ingredients,
            raw_extracted_triggers: self.raw_extracted_triggers,
            confirmed_ingredients: self.confirmed_ingredients,
            confirmed_triggers: self.confirmed_triggers,
            notes: self.notes,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MealDetails {
    #[serde(flatten)]
    pub meal: Meal,
    pub confirmed_display: Vec<IngredientDisplay>,
}

impl From<Meal> for MealDetails {
    fn from(meal: Meal) -> Self {
        Self {
            confirmed_display: to_display(&meal.confirmed_ingredients),
            meal,
        }
    }
}
