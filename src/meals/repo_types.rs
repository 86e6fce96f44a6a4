use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};

use crate::analysis::MealAnalysisData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InputKind {
    Photo,
    Text,
}

impl InputKind {
    pub fn as_str(self) -> &'static str {
        match self {
            InputKind::Photo => "PHOTO",
            InputKind::Text => "TEXT",
        }
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InputKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PHOTO" => Ok(InputKind::Photo),
            "TEXT" => Ok(InputKind::Text),
            other => anyhow::bail!("unknown input kind {other:?}"),
        }
    }
}

/// A logged eating event. `id == 0` means the meal has not been stored yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meal {
    pub id: i64,
    pub timestamp: i64,
    pub input_kind: InputKind,
    pub photo_uri: Option<String>,
    pub description: Option<String>,
    pub raw_extracted_ingredients: Vec<String>,
    pub raw_extracted_triggers: Vec<String>,
    pub confirmed_ingredients: Vec<String>,
    pub confirmed_triggers: Vec<String>,
    pub notes: Option<String>,
}

impl Meal {
    /// Builds an unsaved meal from an analysis payload. The confirmed lists
    /// are whatever the user accepted; the raw lists mirror the payload.
    pub fn from_analysis(
        timestamp: i64,
        input_kind: InputKind,
        source: Option<String>,
        analysis: &MealAnalysisData,
        confirmed: &MealAnalysisData,
    ) -> Self {
        let (photo_uri, description) = match input_kind {
            InputKind::Photo => (source, None),
            InputKind::Text => (None, source),
        };
        Self {
            id: 0,
            timestamp,
            input_kind,
            photo_uri,
            description,
            raw_extracted_ingredients: analysis.ingredients.clone(),
            raw_extracted_triggers: analysis.triggers.clone(),
            confirmed_ingredients: confirmed.ingredients.clone(),
            confirmed_triggers: confirmed.triggers.clone(),
            notes: None,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct MealRow {
    pub id: i64,
    pub timestamp: i64,
    pub input_kind: String,
    pub photo_uri: Option<String>,
    pub description: Option<String>,
    pub raw_extracted_ingredients: Json<Vec<String>>,
    pub raw_extracted_triggers: Json<Vec<String>>,
    pub confirmed_ingredients: Json<Vec<String>>,
    pub confirmed_triggers: Json<Vec<String>>,
    pub notes: Option<String>,
}

impl TryFrom<MealRow> for Meal {
    type Error = anyhow::Error;

    fn try_from(r: MealRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            timestamp: r.timestamp,
            input_kind: r.input_kind.parse()?,
            photo_uri: r.photo_uri,
            description: r.description,
            raw_extracted_ingredients: r.raw_extracted_ingredients.0,
            raw_extracted_triggers: r.raw_extracted_triggers.0,
            confirmed_ingredients: r.confirmed_ingredients.0,
            confirmed_triggers: r.confirmed_triggers.0,
            notes: r.notes,
        })
    }
}
