pub mod analyzer;
pub mod image_source;
pub mod parser;

use serde::{Deserialize, Serialize};

use crate::ai::{GatewayError, ValidationErrorCode};

pub use analyzer::MealAnalyzer;
pub use image_source::{ContentFetcher, HttpFetcher, ImageResolver};
pub use parser::{parse_analysis_text, IngredientDisplay};

/// Ingredients and triggers extracted by one analysis call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealAnalysisData {
    pub ingredients: Vec<String>,
    pub triggers: Vec<String>,
}

/// Why an analysis failed. The `Display` text is meant for the user.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("No internet connection")]
    Offline,

    #[error("AI response was empty or null")]
    EmptyResponse,

    #[error("Failed to decode bitmap from image file")]
    ImageDecode,

    #[error("Failed to read image: {0}")]
    ImageRead(String),

    #[error("Input rejected: {0}")]
    Rejected(ValidationErrorCode),

    #[error("AI analysis failed: {0}")]
    Gateway(#[from] GatewayError),
}
