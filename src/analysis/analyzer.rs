use std::sync::Arc;

use tracing::{info, instrument, warn};

use super::{image_source::ImageResolver, parser::parse_analysis_text, AnalysisError, MealAnalysisData};
use crate::ai::{prompts, AiGateway, Connectivity, ValidationErrorCode, ValidationResult};

/// Turns a photo or a typed description into ingredient and trigger lists.
///
/// Every call is independent: no retries, no caching, nothing stops two
/// analyses of the same input from running at once.
#[derive(Clone)]
pub struct MealAnalyzer {
    gateway: Arc<dyn AiGateway>,
    connectivity: Arc<dyn Connectivity>,
    images: ImageResolver,
}

impl MealAnalyzer {
    pub fn new(
        gateway: Arc<dyn AiGateway>,
        connectivity: Arc<dyn Connectivity>,
        images: ImageResolver,
    ) -> Self {
        Self {
            gateway,
            connectivity,
            images,
        }
    }

    #[instrument(skip(self))]
    pub async fn analyze_from_text(&self, description: &str) -> Result<MealAnalysisData, AnalysisError> {
        self.ensure_online().await?;
        let outcome = self.extract(description).await;
        log_outcome(&outcome);
        outcome
    }

    #[instrument(skip(self))]
    pub async fn analyze_from_image(&self, uri: &str) -> Result<MealAnalysisData, AnalysisError> {
        let outcome = self.analyze_image_inner(uri).await;
        log_outcome(&outcome);
        outcome
    }

    async fn analyze_image_inner(&self, uri: &str) -> Result<MealAnalysisData, AnalysisError> {
        let image = self.images.load(uri).await?;
        self.ensure_online().await?;

        let described = self
            .gateway
            .describe_image(prompts::DESCRIBE_IMAGE, &image)
            .await?;
        let description = described
            .user_description
            .filter(|d| described.success && !d.trim().is_empty())
            .ok_or(AnalysisError::EmptyResponse)?;

        self.extract(&description).await
    }

    /// Asks the model whether a typed description is detailed enough.
    #[instrument(skip(self))]
    pub async fn validate_description(&self, description: &str) -> Result<(), AnalysisError> {
        self.ensure_online().await?;
        let verdict = self
            .gateway
            .process_text_prompt(&prompts::validate_description(description))
            .await?;
        accept(verdict)
    }

    /// Asks the model whether a photo shows an identifiable meal.
    #[instrument(skip(self))]
    pub async fn validate_photo(&self, uri: &str) -> Result<(), AnalysisError> {
        let image = self.images.load(uri).await?;
        self.ensure_online().await?;
        let verdict = self
            .gateway
            .validate_image(prompts::VALIDATE_IMAGE, &image)
            .await?;
        accept(verdict)
    }

    async fn ensure_online(&self) -> Result<(), AnalysisError> {
        if self.connectivity.is_online().await {
            Ok(())
        } else {
            Err(AnalysisError::Offline)
        }
    }

    async fn extract(&self, description: &str) -> Result<MealAnalysisData, AnalysisError> {
        let generated = self
            .gateway
            .generate_structured_prompt(&prompts::meal_analysis(description))
            .await?;
        let text = generated
            .generated_prompt
            .into_iter()
            .next()
            .filter(|t| generated.success && !t.trim().is_empty())
            .ok_or(AnalysisError::EmptyResponse)?;

        Ok(parse_analysis_text(&text))
    }
}

fn accept(verdict: ValidationResult) -> Result<(), AnalysisError> {
    if verdict.success {
        Ok(())
    } else {
        Err(AnalysisError::Rejected(
            verdict.error.unwrap_or(ValidationErrorCode::Other),
        ))
    }
}

fn log_outcome(outcome: &Result<MealAnalysisData, AnalysisError>) {
    match outcome {
        Ok(data) => info!(
            ingredients = data.ingredients.len(),
            triggers = data.triggers.len(),
            "meal analyzed"
        ),
        Err(e) => warn!(error = %e, "meal analysis failed"),
    }
}
