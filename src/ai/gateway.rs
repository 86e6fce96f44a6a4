use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::schema;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("instruction must not be empty")]
    EmptyInstruction,

    #[error("AI service request failed: {0}")]
    Transport(String),

    #[error("AI service returned {status}: {body}")]
    Service { status: u16, body: String },

    #[error("AI response did not match the expected schema: {0}")]
    MalformedResponse(String),
}

/// What the model is asked to do. Each capability has its own response
/// schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ValidateImage,
    DescribeImage,
    ProcessTextPrompt,
    GenerateStructuredPrompt,
}

impl Capability {
    pub fn response_schema(self) -> serde_json::Value {
        match self {
            Capability::ValidateImage | Capability::ProcessTextPrompt => {
                schema::validation_schema()
            }
            Capability::DescribeImage => schema::description_schema(),
            Capability::GenerateStructuredPrompt => schema::generated_prompt_schema(),
        }
    }
}

/// Image bytes ready to send inline.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub bytes: Bytes,
    pub mime_type: String,
}

#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub capability: Capability,
    pub instruction: &'a str,
    pub image: Option<&'a ImagePayload>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationErrorCode {
    NotEnoughInformation,
    PolicyViolation,
    ImageIsInappropriate,
    ImageValidationFailed,
    #[serde(other)]
    Other,
}

impl fmt::Display for ValidationErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ValidationErrorCode::NotEnoughInformation => "not enough information",
            ValidationErrorCode::PolicyViolation => "policy violation",
            ValidationErrorCode::ImageIsInappropriate => "image is inappropriate",
            ValidationErrorCode::ImageValidationFailed => "image validation failed",
            ValidationErrorCode::Other => "other",
        };
        f.write_str(msg)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub success: bool,
    #[serde(default)]
    pub error: Option<ValidationErrorCode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptionResult {
    pub success: bool,
    #[serde(default)]
    pub user_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedPromptResult {
    pub success: bool,
    #[serde(default)]
    pub generated_prompt: Vec<String>,
}

/// Thin seam over a generative model. Implementors only provide `generate`,
/// which returns the raw JSON text the model produced; the typed helpers
/// check the instruction and decode the payload.
#[async_trait]
pub trait AiGateway: Send + Sync {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String, GatewayError>;

    async fn validate_image(
        &self,
        instruction: &str,
        image: &ImagePayload,
    ) -> Result<ValidationResult, GatewayError> {
        let raw = self
            .generate(checked(Capability::ValidateImage, instruction, Some(image))?)
            .await?;
        decode(&raw)
    }

    async fn describe_image(
        &self,
        instruction: &str,
        image: &ImagePayload,
    ) -> Result<DescriptionResult, GatewayError> {
        let raw = self
            .generate(checked(Capability::DescribeImage, instruction, Some(image))?)
            .await?;
        decode(&raw)
    }

    async fn process_text_prompt(
        &self,
        instruction: &str,
    ) -> Result<ValidationResult, GatewayError> {
        let raw = self
            .generate(checked(Capability::ProcessTextPrompt, instruction, None)?)
            .await?;
        decode(&raw)
    }

    async fn generate_structured_prompt(
        &self,
        instruction: &str,
    ) -> Result<GeneratedPromptResult, GatewayError> {
        let raw = self
            .generate(checked(Capability::GenerateStructuredPrompt, instruction, None)?)
            .await?;
        decode(&raw)
    }
}

fn checked<'a>(
    capability: Capability,
    instruction: &'a str,
    image: Option<&'a ImagePayload>,
) -> Result<GenerationRequest<'a>, GatewayError> {
    if instruction.trim().is_empty() {
        return Err(GatewayError::EmptyInstruction);
    }
    Ok(GenerationRequest {
        capability,
        instruction,
        image,
    })
}

fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, GatewayError> {
    serde_json::from_str(raw).map_err(|e| {
        tracing::error!(error = %e, "AI payload does not match schema");
        GatewayError::MalformedResponse(e.to_string())
    })
}
