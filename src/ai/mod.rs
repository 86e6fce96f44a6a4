pub mod connectivity;
pub mod gateway;
pub mod gemini;
pub mod prompts;
pub mod schema;

pub use connectivity::{Connectivity, TcpProbe};
pub use gateway::{
    AiGateway, Capability, DescriptionResult, GatewayError, GeneratedPromptResult,
    GenerationRequest, ImagePayload, ValidationErrorCode, ValidationResult,
};
pub use gemini::GeminiGateway;
