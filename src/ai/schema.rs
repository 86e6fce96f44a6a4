use serde_json::json;

/// `{ success, error? }` used by the image and text validation capabilities.
pub fn validation_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "success": { "type": "boolean" },
            "error": {
                "type": "string",
                "enum": [
                    "NOT_ENOUGH_INFORMATION",
                    "POLICY_VIOLATION",
                    "IMAGE_IS_INAPPROPRIATE",
                    "IMAGE_VALIDATION_FAILED",
                    "OTHER"
                ]
            }
        },
        "required": ["success"]
    })
}

pub fn description_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "success": { "type": "boolean" },
            "user_description": { "type": "string" }
        },
        "required": ["success"]
    })
}

pub fn generated_prompt_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "success": { "type": "boolean" },
            "generated_prompt": {
                "type": "array",
                "items": { "type": "string" }
            }
        },
        "required": ["success"]
    })
}
