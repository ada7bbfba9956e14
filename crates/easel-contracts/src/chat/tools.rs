use serde::Deserialize;
use serde_json::{json, Value};

pub const GENERATE_IMAGE_TOOL: &str = "generate_image";

/// Function spec for the image tool, in chat-completions `tools` shape.
pub fn generate_image_tool() -> Value {
    json!({
        "type": "function",
        "function": {
            "name": GENERATE_IMAGE_TOOL,
            "description": "Generates an image based on the user's prompt",
            "parameters": {
                "type": "object",
                "properties": {
                    "prompt": {
                        "type": "string",
                        "description": "The descriptive image prompt to pass to the image generator."
                    }
                },
                "required": ["prompt"]
            }
        }
    })
}

/// A function call requested by the model. `arguments` is the raw JSON text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub id: Option<String>,
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ToolArgumentsError {
    #[error("invalid generate_image arguments")]
    Malformed(#[from] serde_json::Error),
    #[error("generate_image arguments contain an empty prompt")]
    EmptyPrompt,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GenerateImageArgs {
    pub prompt: String,
}

impl GenerateImageArgs {
    pub fn decode(arguments: &str) -> Result<Self, ToolArgumentsError> {
        let raw = if arguments.trim().is_empty() {
            "{}"
        } else {
            arguments
        };
        let args: Self = serde_json::from_str(raw)?;
        if args.prompt.trim().is_empty() {
            return Err(ToolArgumentsError::EmptyPrompt);
        }
        Ok(args)
    }
}
