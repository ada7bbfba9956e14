use easel_contracts::chat::ToolInvocation;
use serde_json::Value;

/// The parts of `choices[0].message` the agent acts on.
///
/// Parsing never fails: a payload without choices yields an empty reply whose
/// `raw_message` is `null`, so callers can still report what came back.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantReply {
    pub content: Option<String>,
    /// One slot per raw `tool_calls` entry; `None` where the entry could not be read.
    pub tool_calls: Vec<Option<ToolInvocation>>,
    /// `images[*].image_url.url`, in response order.
    pub image_urls: Vec<String>,
    pub raw_message: Value,
}

impl AssistantReply {
    pub fn from_completion(payload: &Value) -> Self {
        let message = payload
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
            .and_then(|choice| choice.get("message"))
            .cloned()
            .unwrap_or(Value::Null);

        let content = message.get("content").and_then(message_content_text);
        let tool_calls: Vec<Option<ToolInvocation>> = message
            .get("tool_calls")
            .and_then(Value::as_array)
            .map(|calls| calls.iter().map(parse_tool_call).collect())
            .unwrap_or_default();
        let image_urls: Vec<String> = message
            .get("images")
            .and_then(Value::as_array)
            .map(|images| {
                images
                    .iter()
                    .map(|image| {
                        image
                            .get("image_url")
                            .and_then(|row| row.get("url"))
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .trim()
                            .to_string()
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            content,
            tool_calls,
            image_urls,
            raw_message: message,
        }
    }

    /// Only the first invocation is considered per turn; any others are ignored.
    /// An unreadable first entry yields `None` rather than promoting the next one.
    pub fn first_tool_call(&self) -> Option<&ToolInvocation> {
        self.tool_calls.first()?.as_ref()
    }

    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

fn parse_tool_call(call: &Value) -> Option<ToolInvocation> {
    let function = call.get("function")?;
    let name = function.get("name").and_then(Value::as_str)?.trim();
    let arguments = match function.get("arguments") {
        Some(Value::String(raw)) => raw.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    Some(ToolInvocation {
        id: call.get("id").and_then(Value::as_str).map(str::to_string),
        name: name.to_string(),
        arguments,
    })
}

fn message_content_text(content: &Value) -> Option<String> {
    match content {
        Value::String(text) => Some(text.clone()),
        Value::Array(parts) => {
            let text = parts
                .iter()
                .filter_map(|part| match part {
                    Value::String(text) => Some(text.as_str()),
                    Value::Object(_) => part.get("text").and_then(Value::as_str),
                    _ => None,
                })
                .collect::<Vec<&str>>()
                .join("");
            Some(text)
        }
        _ => None,
    }
}
