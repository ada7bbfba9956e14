use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::completion::AssistantReply;
use crate::transport::ModelTransport;

pub const NEGATIVE_DELIMITER: &str = "---NEGATIVE---";

pub const DEFAULT_NEGATIVE_PROMPT: &str =
    "deformed, blurry, low quality, text, watermarks, stylized, unrealistic colors";

const EXPANSION_SYSTEM_PROMPT: &str = "You turn a short image request into a detailed, production-ready image generation prompt written in a documentary style.

## Guidelines

**Structure:** Subject -> Details (including framing and viewpoint) -> Setting/Context (who, where, when) -> Lighting/Atmosphere -> Style (documentary, photorealistic) -> Technical (16:9, 8K).

**Principles:** Informational focus, clarity over artistry, documentary aesthetic. Every image stands on its own. Avoid internal contradictions.

**Style:** Documentary or educational, photorealistic, 16:9 aspect ratio, 8K, high detail.

**Camera/Composition:** Always state the shot type and viewpoint (wide, medium or close-up; eye-level, low-angle or aerial), how the subject is framed, and one to three foreground or background elements that support the story.

**Historical authenticity:** When depicting a real period or event, keep props, wardrobe and architecture period-accurate, and add era-appropriate photographic cues where they help (for example \"high-resolution scan of an 1890s glass-plate photograph\", grain, halation, scratches, vignette) while still meeting the 8K, high-detail requirement.

**Detail level:** A single paragraph of three to six sentences. Include at least one viewpoint or framing cue, one lighting cue, and two to four era or style cues.

**Negative prompts:** Steer away from deformed, blurry, text, watermarks, overly stylized, unrealistic colors, anachronisms or modern elements, a CGI/3D render look, and multiple competing subjects.

## Output format

Output exactly two parts and nothing before or after them:

1. **Detailed image prompt**: one paragraph, documentary style, covering subject, details, setting, lighting, style and technical specs (16:9, 8K, photorealistic, high detail). No commentary, no JSON.

2. **Negative prompt**: on a new line write exactly `---NEGATIVE---`, then on the next line the negative prompt as a single comma-separated line.

Example:
```
[The full detailed image prompt, one paragraph.]
---NEGATIVE---
deformed, blurry, low quality, text, watermarks, modern elements, stylized, unrealistic proportions
```

Output ONLY the detailed prompt and the negative prompt in this form.";

/// Positive/negative prompt pair handed to the image model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedPrompt {
    pub prompt: String,
    pub negative_prompt: String,
}

impl ExpandedPrompt {
    /// The original request paired with the baseline negative prompt.
    pub fn fallback(user_prompt: &str) -> Self {
        Self {
            prompt: user_prompt.to_string(),
            negative_prompt: DEFAULT_NEGATIVE_PROMPT.to_string(),
        }
    }
}

pub fn build_expansion_request(text_model: &str, user_prompt: &str) -> Value {
    json!({
        "model": text_model,
        "messages": [
            { "role": "system", "content": EXPANSION_SYSTEM_PROMPT },
            { "role": "user", "content": format!("Expand this image prompt: {user_prompt}") },
        ],
    })
}

/// Expand `user_prompt` with one call to the text model.
///
/// Never fails. Transport errors and empty replies fall back to the original
/// prompt with the baseline negative prompt.
pub fn expand_image_prompt(
    transport: &dyn ModelTransport,
    text_model: &str,
    user_prompt: &str,
) -> ExpandedPrompt {
    let request = build_expansion_request(text_model, user_prompt);
    let payload = match transport.chat_completion(&request) {
        Ok(payload) => payload,
        Err(err) => {
            let error = format!("{err:#}");
            warn!(%error, "prompt expansion failed; using original prompt");
            return ExpandedPrompt::fallback(user_prompt);
        }
    };
    let reply = AssistantReply::from_completion(&payload);
    let expanded = parse_expansion(reply.text(), user_prompt);
    debug!(
        prompt = %expanded.prompt,
        negative_prompt = %expanded.negative_prompt,
        "prompt expanded"
    );
    expanded
}

/// Split a model reply on [`NEGATIVE_DELIMITER`], filling missing parts with defaults.
///
/// The detailed prompt is the text before the first delimiter and the negative
/// prompt the text up to the next one; anything after a second delimiter is dropped.
pub fn parse_expansion(raw: &str, user_prompt: &str) -> ExpandedPrompt {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return ExpandedPrompt::fallback(user_prompt);
    }
    let mut parts = trimmed.split(NEGATIVE_DELIMITER);
    let detailed = parts.next().unwrap_or_default().trim();
    let negative = parts.next().unwrap_or_default().trim();
    ExpandedPrompt {
        prompt: if detailed.is_empty() {
            user_prompt.to_string()
        } else {
            detailed.to_string()
        },
        negative_prompt: if negative.is_empty() {
            DEFAULT_NEGATIVE_PROMPT.to_string()
        } else {
            negative.to_string()
        },
    }
}
