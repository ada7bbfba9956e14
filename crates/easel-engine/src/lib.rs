mod agent;
mod completion;
mod expansion;
mod extraction;
mod transport;

#[cfg(test)]
mod testing;

pub use agent::{ChatError, ImageAgent, AGENT_SYSTEM_PROMPT, NO_RESPONSE_FALLBACK};
pub use completion::AssistantReply;
pub use expansion::{
    build_expansion_request, expand_image_prompt, parse_expansion, ExpandedPrompt,
    DEFAULT_NEGATIVE_PROMPT, NEGATIVE_DELIMITER,
};
pub use extraction::{
    build_image_request, default_output_dir, extract_image_bytes, generate_and_save_image,
    locate_image_source, persist_image, ImageLocator, ImageSource,
};
pub use transport::{Download, ModelTransport, OpenRouterClient};
