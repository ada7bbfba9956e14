use std::path::{Path, PathBuf};

use anyhow::Result;
use easel_contracts::chat::{
    generate_image_tool, GenerateImageArgs, Message, ToolInvocation, GENERATE_IMAGE_TOOL,
};
use easel_contracts::config::AgentConfig;
use serde_json::{json, Value};
use tracing::debug;

use crate::completion::AssistantReply;
use crate::expansion::expand_image_prompt;
use crate::extraction::generate_and_save_image;
use crate::transport::ModelTransport;

pub const AGENT_SYSTEM_PROMPT: &str = "You are a specialized image generation agent. Your primary purpose is to help users create, refine, and generate high-quality images.
If the user just talks or asks questions, reply normally in text, offering advice on image creation if relevant.
If the user asks you to generate, create, or draw an image, you MUST call the \"generate_image\" tool with the full image prompt. Be concise.";

pub const NO_RESPONSE_FALLBACK: &str = "No response generated.";

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The primary chat call failed; the turn produced no reply.
    #[error("Text Generation Error: {0}")]
    TextGeneration(String),
}

/// Runs one chat turn end to end: tool detection, prompt expansion, image output.
pub struct ImageAgent<T: ModelTransport> {
    transport: T,
    text_model: String,
    image_model: String,
    output_dir: PathBuf,
}

impl<T: ModelTransport> ImageAgent<T> {
    pub fn new(
        transport: T,
        text_model: impl Into<String>,
        image_model: impl Into<String>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            transport,
            text_model: text_model.into(),
            image_model: image_model.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn from_config(transport: T, config: &AgentConfig, output_dir: impl Into<PathBuf>) -> Self {
        Self::new(
            transport,
            config.text_model.clone(),
            config.image_model.clone(),
            output_dir,
        )
    }

    pub fn text_model(&self) -> &str {
        &self.text_model
    }

    pub fn image_model(&self) -> &str {
        &self.image_model
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Produce the assistant's reply to `history`.
    ///
    /// `on_update` receives progress lines while an image is being made. Image
    /// failures come back as `Ok("Failed to generate image: ...")`; only a failed
    /// primary chat call is an `Err`.
    pub fn chat(
        &self,
        history: &[Message],
        on_update: &mut dyn FnMut(&str),
    ) -> Result<String, ChatError> {
        let request = self.build_chat_request(history);
        let payload = self
            .transport
            .chat_completion(&request)
            .map_err(|err| ChatError::TextGeneration(format!("{err:#}")))?;
        let reply = AssistantReply::from_completion(&payload);

        if let Some(invocation) = reply.first_tool_call() {
            if reply.tool_calls.len() > 1 {
                debug!(
                    ignored = reply.tool_calls.len() - 1,
                    "only the first tool call is honored"
                );
            }
            if invocation.name == GENERATE_IMAGE_TOOL {
                return Ok(match self.run_image_tool(invocation, on_update) {
                    Ok(summary) => summary,
                    Err(err) => format!("Failed to generate image: {err:#}"),
                });
            }
            debug!(tool = %invocation.name, "ignoring call to unknown tool");
        }

        Ok(reply
            .content
            .filter(|content| !content.is_empty())
            .unwrap_or_else(|| NO_RESPONSE_FALLBACK.to_string()))
    }

    fn build_chat_request(&self, history: &[Message]) -> Value {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(Message::system(AGENT_SYSTEM_PROMPT));
        messages.extend(history.iter().cloned());
        json!({
            "model": self.text_model,
            "messages": messages,
            "tools": [generate_image_tool()],
            "tool_choice": "auto",
        })
    }

    fn run_image_tool(
        &self,
        invocation: &ToolInvocation,
        on_update: &mut dyn FnMut(&str),
    ) -> Result<String> {
        let args = GenerateImageArgs::decode(&invocation.arguments)?;
        on_update(&format!("Expanding prompt: \"{}\"...", args.prompt));
        let expanded = expand_image_prompt(&self.transport, &self.text_model, &args.prompt);
        on_update(&format!(
            "Generating image with detailed prompt: \"{}\" using {}...",
            expanded.prompt, self.image_model
        ));
        let path = generate_and_save_image(
            &self.transport,
            &self.image_model,
            &expanded,
            &self.output_dir,
        )?;
        Ok(format!(
            "Image successfully generated and saved to:\n{}\n\nDetailed Prompt Used:\n{}\n\nNegative Prompt:\n{}",
            path.display(),
            expanded.prompt,
            expanded.negative_prompt
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use easel_contracts::chat::Message;
    use serde_json::json;

    use super::*;
    use crate::expansion::DEFAULT_NEGATIVE_PROMPT;
    use crate::testing::{completion, tool_call_completion, ScriptedTransport};

    fn agent(transport: ScriptedTransport, out: &Path) -> ImageAgent<ScriptedTransport> {
        ImageAgent::new(transport, "text-model", "image-model", out)
    }

    #[test]
    fn plain_reply_is_returned_verbatim() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let agent = agent(
            ScriptedTransport::new().reply_text("Try golden-hour light."),
            temp.path(),
        );
        let mut updates: Vec<String> = Vec::new();
        let reply = agent.chat(&[Message::user("any tips?")], &mut |status: &str| {
            updates.push(status.to_string())
        })?;

        assert_eq!(reply, "Try golden-hour light.");
        assert!(updates.is_empty());
        Ok(())
    }

    #[test]
    fn request_prepends_system_prompt_and_declares_tool() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let agent = agent(ScriptedTransport::new().reply_text("hi"), temp.path());
        let history = vec![Message::user("hello"), Message::assistant("hey"), Message::user("again")];
        agent.chat(&history, &mut |_: &str| {})?;

        let request = agent.transport().request(0);
        assert_eq!(request["model"], "text-model");
        assert_eq!(request["tool_choice"], "auto");
        assert_eq!(request["tools"][0]["function"]["name"], "generate_image");
        assert_eq!(request["messages"].as_array().map(Vec::len), Some(4));
        assert_eq!(
            request["messages"][0],
            json!({ "role": "system", "content": AGENT_SYSTEM_PROMPT })
        );
        assert_eq!(request["messages"][3], json!({ "role": "user", "content": "again" }));
        assert_eq!(history.len(), 3);
        Ok(())
    }

    #[test]
    fn missing_content_uses_fallback() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let agent = agent(
            ScriptedTransport::new()
                .reply(completion(json!({ "role": "assistant", "content": null })))
                .reply(json!({ "choices": [] })),
            temp.path(),
        );
        assert_eq!(agent.chat(&[Message::user("?")], &mut |_: &str| {})?, NO_RESPONSE_FALLBACK);
        assert_eq!(agent.chat(&[Message::user("?")], &mut |_: &str| {})?, NO_RESPONSE_FALLBACK);
        Ok(())
    }

    #[test]
    fn text_call_failure_is_a_text_generation_error() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let agent = agent(
            ScriptedTransport::new().fail("OpenRouter chat request failed (401): bad key"),
            temp.path(),
        );
        let err = agent.chat(&[Message::user("hi")], &mut |_: &str| {}).unwrap_err();
        assert!(matches!(err, ChatError::TextGeneration(_)));
        assert_eq!(
            err.to_string(),
            "Text Generation Error: OpenRouter chat request failed (401): bad key"
        );
        Ok(())
    }

    #[test]
    fn draw_a_cat_end_to_end() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let out = temp.path().join("outdir");
        let transport = ScriptedTransport::new()
            .reply(tool_call_completion("generate_image", r#"{"prompt":"draw a cat"}"#))
            .reply_text("A tabby cat curled on a quilt, soft morning light, 16:9, 8K.\n---NEGATIVE---\ndeformed, blurry")
            .reply(completion(json!({
                "role": "assistant",
                "content": "Here you go: ![cat](https://cdn.example/cat.png)"
            })))
            .serve("https://cdn.example/cat.png", 200, b"cat-png");
        let agent = agent(transport, &out);

        let mut updates: Vec<String> = Vec::new();
        let reply = agent.chat(&[Message::user("draw a cat")], &mut |status: &str| {
            updates.push(status.to_string())
        })?;

        let written = fs::read_dir(&out)?.collect::<std::io::Result<Vec<_>>>()?;
        assert_eq!(written.len(), 1);
        let path = written[0].path();
        let name = path.file_name().and_then(|name| name.to_str()).unwrap_or("");
        assert!(name.starts_with("image_") && name.ends_with(".png"));
        assert_eq!(fs::read(&path)?, b"cat-png".to_vec());

        assert_eq!(
            reply,
            format!(
                "Image successfully generated and saved to:\n{}\n\nDetailed Prompt Used:\nA tabby cat curled on a quilt, soft morning light, 16:9, 8K.\n\nNegative Prompt:\ndeformed, blurry",
                path.display()
            )
        );
        assert_eq!(
            updates,
            vec![
                "Expanding prompt: \"draw a cat\"...".to_string(),
                "Generating image with detailed prompt: \"A tabby cat curled on a quilt, soft morning light, 16:9, 8K.\" using image-model...".to_string(),
            ]
        );

        let transport = agent.transport();
        assert_eq!(transport.request_count(), 3);
        assert_eq!(transport.request(1)["model"], "text-model");
        assert_eq!(transport.request(2)["model"], "image-model");
        Ok(())
    }

    #[test]
    fn expansion_failure_still_generates_with_original_prompt() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let transport = ScriptedTransport::new()
            .reply(tool_call_completion("generate_image", r#"{"prompt":"a lighthouse"}"#))
            .fail("OpenRouter chat request failed (503)")
            .reply(completion(json!({
                "images": [{ "image_url": { "url": "data:image/png;base64,AAAA" } }]
            })));
        let agent = agent(transport, temp.path());

        let reply = agent.chat(&[Message::user("draw a lighthouse")], &mut |_: &str| {})?;

        assert!(reply.starts_with("Image successfully generated and saved to:\n"));
        assert!(reply.ends_with(&format!(
            "Detailed Prompt Used:\na lighthouse\n\nNegative Prompt:\n{DEFAULT_NEGATIVE_PROMPT}"
        )));
        Ok(())
    }

    #[test]
    fn malformed_arguments_are_reported_not_raised() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let agent = agent(
            ScriptedTransport::new().reply(tool_call_completion("generate_image", "{\"prompt\":")),
            temp.path(),
        );
        let mut updates = 0;
        let reply = agent.chat(&[Message::user("draw")], &mut |_: &str| updates += 1)?;

        assert!(reply.starts_with("Failed to generate image: invalid generate_image arguments"));
        assert_eq!(updates, 0);
        assert_eq!(agent.transport().request_count(), 1);
        Ok(())
    }

    #[test]
    fn extraction_failure_is_reported_and_writes_nothing() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let out = temp.path().join("outdir");
        let transport = ScriptedTransport::new()
            .reply(tool_call_completion("generate_image", r#"{"prompt":"a fox"}"#))
            .reply_text("A red fox.\n---NEGATIVE---\nblurry")
            .reply_text("![fox](https://cdn.example/fox.png)")
            .serve("https://cdn.example/fox.png", 404, b"");
        let agent = agent(transport, &out);

        let reply = agent.chat(&[Message::user("draw a fox")], &mut |_: &str| {})?;

        assert_eq!(
            reply,
            "Failed to generate image: Failed to download image from the generated URL (status: 404)"
        );
        assert!(!out.exists());
        Ok(())
    }

    #[test]
    fn only_first_tool_call_is_honored() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let transport = ScriptedTransport::new()
            .reply(completion(json!({
                "role": "assistant",
                "tool_calls": [
                    { "id": "a", "type": "function",
                      "function": { "name": "generate_image", "arguments": "{\"prompt\":\"first\"}" } },
                    { "id": "b", "type": "function",
                      "function": { "name": "generate_image", "arguments": "{\"prompt\":\"second\"}" } }
                ]
            })))
            .reply_text("")
            .reply(completion(json!({
                "images": [{ "image_url": { "url": "data:image/png;base64,AAAA" } }]
            })));
        let agent = agent(transport, temp.path());

        let mut updates: Vec<String> = Vec::new();
        agent.chat(&[Message::user("two images")], &mut |status: &str| {
            updates.push(status.to_string())
        })?;

        assert_eq!(updates[0], "Expanding prompt: \"first\"...");
        assert_eq!(agent.transport().request_count(), 3);
        assert_eq!(fs::read_dir(temp.path())?.count(), 1);
        Ok(())
    }

    #[test]
    fn unreadable_first_tool_call_falls_back_to_content() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let transport = ScriptedTransport::new().reply(completion(json!({
            "role": "assistant",
            "content": "plain text",
            "tool_calls": [
                { "id": "a", "type": "custom", "custom": { "name": "shell", "input": "ls" } },
                { "id": "b", "type": "function",
                  "function": { "name": "generate_image", "arguments": { "prompt": "second" } } }
            ]
        })));
        let agent = agent(transport, temp.path());

        let mut updates = 0;
        let reply = agent.chat(&[Message::user("hi")], &mut |_: &str| updates += 1)?;

        assert_eq!(reply, "plain text");
        assert_eq!(updates, 0);
        assert_eq!(agent.transport().request_count(), 1);
        assert_eq!(fs::read_dir(temp.path())?.count(), 0);
        Ok(())
    }

    #[test]
    fn unknown_tool_falls_back_to_content() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let transport = ScriptedTransport::new().reply(completion(json!({
            "role": "assistant",
            "content": "Let me check the weather.",
            "tool_calls": [{ "type": "function",
                "function": { "name": "get_weather", "arguments": "{}" } }]
        })));
        let agent = agent(transport, temp.path());

        let reply = agent.chat(&[Message::user("weather?")], &mut |_: &str| {})?;

        assert_eq!(reply, "Let me check the weather.");
        assert_eq!(agent.transport().request_count(), 1);
        Ok(())
    }
}
