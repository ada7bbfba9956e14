use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{bail, Context, Result};
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::{alphabet, Engine as _};
use chrono::Utc;
use easel_contracts::config::OUTPUT_DIR_NAME;
use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::completion::AssistantReply;
use crate::expansion::ExpandedPrompt;
use crate::transport::ModelTransport;

/// Standard alphabet; trailing `=` padding may be present or omitted.
const DATA_URL_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

static MARKDOWN_IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[.*?\]\((.*?)\)").expect("markdown image pattern"));

static BARE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s)]+").expect("bare url pattern"));

/// Where the image bytes live once located in a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Base64 payload taken from a `data:image/...` URI.
    Inline { base64: String },
    Remote { url: String },
}

impl ImageSource {
    pub fn fetch_bytes(&self, transport: &dyn ModelTransport) -> Result<Vec<u8>> {
        match self {
            ImageSource::Inline { base64 } => {
                let compact: String = base64.chars().filter(|ch| !ch.is_whitespace()).collect();
                DATA_URL_BASE64
                    .decode(compact.as_bytes())
                    .context("image data URL base64 decode failed")
            }
            ImageSource::Remote { url } => {
                let download = transport.download(url)?;
                if !download.is_success() {
                    bail!(
                        "Failed to download image from the generated URL (status: {})",
                        download.status
                    );
                }
                Ok(download.bytes)
            }
        }
    }
}

/// The ways an image can be referenced by a reply, in lookup order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageLocator {
    /// `message.images[0].image_url.url`.
    Attachment,
    /// First `![alt](url)` in the text content.
    MarkdownLink,
    /// First `http(s)://` token in the text content.
    BareUrl,
}

impl ImageLocator {
    pub const PRECEDENCE: [ImageLocator; 3] = [
        ImageLocator::Attachment,
        ImageLocator::MarkdownLink,
        ImageLocator::BareUrl,
    ];

    pub fn locate(self, reply: &AssistantReply) -> Option<ImageSource> {
        match self {
            ImageLocator::Attachment => locate_attachment(reply),
            ImageLocator::MarkdownLink => locate_markdown_link(reply.text()),
            ImageLocator::BareUrl => locate_bare_url(reply.text()),
        }
    }
}

pub fn locate_image_source(reply: &AssistantReply) -> Option<(ImageLocator, ImageSource)> {
    ImageLocator::PRECEDENCE
        .into_iter()
        .find_map(|locator| locator.locate(reply).map(|source| (locator, source)))
}

fn locate_attachment(reply: &AssistantReply) -> Option<ImageSource> {
    let url = reply.image_urls.first()?.trim();
    if url.is_empty() {
        return None;
    }
    if url.starts_with("data:image/") {
        // A data URI without a payload section is skipped so the text can still be searched.
        let (_, payload) = url.split_once(',')?;
        return Some(ImageSource::Inline {
            base64: payload.to_string(),
        });
    }
    Some(ImageSource::Remote {
        url: url.to_string(),
    })
}

fn locate_markdown_link(text: &str) -> Option<ImageSource> {
    let url = MARKDOWN_IMAGE.captures(text)?.get(1)?.as_str().trim();
    if url.is_empty() {
        return None;
    }
    Some(ImageSource::Remote {
        url: url.to_string(),
    })
}

fn locate_bare_url(text: &str) -> Option<ImageSource> {
    BARE_URL.find(text).map(|found| ImageSource::Remote {
        url: found.as_str().to_string(),
    })
}

pub fn build_image_request(image_model: &str, expanded: &ExpandedPrompt) -> Value {
    json!({
        "model": image_model,
        "messages": [{
            "role": "user",
            "content": format!(
                "Generate an image based on this prompt: {}\n\nNegative prompt: {}",
                expanded.prompt, expanded.negative_prompt
            ),
        }],
    })
}

/// Resolve the image referenced by `reply` into raw bytes.
pub fn extract_image_bytes(
    transport: &dyn ModelTransport,
    reply: &AssistantReply,
) -> Result<Vec<u8>> {
    let Some((locator, source)) = locate_image_source(reply) else {
        let raw = serde_json::to_string(&reply.raw_message).unwrap_or_else(|_| "null".to_string());
        bail!("Could not extract an image URL from the model response. Raw response: {raw}");
    };
    debug!(?locator, "image located in model response");
    source.fetch_bytes(transport)
}

/// Write `bytes` to `<output_dir>/image_<unix-millis>.png` and return the absolute path.
pub fn persist_image(output_dir: &Path, bytes: &[u8]) -> Result<PathBuf> {
    let output_dir = if output_dir.is_absolute() {
        output_dir.to_path_buf()
    } else {
        std::env::current_dir()
            .context("working directory unavailable")?
            .join(output_dir)
    };
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;
    let path = output_dir.join(format!("image_{}.png", Utc::now().timestamp_millis()));
    fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), bytes = bytes.len(), "image saved");
    Ok(path)
}

/// Ask the image model for a picture and save it. Nothing is written on failure.
pub fn generate_and_save_image(
    transport: &dyn ModelTransport,
    image_model: &str,
    expanded: &ExpandedPrompt,
    output_dir: &Path,
) -> Result<PathBuf> {
    let request = build_image_request(image_model, expanded);
    let payload = transport
        .chat_completion(&request)
        .context("image generation request failed")?;
    let reply = AssistantReply::from_completion(&payload);
    let bytes = extract_image_bytes(transport, &reply)?;
    persist_image(output_dir, &bytes)
}

pub fn default_output_dir() -> Result<PathBuf> {
    Ok(std::env::current_dir()
        .context("working directory unavailable")?
        .join(OUTPUT_DIR_NAME))
}
