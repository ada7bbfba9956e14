use std::time::Duration;

use anyhow::{bail, Context, Result};
use easel_contracts::config::AgentConfig;
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response as HttpResponse};
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use tracing::debug;

/// Upper bound for a single request. Image models can take minutes to answer.
const REQUEST_TIMEOUT_SECONDS: u64 = 600;

/// Body and status of a plain GET. Non-2xx statuses are returned, not raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub status: u16,
    pub bytes: Vec<u8>,
}

impl Download {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The two network operations the agent needs from a model provider.
pub trait ModelTransport {
    /// POST an OpenAI-compatible chat-completions payload and return the decoded JSON body.
    fn chat_completion(&self, payload: &Value) -> Result<Value>;

    fn download(&self, url: &str) -> Result<Download>;
}

impl<T: ModelTransport + ?Sized> ModelTransport for &T {
    fn chat_completion(&self, payload: &Value) -> Result<Value> {
        (**self).chat_completion(payload)
    }

    fn download(&self, url: &str) -> Result<Download> {
        (**self).download(url)
    }
}

pub struct OpenRouterClient {
    api_base: String,
    api_key: String,
    http_referer: String,
    x_title: String,
    http: HttpClient,
}

impl OpenRouterClient {
    pub fn new(config: &AgentConfig) -> Result<Self> {
        let api_key = config.require_api_key()?.to_string();
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .build()
            .context("HTTP client construction failed")?;
        Ok(Self {
            api_base: config.api_base.clone(),
            api_key,
            http_referer: config.http_referer.clone(),
            x_title: config.x_title.clone(),
            http,
        })
    }

    fn chat_endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }

    fn apply_attribution_headers(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("HTTP-Referer", self.http_referer.as_str())
            .header("X-Title", self.x_title.as_str())
    }
}

impl ModelTransport for OpenRouterClient {
    fn chat_completion(&self, payload: &Value) -> Result<Value> {
        let endpoint = self.chat_endpoint();
        let model = payload
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        debug!(%endpoint, model, "sending chat completion");
        let request = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .header("accept", "application/json")
            .header(CONTENT_TYPE, "application/json");
        let response = self
            .apply_attribution_headers(request)
            .json(payload)
            .send()
            .with_context(|| format!("OpenRouter chat request failed ({endpoint})"))?;
        response_json_or_error("OpenRouter chat", response)
    }

    fn download(&self, url: &str) -> Result<Download> {
        debug!(url, "downloading generated image");
        let response = self
            .http
            .get(url)
            .send()
            .with_context(|| format!("image download failed ({url})"))?;
        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .context("image bytes read failed")?
            .to_vec();
        Ok(Download { status, bytes })
    }
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let code = response.status().as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    decode_response_body(provider, code, &body)
}

fn decode_response_body(provider: &str, code: u16, body: &str) -> Result<Value> {
    if !(200..300).contains(&code) {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    if let Some(message) = provider_error_message(&parsed) {
        bail!("{provider} returned an error: {message}");
    }
    Ok(parsed)
}

// OpenRouter reports some upstream failures as a 200 carrying an `error` object.
fn provider_error_message(payload: &Value) -> Option<String> {
    let error = payload.get("error")?;
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string());
    match error.get("code") {
        Some(code) if !code.is_null() => Some(format!("{message} (code {code})")),
        _ => Some(message),
    }
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
