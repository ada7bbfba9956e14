use anyhow::{anyhow, Result};

pub const DEFAULT_TEXT_MODEL: &str = "openai/gpt-4o-mini";
pub const DEFAULT_IMAGE_MODEL: &str = "google/imagen-3";
pub const DEFAULT_OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_HTTP_REFERER: &str = "http://localhost:3000";
pub const DEFAULT_X_TITLE: &str = "Easel Image Agent";

/// Directory, relative to the working directory, that receives generated images.
pub const OUTPUT_DIR_NAME: &str = "outdir";

/// Runtime settings for the agent, resolved from environment variables.
///
/// Blank values are treated the same as unset ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub text_model: String,
    pub image_model: String,
    pub http_referer: String,
    pub x_title: String,
}

impl AgentConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let api_base = get("OPENROUTER_API_BASE")
            .or_else(|| get("OPENROUTER_BASE_URL"))
            .map(|raw| normalize_api_base(&raw))
            .unwrap_or_else(|| DEFAULT_OPENROUTER_API_BASE.to_string());
        Self {
            api_key: get("OPENROUTER_API_KEY"),
            api_base,
            text_model: get("TEXT_MODEL").unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string()),
            image_model: get("IMAGE_MODEL").unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
            http_referer: get("OPENROUTER_HTTP_REFERER")
                .unwrap_or_else(|| DEFAULT_HTTP_REFERER.to_string()),
            x_title: get("OPENROUTER_X_TITLE").unwrap_or_else(|| DEFAULT_X_TITLE.to_string()),
        }
    }

    pub fn with_text_model(mut self, model: Option<String>) -> Self {
        if let Some(model) = non_blank(model) {
            self.text_model = model;
        }
        self
    }

    pub fn with_image_model(mut self, model: Option<String>) -> Self {
        if let Some(model) = non_blank(model) {
            self.image_model = model;
        }
        self
    }

    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| anyhow!("OPENROUTER_API_KEY is not set (export it or add it to .env)"))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn normalize_api_base(raw: &str) -> String {
    let mut base = raw.trim().trim_end_matches('/').to_string();
    if let Ok(parsed) = url::Url::parse(&base) {
        if parsed.path().trim().is_empty() || parsed.path() == "/" {
            base = format!("{base}/api/v1");
        }
    }
    base.trim_end_matches('/').to_string()
}
