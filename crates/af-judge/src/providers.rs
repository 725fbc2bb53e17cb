//! LLM provider boundary.
//!
//! Each provider exposes one operation: `call(prompt) -> text`. Transport and
//! decode failures surface as typed errors; the judge converts every failure
//! into its conservative fallback, never into a pipeline error.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use af_config::LlmSettings;

/// Errors a provider call may produce.
#[derive(Debug)]
pub enum ProviderError {
    /// No API key configured for this provider.
    MissingKey(&'static str),
    /// Network or transport failure.
    Transport(String),
    /// The API answered with an error status.
    Api { status: u16, message: String },
    /// The response body could not be decoded.
    Decode(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::MissingKey(provider) => {
                write!(f, "no api key configured for {provider}")
            }
            ProviderError::Transport(msg) => write!(f, "transport error: {msg}"),
            ProviderError::Api { status, message } => {
                write!(f, "provider api error status={status}: {message}")
            }
            ProviderError::Decode(msg) => write!(f, "decode error: {msg}"),
        }
    }
}

impl std::error::Error for ProviderError {}

/// The provider contract. Object-safe so the judge holds `Box<dyn>`.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn call(&self, prompt: &str) -> Result<String, ProviderError>;
}

/// Build the provider named in settings, if its key is present.
pub fn build_provider(name: &str, settings: &LlmSettings) -> Option<Box<dyn LlmProvider>> {
    match name {
        "anthropic" => settings.anthropic_api_key.as_ref().map(|key| {
            Box::new(AnthropicProvider::new(key.clone(), settings)) as Box<dyn LlmProvider>
        }),
        "openai" => settings.openai_api_key.as_ref().map(|key| {
            Box::new(OpenAiProvider::new(key.clone(), settings)) as Box<dyn LlmProvider>
        }),
        _ => None,
    }
}

fn client_with_timeout(timeout_seconds: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Anthropic
// ---------------------------------------------------------------------------

pub struct AnthropicProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicProvider {
    pub fn new(api_key: String, settings: &LlmSettings) -> Self {
        Self::with_base_url(api_key, settings, "https://api.anthropic.com".to_string())
    }

    pub fn with_base_url(api_key: String, settings: &LlmSettings, base_url: String) -> Self {
        Self {
            http: client_with_timeout(settings.timeout_seconds),
            base_url,
            api_key,
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: settings.max_tokens,
        }
    }
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: String,
}

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn call(&self, prompt: &str) -> Result<String, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));

        let resp = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&AnthropicRequest {
                model: &self.model,
                max_tokens: self.max_tokens,
                messages: vec![Message {
                    role: "user",
                    content: prompt,
                }],
            })
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: AnthropicResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        body.content
            .first()
            .map(|c| c.text.clone())
            .ok_or_else(|| ProviderError::Decode("empty content array".to_string()))
    }
}

// ---------------------------------------------------------------------------
// OpenAI
// ---------------------------------------------------------------------------

pub struct OpenAiProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
}

impl OpenAiProvider {
    pub fn new(api_key: String, settings: &LlmSettings) -> Self {
        Self::with_base_url(api_key, settings, "https://api.openai.com".to_string())
    }

    pub fn with_base_url(api_key: String, settings: &LlmSettings, base_url: String) -> Self {
        Self {
            http: client_with_timeout(settings.timeout_seconds),
            base_url,
            api_key,
            model: "gpt-4.1".to_string(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
        }
    }
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    messages: Vec<Message<'a>>,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: String,
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn call(&self, prompt: &str) -> Result<String, ProviderError> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&OpenAiRequest {
                model: &self.model,
                max_tokens: self.max_tokens,
                temperature: self.temperature,
                messages: vec![Message {
                    role: "user",
                    content: prompt,
                }],
            })
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: OpenAiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        body.choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| ProviderError::Decode("empty choices array".to_string()))
    }
}
