use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::{debug, warn};

use chokepoint_core::config::{LlmConfig, LlmProvider};

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const ERROR_BODY_SNIPPET: usize = 300;

/// Single-turn chat completion over HTTP for the configured provider.
pub struct HttpLlmClient {
    http: reqwest::Client,
    provider: LlmProvider,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let base_url = match (config.provider, config.base_url.as_deref()) {
            (_, Some(url)) => url.trim_end_matches('/').to_owned(),
            (LlmProvider::OpenAi, None) => OPENAI_BASE_URL.to_owned(),
            (LlmProvider::Anthropic, None) => ANTHROPIC_BASE_URL.to_owned(),
            (LlmProvider::Ollama, None) => bail!("ollama provider requires a base url"),
        };
        if config.provider != LlmProvider::Ollama && config.api_key.is_none() {
            bail!("{} provider requires an api key", config.provider.as_str());
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build http client")?;

        Ok(Self {
            http,
            provider: config.provider,
            base_url,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_ref()
            .map(|key| key.expose_secret())
            .ok_or_else(|| anyhow!("{} api key is not configured", self.provider.as_str()))
    }

    fn request(&self, prompt: &str) -> Result<reqwest::RequestBuilder> {
        let messages = json!([{ "role": "user", "content": prompt }]);
        let request = match self.provider {
            LlmProvider::OpenAi => self
                .http
                .post(format!("{}/v1/chat/completions", self.base_url))
                .bearer_auth(self.api_key()?)
                .json(&json!({
                    "model": self.model,
                    "messages": messages,
                    "max_tokens": self.max_tokens,
                    "temperature": self.temperature,
                })),
            LlmProvider::Anthropic => self
                .http
                .post(format!("{}/v1/messages", self.base_url))
                .header("x-api-key", self.api_key()?)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&json!({
                    "model": self.model,
                    "max_tokens": self.max_tokens,
                    "temperature": self.temperature,
                    "messages": messages,
                })),
            LlmProvider::Ollama => {
                self.http.post(format!("{}/api/chat", self.base_url)).json(&json!({
                    "model": self.model,
                    "messages": messages,
                    "stream": false,
                    "options": {
                        "temperature": self.temperature,
                        "num_predict": self.max_tokens,
                    },
                }))
            }
        };
        Ok(request)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let provider = self.provider.as_str();
        debug!(
            event_name = "llm.request.started",
            provider,
            model = %self.model,
            prompt_chars = prompt.chars().count(),
            "sending completion request"
        );

        let response = self
            .request(prompt)?
            .send()
            .await
            .with_context(|| format!("{provider} request failed"))?;
        let status = response.status();
        let body = response.text().await.with_context(|| format!("{provider} response body"))?;

        if !status.is_success() {
            let snippet: String = body.chars().take(ERROR_BODY_SNIPPET).collect();
            warn!(
                event_name = "llm.request.rejected",
                provider,
                status = status.as_u16(),
                "completion request rejected"
            );
            bail!("{provider} returned {status}: {snippet}");
        }

        let payload: Value = serde_json::from_str(&body)
            .with_context(|| format!("{provider} returned a non-json body"))?;
        let text = reply_text(self.provider, &payload)
            .ok_or_else(|| anyhow!("{provider} response has no text content"))?;

        debug!(
            event_name = "llm.request.completed",
            provider,
            reply_chars = text.chars().count(),
            "completion received"
        );
        Ok(text)
    }
}

fn reply_text(provider: LlmProvider, payload: &Value) -> Option<String> {
    match provider {
        LlmProvider::OpenAi => payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_owned),
        LlmProvider::Anthropic => {
            let parts = payload.get("content")?.as_array()?;
            let text: String = parts
                .iter()
                .filter(|part| part.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect();
            Some(text)
        }
        LlmProvider::Ollama => {
            payload.pointer("/message/content").and_then(Value::as_str).map(str::to_owned)
        }
    }
}
