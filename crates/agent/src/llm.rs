use anyhow::{anyhow, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;

use partline_core::config::{LlmConfig, LlmProvider};

/// Pluggable completion client. The model is strictly an interpreter of
/// supplier speech: it classifies turns and extracts quote fields, but the
/// spoken lines and every pricing decision are deterministic.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Client that always fails, forcing the rule-based fallbacks. Useful for
/// deployments without a model and for exercising degradation paths.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledLlmClient;

#[async_trait]
impl LlmClient for DisabledLlmClient {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Err(anyhow!("language model is disabled"))
    }
}

/// Chat-completion client over the OpenAI wire shape, which OpenAI,
/// Anthropic's compatibility endpoint, and Ollama's `/v1` all serve. The
/// configured provider picks the default host when no base URL is given.
pub struct HttpLlmClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
    max_retries: u32,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Self {
        let base_url = config.base_url.clone().unwrap_or_else(|| {
            match config.provider {
                LlmProvider::OpenAi => "https://api.openai.com",
                LlmProvider::Anthropic => "https://api.anthropic.com",
                LlmProvider::Ollama => "http://localhost:11434",
            }
            .to_string()
        });
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
        }
    }

    async fn request_completion(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": 0,
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await?.error_for_status()?;
        let value: serde_json::Value = response.json().await?;
        value["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("malformed completion response"))
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut last_error = anyhow!("completion never attempted");
        for _ in 0..=self.max_retries {
            match self.request_completion(prompt).await {
                Ok(text) => return Ok(text),
                Err(error) => last_error = error,
            }
        }
        Err(last_error)
    }
}
