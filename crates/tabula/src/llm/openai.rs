//! OpenAI chat completions.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TabulaError};

use super::http::{self, ChatMessage};
use super::prompts;
use super::provider::{LlmConfig, LlmProvider};

const ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4o";

pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    config: LlmConfig,
}

impl OpenAIProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_config(
            api_key,
            LlmConfig {
                model: DEFAULT_MODEL.to_string(),
                ..LlmConfig::default()
            },
        )
    }

    pub fn with_config(api_key: impl Into<String>, config: LlmConfig) -> Result<Self> {
        Ok(Self {
            client: http::client(&config)?,
            api_key: api_key.into(),
            config,
        })
    }

    /// Read the key from `OPENAI_API_KEY`.
    pub fn from_env(config: LlmConfig) -> Result<Self> {
        match std::env::var("OPENAI_API_KEY") {
            Ok(key) if !key.trim().is_empty() => Self::with_config(key, config),
            _ => Err(TabulaError::Config("OPENAI_API_KEY is not set".to_string())),
        }
    }

    fn request_body<'a>(&'a self, prompt: &str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            messages: vec![
                ChatMessage::system(prompts::system_prompt()),
                ChatMessage::user(prompt),
            ],
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAIProvider {
    async fn complete(&self, prompt: &str) -> Result<String> {
        debug!(model = %self.config.model, "openai completion");
        let request = self.client.post(ENDPOINT).bearer_auth(&self.api_key);
        let reply: ChatReply = http::post_json(self.name(), request, &self.request_body(prompt)).await?;

        reply
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| TabulaError::Generation("OpenAI returned no choices".to_string()))
    }

    fn config(&self) -> &LlmConfig {
        &self.config
    }

    fn name(&self) -> &str {
        "OpenAI"
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    temperature: f64,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    choices: Vec<ReplyChoice>,
}

#[derive(Debug, Deserialize)]
struct ReplyChoice {
    message: ChatMessage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reply() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"General"}}]}"#;
        let parsed: ChatReply = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content, "General");
    }

    #[test]
    fn test_request_body_shape() {
        let provider = OpenAIProvider::new("sk-test").unwrap();
        let body = serde_json::to_value(provider.request_body("hi")).unwrap();
        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
    }
}
