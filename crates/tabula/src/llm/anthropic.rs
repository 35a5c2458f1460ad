//! Anthropic messages API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TabulaError};

use super::http::{self, ChatMessage};
use super::prompts;
use super::provider::{LlmConfig, LlmProvider};

const ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const VERSION_HEADER: (&str, &str) = ("anthropic-version", "2023-06-01");

pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    config: LlmConfig,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_config(api_key, LlmConfig::default())
    }

    pub fn with_config(api_key: impl Into<String>, config: LlmConfig) -> Result<Self> {
        Ok(Self {
            client: http::client(&config)?,
            api_key: api_key.into(),
            config,
        })
    }

    /// Read the key from `ANTHROPIC_API_KEY`.
    pub fn from_env(config: LlmConfig) -> Result<Self> {
        match std::env::var("ANTHROPIC_API_KEY") {
            Ok(key) if !key.trim().is_empty() => Self::with_config(key, config),
            _ => Err(TabulaError::Config("ANTHROPIC_API_KEY is not set".to_string())),
        }
    }

    fn request_body<'a>(&'a self, prompt: &str) -> MessagesRequest<'a> {
        MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            system: prompts::system_prompt(),
            messages: vec![ChatMessage::user(prompt)],
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(&self, prompt: &str) -> Result<String> {
        debug!(model = %self.config.model, "anthropic completion");
        let request = self
            .client
            .post(ENDPOINT)
            .header("x-api-key", &self.api_key)
            .header(VERSION_HEADER.0, VERSION_HEADER.1);
        let reply: MessagesReply = http::post_json(self.name(), request, &self.request_body(prompt)).await?;
        reply
            .first_text()
            .ok_or_else(|| TabulaError::Generation("Anthropic reply held no text block".to_string()))
    }

    fn config(&self) -> &LlmConfig {
        &self.config
    }

    fn name(&self) -> &str {
        "Anthropic"
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    temperature: f64,
    system: &'static str,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct MessagesReply {
    content: Vec<Block>,
}

/// Only `text` blocks carry an answer; others (such as thinking) are skipped.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Block {
    Text { text: String },
    #[serde(other)]
    Other,
}

impl MessagesReply {
    fn first_text(self) -> Option<String> {
        self.content.into_iter().find_map(|block| match block {
            Block::Text { text } => Some(text),
            Block::Other => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_text_skips_other_blocks() {
        let raw = r#"{"content":[{"type":"thinking","thinking":"hmm"},{"type":"text","text":"Numerical"}]}"#;
        let parsed: MessagesReply = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.first_text().as_deref(), Some("Numerical"));
    }

    #[test]
    fn test_request_body_uses_top_level_system() {
        let provider = AnthropicProvider::new("sk-test").unwrap();
        let body = serde_json::to_value(provider.request_body("hi")).unwrap();
        assert!(body["system"].as_str().is_some());
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(provider.name(), "Anthropic");
    }
}
