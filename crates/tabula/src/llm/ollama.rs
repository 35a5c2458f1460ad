//! Local models served by Ollama. No API key is involved; the host comes
//! from `OLLAMA_HOST` when set.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TabulaError};

use super::http::{self, ChatMessage};
use super::prompts;
use super::provider::{LlmConfig, LlmProvider};

const DEFAULT_HOST: &str = "http://localhost:11434";

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "llama3.2";

pub struct OllamaProvider {
    client: Client,
    chat_url: String,
    config: LlmConfig,
}

impl OllamaProvider {
    pub fn new() -> Result<Self> {
        Self::with_model(DEFAULT_MODEL)
    }

    /// Code-oriented models such as `qwen2.5-coder` follow the fenced
    /// answer format most reliably.
    pub fn with_model(model: impl Into<String>) -> Result<Self> {
        Self::with_config(LlmConfig {
            model: model.into(),
            ..LlmConfig::default()
        })
    }

    pub fn with_config(config: LlmConfig) -> Result<Self> {
        let host = std::env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        Ok(Self {
            client: http::client(&config)?,
            chat_url: format!("{}/api/chat", host.trim_end_matches('/')),
            config,
        })
    }

    /// Point the usual failures at the command that fixes them.
    fn with_hint(&self, error: TabulaError) -> TabulaError {
        match error {
            TabulaError::Connection(msg) if msg.contains("could not connect") => {
                TabulaError::Connection(format!("{} (is `ollama serve` running?)", msg))
            }
            TabulaError::Generation(msg) if msg.contains("not found") => TabulaError::Generation(format!(
                "model '{}' is not installed, run `ollama pull {}`",
                self.config.model, self.config.model
            )),
            other => other,
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.config.model,
            stream: false,
            options: Options {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
            messages: vec![
                ChatMessage::system(prompts::system_prompt()),
                ChatMessage::user(prompt),
            ],
        };

        debug!(model = %self.config.model, url = %self.chat_url, "ollama completion");
        let reply: ChatReply = http::post_json(self.name(), self.client.post(&self.chat_url), &body)
            .await
            .map_err(|e| self.with_hint(e))?;
        Ok(reply.message.content)
    }

    fn config(&self) -> &LlmConfig {
        &self.config
    }

    fn name(&self) -> &str {
        "Ollama"
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    stream: bool,
    options: Options,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct Options {
    temperature: f64,
    num_predict: usize,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    message: ChatMessage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reply() {
        let raw = r#"{"model":"llama3.2","message":{"role":"assistant","content":"```lua\nfunction transform(x) return x end\n```"},"done":true}"#;
        let parsed: ChatReply = serde_json::from_str(raw).unwrap();
        assert!(parsed.message.content.starts_with("```lua"));
    }

    #[test]
    fn test_with_model() {
        let provider = OllamaProvider::with_model("codellama").unwrap();
        assert_eq!(provider.config().model, "codellama");
        assert!(provider.chat_url.ends_with("/api/chat"));
    }

    #[test]
    fn test_missing_model_hint() {
        let provider = OllamaProvider::with_model("codellama").unwrap();
        let err = provider.with_hint(TabulaError::Generation("model \"codellama\" not found".into()));
        assert!(err.to_string().contains("ollama pull codellama"));
    }
}
