//! LLM provider trait and types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmSettings;
use crate::error::Result;
use crate::transform::Example;

use super::prompts;

/// Input of a classification call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationRequest {
    pub column: String,
    pub examples: Vec<Example>,
}

/// Input of a code generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeRequest {
    pub column: String,
    pub examples: Vec<Example>,
    pub classification: String,

    /// Template to adapt to the examples, when refining.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_code: Option<String>,
}

/// Configuration for LLM providers.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Model to use (e.g., "claude-sonnet-4-20250514").
    pub model: String,

    /// Maximum tokens in response.
    pub max_tokens: usize,

    /// Temperature for generation (0.0-1.0).
    pub temperature: f64,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 1024,
            temperature: 0.2,
            timeout_secs: 60,
        }
    }
}

impl LlmConfig {
    /// Build from settings, keeping `default_model` when none is configured.
    pub fn from_settings(settings: &LlmSettings, default_model: &str) -> Self {
        Self {
            model: settings
                .model
                .clone()
                .unwrap_or_else(|| default_model.to_string()),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            timeout_secs: settings.timeout_secs,
        }
    }
}

/// Trait for LLM providers.
///
/// Implementations must be thread-safe (Send + Sync) so one provider can
/// serve every session. The classification and generation methods return
/// the raw answer; label and code extraction happen in the caller.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send one prompt and return the model's text answer.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Ask for one of the four transformation categories.
    async fn classify_transformation(&self, request: &ClassificationRequest) -> Result<String> {
        self.complete(&prompts::classification_prompt(request)).await
    }

    /// Ask which built-in conversion the examples follow.
    async fn conversion_type(&self, request: &ClassificationRequest, labels: &[&str]) -> Result<String> {
        self.complete(&prompts::conversion_type_prompt(request, labels))
            .await
    }

    /// Ask for transform code, or for a refinement of `base_code`.
    async fn generate_code(&self, request: &CodeRequest) -> Result<String> {
        let prompt = match &request.base_code {
            Some(base) => prompts::refinement_prompt(request, base),
            None => prompts::code_prompt(request),
        };
        self.complete(&prompt).await
    }

    /// Get the configuration for this provider.
    fn config(&self) -> &LlmConfig;

    /// Get the name of this provider (for logging/debugging).
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_settings() {
        let settings = LlmSettings::default();
        let config = LlmConfig::from_settings(&settings, "gpt-4o");
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.timeout_secs, settings.timeout_secs);
    }
}
