//! LLM providers backing classification and code generation.
//!
//! # Supported Providers
//!
//! - **Mock** - deterministic and offline, the default
//! - **Anthropic** - Claude models via API (requires `ANTHROPIC_API_KEY`)
//! - **OpenAI** - GPT models via API (requires `OPENAI_API_KEY`)
//! - **Ollama** - local models, no API key needed (honours `OLLAMA_HOST`)

mod anthropic;
mod http;
mod mock;
mod ollama;
mod openai;
mod prompts;
mod provider;

use std::sync::Arc;

use tracing::info;

use crate::config::LlmSettings;
use crate::error::{Result, TabulaError};

pub use anthropic::AnthropicProvider;
pub use mock::MockProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAIProvider;
pub use provider::{ClassificationRequest, CodeRequest, LlmConfig, LlmProvider};

/// Names accepted by [`provider_from_settings`].
pub const PROVIDERS: [&str; 4] = ["mock", "openai", "anthropic", "ollama"];

/// Build the provider named in the settings.
pub fn provider_from_settings(settings: &LlmSettings) -> Result<Arc<dyn LlmProvider>> {
    let provider: Arc<dyn LlmProvider> = match settings.provider.to_lowercase().as_str() {
        "mock" => Arc::new(MockProvider::with_config(LlmConfig::from_settings(settings, "mock"))),
        "openai" => Arc::new(OpenAIProvider::from_env(LlmConfig::from_settings(
            settings,
            openai::DEFAULT_MODEL,
        ))?),
        "anthropic" => Arc::new(AnthropicProvider::from_env(LlmConfig::from_settings(
            settings,
            &LlmConfig::default().model,
        ))?),
        "ollama" => Arc::new(OllamaProvider::with_config(LlmConfig::from_settings(
            settings,
            ollama::DEFAULT_MODEL,
        ))?),
        other => {
            return Err(TabulaError::Config(format!(
                "Unknown LLM provider '{}', expected one of: {}",
                other,
                PROVIDERS.join(", ")
            )));
        }
    };
    info!(provider = provider.name(), model = %provider.config().model, "LLM provider ready");
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_give_mock() {
        let provider = provider_from_settings(&LlmSettings::default()).unwrap();
        assert_eq!(provider.name(), "Mock");
    }

    #[test]
    fn test_unknown_provider() {
        let settings = LlmSettings {
            provider: "gemini".to_string(),
            ..LlmSettings::default()
        };
        let err = provider_from_settings(&settings).err().unwrap();
        assert!(matches!(err, TabulaError::Config(_)));
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let settings = LlmSettings {
            provider: "Ollama".to_string(),
            model: Some("codellama".to_string()),
            ..LlmSettings::default()
        };
        let provider = provider_from_settings(&settings).unwrap();
        assert_eq!(provider.config().model, "codellama");
    }
}
