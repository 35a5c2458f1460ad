//! TOML-based configuration.
//!
//! Supports a config file (`tabula.toml`) with environment variable
//! expansion in string values.
//!
//! ```toml
//! [preview]
//! limit = 100
//!
//! [sandbox]
//! memory_limit_bytes = 16777216
//! instruction_limit = 1000000
//!
//! [llm]
//! provider = "anthropic"
//! model = "claude-sonnet-4-20250514"
//!
//! [sources]
//! sqlite_dir = "${HOME}/data/sqlite"
//! document_dir = "./collections"
//!
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//!
//! [auth.tokens]
//! "dev-token" = "alice"
//! ```

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TabulaError};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TabulaConfig {
    pub preview: PreviewSettings,
    pub sandbox: SandboxSettings,
    pub llm: LlmSettings,
    pub sources: SourceSettings,
    pub server: ServerSettings,
    pub auth: AuthSettings,
}

/// Preview sampling.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PreviewSettings {
    /// Maximum number of rows fetched into the preview snapshot.
    pub limit: usize,
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self { limit: 100 }
    }
}

/// Limits applied to generated transform code.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SandboxSettings {
    /// Interpreter heap limit.
    pub memory_limit_bytes: usize,

    /// Instructions allowed per cell before the call is aborted.
    pub instruction_limit: u64,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            memory_limit_bytes: 16 * 1024 * 1024,
            instruction_limit: 1_000_000,
        }
    }
}

/// Language model provider selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmSettings {
    /// One of `mock`, `openai`, `anthropic`, `ollama`.
    pub provider: String,

    /// Model name; `None` uses the provider default.
    pub model: Option<String>,

    pub max_tokens: usize,
    pub temperature: f64,

    /// Request timeout for provider calls.
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            model: None,
            max_tokens: 1024,
            temperature: 0.2,
            timeout_secs: 60,
        }
    }
}

/// Where the bundled drivers find their data.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceSettings {
    /// Directory holding one SQLite file per database.
    pub sqlite_dir: Option<PathBuf>,

    /// Default root for `jsondir://` document sources.
    pub document_dir: Option<PathBuf>,
}

/// HTTP server binding.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Bearer tokens accepted by the HTTP API.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Token to user name.
    pub tokens: HashMap<String, String>,
}

impl TabulaConfig {
    /// Parse configuration from TOML text, expanding `${VAR}` references.
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut value: toml::Value = toml::from_str(content)?;
        expand_value(&mut value)?;
        let config = value.try_into()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| TabulaError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Load configuration from the default locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `TABULA_CONFIG`
    /// 2. `./tabula.toml`
    ///
    /// Falls back to defaults when neither exists.
    pub fn load() -> Result<Self> {
        if let Ok(path) = env::var("TABULA_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("tabula.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        Ok(Self::default())
    }
}

fn expand_value(value: &mut toml::Value) -> Result<()> {
    match value {
        toml::Value::String(s) => *s = expand_env_vars(s)?,
        toml::Value::Array(items) => {
            for item in items {
                expand_value(item)?;
            }
        }
        toml::Value::Table(table) => {
            for (_, item) in table.iter_mut() {
                expand_value(item)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Expand `${VAR}` references in a string.
///
/// A `$` not followed by `{` is kept as is.
pub fn expand_env_vars(s: &str) -> Result<String> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' || chars.peek() != Some(&'{') {
            result.push(c);
            continue;
        }

        chars.next();
        let mut var_name = String::new();
        let mut closed = false;
        for ch in chars.by_ref() {
            if ch == '}' {
                closed = true;
                break;
            }
            var_name.push(ch);
        }
        if !closed {
            return Err(TabulaError::Config(format!(
                "Unterminated variable reference in '{}'",
                s
            )));
        }

        let value = env::var(&var_name).map_err(|_| {
            TabulaError::Config(format!("Missing environment variable: {}", var_name))
        })?;
        result.push_str(&value);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TabulaConfig::default();
        assert_eq!(config.preview.limit, 100);
        assert_eq!(config.llm.provider, "mock");
        assert_eq!(config.server.port, 8080);
        assert!(config.auth.tokens.is_empty());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = TabulaConfig::from_toml("[preview]\nlimit = 25\n").unwrap();
        assert_eq!(config.preview.limit, 25);
        assert_eq!(config.sandbox.instruction_limit, 1_000_000);
    }

    #[test]
    fn test_env_expansion() {
        // SAFETY: test-local variable name, not read by other tests
        unsafe { env::set_var("TABULA_TEST_TOKEN_USER", "alice") };
        let config = TabulaConfig::from_toml(
            "[auth.tokens]\n\"secret\" = \"${TABULA_TEST_TOKEN_USER}\"\n",
        )
        .unwrap();
        assert_eq!(config.auth.tokens.get("secret").unwrap(), "alice");
    }

    #[test]
    fn test_missing_env_var() {
        let err = expand_env_vars("${TABULA_TEST_DEFINITELY_UNSET}").unwrap_err();
        assert!(matches!(err, TabulaError::Config(_)));
    }

    #[test]
    fn test_lone_dollar_kept() {
        assert_eq!(expand_env_vars("cost $5").unwrap(), "cost $5");
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tabula.toml");
        fs::write(&path, "[llm]\nprovider = \"ollama\"\nmodel = \"llama3.2\"\n").unwrap();

        let config = TabulaConfig::from_file(&path).unwrap();
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.llm.model.as_deref(), Some("llama3.2"));
    }
}
