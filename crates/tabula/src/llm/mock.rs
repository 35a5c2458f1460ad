//! Mock LLM provider for testing and offline use.
//!
//! Answers deterministically from the examples: it recognises a handful of
//! whole-value string operations and writes Lua for them. Anything else gets
//! an answer without code, which callers report as a generation failure.

use async_trait::async_trait;

use crate::error::Result;
use crate::transform::{lua_quote, Classification, Example};

use super::provider::{ClassificationRequest, CodeRequest, LlmConfig, LlmProvider};

/// String operation recognised from examples.
#[derive(Debug, Clone, PartialEq, Eq)]
enum StringOp {
    Upper,
    Lower,
    Trim,
    Reverse,
    Prefix(String),
    Suffix(String),
}

impl StringOp {
    fn detect(examples: &[Example]) -> Option<Self> {
        let first = examples.first()?;
        let mut candidates = vec![Self::Upper, Self::Lower, Self::Trim, Self::Reverse];
        if let Some(prefix) = first.output.strip_suffix(first.input.as_str()) {
            candidates.push(Self::Prefix(prefix.to_string()));
        }
        if let Some(suffix) = first.output.strip_prefix(first.input.as_str()) {
            candidates.push(Self::Suffix(suffix.to_string()));
        }

        candidates
            .into_iter()
            .filter(|op| !op.is_identity())
            .find(|op| examples.iter().all(|e| op.eval(&e.input) == e.output))
    }

    fn is_identity(&self) -> bool {
        matches!(self, Self::Prefix(p) | Self::Suffix(p) if p.is_empty())
    }

    fn eval(&self, input: &str) -> String {
        match self {
            Self::Upper => input.to_uppercase(),
            Self::Lower => input.to_lowercase(),
            Self::Trim => input.trim().to_string(),
            Self::Reverse => input.chars().rev().collect(),
            Self::Prefix(p) => format!("{}{}", p, input),
            Self::Suffix(s) => format!("{}{}", input, s),
        }
    }

    fn lua_expr(&self) -> String {
        match self {
            Self::Upper => "string.upper(s)".to_string(),
            Self::Lower => "string.lower(s)".to_string(),
            Self::Trim => "(s:gsub(\"^%s+\", \"\"):gsub(\"%s+$\", \"\"))".to_string(),
            Self::Reverse => "string.reverse(s)".to_string(),
            Self::Prefix(p) => format!("{} .. s", lua_quote(p)),
            Self::Suffix(x) => format!("s .. {}", lua_quote(x)),
        }
    }

    fn code(&self) -> String {
        format!(
            "function transform(x)\n  if x == nil then return nil end\n  local s = tostring(x)\n  return {}\nend\n",
            self.lua_expr()
        )
    }
}

/// Mock LLM provider that returns predictable responses for testing.
pub struct MockProvider {
    config: LlmConfig,
}

impl MockProvider {
    /// Create a new mock provider.
    pub fn new() -> Self {
        Self {
            config: LlmConfig {
                model: "mock".to_string(),
                ..LlmConfig::default()
            },
        }
    }

    /// Create with custom configuration.
    pub fn with_config(config: LlmConfig) -> Self {
        Self { config }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Ok("The mock provider only answers structured requests.".to_string())
    }

    async fn classify_transformation(&self, request: &ClassificationRequest) -> Result<String> {
        let label = if StringOp::detect(&request.examples).is_some() {
            Classification::STRING_BASED
        } else if request
            .examples
            .iter()
            .all(|e| e.input.trim().parse::<f64>().is_ok() && e.output.trim().parse::<f64>().is_ok())
        {
            Classification::NUMERICAL
        } else {
            Classification::GENERAL
        };
        Ok(format!("Class: {}", label))
    }

    async fn conversion_type(&self, _request: &ClassificationRequest, _labels: &[&str]) -> Result<String> {
        Ok("unknown".to_string())
    }

    async fn generate_code(&self, request: &CodeRequest) -> Result<String> {
        if let Some(base) = &request.base_code {
            return Ok(format!("```lua\n{}\n```", base.trim()));
        }
        Ok(match StringOp::detect(&request.examples) {
            Some(op) => format!("```lua\n{}```", op.code()),
            None => format!(
                "No {} transformation matches these examples.",
                request.classification
            ),
        })
    }

    fn config(&self) -> &LlmConfig {
        &self.config
    }

    fn name(&self) -> &str {
        "Mock"
    }
}
