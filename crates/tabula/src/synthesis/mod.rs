//! Turning example pairs into a classification label and transform code.
//!
//! [`Synthesizer`] mirrors how the labels are handled:
//!
//! - classification tries local checks first (a straight numeric line, or
//!   dates on both sides) and only then asks the LLM provider;
//! - `Numerical` code comes from curve fitting, `General` code from a lookup
//!   table of the examples, `Algorithmic` code from a built-in template that
//!   reproduces the examples (or one the provider picks and adapts), and
//!   everything else is written by the provider.

mod extract;
mod heuristics;
mod numeric;
pub mod templates;

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use tracing::{debug, info};

use crate::error::{Result, TabulaError};
use crate::llm::{ClassificationRequest, CodeRequest, LlmProvider};
use crate::transform::{lua_quote, Classification, Example, SandboxLimits};

pub use extract::{extract_code, extract_conversion_type};
pub use heuristics::{all_dates, is_date, looks_linear, DATE_FORMATS};
pub use numeric::NumericModel;
pub use templates::Template;

/// Default returned by lookup transforms for inputs outside the examples.
pub const LOOKUP_DEFAULT: &str = "UNKNOWN";

/// Code used as the refinement base when the provider names no template.
const BLANK_TEMPLATE: &str = "function transform(x)\n  return x\nend\n";

/// Classification and code generation service.
#[async_trait]
pub trait TransformSynthesizer: Send + Sync {
    /// Infer a label for the examples. Requires at least one example.
    async fn classify(&self, column: &str, examples: &[Example]) -> Result<Classification>;

    /// Produce `transform(x)` source consistent with the label.
    async fn generate(&self, column: &str, examples: &[Example], classification: &Classification) -> Result<String>;

    /// Name for logs.
    fn name(&self) -> &str;
}

/// Default synthesizer: local analysis plus an LLM provider.
pub struct Synthesizer {
    provider: Arc<dyn LlmProvider>,
    limits: SandboxLimits,
}

impl Synthesizer {
    pub fn new(provider: Arc<dyn LlmProvider>, limits: SandboxLimits) -> Self {
        Self { provider, limits }
    }

    pub fn provider(&self) -> &dyn LlmProvider {
        self.provider.as_ref()
    }

    async fn generate_with_provider(&self, request: CodeRequest) -> Result<String> {
        let answer = self.provider.generate_code(&request).await?;
        extract_code(&answer).ok_or_else(|| {
            TabulaError::Generation(format!(
                "{} returned no code block for the {} transformation",
                self.provider.name(),
                request.classification
            ))
        })
    }

    async fn generate_algorithmic(&self, column: &str, examples: &[Example]) -> Result<String> {
        if let Some(template) = templates::find_matching(examples, self.limits) {
            info!(template = template.name, "Using built-in template");
            return Ok(template.code.to_string());
        }

        let request = ClassificationRequest {
            column: column.to_string(),
            examples: examples.to_vec(),
        };
        let names = templates::names();
        let answer = self.provider.conversion_type(&request, &names).await?;
        let base = extract_conversion_type(&answer, &names)
            .and_then(templates::get)
            .map(|t| {
                debug!(template = t.name, "Refining template suggested by provider");
                t.code
            })
            .unwrap_or(BLANK_TEMPLATE);

        self.generate_with_provider(CodeRequest {
            column: column.to_string(),
            examples: examples.to_vec(),
            classification: Classification::ALGORITHMIC.to_string(),
            base_code: Some(base.to_string()),
        })
        .await
    }
}

/// Lua lookup transform built from the examples. When an input repeats,
/// its last output wins.
pub fn lookup_code(examples: &[Example]) -> String {
    let table: IndexMap<&str, &str> = examples
        .iter()
        .map(|e| (e.input.as_str(), e.output.as_str()))
        .collect();

    let mut code = String::from("local LOOKUP = {\n");
    for (input, output) in &table {
        code.push_str(&format!("  [{}] = {},\n", lua_quote(input), lua_quote(output)));
    }
    code.push_str(&format!(
        "}}\n\nfunction transform(x)\n  if x == nil then return {default} end\n  local v = LOOKUP[tostring(x)]\n  if v == nil then return {default} end\n  return v\nend\n",
        default = lua_quote(LOOKUP_DEFAULT)
    ));
    code
}

#[async_trait]
impl TransformSynthesizer for Synthesizer {
    async fn classify(&self, column: &str, examples: &[Example]) -> Result<Classification> {
        if examples.is_empty() {
            return Err(TabulaError::InsufficientData(
                "at least one example pair is required".to_string(),
            ));
        }

        if looks_linear(examples) {
            debug!(column, "Examples fit a straight line");
            return Ok(Classification::new(Classification::NUMERICAL));
        }
        if all_dates(examples) {
            debug!(column, "Examples are dates on both sides");
            return Ok(Classification::new(Classification::ALGORITHMIC));
        }

        let request = ClassificationRequest {
            column: column.to_string(),
            examples: examples.to_vec(),
        };
        let answer = self
            .provider
            .classify_transformation(&request)
            .await
            .map_err(|e| match e {
                TabulaError::Generation(message) => TabulaError::Classification(message),
                other => other,
            })?;

        Classification::extract(&answer).ok_or_else(|| {
            let excerpt: String = answer.chars().take(80).collect();
            TabulaError::Classification(format!(
                "{} gave no known label (answer: {:?})",
                self.provider.name(),
                excerpt
            ))
        })
    }

    async fn generate(&self, column: &str, examples: &[Example], classification: &Classification) -> Result<String> {
        if classification.is(Classification::NUMERICAL) {
            let model = numeric::fit(examples)?;
            info!(column, model = %model, "Fitted numeric model");
            Ok(model.lua_code())
        } else if classification.is(Classification::GENERAL) {
            Ok(lookup_code(examples))
        } else if classification.is(Classification::ALGORITHMIC) {
            self.generate_algorithmic(column, examples).await
        } else {
            self.generate_with_provider(CodeRequest {
                column: column.to_string(),
                examples: examples.to_vec(),
                classification: classification.to_string(),
                base_code: None,
            })
            .await
        }
    }

    fn name(&self) -> &str {
        self.provider.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmConfig, MockProvider};
    use crate::table::CellValue;
    use crate::transform::{CellTransform, LuaTransform, TransformOutput};

    fn synthesizer() -> Synthesizer {
        Synthesizer::new(Arc::new(MockProvider::new()), SandboxLimits::default())
    }

    fn examples(pairs: &[(&str, &str)]) -> Vec<Example> {
        pairs.iter().map(|(i, o)| Example::new(*i, *o)).collect()
    }

    fn run(code: &str, input: &str) -> CellValue {
        let t = LuaTransform::compile(code, SandboxLimits::default()).unwrap();
        match t.apply(&input.into()).unwrap() {
            TransformOutput::Value(v) => v,
            other => panic!("unexpected output {other:?}"),
        }
    }

    /// Provider whose every answer is fixed.
    struct Canned(String, LlmConfig);

    #[async_trait]
    impl LlmProvider for Canned {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.clone())
        }

        fn config(&self) -> &LlmConfig {
            &self.1
        }

        fn name(&self) -> &str {
            "Canned"
        }
    }

    fn canned(answer: &str) -> Synthesizer {
        Synthesizer::new(
            Arc::new(Canned(answer.to_string(), LlmConfig::default())),
            SandboxLimits::default(),
        )
    }

    #[tokio::test]
    async fn test_classify_requires_examples() {
        let err = synthesizer().classify("c", &[]).await.unwrap_err();
        assert!(matches!(err, TabulaError::InsufficientData(_)));
    }

    #[tokio::test]
    async fn test_local_classification() {
        let s = synthesizer();
        let label = s.classify("c", &examples(&[("1", "3"), ("2", "5")])).await.unwrap();
        assert_eq!(label.as_str(), Classification::NUMERICAL);

        let label = s
            .classify("d", &examples(&[("2023-01-05", "05/01/2023")]))
            .await
            .unwrap();
        assert_eq!(label.as_str(), Classification::ALGORITHMIC);

        let label = s.classify("n", &examples(&[("alice", "ALICE")])).await.unwrap();
        assert_eq!(label.as_str(), Classification::STRING_BASED);
    }

    #[tokio::test]
    async fn test_unlabelled_answer_is_classification_error() {
        let err = canned("I am not sure")
            .classify("c", &examples(&[("a", "b")]))
            .await
            .unwrap_err();
        assert!(matches!(err, TabulaError::Classification(_)));
    }

    #[tokio::test]
    async fn test_generate_numerical() {
        let code = synthesizer()
            .generate(
                "c",
                &examples(&[("0", "32"), ("100", "212")]),
                &Classification::new(Classification::NUMERICAL),
            )
            .await
            .unwrap();
        match run(&code, "37.5") {
            CellValue::Float(v) => assert!((v - 99.5).abs() < 1e-9),
            other => panic!("expected a number, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_generate_lookup() {
        let code = synthesizer()
            .generate(
                "ceo",
                &examples(&[("Microsoft", "Satya Nadella"), ("Apple", "Tim Cook")]),
                &Classification::new(Classification::GENERAL),
            )
            .await
            .unwrap();
        assert_eq!(run(&code, "Apple"), CellValue::from("Tim Cook"));
        assert_eq!(run(&code, "Pepsico"), CellValue::from(LOOKUP_DEFAULT));
    }

    #[test]
    fn test_lookup_repeated_input_keeps_last_output() {
        let code = lookup_code(&examples(&[("a", "1"), ("b", "2"), ("a", "3")]));
        assert_eq!(run(&code, "a"), CellValue::from("3"));
        assert_eq!(run(&code, "b"), CellValue::from("2"));
    }

    #[tokio::test]
    async fn test_generate_algorithmic_from_template() {
        let code = synthesizer()
            .generate(
                "d",
                &examples(&[("IX", "9"), ("XIV", "14")]),
                &Classification::new(Classification::ALGORITHMIC),
            )
            .await
            .unwrap();
        assert_eq!(code, templates::get("roman_to_decimal").unwrap().code);
    }

    #[tokio::test]
    async fn test_generate_algorithmic_refined_by_provider() {
        let answer = "binary_to_decimal\n```lua\nfunction transform(x) return 'refined' end\n```";
        let code = canned(answer)
            .generate(
                "d",
                &examples(&[("0b101", "five")]),
                &Classification::new(Classification::ALGORITHMIC),
            )
            .await
            .unwrap();
        assert_eq!(code, "function transform(x) return 'refined' end");
    }

    #[tokio::test]
    async fn test_generate_string_based() {
        let code = synthesizer()
            .generate(
                "name",
                &examples(&[("alice", "ALICE")]),
                &Classification::new(Classification::STRING_BASED),
            )
            .await
            .unwrap();
        assert_eq!(run(&code, "bob"), CellValue::from("BOB"));
    }

    #[tokio::test]
    async fn test_generation_without_code_block_fails() {
        let err = synthesizer()
            .generate(
                "c",
                &examples(&[("a", "zzz")]),
                &Classification::new(Classification::STRING_BASED),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TabulaError::Generation(_)));
    }
}
