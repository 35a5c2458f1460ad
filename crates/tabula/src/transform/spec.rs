//! Example pairs, classification labels and the transform spec.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TabulaError};

/// One input to output example.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    pub input: String,
    pub output: String,
}

impl Example {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }

    /// Parse `input=>output`.
    pub fn parse(text: &str) -> Result<Self> {
        let (input, output) = text.split_once("=>").ok_or_else(|| {
            TabulaError::InsufficientData(format!(
                "Example '{}' must look like input=>output",
                text
            ))
        })?;
        Ok(Self::new(input.trim(), output.trim()))
    }
}

impl fmt::Display for Example {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(\"{}\" -> \"{}\")", self.input, self.output)
    }
}

/// A transformation pattern label.
///
/// Labels are opaque to the workflow; the synthesis pipeline understands
/// the four in [`Classification::KNOWN`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Classification(String);

impl Classification {
    pub const STRING_BASED: &'static str = "String-based";
    pub const NUMERICAL: &'static str = "Numerical";
    pub const ALGORITHMIC: &'static str = "Algorithmic";
    pub const GENERAL: &'static str = "General";

    pub const KNOWN: [&'static str; 4] = [
        Self::STRING_BASED,
        Self::NUMERICAL,
        Self::ALGORITHMIC,
        Self::GENERAL,
    ];

    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is(&self, label: &str) -> bool {
        self.0.eq_ignore_ascii_case(label)
    }

    /// First known label mentioned in free text, case-insensitively.
    pub fn extract(text: &str) -> Option<Self> {
        let lower = text.to_lowercase();
        Self::KNOWN
            .iter()
            .find(|label| lower.contains(&label.to_lowercase()))
            .map(|label| Self::new(*label))
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The active transformation of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformSpec {
    pub column: String,
    pub examples: Vec<Example>,
    pub classification: Option<Classification>,
    pub code: Option<String>,
}

impl TransformSpec {
    pub fn new(column: impl Into<String>, examples: Vec<Example>) -> Self {
        Self {
            column: column.into(),
            examples,
            classification: None,
            code: None,
        }
    }

    /// Both the classification and the code are set.
    pub fn is_executable(&self) -> bool {
        self.classification.is_some() && self.code.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_example() {
        let example = Example::parse("alice => ALICE").unwrap();
        assert_eq!(example, Example::new("alice", "ALICE"));
        assert!(Example::parse("no arrow").is_err());
    }

    #[test]
    fn test_extract_label() {
        assert_eq!(
            Classification::extract("I think this is numerical."),
            Some(Classification::new("Numerical"))
        );
        assert_eq!(
            Classification::extract("Class: string-based"),
            Some(Classification::new("String-based"))
        );
        assert_eq!(Classification::extract("no idea"), None);
    }

    #[test]
    fn test_executable_needs_both_parts() {
        let mut spec = TransformSpec::new("name", vec![Example::new("a", "A")]);
        assert!(!spec.is_executable());
        spec.classification = Some(Classification::new("uppercase"));
        assert!(!spec.is_executable());
        spec.code = Some("function transform(x) return x end".into());
        assert!(spec.is_executable());
    }
}
