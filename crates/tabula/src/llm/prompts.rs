//! Prompt templates for LLM interactions.

use crate::transform::Example;

use super::provider::{ClassificationRequest, CodeRequest};

/// Examples quoted in code prompts. Long lists add tokens without helping.
const CODE_PROMPT_EXAMPLES: usize = 4;

/// System prompt shared by every provider.
pub fn system_prompt() -> &'static str {
    "You infer value-level data transformations from input/output examples. \
     When asked for code, write Lua 5.4 that defines a global function \
     transform(x) and uses only the string, math, table and utf8 libraries. \
     Answer exactly in the format requested."
}

fn example_lines(examples: &[Example], limit: usize) -> String {
    if examples.is_empty() {
        return "No examples provided".to_string();
    }
    examples
        .iter()
        .take(limit)
        .map(|e| format!("Input: {} -> Output: {}", e.input, e.output))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build a prompt asking for one of the four transformation categories.
pub fn classification_prompt(request: &ClassificationRequest) -> String {
    let pairs = request
        .examples
        .iter()
        .map(|e| format!("  {}", e))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Analyze the relationship between source and target values of the column "{}" and classify the transformation into one of these categories:
1. String-based: text operations like case changes, formatting, substring extraction.
2. Numerical: arithmetic, scaling, rounding, unit conversions.
3. Algorithmic: conditional rules, encoding/decoding, date and calendar conversions, number bases.
4. General: plain mappings or lookups that fit none of the above.

Source -> Target pairs:
{}

Respond ONLY with the class name (String-based, Numerical, Algorithmic, or General)."#,
        request.column, pairs
    )
}

/// Build a prompt asking which built-in conversion the examples follow.
pub fn conversion_type_prompt(request: &ClassificationRequest, labels: &[&str]) -> String {
    let choices = labels
        .iter()
        .map(|label| format!("- {}", label))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Identify the algorithmic conversion that maps each input to its output.
If the values are dates, prefer date conversions over number or text conversions.

Possible conversion types:
{}

Examples:
{}

Respond only with the name of the best matching conversion type. Do not include explanations."#,
        choices,
        example_lines(&request.examples, 2)
    )
}

/// Build a prompt asking for transform code from scratch.
pub fn code_prompt(request: &CodeRequest) -> String {
    format!(
        r#"Write a Lua function named `transform` that performs the {} transformation of the column "{}" shown by these examples:
{}

Return only the function code, enclosed in triple backticks, like this:

```lua
function transform(x)
  -- your code here
end
```

`x` is the cell value as a string, or nil for an empty cell. Return the new value.
Write exactly one function. Do not include explanations or test cases."#,
        request.classification.to_lowercase(),
        request.column,
        example_lines(&request.examples, CODE_PROMPT_EXAMPLES)
    )
}

/// Build a prompt asking to adapt `base` so it reproduces the examples.
pub fn refinement_prompt(request: &CodeRequest, base: &str) -> String {
    format!(
        r#"You are given a base Lua function and examples of input/output transformations.

Function:
```lua
{}
```

Examples:
{}

Modify the function so it exactly follows the transformation pattern shown in the examples.
Return only the final Lua code inside triple backticks."#,
        base.trim(),
        example_lines(&request.examples, CODE_PROMPT_EXAMPLES)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ClassificationRequest {
        ClassificationRequest {
            column: "name".to_string(),
            examples: vec![Example::new("alice", "ALICE"), Example::new("bob", "BOB")],
        }
    }

    #[test]
    fn test_classification_prompt_lists_pairs() {
        let prompt = classification_prompt(&request());
        assert!(prompt.contains("(\"alice\" -> \"ALICE\")"));
        assert!(prompt.contains("String-based, Numerical, Algorithmic, or General"));
    }

    #[test]
    fn test_conversion_prompt_limits_examples() {
        let mut req = request();
        req.examples.push(Example::new("carol", "CAROL"));
        let prompt = conversion_type_prompt(&req, &["decimal_to_binary", "base64_encode"]);
        assert!(prompt.contains("- base64_encode"));
        assert!(!prompt.contains("carol"));
    }

    #[test]
    fn test_refinement_prompt_quotes_base() {
        let req = CodeRequest {
            column: "d".to_string(),
            examples: vec![Example::new("10", "1010")],
            classification: "Algorithmic".to_string(),
            base_code: None,
        };
        let prompt = refinement_prompt(&req, "function transform(x) return x end\n");
        assert!(prompt.contains("function transform(x) return x end\n```"));
        assert!(prompt.contains("Input: 10 -> Output: 1010"));
    }
}
