//! Pulling code and labels out of free-text model answers.

use once_cell::sync::Lazy;
use regex::Regex;

static CODE_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n?(.*?)```").expect("Invalid code block regex")
});

/// Body of the last fenced code block, trimmed. Blocks that are empty
/// after trimming count as missing.
pub fn extract_code(response: &str) -> Option<String> {
    CODE_BLOCK
        .captures_iter(response)
        .filter_map(|c| c.get(1))
        .last()
        .map(|m| m.as_str().trim().to_string())
        .filter(|code| !code.is_empty())
}

/// The label from `known` mentioned earliest in `response`.
pub fn extract_conversion_type<'a>(response: &str, known: &[&'a str]) -> Option<&'a str> {
    let lower = response.to_lowercase();
    known
        .iter()
        .filter_map(|label| lower.find(&label.to_lowercase()).map(|pos| (pos, *label)))
        .min_by_key(|(pos, label)| (*pos, std::cmp::Reverse(label.len())))
        .map(|(_, label)| label)
}
