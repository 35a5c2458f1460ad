//! Local classification checks that run before asking a provider.

use chrono::NaiveDate;

use crate::transform::Example;

use super::numeric::{least_squares, mean_squared_error};

/// Formats accepted by [`is_date`].
pub const DATE_FORMATS: [&str; 6] = ["%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y", "%m-%d-%Y", "%Y-%m-%d"];

/// Error below which a straight line counts as an exact numeric mapping.
const LINEAR_MSE_THRESHOLD: f64 = 1e-2;

/// Parse a finite number, ignoring surrounding whitespace.
pub fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Examples whose input and output both parse as numbers.
pub fn numeric_pairs(examples: &[Example]) -> Vec<(f64, f64)> {
    examples
        .iter()
        .filter_map(|e| Some((parse_number(&e.input)?, parse_number(&e.output)?)))
        .collect()
}

/// At least two numeric pairs lie on a straight line.
pub fn looks_linear(examples: &[Example]) -> bool {
    let pairs = numeric_pairs(examples);
    if pairs.len() < 2 {
        return false;
    }

    let features: Vec<Vec<f64>> = pairs.iter().map(|(x, _)| vec![*x, 1.0]).collect();
    let targets: Vec<f64> = pairs.iter().map(|(_, y)| *y).collect();
    match least_squares(&features, &targets) {
        Some(p) => {
            mean_squared_error(&pairs, |x| p[0] * x + p[1]) < LINEAR_MSE_THRESHOLD
        }
        None => false,
    }
}

/// Whether `text` is a calendar date in one of [`DATE_FORMATS`].
pub fn is_date(text: &str) -> bool {
    let text = text.trim();
    DATE_FORMATS
        .iter()
        .any(|fmt| NaiveDate::parse_from_str(text, fmt).is_ok())
}

/// Every input and every output is a date.
pub fn all_dates(examples: &[Example]) -> bool {
    !examples.is_empty() && examples.iter().all(|e| is_date(&e.input) && is_date(&e.output))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn examples(pairs: &[(&str, &str)]) -> Vec<Example> {
        pairs.iter().map(|(i, o)| Example::new(*i, *o)).collect()
    }

    #[test]
    fn test_linear() {
        assert!(looks_linear(&examples(&[("0", "32"), ("100", "212"), ("37", "98.6")])));
        assert!(!looks_linear(&examples(&[("1", "1"), ("2", "4"), ("3", "9"), ("4", "16")])));
    }

    #[test]
    fn test_linear_needs_two_numeric_pairs() {
        assert!(!looks_linear(&examples(&[("1", "2")])));
        assert!(!looks_linear(&examples(&[("1", "2"), ("a", "b")])));
    }

    #[test]
    fn test_dates() {
        assert!(is_date("2023-03-21"));
        assert!(is_date("21/03/2023"));
        assert!(is_date("2023/03/21"));
        assert!(!is_date("2023-13-45"));
        assert!(!is_date("Wednesday"));
        assert!(all_dates(&examples(&[("2023-01-05", "05/01/2023")])));
        assert!(!all_dates(&examples(&[("2023-04-12", "Wednesday")])));
        assert!(!all_dates(&[]));
    }
}
