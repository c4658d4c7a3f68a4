//! Event text generalization.
//!
//! Two occurrences of the same dialog that differ only by a record number or
//! a quoted name produce the same template, so one handler covers both.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::condition::normalize;

/// Placeholder for quoted text.
pub const TEXT_PLACEHOLDER: &str = "{text}";

/// Placeholder for tokens containing digits.
pub const NUMBER_PLACEHOLDER: &str = "{n}";

static DOUBLE_QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""[^"]*"|“[^”]*”"#).expect("static regex"));

// Only quotes opening a word, so apostrophes in "don't" are left alone.
static SINGLE_QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|[\s(\[:])'[^']*'").expect("static regex"));

static WITH_DIGITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\w#/.:-]*\d[\w/-]*").expect("static regex"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Messages acknowledged without pausing or asking.
const BENIGN_PATTERNS: &[&str] = &[
    "saved successfully",
    "successfully saved",
    "changes saved",
    "record saved",
    "successfully updated",
    "loading",
    "please wait",
];

/// Replace variable parts of an event text with placeholders.
pub fn generalize(text: &str) -> String {
    let text = DOUBLE_QUOTED.replace_all(text, TEXT_PLACEHOLDER);
    let text = SINGLE_QUOTED.replace_all(&text, format!("${{1}}{}", TEXT_PLACEHOLDER).as_str());
    let text = WITH_DIGITS.replace_all(&text, NUMBER_PLACEHOLDER);
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Whether a text matches the benign allow-list.
pub fn is_benign(text: &str) -> bool {
    let text = normalize(text);
    BENIGN_PATTERNS.iter().any(|pattern| text.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbers_are_generalized() {
        assert_eq!(
            generalize("Record 10452 is locked by user ID-77"),
            "Record {n} is locked by user {n}"
        );
        assert_eq!(
            generalize("Record 10452 is locked by user ID-77"),
            generalize("Record 9 is locked by user ID-1")
        );
    }

    #[test]
    fn test_quoted_text_is_generalized() {
        assert_eq!(
            generalize("Customer \"ACME Corp\" already exists"),
            "Customer {text} already exists"
        );
        assert_eq!(
            generalize("Delete 'Main Street 12'?"),
            "Delete {text}?"
        );
        assert_eq!(generalize("Don't leave   this page"), "Don't leave this page");
    }

    #[test]
    fn test_trailing_punctuation_is_kept() {
        assert_eq!(generalize("Delete line 3?"), "Delete line {n}?");
        assert_eq!(generalize("Total is 12.50."), "Total is {n}.");
    }

    #[test]
    fn test_quoted_digits_stay_one_placeholder() {
        assert_eq!(generalize("Order \"A-1\" saved"), "Order {text} saved");
    }

    #[test]
    fn test_benign_patterns() {
        assert!(is_benign("Record   SAVED successfully."));
        assert!(is_benign("Loading..."));
        assert!(!is_benign("Are you sure you want to delete?"));
    }
}
