//! Generic-response detection
//!
//! A handler answer is "generic" when it carries no concrete information:
//! empty text, or boilerplate filler with nothing specific next to it. The
//! strategy chain moves on to the next handler when this predicate fires, and
//! the interaction log uses its negation as the success flag.

use super::entities::has_code_token;

/// Boilerplate openers that signal an answer with nothing to say
pub const FILLER_PHRASES: &[&str] = &[
    "i'd be happy to help",
    "i would be happy to help",
    "i can help you with that",
    "could you provide more details",
    "could you please provide more",
    "i'm not sure what you mean",
    "please let me know how i can",
    "i don't have specific information",
    "i don't have enough information",
];

/// Minimum length (in characters) of a line that counts as concrete prose
/// once filler phrases have been removed from it
const MIN_CONCRETE_REMAINDER: usize = 40;

/// Returns `true` when `response` should be treated as carrying no answer.
pub fn is_generic_response(response: &str) -> bool {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return true;
    }

    let lower = trimmed.to_lowercase();
    if !FILLER_PHRASES.iter().any(|p| lower.contains(p)) {
        return false;
    }

    !has_concrete_content(trimmed)
}

/// Structured or specific content that outweighs a filler phrase
fn has_concrete_content(text: &str) -> bool {
    if has_code_token(text) {
        return true;
    }

    for line in text.lines().map(str::trim) {
        if line.starts_with("- ") || line.starts_with("* ") || line.contains("**") {
            return true;
        }
        if line.chars().next().is_some_and(|c| c.is_ascii_digit()) && line.contains(". ") {
            return true;
        }
    }

    let mut remainder = text.to_lowercase();
    for phrase in FILLER_PHRASES {
        remainder = remainder.replace(phrase, "");
    }
    let remainder: String = remainder
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    remainder.split_whitespace().collect::<Vec<_>>().join(" ").len() >= MIN_CONCRETE_REMAINDER
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_generic() {
        assert!(is_generic_response(""));
        assert!(is_generic_response("   \n\t"));
    }

    #[test]
    fn test_plain_answer_is_not_generic() {
        assert!(!is_generic_response("OD means Right Eye."));
        assert!(!is_generic_response("ok"));
    }

    #[test]
    fn test_filler_alone_is_generic() {
        assert!(is_generic_response("I'd be happy to help!"));
        assert!(is_generic_response(
            "I can help you with that. Could you provide more details?"
        ));
        assert!(is_generic_response("I'M NOT SURE WHAT YOU MEAN."));
    }

    #[test]
    fn test_filler_with_code_is_concrete() {
        assert!(!is_generic_response(
            "I'd be happy to help! Use 92250 for fundus photography."
        ));
    }

    #[test]
    fn test_filler_with_bullets_is_concrete() {
        let text = "I'd be happy to help.\n- Check the member ID\n- Verify coverage";
        assert!(!is_generic_response(text));
        assert!(!is_generic_response("I can help you with that: **Right Eye**"));
        assert!(!is_generic_response(
            "I can help you with that.\n1. Open the form\n2. Enter the code"
        ));
    }

    #[test]
    fn test_filler_with_substantial_prose_is_concrete() {
        assert!(!is_generic_response(
            "I'd be happy to help. The rendering provider is the clinician who actually performed the exam."
        ));
    }

    #[test]
    fn test_filler_with_short_tail_is_generic() {
        assert!(is_generic_response("I'd be happy to help with billing."));
    }
}
