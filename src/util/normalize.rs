//! Text normalization shared by the protocol registry's duplicate
//! detection (SPEC_FULL §4.3) and the trigger matcher's utterance
//! comparison (SPEC_FULL §4.4).

// Layer 1: Standard library imports
use std::sync::LazyLock;

// Layer 2: Third-party crate imports
use regex::Regex;

// Layer 3: Internal module imports
// (none)

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\s+").expect("static whitespace regex is valid")
});

static PUNCTUATION: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"[^\w\s{}]").expect("static punctuation regex is valid")
});

/// Lowercase and collapse runs of whitespace to a single space, trimming
/// the ends. Used for utterance comparison in the trigger matcher, which
/// must not strip punctuation (punctuation inside a placeholder capture is
/// meaningful user input).
pub fn normalize_whitespace(input: &str) -> String {
    let lowered = input.to_lowercase();
    WHITESPACE.replace_all(lowered.trim(), " ").into_owned()
}

/// Lowercase, collapse whitespace, and strip punctuation other than the
/// braces used by placeholder templates. Used for protocol-name and
/// trigger-phrase-set duplicate detection (SPEC_FULL §4.3), where
/// `"blue lights!"` and `"blue lights"` must collide.
pub fn normalize_strict(input: &str) -> String {
    let stripped = PUNCTUATION.replace_all(input, "");
    normalize_whitespace(&stripped)
}

/// Normalize a protocol name: lowercase + trim only (SPEC_FULL §4.3 rule
/// 1 does not call for punctuation stripping, unlike the trigger-phrase
/// set rule).
pub fn normalize_name(input: &str) -> String {
    input.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_collapses_and_lowercases() {
        assert_eq!(normalize_whitespace("  Blue   Lights  "), "blue lights");
    }

    #[test]
    fn strict_strips_punctuation() {
        assert_eq!(normalize_strict("Blue lights!"), "blue lights");
        assert_eq!(normalize_strict("Blue, lights?"), "blue lights");
    }

    #[test]
    fn strict_keeps_placeholder_braces() {
        assert_eq!(normalize_strict("set {color} lights"), "set {color} lights");
    }

    #[test]
    fn name_normalization_is_trim_and_lowercase_only() {
        assert_eq!(normalize_name("  Blue_Lights  "), "blue_lights");
    }
}
