//! C9 - Offline Fallback (spec §4.9).
//!
//! A pure, deterministic function over the current text: no network, no
//! randomness. Used whenever the remote client is unconfigured, or after a
//! run of `Offline`/`Timeout` failures (spec §4.9). Also hosts the "secure
//! transformations" rewrite list (spec §9, Open Question 1's resolution:
//! these run only here, never on the online path).

use std::sync::OnceLock;

use regex::Regex;

/// Ordered `(pattern, replacement)` rewrite rules softening absolutes and
/// blame-toned sentence openers. Applied in order; each only fires once
/// per call (`replacen(.., 1)`), since spec's examples are single-clause
/// rewrites, not exhaustive scrubbing.
fn secure_transformations() -> &'static [(Regex, &'static str)] {
    static RULES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            (Regex::new(r"(?i)\byou always\b").unwrap(), "I feel like you sometimes"),
            (Regex::new(r"(?i)\byou never\b").unwrap(), "I feel like you rarely"),
            (Regex::new(r"(?i)\balways\b").unwrap(), "often"),
            (Regex::new(r"(?i)\bnever\b").unwrap(), "rarely"),
            (Regex::new(r"(?i)\beveryone\b").unwrap(), "many people"),
            (Regex::new(r"(?i)\bno one\b").unwrap(), "not many people"),
        ]
    })
}

/// Apply the secure transformation rules to `text`, in order, first match
/// per rule.
pub fn apply_secure_transformations(text: &str) -> String {
    let mut out = text.to_string();
    for (pattern, replacement) in secure_transformations() {
        if pattern.is_match(&out) {
            out = pattern.replacen(&out, 1, *replacement).into_owned();
        }
    }
    out
}

/// Produce one short, deterministic suggestion for `text` using local
/// rules: capitalize the first letter, ensure terminal punctuation, and
/// soften absolutes/blame language via [`apply_secure_transformations`].
pub fn suggest(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let softened = apply_secure_transformations(trimmed);
    let capitalized = capitalize_first(&softened);
    ensure_terminal_punctuation(&capitalized)
}

fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn ensure_terminal_punctuation(s: &str) -> String {
    match s.chars().last() {
        Some(c) if ".!?".contains(c) => s.to_string(),
        _ => format!("{s}."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggest_is_deterministic_given_same_input() {
        assert_eq!(suggest("you never listen"), suggest("you never listen"));
    }

    #[test]
    fn suggest_capitalizes_and_terminates() {
        let s = suggest("this is fine");
        assert!(s.starts_with('T'));
        assert!(s.ends_with('.'));
    }

    #[test]
    fn suggest_softens_you_never() {
        let s = suggest("you never listen");
        assert!(s.to_lowercase().contains("rarely"));
        assert!(!s.to_lowercase().contains("you never"));
    }

    #[test]
    fn suggest_softens_you_always() {
        let s = suggest("you always do this");
        assert!(s.to_lowercase().contains("sometimes"));
    }

    #[test]
    fn empty_text_yields_empty_suggestion() {
        assert_eq!(suggest("   "), "");
    }

    #[test]
    fn existing_terminal_punctuation_is_preserved() {
        let s = suggest("are you serious?");
        assert_eq!(s.matches('?').count() + s.matches('.').count(), 1);
    }

    #[test]
    fn secure_transformations_only_replace_first_match() {
        let out = apply_secure_transformations("you always do this, you always do that");
        assert_eq!(out.matches("I feel like you sometimes").count(), 1);
    }
}
