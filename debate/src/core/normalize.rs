//! Text normalization for similarity and keyword checks.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::candidate::CandidateContent;

/// Round/turn references, speaker letters, ordinals and bare integers.
static VOLATILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:round|turn)\s*\d+\b|\b(?:speaker|agent)\s*[ab]\b|\b\d+(?:st|nd|rd|th)\b|\b\d+\b",
    )
    .expect("volatile token regex should compile")
});

/// Lower-case, drop ASCII punctuation and volatile tokens, collapse whitespace.
///
/// Idempotent: stripping can expose a new volatile token (for example
/// `round agent a 3`), so stripping repeats until the text is stable.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped: String = lowered
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect();

    let mut current = collapse_whitespace(&stripped);
    loop {
        let next = collapse_whitespace(&VOLATILE_RE.replace_all(&current, " "));
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Normalized own words of a candidate; the quote never counts as repetition.
pub fn repetition_key(content: &CandidateContent) -> String {
    normalize(&content.own_words())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
