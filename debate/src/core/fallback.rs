//! Deterministic fallback turns.
//!
//! The producer uses variant `round - 1` when every generation attempt fails;
//! the acceptance validator walks the variants for a forced rewrite. Every
//! variant satisfies the content rules for any topic between 10 and 300
//! characters as long as the limits pass [`check_limits`]. Variants below
//! [`VARIANT_COUNT`] share no sentence; the full [`VARIANT_SPACE`] never
//! repeats a (rebut, new, question) combination.

use std::collections::BTreeSet;

use crate::core::candidate::{
    CandidateContent, ContentShape, ParagraphTurn, QUOTE_SENTINEL, StructuredTurn, is_sentinel,
};
use crate::core::rules::ContentLimits;
use crate::core::types::{Persona, TOPIC_MAX_CHARS};

pub const VARIANT_COUNT: usize = 8;

/// Distinct sentence combinations across all variants.
pub const VARIANT_SPACE: usize = VARIANT_COUNT * VARIANT_COUNT;

/// Longest quote taken from an opponent sentence.
pub const MAX_QUOTE_CHARS: usize = 160;

/// Longest debate the banks cover. Up to this round every fallback still
/// finds an unquoted opponent sentence and every forced rewrite a variant
/// below the duplicate thresholds.
pub const MAX_ROUNDS: u32 = 30;

/// Characters `new` adds around the bank entry: `Speaking as the `, `, `,
/// ` "` and `".`.
const NEW_FRAME_CHARS: usize = 22;

const REBUTS: [&str; VARIANT_COUNT] = [
    "That claim leans on an assumption that has not been shown to hold once costs and risks are counted honestly.",
    "The reasoning skips over who bears the burden if the expected benefits arrive late or never arrive at all.",
    "This framing treats a hopeful projection as settled fact, and the gap between the two matters here.",
    "The argument quietly swaps a possibility for a likelihood, which inflates how strong the case really is.",
    "Even granting that premise, the conclusion does not follow without a comparison against realistic alternatives.",
    "That line of thought ignores how past efforts of this kind drifted over budget and away from their stated aims.",
    "Appealing to long-run gains sidesteps the obligations owed to people affected during the transition.",
    "The point rests on selective examples, and a fuller record shows mixed results that cut against it.",
];

/// Each entry is completed with the topic phrase.
const NEWS: [&str; VARIANT_COUNT] = [
    "opportunity cost deserves weight on the question of",
    "reversibility should set a higher bar of justification when deciding",
    "someone must stay accountable for failed projections when we consider",
    "distributional effects decide whether the public sees legitimacy in",
    "timing matters, since acting early locks in limited knowledge about",
    "independent verification is essential before trusting progress reports on",
    "public consent has to be earned through transparent goals when settling",
    "resilience to setbacks should shape any plan that follows from",
];

const QUESTIONS: [&str; VARIANT_COUNT] = [
    "Which specific outcome would convince you that the costs outweigh the benefits?",
    "How would you reverse course if the early results disappoint?",
    "Who should be held responsible if the promised benefits never arrive?",
    "How do you justify the uneven spread of risks and rewards?",
    "Why act now rather than after the key uncertainties shrink?",
    "What independent check would you accept as a fair test of your claim?",
    "How would you secure genuine public consent for this path?",
    "What would your plan look like after a serious setback?",
];

/// Inputs a fallback turn is parameterized by.
#[derive(Debug, Clone, Copy)]
pub struct FallbackInput<'a> {
    pub topic: &'a str,
    pub persona: &'a Persona,
    pub shape: ContentShape,
    /// The opponent's previous own words; `None` in the first round.
    pub quote_source: Option<&'a str>,
    pub used_quotes: &'a BTreeSet<String>,
}

/// Build fallback content for `variant` (taken modulo [`VARIANT_SPACE`]).
pub fn fallback_content(input: &FallbackInput<'_>, variant: usize) -> CandidateContent {
    let variant = variant % VARIANT_SPACE;
    let cycle = variant / VARIANT_COUNT;
    let rebut = REBUTS[variant % VARIANT_COUNT].to_string();
    let new = format!(
        "Speaking as the {}, {} \"{}\".",
        input.persona.name,
        NEWS[(variant + 3 + cycle) % VARIANT_COUNT],
        topic_phrase(input.topic)
    );
    let question = QUESTIONS[(variant + 5 + 3 * cycle) % VARIANT_COUNT].to_string();

    match input.shape {
        ContentShape::Structured => {
            let quote = match input.quote_source {
                Some(source) => pick_quote(source, input.used_quotes),
                None => QUOTE_SENTINEL.to_string(),
            };
            CandidateContent::Structured(StructuredTurn {
                quote,
                rebut,
                new,
                question,
            })
        }
        ContentShape::Paragraph => CandidateContent::Paragraph(ParagraphTurn {
            argument: format!("{rebut} {new} {question}"),
        }),
    }
}

/// Variant order tried by a forced rewrite in `round`.
pub fn rewrite_order(round: u32) -> impl Iterator<Item = usize> {
    let start = round as usize;
    (0..VARIANT_SPACE).map(move |k| (start + k) % VARIANT_SPACE)
}

/// Check that every variant meets `limits` for the given personas and any
/// valid topic.
pub fn check_limits(
    limits: &ContentLimits,
    shape: ContentShape,
    personas: [&Persona; 2],
) -> Result<(), String> {
    let (rebut_min, rebut_max) = char_range(&REBUTS);
    let (news_min, news_max) = char_range(&NEWS);
    let (question_min, question_max) = char_range(&QUESTIONS);
    let names = personas.map(|p| p.name.chars().count());
    let name_min = names.iter().copied().min().unwrap_or(0);
    let name_max = names.iter().copied().max().unwrap_or(0);
    // The topic phrase may be trimmed down to nothing.
    let new_min = NEW_FRAME_CHARS + name_min + news_min;
    let new_max = NEW_FRAME_CHARS + name_max + news_max + TOPIC_MAX_CHARS;

    match shape {
        ContentShape::Structured => {
            for (label, limit, shortest) in [
                ("rules.min_rebut_chars", limits.min_rebut_chars, rebut_min),
                ("rules.min_new_chars", limits.min_new_chars, new_min),
                ("rules.min_question_chars", limits.min_question_chars, question_min),
            ] {
                if limit > shortest {
                    return Err(format!(
                        "{label} must be <= {shortest} (shortest fallback text)"
                    ));
                }
            }
        }
        ContentShape::Paragraph => {
            let shortest = rebut_min + new_min + question_min + 2;
            let longest = rebut_max + new_max + question_max + 2;
            if limits.min_argument_chars > shortest {
                return Err(format!(
                    "rules.min_argument_chars must be <= {shortest} (shortest fallback text)"
                ));
            }
            if limits.max_argument_chars < longest {
                return Err(format!(
                    "rules.max_argument_chars must be >= {longest} (longest fallback text)"
                ));
            }
        }
    }
    Ok(())
}

fn char_range(bank: &[&str]) -> (usize, usize) {
    let lens: Vec<usize> = bank.iter().map(|s| s.chars().count()).collect();
    let min = lens.iter().copied().min().unwrap_or(0);
    let max = lens.iter().copied().max().unwrap_or(0);
    (min, max)
}

fn topic_phrase(topic: &str) -> &str {
    topic.trim().trim_end_matches(['?', '.', '!'])
}

/// First sentence of `source` that has not been quoted yet, cut to at most
/// [`MAX_QUOTE_CHARS`] characters. The result is always a substring of
/// `source`. Falls back to the sentinel when `source` has no usable text.
pub fn pick_quote(source: &str, used: &BTreeSet<String>) -> String {
    let sentences = split_sentences(source);
    sentences
        .iter()
        .map(|sentence| truncate_chars(sentence, MAX_QUOTE_CHARS))
        .find(|quote| !quote.is_empty() && !is_sentinel(quote) && !used.contains(*quote))
        .or_else(|| {
            sentences
                .first()
                .map(|sentence| truncate_chars(sentence, MAX_QUOTE_CHARS))
        })
        .filter(|quote| !quote.is_empty())
        .map_or_else(|| QUOTE_SENTINEL.to_string(), str::to_string)
}

/// Split on newlines and on `.`, `?`, `!` followed by whitespace.
fn split_sentences(source: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = source.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        let end = match c {
            '\n' => Some(idx),
            '.' | '?' | '!' => match chars.peek() {
                None => Some(idx + 1),
                Some((_, next)) if next.is_whitespace() => Some(idx + 1),
                Some(_) => None,
            },
            _ => None,
        };
        if let Some(end) = end {
            let sentence = source[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = if c == '\n' { idx + 1 } else { end };
        }
    }
    let rest = source[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].trim_end(),
        None => text,
    }
}
