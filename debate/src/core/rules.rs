//! Stateless content rules for a parsed candidate turn.
//!
//! [`check_content`] collects every violated rule in a fixed order so both the
//! producer and the acceptance validator report identical reasons for the same
//! candidate.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::core::candidate::{CandidateContent, is_sentinel};
use crate::core::normalize::normalize;
use crate::core::types::{FlagKind, RejectionReason};

/// Phrases that only appear in canned fallback text (normalized form).
const FALLBACK_MARKERS: [&str; 7] = [
    "i will stay on topic",
    "i will stay on the topic",
    "what concrete evidence would change your stance",
    "what evidence would you require before scaling",
    "what stop condition would trigger reversal or redesign",
    "here is one concrete consideration",
    "as an ai language model",
];

/// Concessions that hint a speaker is abandoning their own position.
const CONCESSION_MARKERS: [&str; 6] = [
    "i agree with you",
    "you are right",
    "youre right",
    "i concede",
    "you make a fair point",
    "i was wrong",
];

const STOPWORDS: [&str; 26] = [
    "about", "after", "again", "against", "being", "because", "before", "between", "could",
    "every", "other", "people", "should", "their", "there", "these", "thing", "things", "those",
    "under", "where", "whether", "which", "while", "within", "would",
];

/// Length and keyword limits applied to every candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentLimits {
    pub min_rebut_chars: usize,
    pub min_new_chars: usize,
    pub min_question_chars: usize,
    pub min_argument_chars: usize,
    pub max_argument_chars: usize,
    /// Maximum number of topic keywords used by the topic gate.
    pub keyword_cap: usize,
}

impl Default for ContentLimits {
    fn default() -> Self {
        Self {
            min_rebut_chars: 60,
            min_new_chars: 60,
            min_question_chars: 10,
            min_argument_chars: 140,
            max_argument_chars: 1100,
            keyword_cap: 8,
        }
    }
}

/// Everything the rules need to know about the debate so far.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub round: u32,
    /// The opponent's immediately preceding turn, if any.
    pub opponent_last: Option<&'a CandidateContent>,
    pub keywords: &'a [String],
    pub used_quotes: &'a BTreeSet<String>,
    pub limits: &'a ContentLimits,
}

/// Non-blocking observation attached to a checked candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub kind: FlagKind,
    pub details: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentReport {
    pub reasons: Vec<RejectionReason>,
    pub observations: Vec<Observation>,
}

impl ContentReport {
    pub fn passed(&self) -> bool {
        self.reasons.is_empty()
    }

    fn reject(&mut self, reason: RejectionReason) {
        if !self.reasons.contains(&reason) {
            self.reasons.push(reason);
        }
    }
}

/// Apply every content rule to `content`.
pub fn check_content(content: &CandidateContent, ctx: &RuleContext<'_>) -> ContentReport {
    let mut report = ContentReport::default();
    let limits = ctx.limits;

    match content {
        CandidateContent::Structured(turn) => {
            if char_len(&turn.rebut) < limits.min_rebut_chars {
                report.reject(RejectionReason::RebutTooShort);
            }
            if char_len(&turn.new) < limits.min_new_chars {
                report.reject(RejectionReason::NewTooShort);
            }
            check_question(&turn.question, limits, &mut report);
            check_quote(&turn.quote, ctx, &mut report);
        }
        CandidateContent::Paragraph(turn) => {
            let len = char_len(&turn.argument);
            if len < limits.min_argument_chars {
                report.reject(RejectionReason::ArgumentTooShort);
            }
            if len > limits.max_argument_chars {
                report.reject(RejectionReason::ArgumentTooLong);
            }
        }
    }

    let own = normalize(&content.own_words());
    if looks_like_fallback(&own) {
        report.reject(RejectionReason::LooksLikeFallbackTemplate);
    }

    if !mentions_topic(&own, ctx.keywords) {
        report.observations.push(Observation {
            kind: FlagKind::TopicDriftSuspected,
            details: format!("no topic keyword from [{}]", ctx.keywords.join(", ")),
        });
        if !report.reasons.is_empty() {
            report.reject(RejectionReason::OffTopic);
        }
    }

    if let Some(marker) = concession_marker(&own) {
        report.observations.push(Observation {
            kind: FlagKind::PossibleContradiction,
            details: format!("concession phrase \"{marker}\""),
        });
    }

    report
}

fn check_question(question: &str, limits: &ContentLimits, report: &mut ContentReport) {
    let question = question.trim();
    if !question.ends_with('?') {
        report.reject(RejectionReason::QuestionMissingMark);
    }
    if char_len(question) < limits.min_question_chars {
        report.reject(RejectionReason::QuestionTooShort);
    }
}

fn check_quote(quote: &str, ctx: &RuleContext<'_>, report: &mut ContentReport) {
    let quote = quote.trim();
    let Some(opponent) = ctx.opponent_last.filter(|_| ctx.round > 1) else {
        if !is_sentinel(quote) {
            report.reject(RejectionReason::QuoteMustBeNoneRound1);
        }
        return;
    };

    if quote.is_empty() || is_sentinel(quote) {
        report.reject(RejectionReason::QuoteCannotBeNoneAfterRound1);
        return;
    }
    if !opponent.own_words().contains(quote) {
        report.reject(RejectionReason::QuoteNotFromOpponent);
    }
    if ctx.used_quotes.contains(quote) {
        report.reject(RejectionReason::RepeatedQuote);
    }
}

fn char_len(text: &str) -> usize {
    text.trim().chars().count()
}

/// Topic keywords: normalized tokens of at least five characters that are not
/// stopwords or numbers, deduplicated, first `cap` kept.
pub fn topic_keywords(topic: &str, cap: usize) -> Vec<String> {
    let mut seen = BTreeSet::new();
    normalize(topic)
        .split_whitespace()
        .filter(|token| token.chars().count() >= 5)
        .filter(|token| !STOPWORDS.contains(token))
        .filter(|token| !token.chars().all(|c| c.is_ascii_digit()))
        .filter(|token| seen.insert(token.to_string()))
        .take(cap)
        .map(str::to_string)
        .collect()
}

/// Whether normalized text mentions any keyword. No keywords always passes.
pub fn mentions_topic(normalized: &str, keywords: &[String]) -> bool {
    keywords.is_empty() || keywords.iter().any(|k| normalized.contains(k.as_str()))
}

/// Whether normalized text contains a canned-fallback marker phrase.
pub fn looks_like_fallback(normalized: &str) -> bool {
    FALLBACK_MARKERS.iter().any(|m| normalized.contains(m))
}

fn concession_marker(normalized: &str) -> Option<&'static str> {
    CONCESSION_MARKERS
        .iter()
        .copied()
        .find(|m| normalized.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::candidate::{ParagraphTurn, StructuredTurn};

    const REBUT: &str =
        "Crewed missions carry risks that robotic probes avoid entirely, at lower cost.";
    const NEW: &str =
        "Public budgets for crewed missions compete directly with climate adaptation spending.";

    fn structured(quote: &str, rebut: &str, new: &str, question: &str) -> CandidateContent {
        CandidateContent::Structured(StructuredTurn {
            quote: quote.to_string(),
            rebut: rebut.to_string(),
            new: new.to_string(),
            question: question.to_string(),
        })
    }

    fn round_two<'a>(
        opponent: &'a CandidateContent,
        keywords: &'a [String],
        used: &'a BTreeSet<String>,
        limits: &'a ContentLimits,
    ) -> RuleContext<'a> {
        RuleContext {
            round: 2,
            opponent_last: Some(opponent),
            keywords,
            used_quotes: used,
            limits,
        }
    }

    fn keywords() -> Vec<String> {
        topic_keywords("Should nations fund crewed missions to Mars?", 8)
    }

    #[test]
    fn keywords_drop_short_words_stopwords_and_duplicates() {
        assert_eq!(keywords(), vec!["nations", "crewed", "missions"]);
        assert_eq!(
            topic_keywords("Robots robots ROBOTS replace teachers in 2030 classrooms", 2),
            vec!["robots", "replace"]
        );
        assert!(topic_keywords("Is it ok?", 8).is_empty());
    }

    #[test]
    fn first_round_requires_sentinel_quote() {
        let limits = ContentLimits::default();
        let used = BTreeSet::new();
        let kw = keywords();
        let ctx = RuleContext {
            round: 1,
            opponent_last: None,
            keywords: &kw,
            used_quotes: &used,
            limits: &limits,
        };

        let bad = structured("Mars is far away.", REBUT, NEW, "Who pays for the crewed missions?");
        let report = check_content(&bad, &ctx);
        assert_eq!(report.reasons, vec![RejectionReason::QuoteMustBeNoneRound1]);

        let good = structured("none", REBUT, NEW, "Who pays for the crewed missions?");
        assert!(check_content(&good, &ctx).passed());
    }

    #[test]
    fn later_rounds_require_verbatim_unused_opponent_quote() {
        let limits = ContentLimits::default();
        let kw = keywords();
        let opponent = structured("none", REBUT, NEW, "Who pays for the crewed missions?");
        let mut used = BTreeSet::new();
        let answer = |quote: &str| {
            structured(
                quote,
                "Robotic probes cannot adapt on site the way trained crews do during missions.",
                "Crewed missions train engineers whose skills return to domestic industries later.",
                "Would you cut every crewed mission, even lunar ones?",
            )
        };

        assert_eq!(
            check_content(&answer("none"), &round_two(&opponent, &kw, &used, &limits)).reasons,
            vec![RejectionReason::QuoteCannotBeNoneAfterRound1]
        );
        assert_eq!(
            check_content(
                &answer("Mars is cheap."),
                &round_two(&opponent, &kw, &used, &limits)
            )
            .reasons,
            vec![RejectionReason::QuoteNotFromOpponent]
        );
        assert!(
            check_content(&answer(REBUT), &round_two(&opponent, &kw, &used, &limits)).passed()
        );

        used.insert(REBUT.to_string());
        assert_eq!(
            check_content(&answer(REBUT), &round_two(&opponent, &kw, &used, &limits)).reasons,
            vec![RejectionReason::RepeatedQuote]
        );
    }

    #[test]
    fn collects_all_structural_reasons_and_off_topic() {
        let limits = ContentLimits::default();
        let used = BTreeSet::new();
        let kw = keywords();
        let ctx = RuleContext {
            round: 1,
            opponent_last: None,
            keywords: &kw,
            used_quotes: &used,
            limits: &limits,
        };
        let report = check_content(&structured("none", "short", "short too", "why"), &ctx);
        assert_eq!(
            report.reasons,
            vec![
                RejectionReason::RebutTooShort,
                RejectionReason::NewTooShort,
                RejectionReason::QuestionMissingMark,
                RejectionReason::QuestionTooShort,
                RejectionReason::OffTopic,
            ]
        );
        assert_eq!(report.observations[0].kind, FlagKind::TopicDriftSuspected);
    }

    #[test]
    fn topic_drift_alone_is_only_an_observation() {
        let limits = ContentLimits::default();
        let used = BTreeSet::new();
        let kw = keywords();
        let ctx = RuleContext {
            round: 1,
            opponent_last: None,
            keywords: &kw,
            used_quotes: &used,
            limits: &limits,
        };
        let drift = structured(
            "none",
            "Cooking at home saves money compared with eating at restaurants every evening.",
            "Home cooking also builds skills that make families healthier over many decades.",
            "Why do so many people still order takeaway food?",
        );
        let report = check_content(&drift, &ctx);
        assert!(report.passed());
        assert_eq!(report.observations.len(), 1);
        assert_eq!(report.observations[0].kind, FlagKind::TopicDriftSuspected);
    }

    #[test]
    fn detects_templates_and_concessions() {
        let limits = ContentLimits::default();
        let used = BTreeSet::new();
        let kw = keywords();
        let ctx = RuleContext {
            round: 1,
            opponent_last: None,
            keywords: &kw,
            used_quotes: &used,
            limits: &limits,
        };
        let templated = structured(
            "none",
            "I will stay on topic: crewed missions need a clear rationale before any funding.",
            "You are right that crewed missions inspire students, yet inspiration is not a budget line.",
            "What concrete evidence would change your stance?",
        );
        let report = check_content(&templated, &ctx);
        assert_eq!(report.reasons, vec![RejectionReason::LooksLikeFallbackTemplate]);
        assert!(
            report
                .observations
                .iter()
                .any(|o| o.kind == FlagKind::PossibleContradiction)
        );
    }

    #[test]
    fn paragraph_length_bounds() {
        let limits = ContentLimits::default();
        let used = BTreeSet::new();
        let kw = keywords();
        let ctx = RuleContext {
            round: 1,
            opponent_last: None,
            keywords: &kw,
            used_quotes: &used,
            limits: &limits,
        };
        let short = CandidateContent::Paragraph(ParagraphTurn {
            argument: "Crewed missions are costly.".to_string(),
        });
        assert_eq!(
            check_content(&short, &ctx).reasons,
            vec![RejectionReason::ArgumentTooShort]
        );
        let long = CandidateContent::Paragraph(ParagraphTurn {
            argument: "Crewed missions ".repeat(80),
        });
        assert_eq!(
            check_content(&long, &ctx).reasons,
            vec![RejectionReason::ArgumentTooLong]
        );
    }
}
