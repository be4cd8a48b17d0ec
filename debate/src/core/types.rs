//! Shared deterministic types for the debate core.
//!
//! These types define the contracts between the producer, the acceptance
//! validator, the memory store and the scheduler. They carry no I/O and
//! serialize to stable JSON for the event log.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::candidate::CandidateContent;

/// Debate side. `A` opens unless configured otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Speaker {
    A,
    B,
}

impl Speaker {
    pub fn opponent(self) -> Self {
        match self {
            Speaker::A => Speaker::B,
            Speaker::B => Speaker::A,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Speaker::A => "A",
            Speaker::B => "B",
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persona bound to a speaker. Only used to build prompts and fallback text.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Persona {
    pub name: String,
    /// Argumentative style injected into the system prompt.
    pub style: String,
}

pub const TOPIC_MIN_CHARS: usize = 10;
pub const TOPIC_MAX_CHARS: usize = 300;

/// Sanitized debate topic. Immutable once the debate starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    /// Strip control characters and surrounding whitespace, then enforce
    /// the `[TOPIC_MIN_CHARS, TOPIC_MAX_CHARS]` length bounds.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let sanitized: String = raw.trim().chars().filter(|c| !c.is_control()).collect();
        let sanitized = sanitized.trim().to_string();
        let len = sanitized.chars().count();
        if len < TOPIC_MIN_CHARS {
            return Err(format!(
                "topic too short ({len} chars, min {TOPIC_MIN_CHARS})"
            ));
        }
        if len > TOPIC_MAX_CHARS {
            return Err(format!("topic too long ({len} chars, max {TOPIC_MAX_CHARS})"));
        }
        Ok(Self(sanitized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A committed debate turn. Never edited once appended to the memory store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    /// 1-indexed, equal to the append position.
    pub round: u32,
    pub speaker: Speaker,
    pub agent_name: String,
    /// Canonical rendering of `content`.
    pub text: String,
    pub content: CandidateContent,
    pub meta: BTreeMap<String, Value>,
}

/// Where a pending turn came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Origin {
    /// Produced by the generator on the given attempt index.
    Generated { attempt: u32, temperature: f64 },
    /// Deterministic producer fallback after the attempts ran out.
    Fallback,
    /// Deterministic substitute chosen by the acceptance validator.
    ForcedRewrite { variant: usize },
}

/// Candidate handed from the producer to the acceptance validator.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingTurn {
    pub speaker: Speaker,
    pub agent_name: String,
    pub content: CandidateContent,
    pub text: String,
    pub origin: Origin,
}

impl PendingTurn {
    pub fn new(
        speaker: Speaker,
        agent_name: &str,
        content: CandidateContent,
        origin: Origin,
    ) -> Self {
        let text = content.render();
        Self {
            speaker,
            agent_name: agent_name.to_string(),
            content,
            text,
            origin,
        }
    }
}

/// How the acceptance validator resolved a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Passed every check.
    Accepted,
    /// Attempts ran out with only soft reasons left; committed as-is.
    ExhaustedAccepted,
    /// Attempts ran out with a hard-block reason; replaced by a forced rewrite.
    ForcedRewrite,
}

impl Resolution {
    pub fn as_str(self) -> &'static str {
        match self {
            Resolution::Accepted => "accepted",
            Resolution::ExhaustedAccepted => "exhausted_accepted",
            Resolution::ForcedRewrite => "forced_rewrite",
        }
    }
}

/// Reason a candidate was rejected.
///
/// Serialized names are stable; they appear in prompts, audit records and
/// the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    NonJson,
    SchemaMismatch,
    GenerationFailed,
    RebutTooShort,
    NewTooShort,
    ArgumentTooShort,
    ArgumentTooLong,
    QuestionMissingMark,
    QuestionTooShort,
    QuoteMustBeNoneRound1,
    QuoteCannotBeNoneAfterRound1,
    QuoteNotFromOpponent,
    RepeatedQuote,
    OffTopic,
    LooksLikeFallbackTemplate,
    DuplicateSameSpeaker,
    DuplicateCrossSpeaker,
    DuplicateLastTurn,
}

impl RejectionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectionReason::NonJson => "non_json",
            RejectionReason::SchemaMismatch => "schema_mismatch",
            RejectionReason::GenerationFailed => "generation_failed",
            RejectionReason::RebutTooShort => "rebut_too_short",
            RejectionReason::NewTooShort => "new_too_short",
            RejectionReason::ArgumentTooShort => "argument_too_short",
            RejectionReason::ArgumentTooLong => "argument_too_long",
            RejectionReason::QuestionMissingMark => "question_missing_mark",
            RejectionReason::QuestionTooShort => "question_too_short",
            RejectionReason::QuoteMustBeNoneRound1 => "quote_must_be_none_round1",
            RejectionReason::QuoteCannotBeNoneAfterRound1 => "quote_cannot_be_none_after_round1",
            RejectionReason::QuoteNotFromOpponent => "quote_not_from_opponent",
            RejectionReason::RepeatedQuote => "repeated_quote",
            RejectionReason::OffTopic => "off_topic",
            RejectionReason::LooksLikeFallbackTemplate => "looks_like_fallback_template",
            RejectionReason::DuplicateSameSpeaker => "duplicate_same_speaker",
            RejectionReason::DuplicateCrossSpeaker => "duplicate_cross_speaker",
            RejectionReason::DuplicateLastTurn => "duplicate_last_turn",
        }
    }

    /// Hard-block reasons are never committed as-is, even after the retry
    /// budget is spent.
    pub fn is_hard_block(self) -> bool {
        matches!(
            self,
            RejectionReason::DuplicateSameSpeaker
                | RejectionReason::DuplicateCrossSpeaker
                | RejectionReason::DuplicateLastTurn
                | RejectionReason::LooksLikeFallbackTemplate
        )
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a non-blocking coherence observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlagKind {
    RepetitionDetected,
    TopicDriftSuspected,
    PossibleContradiction,
    AgentFallbackUsed,
    RetryExhaustedForcedRewrite,
    RetryExhaustedAccepted,
}

/// Append-only audit record. Never drives control flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoherenceFlag {
    pub round: u32,
    pub speaker: Speaker,
    pub kind: FlagKind,
    pub details: String,
}

/// Which side of the protocol rejected a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionStage {
    Producer,
    Acceptance,
}

/// Append-only record of a rejected candidate, kept after the round resolves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectionRecord {
    pub round: u32,
    pub speaker: Speaker,
    /// 0-indexed attempt within the round.
    pub attempt: u32,
    pub stage: RejectionStage,
    pub reasons: Vec<RejectionReason>,
    pub text: String,
}

/// Append-only coherence flags and rejection history for one debate.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditTrail {
    coherence_flags: Vec<CoherenceFlag>,
    rejection_history: Vec<RejectionRecord>,
}

impl AuditTrail {
    pub fn flag(
        &mut self,
        round: u32,
        speaker: Speaker,
        kind: FlagKind,
        details: impl Into<String>,
    ) {
        self.coherence_flags.push(CoherenceFlag {
            round,
            speaker,
            kind,
            details: details.into(),
        });
    }

    pub fn reject(&mut self, record: RejectionRecord) {
        self.rejection_history.push(record);
    }

    pub fn coherence_flags(&self) -> &[CoherenceFlag] {
        &self.coherence_flags
    }

    pub fn rejection_history(&self) -> &[RejectionRecord] {
        &self.rejection_history
    }

    pub fn flags_tail(&self, n: usize) -> &[CoherenceFlag] {
        tail(&self.coherence_flags, n)
    }

    pub fn rejections_tail(&self, n: usize) -> &[RejectionRecord] {
        tail(&self.rejection_history, n)
    }
}

fn tail<T>(items: &[T], n: usize) -> &[T] {
    &items[items.len().saturating_sub(n)..]
}

/// Retry bookkeeping for the in-flight round.
///
/// The producer and the acceptance validator share one budget of
/// `max_retries + 1` attempts per round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetryContext {
    attempts: u32,
    max_retries: u32,
    last_reasons: Vec<RejectionReason>,
    last_rejected_text: Option<String>,
}

impl RetryContext {
    pub fn new(max_retries: u32) -> Self {
        Self {
            attempts: 0,
            max_retries,
            last_reasons: Vec::new(),
            last_rejected_text: None,
        }
    }

    /// Claim the next attempt. Returns its 0-indexed position, or `None`
    /// once the budget is spent.
    pub fn begin_attempt(&mut self) -> Option<u32> {
        if !self.has_remaining() {
            return None;
        }
        let index = self.attempts;
        self.attempts += 1;
        Some(index)
    }

    pub fn has_remaining(&self) -> bool {
        self.attempts <= self.max_retries
    }

    pub fn record_rejection(&mut self, reasons: &[RejectionReason], text: &str) {
        self.last_reasons = reasons.to_vec();
        self.last_rejected_text = Some(text.to_string());
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
        self.last_reasons.clear();
        self.last_rejected_text = None;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_reasons(&self) -> &[RejectionReason] {
        &self.last_reasons
    }

    pub fn last_rejected_text(&self) -> Option<&str> {
        self.last_rejected_text.as_deref()
    }
}

/// Lifecycle status of a debate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "error", rename_all = "snake_case")]
pub enum DebateStatus {
    Running,
    Complete,
    Error(String),
}

impl DebateStatus {
    pub fn is_error(&self) -> bool {
        matches!(self, DebateStatus::Error(_))
    }
}

/// Terminal judgment produced once after the final round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub summary: String,
    pub winner: Speaker,
    pub winner_name: String,
    pub reason: String,
    /// True when the judge response could not be parsed and defaults were used.
    pub malformed: bool,
    /// Audit flags raised during the debate, carried into the judged output.
    pub coherence_flags: Vec<CoherenceFlag>,
}
