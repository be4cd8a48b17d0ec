//! Append-only debate memory.
//!
//! [`MemoryStore::commit`] is the only way a turn enters the transcript. Each
//! commit also records the quoted sentence, extends the rolling summary, indexes
//! the repetition key and recomputes both speakers' [`MemorySlice`]s.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::Value;

use crate::core::candidate::CandidateContent;
use crate::core::normalize::repetition_key;
use crate::core::types::{PendingTurn, Speaker, Turn};
use crate::schedule::ProtocolViolation;

/// Characters of each turn kept in the rolling summary.
const SUMMARY_EXCERPT_CHARS: usize = 120;

/// Compact view of a committed turn for prompts and slices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnView {
    pub round: u32,
    pub speaker: Speaker,
    pub agent_name: String,
    pub text: String,
}

impl From<&Turn> for TurnView {
    fn from(turn: &Turn) -> Self {
        Self {
            round: turn.round,
            speaker: turn.speaker,
            agent_name: turn.agent_name.clone(),
            text: turn.text.clone(),
        }
    }
}

/// Read-only projection of memory for one speaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemorySlice {
    pub you_are: Speaker,
    pub summary: String,
    pub recent_turns: Vec<TurnView>,
    pub last_own_turn: Option<TurnView>,
    pub last_opponent_turn: Option<TurnView>,
}

impl MemorySlice {
    fn empty(you_are: Speaker) -> Self {
        Self {
            you_are,
            summary: String::new(),
            recent_turns: Vec::new(),
            last_own_turn: None,
            last_opponent_turn: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MemoryStore {
    topic: String,
    summary_chars: usize,
    recent_turns: usize,
    turns: Vec<Turn>,
    repetition_keys: Vec<String>,
    summary: String,
    used_quotes: BTreeSet<String>,
    slice_a: MemorySlice,
    slice_b: MemorySlice,
}

impl MemoryStore {
    pub fn new(topic: &str, summary_chars: usize, recent_turns: usize) -> Self {
        Self {
            topic: topic.to_string(),
            summary_chars,
            recent_turns,
            turns: Vec::new(),
            repetition_keys: Vec::new(),
            summary: String::new(),
            used_quotes: BTreeSet::new(),
            slice_a: MemorySlice::empty(Speaker::A),
            slice_b: MemorySlice::empty(Speaker::B),
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Round number the next commit will receive.
    pub fn next_round(&self) -> u32 {
        self.turns.len() as u32 + 1
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn used_quotes(&self) -> &BTreeSet<String> {
        &self.used_quotes
    }

    pub fn slice(&self, speaker: Speaker) -> &MemorySlice {
        match speaker {
            Speaker::A => &self.slice_a,
            Speaker::B => &self.slice_b,
        }
    }

    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn last_turn_of(&self, speaker: Speaker) -> Option<&Turn> {
        self.turns.iter().rev().find(|t| t.speaker == speaker)
    }

    /// Content of the immediately preceding turn when it belongs to the
    /// opponent of `speaker`.
    pub fn opponent_last_content(&self, speaker: Speaker) -> Option<&CandidateContent> {
        self.turns
            .last()
            .filter(|t| t.speaker == speaker.opponent())
            .map(|t| &t.content)
    }

    /// Repetition keys of every committed turn, in round order.
    pub fn repetition_keys(&self) -> &[String] {
        &self.repetition_keys
    }

    /// `(round, repetition key)` of `speaker`'s committed turns, in round order.
    pub fn repetition_keys_of(&self, speaker: Speaker) -> Vec<(u32, &str)> {
        self.turns
            .iter()
            .zip(&self.repetition_keys)
            .filter(|(turn, _)| turn.speaker == speaker)
            .map(|(turn, key)| (turn.round, key.as_str()))
            .collect()
    }

    pub fn last_repetition_key(&self) -> Option<&str> {
        self.repetition_keys.last().map(String::as_str)
    }

    /// Append a pending turn. Fails without appending when the turn is not
    /// from `expected` or is missing its text or agent name.
    pub fn commit(
        &mut self,
        pending: PendingTurn,
        expected: Speaker,
        meta: BTreeMap<String, Value>,
    ) -> Result<&Turn, ProtocolViolation> {
        if pending.speaker != expected {
            return Err(ProtocolViolation::new(format!(
                "commit for speaker {} while {} is expected",
                pending.speaker, expected
            )));
        }
        if pending.text.trim().is_empty() {
            return Err(ProtocolViolation::new("pending turn has no text"));
        }
        if pending.agent_name.trim().is_empty() {
            return Err(ProtocolViolation::new("pending turn has no agent name"));
        }

        let turn = Turn {
            round: self.next_round(),
            speaker: pending.speaker,
            agent_name: pending.agent_name,
            text: pending.text,
            content: pending.content,
            meta,
        };

        if let Some(quote) = turn.content.quoted_text() {
            self.used_quotes.insert(quote.to_string());
        }
        self.repetition_keys.push(repetition_key(&turn.content));
        self.extend_summary(&turn);
        self.turns.push(turn);
        self.slice_a = self.build_slice(Speaker::A);
        self.slice_b = self.build_slice(Speaker::B);

        let index = self.turns.len() - 1;
        Ok(&self.turns[index])
    }

    fn extend_summary(&mut self, turn: &Turn) {
        if self.summary.is_empty() {
            self.summary = format!("Topic: {}. ", self.topic);
        }
        let excerpt: String = turn
            .text
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .chars()
            .take(SUMMARY_EXCERPT_CHARS)
            .collect();
        self.summary
            .push_str(&format!("[R{}:{}] {}... ", turn.round, turn.agent_name, excerpt));
    }

    fn build_slice(&self, you_are: Speaker) -> MemorySlice {
        let start = self.turns.len().saturating_sub(self.recent_turns);
        MemorySlice {
            you_are,
            summary: tail_chars(&self.summary, self.summary_chars).to_string(),
            recent_turns: self.turns[start..].iter().map(TurnView::from).collect(),
            last_own_turn: self.last_turn_of(you_are).map(TurnView::from),
            last_opponent_turn: self.last_turn_of(you_are.opponent()).map(TurnView::from),
        }
    }
}

/// Last `max` characters of `text`, on a char boundary.
fn tail_chars(text: &str, max: usize) -> &str {
    let count = text.chars().count();
    if count <= max {
        return text;
    }
    match text.char_indices().nth(count - max) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}
