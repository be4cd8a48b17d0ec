//! Candidate turn content: the two accepted shapes, parsing and rendering.
//!
//! A debate uses exactly one [`ContentShape`]. Everything shape-specific
//! (which fields exist, how they render, which text counts as the speaker's own
//! words) lives on [`CandidateContent`] so callers never branch on raw string
//! prefixes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::schema::{self, SchemaKind};

/// Quote value required when there is no opponent turn to quote.
pub const QUOTE_SENTINEL: &str = "none";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentShape {
    #[default]
    Structured,
    Paragraph,
}

impl ContentShape {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentShape::Structured => "structured",
            ContentShape::Paragraph => "paragraph",
        }
    }

    fn schema(self) -> SchemaKind {
        match self {
            ContentShape::Structured => SchemaKind::StructuredTurn,
            ContentShape::Paragraph => SchemaKind::ParagraphTurn,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredTurn {
    pub quote: String,
    pub rebut: String,
    pub new: String,
    pub question: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParagraphTurn {
    pub argument: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum CandidateContent {
    Structured(StructuredTurn),
    Paragraph(ParagraphTurn),
}

impl CandidateContent {
    /// Canonical transcript text.
    pub fn render(&self) -> String {
        match self {
            CandidateContent::Structured(turn) => format!(
                "QUOTE: {}\nREBUT: {}\nNEW: {}\nQUESTION: {}",
                turn.quote, turn.rebut, turn.new, turn.question
            ),
            CandidateContent::Paragraph(turn) => turn.argument.clone(),
        }
    }

    /// The speaker's own words: everything except a quote of the opponent.
    ///
    /// Used for repetition keys, topic checks, and as the source an opponent
    /// may quote from.
    pub fn own_words(&self) -> String {
        match self {
            CandidateContent::Structured(turn) => {
                format!("{}\n{}\n{}", turn.rebut, turn.new, turn.question)
            }
            CandidateContent::Paragraph(turn) => turn.argument.clone(),
        }
    }

    pub fn quote(&self) -> Option<&str> {
        match self {
            CandidateContent::Structured(turn) => Some(turn.quote.as_str()),
            CandidateContent::Paragraph(_) => None,
        }
    }

    /// Quote that counts toward the used-quote set (non-sentinel, trimmed).
    pub fn quoted_text(&self) -> Option<&str> {
        self.quote()
            .map(str::trim)
            .filter(|quote| !quote.is_empty() && !is_sentinel(quote))
    }
}

/// True for `none`, `(none)` and case variants.
pub fn is_sentinel(quote: &str) -> bool {
    quote
        .trim()
        .trim_start_matches('(')
        .trim_end_matches(')')
        .trim()
        .eq_ignore_ascii_case(QUOTE_SENTINEL)
}

/// Why a raw response could not become a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    /// No JSON object could be decoded.
    NotJson(String),
    /// Decoded JSON did not match the shape's schema.
    SchemaMismatch(Vec<String>),
}

impl ParseFailure {
    pub fn detail(&self) -> String {
        match self {
            ParseFailure::NotJson(detail) => detail.clone(),
            ParseFailure::SchemaMismatch(messages) => messages.join("; "),
        }
    }
}

/// Parse a raw generator response into content of the expected shape.
///
/// Every field is collapsed to a single line so the canonical rendering stays
/// one line per block.
pub fn parse_candidate(raw: &str, shape: ContentShape) -> Result<CandidateContent, ParseFailure> {
    let body = schema::extract_json_object(raw)
        .ok_or_else(|| ParseFailure::NotJson("no json object in response".to_string()))?;
    let value: Value =
        serde_json::from_str(body).map_err(|err| ParseFailure::NotJson(err.to_string()))?;

    let messages = schema::violations(shape.schema(), &value);
    if !messages.is_empty() {
        return Err(ParseFailure::SchemaMismatch(messages));
    }

    let content = match shape {
        ContentShape::Structured => {
            let turn: StructuredTurn = serde_json::from_value(value)
                .map_err(|err| ParseFailure::SchemaMismatch(vec![err.to_string()]))?;
            CandidateContent::Structured(StructuredTurn {
                quote: single_line(&turn.quote),
                rebut: single_line(&turn.rebut),
                new: single_line(&turn.new),
                question: single_line(&turn.question),
            })
        }
        ContentShape::Paragraph => {
            let turn: ParagraphTurn = serde_json::from_value(value)
                .map_err(|err| ParseFailure::SchemaMismatch(vec![err.to_string()]))?;
            CandidateContent::Paragraph(ParagraphTurn {
                argument: single_line(&turn.argument),
            })
        }
    };
    Ok(content)
}

/// Collapse all whitespace runs (including newlines) into single spaces.
pub fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
