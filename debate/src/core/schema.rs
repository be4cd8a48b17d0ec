//! JSON Schema checks for collaborator responses (Draft 2020-12).

use std::sync::LazyLock;

use jsonschema::{Draft, Validator};
use serde_json::Value;

const STRUCTURED_TURN_SCHEMA: &str = include_str!("../../schemas/turn_structured.schema.json");
const PARAGRAPH_TURN_SCHEMA: &str = include_str!("../../schemas/turn_paragraph.schema.json");
const VERDICT_SCHEMA: &str = include_str!("../../schemas/verdict.schema.json");

/// Which bundled schema to validate against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    StructuredTurn,
    ParagraphTurn,
    Verdict,
}

fn compile(raw: &str, label: &str) -> Validator {
    let schema: Value = serde_json::from_str(raw)
        .unwrap_or_else(|err| panic!("bundled {label} schema should be valid json: {err}"));
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .unwrap_or_else(|err| panic!("bundled {label} schema should compile: {err}"))
}

static STRUCTURED_TURN: LazyLock<Validator> =
    LazyLock::new(|| compile(STRUCTURED_TURN_SCHEMA, "structured turn"));
static PARAGRAPH_TURN: LazyLock<Validator> =
    LazyLock::new(|| compile(PARAGRAPH_TURN_SCHEMA, "paragraph turn"));
static VERDICT: LazyLock<Validator> = LazyLock::new(|| compile(VERDICT_SCHEMA, "verdict"));

/// Collect every schema violation for `instance`. Empty means valid.
pub fn violations(kind: SchemaKind, instance: &Value) -> Vec<String> {
    let validator: &Validator = match kind {
        SchemaKind::StructuredTurn => &STRUCTURED_TURN,
        SchemaKind::ParagraphTurn => &PARAGRAPH_TURN,
        SchemaKind::Verdict => &VERDICT,
    };
    validator
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect()
}

/// Locate the JSON object inside a model response.
///
/// Tolerates surrounding Markdown code fences and leading/trailing chatter by
/// slicing from the first `{` to the last `}`.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}
