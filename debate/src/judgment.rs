//! Final judgment over the committed transcript.
//!
//! Judgment never fails the debate: a generator error or an unparseable
//! response yields a default verdict for speaker A with `malformed` set.
//! Every verdict carries the debate's coherence flags.

use serde::Deserialize;
use serde_json::Value;
use tracing::{instrument, warn};

use crate::core::schema::{self, SchemaKind};
use crate::core::types::{CoherenceFlag, Speaker, Turn, Verdict};
use crate::io::config::{DebateConfig, PersonaConfig};
use crate::io::generator::{GenerationRequest, Generator};
use crate::io::prompt::PromptEngine;

/// Raw text kept in the summary of a malformed verdict.
pub const MAX_RAW_SUMMARY_CHARS: usize = 2000;

const MALFORMED_REASON: &str = "Judge returned invalid JSON; raw output stored in summary.";

#[derive(Debug, Deserialize)]
struct RawVerdict {
    summary: String,
    winner: String,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    justification: Option<String>,
}

/// One `R{round} {agent}: {text}` line per turn.
pub fn transcript(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| format!("R{} {}: {}\n", t.round, t.agent_name, t.text))
        .collect()
}

/// Ask the generator for a verdict at the judge's temperature.
#[instrument(skip_all, fields(turns = turns.len()))]
pub fn judge<G: Generator>(
    generator: &G,
    prompts: &PromptEngine,
    config: &DebateConfig,
    topic: &str,
    turns: &[Turn],
    flags: &[CoherenceFlag],
) -> Verdict {
    let mut verdict = request_verdict(generator, prompts, config, topic, turns);
    verdict.coherence_flags = flags.to_vec();
    verdict
}

fn request_verdict<G: Generator>(
    generator: &G,
    prompts: &PromptEngine,
    config: &DebateConfig,
    topic: &str,
    turns: &[Turn],
) -> Verdict {
    let personas = &config.personas;
    let prompt = match prompts.render_judge(topic, &personas.a, &personas.b, &transcript(turns)) {
        Ok(prompt) => prompt,
        Err(err) => {
            warn!(err = %format!("{err:#}"), "judge prompt failed to render");
            return malformed(personas, &format!("{err:#}"));
        }
    };
    let request = GenerationRequest {
        system: prompt.system,
        user: prompt.user,
        temperature: config.judge.temperature,
        max_tokens: config.judge.max_tokens,
        seed: config.sampling.seed,
    };
    match generator.generate(&request) {
        Ok(raw) => parse_verdict(&raw, personas),
        Err(err) => {
            warn!(err = %format!("{err:#}"), "judge generation failed");
            malformed(personas, &format!("{err:#}"))
        }
    }
}

/// Parse a judge response, falling back to the default verdict.
pub fn parse_verdict(raw: &str, personas: &PersonaConfig) -> Verdict {
    match try_parse(raw, personas) {
        Some(verdict) => verdict,
        None => {
            warn!("judge response malformed, using default verdict");
            malformed(personas, raw)
        }
    }
}

fn try_parse(raw: &str, personas: &PersonaConfig) -> Option<Verdict> {
    let value: Value = serde_json::from_str(schema::extract_json_object(raw)?).ok()?;
    if !schema::violations(SchemaKind::Verdict, &value).is_empty() {
        return None;
    }
    let parsed: RawVerdict = serde_json::from_value(value).ok()?;
    let winner = resolve_winner(&parsed.winner, personas)?;
    let reason = parsed
        .reason
        .filter(|r| !r.trim().is_empty())
        .or(parsed.justification)
        .unwrap_or_default();
    Some(Verdict {
        summary: parsed.summary.trim().to_string(),
        winner,
        winner_name: personas.get(winner).name.clone(),
        reason: reason.trim().to_string(),
        malformed: false,
        coherence_flags: Vec::new(),
    })
}

/// Accepts the persona name, `A`/`B`, or `AgentA`/`AgentB` (any case).
fn resolve_winner(raw: &str, personas: &PersonaConfig) -> Option<Speaker> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .collect::<String>()
        .to_lowercase();
    [Speaker::A, Speaker::B].into_iter().find(|speaker| {
        let name: String = personas
            .get(*speaker)
            .name
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        let letter = speaker.as_str().to_lowercase();
        cleaned == name
            || cleaned == letter
            || cleaned == format!("agent{letter}")
            || cleaned == format!("speaker{letter}")
    })
}

fn malformed(personas: &PersonaConfig, raw: &str) -> Verdict {
    Verdict {
        summary: raw.trim().chars().take(MAX_RAW_SUMMARY_CHARS).collect(),
        winner: Speaker::A,
        winner_name: personas.a.name.clone(),
        reason: MALFORMED_REASON.to_string(),
        malformed: true,
        coherence_flags: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::core::candidate::{CandidateContent, ParagraphTurn};
    use crate::core::types::FlagKind;
    use crate::test_support::{Scripted, ScriptedGenerator, test_config};

    fn turn(round: u32, speaker: Speaker, name: &str, text: &str) -> Turn {
        Turn {
            round,
            speaker,
            agent_name: name.to_string(),
            text: text.to_string(),
            content: CandidateContent::Paragraph(ParagraphTurn {
                argument: text.to_string(),
            }),
            meta: BTreeMap::new(),
        }
    }

    #[test]
    fn transcript_lists_rounds_in_order() {
        let turns = [
            turn(1, Speaker::A, "Scientist", "first"),
            turn(2, Speaker::B, "Philosopher", "second"),
        ];
        assert_eq!(transcript(&turns), "R1 Scientist: first\nR2 Philosopher: second\n");
    }

    #[test]
    fn parses_winner_aliases() {
        let personas = PersonaConfig::default();
        for (winner, expected) in [
            ("Philosopher", Speaker::B),
            ("philosopher", Speaker::B),
            ("B", Speaker::B),
            ("AgentA", Speaker::A),
            ("agent_b", Speaker::B),
        ] {
            let raw = format!(
                "{{\"summary\": \"Close debate.\", \"winner\": \"{winner}\", \"reason\": \"Sharper rebuttals.\"}}"
            );
            let verdict = parse_verdict(&raw, &personas);
            assert!(!verdict.malformed, "{winner}");
            assert_eq!(verdict.winner, expected, "{winner}");
        }
    }

    #[test]
    fn accepts_justification_alias() {
        let personas = PersonaConfig::default();
        let verdict = parse_verdict(
            "```json\n{\"summary\": \"s\", \"winner\": \"Scientist\", \"justification\": \"data\"}\n```",
            &personas,
        );
        assert!(!verdict.malformed);
        assert_eq!(verdict.winner_name, "Scientist");
        assert_eq!(verdict.reason, "data");
    }

    #[test]
    fn malformed_response_defaults_to_speaker_a() {
        let personas = PersonaConfig::default();
        let raw = format!("The winner is clearly B. {}", "x".repeat(3000));
        let verdict = parse_verdict(&raw, &personas);
        assert!(verdict.malformed);
        assert_eq!(verdict.winner, Speaker::A);
        assert_eq!(verdict.winner_name, "Scientist");
        assert_eq!(verdict.summary.chars().count(), MAX_RAW_SUMMARY_CHARS);
        assert!(verdict.summary.starts_with("The winner is clearly B."));

        let unknown = parse_verdict(
            "{\"summary\": \"s\", \"winner\": \"Nobody\", \"reason\": \"r\"}",
            &personas,
        );
        assert!(unknown.malformed);
    }

    #[test]
    fn judge_uses_zero_temperature_and_survives_failures() {
        let config = test_config();
        let prompts = PromptEngine::new();
        let turns = [turn(1, Speaker::A, "Scientist", "first")];

        let generator = ScriptedGenerator::new(vec![Scripted::Text(
            "{\"summary\": \"s\", \"winner\": \"B\", \"reason\": \"r\"}".to_string(),
        )]);
        let verdict = judge(&generator, &prompts, &config, "Topic", &turns, &[]);
        assert_eq!(verdict.winner, Speaker::B);
        assert!(verdict.coherence_flags.is_empty());
        assert_eq!(generator.requests()[0].temperature, 0.0);
        assert!(generator.requests()[0].user.contains("R1 Scientist: first"));

        let failing = ScriptedGenerator::new(vec![Scripted::Fail("timeout".to_string())]);
        let flags = [CoherenceFlag {
            round: 1,
            speaker: Speaker::A,
            kind: FlagKind::AgentFallbackUsed,
            details: "no valid candidate".to_string(),
        }];
        let verdict = judge(&failing, &prompts, &config, "Topic", &turns, &flags);
        assert!(verdict.malformed);
        assert_eq!(verdict.summary, "timeout");
        assert_eq!(verdict.coherence_flags, flags);
    }
}
