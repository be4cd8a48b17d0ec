//! Debate-level lifecycle tests.
//!
//! These tests drive `Debate` with scripted generators and in-memory sinks to
//! verify end-to-end behavior: retries with feedback, forced rewrites, protocol
//! violations, fatal collaborator and sink failures, and the judged outcome.

use std::collections::BTreeSet;
use std::fs;

use debate::core::candidate::{CandidateContent, ContentShape, QUOTE_SENTINEL};
use debate::core::fallback::MAX_ROUNDS;
use debate::core::normalize::repetition_key;
use debate::core::similarity::similarity;
use debate::core::types::{FlagKind, RejectionReason, RejectionStage, Speaker, Topic, Turn};
use debate::debate::Debate;
use debate::io::config::DebateConfig;
use debate::io::event_log::{EventKind, JsonlSink, SinkFailure};
use debate::io::generator::CollaboratorUnavailable;
use debate::schedule::ProtocolViolation;
use debate::test_support::{
    FailingSink, MemorySink, Scripted, ScriptedGenerator, structured_json, test_config,
    verdict_json,
};
use serde_json::{Value, json};

const MARS: &str = "Should nations fund crewed missions to Mars?";

const A_REBUT: &str =
    "Crewed missions to Mars cost far more than robotic probes that return comparable science.";
const A_NEW: &str =
    "Radiation exposure on a multi-year crewed mission remains an unsolved medical problem today.";
const A_QUESTION: &str = "What shielding technology would you trust with a crew?";

const B_REBUT: &str =
    "Cost comparisons ignore that crewed missions answer questions no probe can improvise around.";
const B_NEW: &str =
    "National prestige from crewed missions has historically pulled students into engineering careers.";
const B_QUESTION: &str = "Is inspiring a generation worth nothing in your accounting?";

const LONG_QUESTION: &str =
    "Would you still fund crewed missions to Mars if each launch cost ten times more than probes?";

fn topic() -> Topic {
    Topic::parse(MARS).expect("topic")
}

fn opening() -> Scripted {
    Scripted::Text(structured_json(QUOTE_SENTINEL, A_REBUT, A_NEW, A_QUESTION))
}

fn reply() -> Scripted {
    Scripted::Text(structured_json(A_REBUT, B_REBUT, B_NEW, B_QUESTION))
}

fn garbage() -> Scripted {
    Scripted::Text("not json".to_string())
}

/// Round 1 with a quoted opener: the producer rejects it, feeds the reason
/// back, and accepts the corrected candidate at an escalated temperature.
#[test]
fn round_one_quote_is_retried_with_feedback() {
    let config = test_config();
    let generator = ScriptedGenerator::new(vec![
        Scripted::Text(structured_json(
            "Mars is far away.",
            A_REBUT,
            A_NEW,
            A_QUESTION,
        )),
        opening(),
    ]);
    let mut sink = MemorySink::default();
    let mut debate = Debate::new(&config, topic(), &generator, &mut sink);

    let turn = debate.play_round(Speaker::A).expect("round 1");
    assert_eq!(turn.round, 1);
    assert_eq!(turn.content.quote(), Some(QUOTE_SENTINEL));
    assert_eq!(turn.meta["attempts"], json!(2));
    assert_eq!(turn.meta["resolution"], json!("accepted"));
    assert_eq!(turn.meta["origin"]["kind"], json!("generated"));

    let history = debate.audit().rejection_history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].stage, RejectionStage::Producer);
    assert_eq!(history[0].attempt, 0);
    assert_eq!(
        history[0].reasons,
        vec![RejectionReason::QuoteMustBeNoneRound1]
    );

    let requests = generator.requests();
    assert_eq!(requests.len(), 2);
    assert!((requests[0].temperature - 0.2).abs() < 1e-9);
    assert!((requests[1].temperature - 0.35).abs() < 1e-9);
    assert!(
        requests[1]
            .user
            .contains("rejected for: quote_must_be_none_round1")
    );
    assert_eq!(debate.expected_speaker(), Speaker::B);
    assert_eq!(sink.kinds(), vec![EventKind::RoundCommitted]);
}

/// Round 3 restates round 1 on every attempt: once the retries are spent the
/// validator substitutes a forced rewrite that passes every check.
#[test]
fn repeated_duplicate_is_replaced_by_forced_rewrite() {
    let config = test_config();
    assert_eq!(config.max_retries, 2);
    let restated = structured_json(
        B_REBUT,
        &format!("In round 3, {A_REBUT}"),
        A_NEW,
        A_QUESTION,
    );
    let generator = ScriptedGenerator::new(vec![
        opening(),
        reply(),
        Scripted::Text(restated.clone()),
        Scripted::Text(restated.clone()),
        Scripted::Text(restated),
    ]);
    let mut sink = MemorySink::default();
    let mut debate = Debate::new(&config, topic(), &generator, &mut sink);

    debate.play_round(Speaker::A).expect("round 1");
    debate.play_round(Speaker::B).expect("round 2");
    let turn = debate.play_round(Speaker::A).expect("round 3").clone();

    assert_eq!(generator.calls(), 5);
    assert_eq!(turn.round, 3);
    assert_eq!(turn.meta["resolution"], json!("forced_rewrite"));
    assert_eq!(turn.meta["origin"]["kind"], json!("forced_rewrite"));
    assert_eq!(turn.meta["attempts"], json!(3));

    let quote = turn.content.quoted_text().expect("quote");
    assert!(debate.turns()[1].content.own_words().contains(quote));
    let key = repetition_key(&turn.content);
    let opening_key = repetition_key(&debate.turns()[0].content);
    assert!(similarity(&key, &opening_key, 4) < config.similarity.same_speaker);

    let acceptance: Vec<_> = debate
        .audit()
        .rejection_history()
        .iter()
        .filter(|r| r.round == 3 && r.stage == RejectionStage::Acceptance)
        .collect();
    assert_eq!(acceptance.len(), 3);
    assert!(
        acceptance
            .iter()
            .all(|r| r.reasons.contains(&RejectionReason::DuplicateSameSpeaker))
    );
    assert_eq!(
        acceptance.iter().map(|r| r.attempt).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );

    let flags = debate.audit().coherence_flags();
    assert!(
        flags
            .iter()
            .any(|f| f.round == 3 && f.kind == FlagKind::RetryExhaustedForcedRewrite)
    );
    assert!(
        flags
            .iter()
            .any(|f| f.round == 3 && f.kind == FlagKind::RepetitionDetected)
    );
}

/// Calling B while A is expected is a fatal protocol violation and appends
/// nothing.
#[test]
fn out_of_turn_speaker_is_a_protocol_violation() {
    let config = test_config();
    let generator = ScriptedGenerator::new(vec![opening()]);
    let mut sink = MemorySink::default();
    let mut debate = Debate::new(&config, topic(), &generator, &mut sink);

    let err = debate.play_round(Speaker::B).expect_err("out of turn");
    assert!(err.downcast_ref::<ProtocolViolation>().is_some());
    assert!(err.to_string().contains("out of turn"));
    assert!(debate.turns().is_empty());
    assert!(debate.status().is_error());
    assert_eq!(generator.calls(), 0);
    assert!(debate.run().is_err());

    let halted = sink.events.last().expect("halted event");
    assert_eq!(halted.kind, EventKind::Halted);
    assert_eq!(halted.snapshot.status, "error");
    assert!(
        halted
            .snapshot
            .error
            .as_deref()
            .is_some_and(|e| e.contains("out of turn"))
    );
}

/// A generator that never produces JSON still yields a full 8-round debate
/// that honors every turn invariant, and a malformed verdict defaults to A.
#[test]
fn unusable_generator_still_completes_a_valid_debate() {
    let config = test_config();
    let generator = ScriptedGenerator::new(Vec::new()).then_always(garbage());
    let mut sink = MemorySink::default();
    let mut debate = Debate::new(&config, topic(), &generator, &mut sink);

    let verdict = debate.run().expect("run");
    assert!(verdict.malformed);
    assert_eq!(verdict.winner, Speaker::A);
    assert_eq!(verdict.winner_name, "Scientist");
    assert_eq!(verdict.summary, "not json");
    assert_eq!(generator.calls(), 8 * 3 + 1);

    let turns = debate.turns();
    assert_eq!(turns.len(), 8);
    assert_turn_invariants(turns, &config);

    let fallbacks = debate
        .audit()
        .coherence_flags()
        .iter()
        .filter(|f| f.kind == FlagKind::AgentFallbackUsed)
        .count();
    assert_eq!(fallbacks, 8);

    let mut kinds = vec![EventKind::DebateStarted];
    kinds.extend([EventKind::RoundCommitted; 8]);
    kinds.push(EventKind::Judged);
    assert_eq!(sink.kinds(), kinds);
    let last = sink.events.last().expect("judged event");
    assert_eq!(last.snapshot.status, "complete");
    assert_eq!(last.snapshot.round_idx, 8);
    assert_eq!(last.snapshot.turns_tail.len(), 2);
    assert!(last.snapshot.verdict.as_ref().is_some_and(|v| v.malformed));
}

/// The longest allowed debate against an unusable generator never reuses a
/// quote and never needs more than the fallback turn.
#[test]
fn longest_fallback_debate_keeps_every_invariant() {
    let mut config = test_config();
    config.max_rounds = MAX_ROUNDS;
    config.validate().expect("longest debate is a valid config");
    let generator = ScriptedGenerator::new(Vec::new()).then_always(garbage());
    let mut sink = MemorySink::default();
    let mut debate = Debate::new(&config, topic(), &generator, &mut sink);

    debate.run().expect("run");
    let turns = debate.turns();
    assert_eq!(turns.len(), MAX_ROUNDS as usize);
    assert_turn_invariants(turns, &config);
    assert!(
        turns
            .iter()
            .all(|t| t.meta["resolution"] == json!("accepted"))
    );
    assert!(debate.audit().coherence_flags().iter().all(|f| !matches!(
        f.kind,
        FlagKind::RetryExhaustedAccepted | FlagKind::RetryExhaustedForcedRewrite
    )));
}

/// An opponent who repeats one sentence that was already quoted leaves the
/// fallback nothing fresh to quote. Once the attempts are spent the soft
/// violation is accepted and flagged instead of rewritten.
#[test]
fn soft_violation_is_accepted_after_attempts_run_out() {
    let config = test_config();
    let generator = ScriptedGenerator::new(vec![
        Scripted::Text(structured_json(QUOTE_SENTINEL, A_REBUT, A_NEW, LONG_QUESTION)),
        Scripted::Text(structured_json(
            LONG_QUESTION,
            LONG_QUESTION,
            LONG_QUESTION,
            LONG_QUESTION,
        )),
    ])
    .then_always(garbage());
    let mut sink = MemorySink::default();
    let mut debate = Debate::new(&config, topic(), &generator, &mut sink);

    debate.play_round(Speaker::A).expect("round 1");
    debate.play_round(Speaker::B).expect("round 2");
    let turn = debate.play_round(Speaker::A).expect("round 3").clone();

    assert_eq!(generator.calls(), 2 + 3);
    assert_eq!(turn.meta["resolution"], json!("exhausted_accepted"));
    assert_eq!(turn.meta["origin"]["kind"], json!("fallback"));
    assert_eq!(turn.meta["attempts"], json!(3));
    assert_eq!(turn.content.quoted_text(), Some(LONG_QUESTION));

    let acceptance: Vec<_> = debate
        .audit()
        .rejection_history()
        .iter()
        .filter(|r| r.stage == RejectionStage::Acceptance)
        .collect();
    assert_eq!(acceptance.len(), 1);
    assert_eq!(acceptance[0].round, 3);
    assert_eq!(acceptance[0].attempt, 2);
    assert_eq!(acceptance[0].reasons, vec![RejectionReason::RepeatedQuote]);

    let flags = debate.audit().coherence_flags();
    assert!(flags.iter().any(|f| f.round == 3
        && f.kind == FlagKind::RetryExhaustedAccepted
        && f.details == "accepted despite repeated_quote"));
    assert!(
        flags
            .iter()
            .any(|f| f.round == 3 && f.kind == FlagKind::AgentFallbackUsed)
    );
    assert!(
        !flags
            .iter()
            .any(|f| f.kind == FlagKind::RetryExhaustedForcedRewrite)
    );
}

/// The judge's response decides the winner when it parses.
#[test]
fn judged_winner_comes_from_judge_response() {
    let mut config = test_config();
    config.max_rounds = 2;
    let generator = ScriptedGenerator::new(vec![
        opening(),
        reply(),
        Scripted::Text(verdict_json(
            "B answered the cost case.",
            "Philosopher",
            "Stronger rebuttal.",
        )),
    ]);
    let mut sink = MemorySink::default();
    let mut debate = Debate::new(&config, topic(), &generator, &mut sink);

    let verdict = debate.run().expect("run");
    assert!(!verdict.malformed);
    assert_eq!(verdict.winner, Speaker::B);
    assert_eq!(verdict.reason, "Stronger rebuttal.");
    assert_eq!(generator.requests()[2].temperature, 0.0);
    assert!(generator.requests()[2].user.contains("R2 Philosopher: QUOTE:"));
    assert_eq!(debate.verdict(), Some(&verdict));
}

/// Judging before the last round is rejected.
#[test]
fn early_judgment_is_a_protocol_violation() {
    let config = test_config();
    let generator = ScriptedGenerator::new(vec![opening()]);
    let mut sink = MemorySink::default();
    let mut debate = Debate::new(&config, topic(), &generator, &mut sink);

    debate.play_round(Speaker::A).expect("round 1");
    let err = debate.conclude().expect_err("early judgment");
    assert!(err.downcast_ref::<ProtocolViolation>().is_some());
    assert_eq!(generator.calls(), 1);
    assert!(debate.verdict().is_none());
}

/// An unreachable generator halts the debate with nothing appended.
#[test]
fn unavailable_generator_halts_the_debate() {
    let config = test_config();
    let generator = ScriptedGenerator::new(vec![Scripted::Unavailable]);
    let mut sink = MemorySink::default();
    let mut debate = Debate::new(&config, topic(), &generator, &mut sink);

    let err = debate.run().expect_err("unavailable");
    assert!(err.downcast_ref::<CollaboratorUnavailable>().is_some());
    assert!(debate.turns().is_empty());
    assert!(debate.status().is_error());
    assert_eq!(generator.calls(), 1);
    assert_eq!(sink.kinds(), vec![EventKind::DebateStarted, EventKind::Halted]);
}

/// A failing sink is fatal; the turn committed before the failure is kept.
#[test]
fn sink_failure_halts_the_debate() {
    let config = test_config();
    let generator = ScriptedGenerator::new(vec![opening(), reply()]);
    let mut sink = FailingSink::after(1);
    let mut debate = Debate::new(&config, topic(), &generator, &mut sink);

    let err = debate.run().expect_err("sink failure");
    assert!(err.downcast_ref::<SinkFailure>().is_some());
    assert!(err.to_string().contains("disk full"));
    assert_eq!(debate.turns().len(), 1);
    assert!(debate.status().is_error());
    assert_eq!(generator.calls(), 1);
    drop(debate);
    assert_eq!(sink.written, 1);
}

/// Paragraph debates commit single-argument turns without quotes.
#[test]
fn paragraph_shape_commits_arguments() {
    let mut config = test_config();
    config.content_shape = ContentShape::Paragraph;
    config.max_rounds = 2;
    let generator = ScriptedGenerator::new(Vec::new()).then_always(garbage());
    let mut sink = MemorySink::default();
    let mut debate = Debate::new(&config, topic(), &generator, &mut sink);

    debate.run().expect("run");
    for turn in debate.turns() {
        assert!(matches!(turn.content, CandidateContent::Paragraph(_)));
        assert!(!turn.text.starts_with("QUOTE:"));
        assert!(turn.text.chars().count() >= config.rules.min_argument_chars);
    }
}

/// The JSONL sink writes one parseable event per line.
#[test]
fn jsonl_log_records_every_event() {
    let mut config = test_config();
    config.max_rounds = 2;
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("logs").join("debate.jsonl");
    let generator = ScriptedGenerator::new(vec![opening(), reply()]).then_always(garbage());
    let mut sink = JsonlSink::create(&path).expect("sink");
    let debate_id = {
        let mut debate = Debate::new(&config, topic(), &generator, &mut sink);
        debate.run().expect("run");
        debate.debate_id().to_string()
    };

    let raw = fs::read_to_string(&path).expect("read log");
    let events: Vec<Value> = raw
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect();
    let kinds: Vec<&str> = events
        .iter()
        .map(|e| e["kind"].as_str().expect("kind"))
        .collect();
    assert_eq!(
        kinds,
        vec!["debate_started", "round_committed", "round_committed", "judged"]
    );
    assert!(events.iter().all(|e| e["debate_id"] == json!(debate_id)));
    assert_eq!(events[1]["snapshot"]["next_speaker"], json!("B"));
    assert_eq!(events[1]["snapshot"]["turns_tail"][0]["agent_name"], json!("Scientist"));
    assert_eq!(events[3]["snapshot"]["verdict"]["winner_name"], json!("Scientist"));
}

/// Alternation, quote provenance and duplicate thresholds over a transcript.
fn assert_turn_invariants(turns: &[Turn], config: &DebateConfig) {
    let mut quotes = BTreeSet::new();
    for (idx, turn) in turns.iter().enumerate() {
        assert_eq!(turn.round, idx as u32 + 1);
        let expected = if idx % 2 == 0 { Speaker::A } else { Speaker::B };
        assert_eq!(turn.speaker, expected);
        assert!(turn.meta["attempts"].as_u64().is_some_and(|a| a <= 3));

        if idx == 0 {
            assert_eq!(turn.content.quote(), Some(QUOTE_SENTINEL));
        } else {
            let quote = turn.content.quoted_text().expect("quote after round 1");
            assert!(turns[idx - 1].content.own_words().contains(quote));
            assert!(
                quotes.insert(quote.to_string()),
                "round {}: quote reused: {quote}",
                turn.round
            );
        }

        let key = repetition_key(&turn.content);
        for earlier in &turns[..idx] {
            let score = similarity(&key, &repetition_key(&earlier.content), 4);
            let pair = format!("round {} vs {}", turn.round, earlier.round);
            assert!(score < config.similarity.cross_speaker, "{pair}");
            if earlier.speaker == turn.speaker {
                assert!(score < config.similarity.same_speaker, "{pair}");
            }
        }
        if idx > 0 {
            let previous = repetition_key(&turns[idx - 1].content);
            assert!(similarity(&key, &previous, 4) < config.similarity.last_turn);
        }
    }
}
