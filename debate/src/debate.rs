//! Debate orchestration.
//!
//! A [`Debate`] owns all state of one run: scheduler, memory, audit trail and
//! the in-flight round's retry context. Each round runs the producer and the
//! acceptance review in a loop until a turn is committed, then emits a
//! `round_committed` event. Fatal errors put the debate in the terminal error
//! state; committed turns are kept.

use std::collections::BTreeMap;

use anyhow::{Result, anyhow};
use chrono::{SecondsFormat, Utc};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};

use crate::accept::{self, Review};
use crate::core::phase::{PhaseTracker, RoundPhase};
use crate::core::rules::topic_keywords;
use crate::core::types::{
    AuditTrail, DebateStatus, FlagKind, Origin, PendingTurn, RejectionRecord, RejectionStage,
    Resolution, RetryContext, Speaker, Topic, Turn, Verdict,
};
use crate::io::config::DebateConfig;
use crate::io::event_log::{DebateEvent, EventKind, EventSink, SinkFailure, Snapshot};
use crate::io::generator::Generator;
use crate::io::prompt::PromptEngine;
use crate::judgment;
use crate::memory::{MemoryStore, TurnView};
use crate::produce::{TurnProducer, TurnRequest, join_reasons};
use crate::schedule::{ProtocolViolation, Scheduler};

/// Entries of each audit list carried in an event snapshot.
const SNAPSHOT_AUDIT_TAIL: usize = 5;
/// Turns carried in an event snapshot.
const SNAPSHOT_TURNS_TAIL: usize = 2;

pub struct Debate<'a, G, S> {
    config: &'a DebateConfig,
    generator: &'a G,
    sink: &'a mut S,
    prompts: PromptEngine,
    debate_id: String,
    topic: Topic,
    keywords: Vec<String>,
    scheduler: Scheduler,
    memory: MemoryStore,
    audit: AuditTrail,
    retry: RetryContext,
    verdict: Option<Verdict>,
    started: bool,
}

impl<'a, G: Generator, S: EventSink> Debate<'a, G, S> {
    pub fn new(config: &'a DebateConfig, topic: Topic, generator: &'a G, sink: &'a mut S) -> Self {
        let started_at = Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true);
        Self {
            config,
            generator,
            sink,
            prompts: PromptEngine::new(),
            debate_id: debate_id(topic.as_str(), &started_at),
            keywords: topic_keywords(topic.as_str(), config.rules.keyword_cap),
            scheduler: Scheduler::new(config.max_rounds, config.starting_speaker),
            memory: MemoryStore::new(topic.as_str(), config.summary_chars, config.recent_turns),
            audit: AuditTrail::default(),
            retry: RetryContext::new(config.max_retries),
            verdict: None,
            started: false,
            topic,
        }
    }

    pub fn debate_id(&self) -> &str {
        &self.debate_id
    }

    pub fn turns(&self) -> &[Turn] {
        self.memory.turns()
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    pub fn status(&self) -> &DebateStatus {
        self.scheduler.status()
    }

    pub fn verdict(&self) -> Option<&Verdict> {
        self.verdict.as_ref()
    }

    pub fn expected_speaker(&self) -> Speaker {
        self.scheduler.expected()
    }

    pub fn is_complete(&self) -> bool {
        self.scheduler.is_complete()
    }

    /// Play every remaining round, then judge the transcript.
    #[instrument(skip_all, fields(debate_id = %self.debate_id, rounds = self.config.max_rounds))]
    pub fn run(&mut self) -> Result<Verdict> {
        self.start()?;
        while !self.scheduler.is_complete() {
            let speaker = self.scheduler.expected();
            self.play_round(speaker)?;
        }
        self.conclude()
    }

    /// Record the `debate_started` event. Idempotent.
    pub fn start(&mut self) -> Result<()> {
        if let DebateStatus::Error(message) = self.scheduler.status() {
            return Err(ProtocolViolation::new(format!("debate halted: {message}")).into());
        }
        if self.started {
            return Ok(());
        }
        self.started = true;
        info!(topic = %self.topic, keywords = ?self.keywords, "debate started");
        self.emit(EventKind::DebateStarted)
            .map_err(|err| self.fail(err))
    }

    /// Judge the finished transcript and close the debate.
    pub fn conclude(&mut self) -> Result<Verdict> {
        if let Some(verdict) = &self.verdict {
            return Ok(verdict.clone());
        }
        if !self.scheduler.is_complete() || self.scheduler.status().is_error() {
            let err = ProtocolViolation::new(format!(
                "judgment requested after {} of {} rounds",
                self.scheduler.completed_rounds(),
                self.scheduler.max_rounds()
            ));
            return Err(self.fail(err.into()));
        }

        let verdict = judgment::judge(
            self.generator,
            &self.prompts,
            self.config,
            self.topic.as_str(),
            self.memory.turns(),
            self.audit.coherence_flags(),
        );
        info!(winner = %verdict.winner_name, malformed = verdict.malformed, "debate judged");
        self.verdict = Some(verdict.clone());
        self.scheduler.finish();
        self.emit(EventKind::Judged).map_err(|err| self.fail(err))?;
        Ok(verdict)
    }

    /// Play one round for `speaker`, who must be the expected speaker.
    pub fn play_round(&mut self, speaker: Speaker) -> Result<&Turn> {
        if let Err(err) = self.play_round_inner(speaker) {
            return Err(self.fail(err));
        }
        self.memory
            .last_turn()
            .ok_or_else(|| anyhow!("round committed but transcript is empty"))
    }

    #[instrument(skip_all, fields(round = self.scheduler.current_round(), speaker = %speaker))]
    fn play_round_inner(&mut self, speaker: Speaker) -> Result<()> {
        self.scheduler.ensure_turn(speaker)?;
        let round = self.scheduler.current_round();
        if round != self.memory.next_round() {
            return Err(ProtocolViolation::new(format!(
                "scheduler round {round} does not match transcript round {}",
                self.memory.next_round()
            ))
            .into());
        }

        let config = self.config;
        self.retry.reset();
        let mut phase = PhaseTracker::default();
        let producer = TurnProducer::new(config, self.generator, &self.prompts);
        let request = TurnRequest {
            topic: self.topic.as_str(),
            keywords: &self.keywords,
            speaker,
            round,
            memory: &self.memory,
        };

        let (pending, resolution, review) = loop {
            let pending = producer.produce(&request, &mut self.retry, &mut self.audit)?;
            step(&mut phase, RoundPhase::Generated)?;
            step(&mut phase, RoundPhase::Validating)?;

            let review = accept::review(&pending.content, &request, config);
            if review.passed() {
                step(&mut phase, RoundPhase::Accepted)?;
                break (pending, Resolution::Accepted, review);
            }

            self.audit.reject(RejectionRecord {
                round,
                speaker,
                attempt: self.retry.attempts().saturating_sub(1),
                stage: RejectionStage::Acceptance,
                reasons: review.reasons.clone(),
                text: pending.text.clone(),
            });

            if self.retry.has_remaining() {
                record_repetition(&mut self.audit, round, speaker, &review);
                self.retry.record_rejection(&review.reasons, &pending.text);
                step(&mut phase, RoundPhase::RetryRequested)?;
                step(&mut phase, RoundPhase::AwaitingGeneration)?;
                continue;
            }

            if review.has_hard_block() {
                record_repetition(&mut self.audit, round, speaker, &review);
                step(&mut phase, RoundPhase::ForcedRewrite)?;
                let rewrite = accept::forced_rewrite(&request, config)?;
                warn!(
                    variant = rewrite.variant,
                    reasons = ?review.reasons,
                    "retries exhausted, forced rewrite"
                );
                self.audit.flag(
                    round,
                    speaker,
                    FlagKind::RetryExhaustedForcedRewrite,
                    format!(
                        "replaced candidate rejected for {} with variant {}",
                        join_reasons(&review.reasons),
                        rewrite.variant
                    ),
                );
                step(&mut phase, RoundPhase::Accepted)?;
                let pending = PendingTurn::new(
                    speaker,
                    &pending.agent_name,
                    rewrite.content,
                    Origin::ForcedRewrite {
                        variant: rewrite.variant,
                    },
                );
                break (pending, Resolution::ForcedRewrite, rewrite.review);
            }

            warn!(reasons = ?review.reasons, "retries exhausted, accepting candidate as-is");
            self.audit.flag(
                round,
                speaker,
                FlagKind::RetryExhaustedAccepted,
                format!("accepted despite {}", join_reasons(&review.reasons)),
            );
            step(&mut phase, RoundPhase::Accepted)?;
            break (pending, Resolution::ExhaustedAccepted, review);
        };

        for observation in review.observations {
            self.audit
                .flag(round, speaker, observation.kind, observation.details);
        }
        let meta = turn_meta(&pending.origin, resolution, self.retry.attempts());
        let turn = self.memory.commit(pending, speaker, meta)?;
        info!(
            round = turn.round,
            speaker = %turn.speaker,
            resolution = resolution.as_str(),
            "turn committed"
        );

        self.scheduler.advance();
        self.retry.reset();
        self.emit(EventKind::RoundCommitted)
    }

    fn emit(&mut self, kind: EventKind) -> Result<()> {
        let event = DebateEvent {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            debate_id: self.debate_id.clone(),
            kind,
            snapshot: self.snapshot(),
        };
        self.sink.emit(&event).map_err(|err| {
            anyhow::Error::new(SinkFailure {
                detail: format!("{err:#}"),
            })
        })
    }

    fn snapshot(&self) -> Snapshot {
        let (status, error) = match self.scheduler.status() {
            DebateStatus::Running => ("running", None),
            DebateStatus::Complete => ("complete", None),
            DebateStatus::Error(message) => ("error", Some(message.clone())),
        };
        let turns = self.memory.turns();
        Snapshot {
            topic: self.topic.to_string(),
            round_idx: self.scheduler.completed_rounds(),
            next_speaker: self.scheduler.expected(),
            status,
            error,
            summary: self.memory.summary().to_string(),
            coherence_flags: self.audit.flags_tail(SNAPSHOT_AUDIT_TAIL).to_vec(),
            rejection_history: self.audit.rejections_tail(SNAPSHOT_AUDIT_TAIL).to_vec(),
            turns_tail: turns[turns.len().saturating_sub(SNAPSHOT_TURNS_TAIL)..]
                .iter()
                .map(TurnView::from)
                .collect(),
            verdict: self.verdict.clone(),
        }
    }

    /// Enter the terminal error state and report it to the sink.
    fn fail(&mut self, err: anyhow::Error) -> anyhow::Error {
        warn!(err = %format!("{err:#}"), "debate halted");
        self.scheduler.halt(format!("{err:#}"));
        if err.downcast_ref::<SinkFailure>().is_none()
            && let Err(emit_err) = self.emit(EventKind::Halted)
        {
            warn!(err = %format!("{emit_err:#}"), "failed to record halt event");
        }
        err
    }
}

fn step(tracker: &mut PhaseTracker, to: RoundPhase) -> Result<()> {
    tracker
        .advance(to)
        .map_err(|message| ProtocolViolation::new(message).into())
}

fn record_repetition(audit: &mut AuditTrail, round: u32, speaker: Speaker, review: &Review) {
    for observation in &review.observations {
        if observation.kind == FlagKind::RepetitionDetected {
            audit.flag(round, speaker, observation.kind, observation.details.clone());
        }
    }
}

fn turn_meta(origin: &Origin, resolution: Resolution, attempts: u32) -> BTreeMap<String, Value> {
    let mut meta = BTreeMap::new();
    meta.insert("attempts".to_string(), json!(attempts));
    meta.insert("resolution".to_string(), json!(resolution.as_str()));
    meta.insert(
        "origin".to_string(),
        serde_json::to_value(origin).unwrap_or(Value::Null),
    );
    if let Origin::Generated { temperature, .. } = origin {
        meta.insert("temperature".to_string(), json!(temperature));
    }
    meta
}

/// Short stable identifier for a debate started at `started_at`.
pub fn debate_id(topic: &str, started_at: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(topic.as_bytes());
    hasher.update(b"\n");
    hasher.update(started_at.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..6])
}
