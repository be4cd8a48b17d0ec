//! Turn producer: prompt, generate, parse, validate, escalate.
//!
//! Attempts come out of the round's shared [`RetryContext`]. When every
//! remaining attempt fails, the producer returns a deterministic fallback so
//! the round always has a candidate.

use anyhow::Result;
use tracing::{debug, instrument, warn};

use crate::core::candidate::{CandidateContent, ParseFailure, parse_candidate};
use crate::core::escalate::escalate;
use crate::core::fallback::{FallbackInput, fallback_content};
use crate::core::rules::{ContentLimits, RuleContext, check_content};
use crate::core::types::{
    AuditTrail, FlagKind, Origin, PendingTurn, RejectionReason, RejectionRecord, RejectionStage,
    RetryContext, Speaker,
};
use crate::io::config::DebateConfig;
use crate::io::generator::{CollaboratorUnavailable, GenerationRequest, Generator};
use crate::io::prompt::{PromptEngine, RetryNotes, TurnPromptInputs};
use crate::memory::MemoryStore;

/// The round a turn is requested for.
#[derive(Debug, Clone, Copy)]
pub struct TurnRequest<'a> {
    pub topic: &'a str,
    pub keywords: &'a [String],
    pub speaker: Speaker,
    pub round: u32,
    pub memory: &'a MemoryStore,
}

impl<'a> TurnRequest<'a> {
    pub fn rule_context(&self, limits: &'a ContentLimits) -> RuleContext<'a> {
        RuleContext {
            round: self.round,
            opponent_last: self.memory.opponent_last_content(self.speaker),
            keywords: self.keywords,
            used_quotes: self.memory.used_quotes(),
            limits,
        }
    }

    /// Deterministic fallback content for this round.
    pub fn fallback(&self, config: &DebateConfig, variant: usize) -> CandidateContent {
        let quote_source = self
            .memory
            .opponent_last_content(self.speaker)
            .map(CandidateContent::own_words);
        fallback_content(
            &FallbackInput {
                topic: self.topic,
                persona: config.personas.get(self.speaker),
                shape: config.content_shape,
                quote_source: quote_source.as_deref(),
                used_quotes: self.memory.used_quotes(),
            },
            variant,
        )
    }
}

pub struct TurnProducer<'a, G> {
    config: &'a DebateConfig,
    generator: &'a G,
    prompts: &'a PromptEngine,
}

impl<'a, G: Generator> TurnProducer<'a, G> {
    pub fn new(config: &'a DebateConfig, generator: &'a G, prompts: &'a PromptEngine) -> Self {
        Self {
            config,
            generator,
            prompts,
        }
    }

    /// Produce a pending turn for `request`.
    ///
    /// Only a [`CollaboratorUnavailable`] generator error or a prompt
    /// rendering failure is returned as an error.
    #[instrument(skip_all, fields(round = request.round, speaker = %request.speaker))]
    pub fn produce(
        &self,
        request: &TurnRequest<'_>,
        retry: &mut RetryContext,
        audit: &mut AuditTrail,
    ) -> Result<PendingTurn> {
        let config = self.config;
        let persona = config.personas.get(request.speaker);
        let ctx = request.rule_context(&config.rules);

        while let Some(attempt) = retry.begin_attempt() {
            let sampling = &config.sampling;
            let temperature = escalate(
                sampling.base_temperature,
                sampling.temperature_step,
                attempt,
                sampling.temperature_cap,
            );
            let prompt = self.prompts.render_turn(&TurnPromptInputs {
                topic: request.topic,
                persona,
                opponent: config.personas.get(request.speaker.opponent()),
                shape: config.content_shape,
                round: request.round,
                max_rounds: config.max_rounds,
                limits: &config.rules,
                memory: request.memory.slice(request.speaker),
                retry: retry.last_rejected_text().map(|text| RetryNotes {
                    reasons: retry.last_reasons(),
                    rejected_text: text,
                }),
            })?;
            debug!(attempt, temperature, "requesting candidate");

            let generated = self.generator.generate(&GenerationRequest {
                system: prompt.system,
                user: prompt.user,
                temperature,
                max_tokens: sampling.max_tokens,
                seed: sampling.seed,
            });
            let raw = match generated {
                Ok(raw) => raw,
                Err(err) if err.downcast_ref::<CollaboratorUnavailable>().is_some() => {
                    return Err(err);
                }
                Err(err) => {
                    warn!(attempt, err = %format!("{err:#}"), "generation failed");
                    self.reject(
                        request,
                        attempt,
                        &[RejectionReason::GenerationFailed],
                        &format!("{err:#}"),
                        retry,
                        audit,
                    );
                    continue;
                }
            };

            let content = match parse_candidate(&raw, config.content_shape) {
                Ok(content) => content,
                Err(failure) => {
                    let reason = match &failure {
                        ParseFailure::NotJson(_) => RejectionReason::NonJson,
                        ParseFailure::SchemaMismatch(_) => RejectionReason::SchemaMismatch,
                    };
                    debug!(attempt, %reason, detail = %failure.detail(), "unparseable candidate");
                    self.reject(request, attempt, &[reason], raw.trim(), retry, audit);
                    continue;
                }
            };

            let report = check_content(&content, &ctx);
            if report.passed() {
                return Ok(PendingTurn::new(
                    request.speaker,
                    &persona.name,
                    content,
                    Origin::Generated {
                        attempt,
                        temperature,
                    },
                ));
            }
            debug!(attempt, reasons = ?report.reasons, "candidate failed content rules");
            for observation in &report.observations {
                if observation.kind == FlagKind::TopicDriftSuspected {
                    audit.flag(
                        request.round,
                        request.speaker,
                        observation.kind,
                        format!("attempt {attempt}: {}", observation.details),
                    );
                }
            }
            self.reject(
                request,
                attempt,
                &report.reasons,
                &content.render(),
                retry,
                audit,
            );
        }

        let variant = request.round.saturating_sub(1) as usize;
        warn!(variant, attempts = retry.attempts(), "attempts exhausted, using fallback turn");
        audit.flag(
            request.round,
            request.speaker,
            FlagKind::AgentFallbackUsed,
            format!(
                "no valid candidate after {} attempts; last reasons: {}",
                retry.attempts(),
                join_reasons(retry.last_reasons())
            ),
        );
        Ok(PendingTurn::new(
            request.speaker,
            &persona.name,
            request.fallback(config, variant),
            Origin::Fallback,
        ))
    }

    fn reject(
        &self,
        request: &TurnRequest<'_>,
        attempt: u32,
        reasons: &[RejectionReason],
        text: &str,
        retry: &mut RetryContext,
        audit: &mut AuditTrail,
    ) {
        retry.record_rejection(reasons, text);
        audit.reject(RejectionRecord {
            round: request.round,
            speaker: request.speaker,
            attempt,
            stage: RejectionStage::Producer,
            reasons: reasons.to_vec(),
            text: text.to_string(),
        });
    }
}

pub(crate) fn join_reasons(reasons: &[RejectionReason]) -> String {
    reasons
        .iter()
        .map(|r| r.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
