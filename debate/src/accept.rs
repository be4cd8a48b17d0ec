//! Acceptance review: content rules plus duplicate detection.
//!
//! A candidate passes when it has no reasons at all. Duplicates and templated
//! text are hard blocks: once the round's attempts are spent they are replaced
//! by a forced rewrite instead of being committed.

use anyhow::{Result, bail};
use tracing::debug;

use crate::core::candidate::CandidateContent;
use crate::core::fallback::rewrite_order;
use crate::core::normalize::repetition_key;
use crate::core::rules::{Observation, check_content};
use crate::core::similarity::{best_match, similarity};
use crate::core::types::{FlagKind, RejectionReason};
use crate::io::config::{DebateConfig, SimilarityConfig};
use crate::memory::MemoryStore;
use crate::produce::TurnRequest;

/// Outcome of reviewing one candidate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Review {
    pub reasons: Vec<RejectionReason>,
    pub observations: Vec<Observation>,
}

impl Review {
    pub fn passed(&self) -> bool {
        self.reasons.is_empty()
    }

    pub fn has_hard_block(&self) -> bool {
        self.reasons.iter().any(|r| r.is_hard_block())
    }

    fn reject(&mut self, reason: RejectionReason, details: String) {
        if !self.reasons.contains(&reason) {
            self.reasons.push(reason);
        }
        self.observations.push(Observation {
            kind: FlagKind::RepetitionDetected,
            details,
        });
    }
}

/// Re-apply the content rules and run the duplicate checks.
pub fn review(
    content: &CandidateContent,
    request: &TurnRequest<'_>,
    config: &DebateConfig,
) -> Review {
    let report = check_content(content, &request.rule_context(&config.rules));
    let mut review = Review {
        reasons: report.reasons,
        observations: report.observations,
    };
    check_duplicates(
        &repetition_key(content),
        request,
        &config.similarity,
        &mut review,
    );
    review
}

fn check_duplicates(
    key: &str,
    request: &TurnRequest<'_>,
    sim: &SimilarityConfig,
    review: &mut Review,
) {
    let memory: &MemoryStore = request.memory;
    let n = sim.ngram;

    let (own_rounds, own_keys): (Vec<u32>, Vec<&str>) =
        memory.repetition_keys_of(request.speaker).into_iter().unzip();
    match best_match(key, &own_keys, sim.same_speaker, n) {
        Some(hit) => review.reject(
            RejectionReason::DuplicateSameSpeaker,
            format!(
                "same-speaker similarity {:.2} with round {}",
                hit.score, own_rounds[hit.index]
            ),
        ),
        None => {
            if let Some(hit) = best_match(key, &own_keys, sim.repetition_watch, n) {
                review.observations.push(Observation {
                    kind: FlagKind::RepetitionDetected,
                    details: format!(
                        "watch: same-speaker similarity {:.2} with round {}",
                        hit.score, own_rounds[hit.index]
                    ),
                });
            }
        }
    }

    if let Some(hit) = best_match(key, memory.repetition_keys(), sim.cross_speaker, n) {
        review.reject(
            RejectionReason::DuplicateCrossSpeaker,
            format!("similarity {:.2} with round {}", hit.score, hit.index + 1),
        );
    }

    if let Some(last) = memory.last_repetition_key() {
        let score = similarity(key, last, n);
        if score >= sim.last_turn {
            review.reject(
                RejectionReason::DuplicateLastTurn,
                format!(
                    "similarity {score:.2} with previous round {}",
                    memory.len()
                ),
            );
        }
    }
}

/// Deterministic replacement for a hard-blocked candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct ForcedRewrite {
    pub content: CandidateContent,
    pub variant: usize,
    pub review: Review,
}

/// Walk the fallback variants and return the first that passes a full review.
///
/// Fails when no variant passes; a hard-blocked text is never committed.
pub fn forced_rewrite(request: &TurnRequest<'_>, config: &DebateConfig) -> Result<ForcedRewrite> {
    for variant in rewrite_order(request.round) {
        let content = request.fallback(config, variant);
        let review = review(&content, request, config);
        if review.passed() {
            debug!(variant, "forced rewrite variant accepted");
            return Ok(ForcedRewrite {
                content,
                variant,
                review,
            });
        }
    }
    bail!(
        "no forced rewrite variant passes review in round {}",
        request.round
    )
}
