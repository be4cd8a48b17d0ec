//! Per-round protocol state machine.
//!
//! ```text
//! AwaitingGeneration -> Generated -> Validating -> Accepted
//!                                              \-> RetryRequested -> AwaitingGeneration
//!                                              \-> ForcedRewrite -> Accepted
//! ```

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    AwaitingGeneration,
    Generated,
    Validating,
    RetryRequested,
    ForcedRewrite,
    Accepted,
}

impl RoundPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            RoundPhase::AwaitingGeneration => "awaiting_generation",
            RoundPhase::Generated => "generated",
            RoundPhase::Validating => "validating",
            RoundPhase::RetryRequested => "retry_requested",
            RoundPhase::ForcedRewrite => "forced_rewrite",
            RoundPhase::Accepted => "accepted",
        }
    }
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether `from -> to` is a legal edge.
pub fn can_transition(from: RoundPhase, to: RoundPhase) -> bool {
    use RoundPhase::{
        Accepted, AwaitingGeneration, ForcedRewrite, Generated, RetryRequested, Validating,
    };
    matches!(
        (from, to),
        (AwaitingGeneration, Generated)
            | (Generated, Validating)
            | (Validating, Accepted)
            | (Validating, RetryRequested)
            | (Validating, ForcedRewrite)
            | (RetryRequested, AwaitingGeneration)
            | (ForcedRewrite, Accepted)
    )
}

/// Tracks the phase of the in-flight round and rejects illegal edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseTracker {
    phase: RoundPhase,
    history: Vec<RoundPhase>,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self {
            phase: RoundPhase::AwaitingGeneration,
            history: vec![RoundPhase::AwaitingGeneration],
        }
    }
}

impl PhaseTracker {
    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn history(&self) -> &[RoundPhase] {
        &self.history
    }

    pub fn advance(&mut self, to: RoundPhase) -> Result<(), String> {
        if !can_transition(self.phase, to) {
            return Err(format!("illegal round transition {} -> {}", self.phase, to));
        }
        self.phase = to;
        self.history.push(to);
        Ok(())
    }
}
