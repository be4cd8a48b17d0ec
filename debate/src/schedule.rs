//! Round scheduling: strict alternation over a fixed number of rounds.

use std::fmt;

use crate::core::types::{DebateStatus, Speaker};

/// Fatal breach of the turn protocol (out-of-turn call, round limit exceeded,
/// illegal phase transition, malformed commit).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolViolation {
    pub message: String,
}

impl ProtocolViolation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "protocol violation: {}", self.message)
    }
}

impl std::error::Error for ProtocolViolation {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scheduler {
    max_rounds: u32,
    completed: u32,
    next: Speaker,
    status: DebateStatus,
}

impl Scheduler {
    pub fn new(max_rounds: u32, starting: Speaker) -> Self {
        Self {
            max_rounds,
            completed: 0,
            next: starting,
            status: DebateStatus::Running,
        }
    }

    pub fn expected(&self) -> Speaker {
        self.next
    }

    /// Round number of the in-flight round (1-indexed).
    pub fn current_round(&self) -> u32 {
        self.completed + 1
    }

    pub fn completed_rounds(&self) -> u32 {
        self.completed
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    pub fn status(&self) -> &DebateStatus {
        &self.status
    }

    pub fn is_complete(&self) -> bool {
        self.completed >= self.max_rounds
    }

    /// Check that `speaker` may produce the next turn.
    pub fn ensure_turn(&self, speaker: Speaker) -> Result<(), ProtocolViolation> {
        if let DebateStatus::Error(message) = &self.status {
            return Err(ProtocolViolation::new(format!("debate halted: {message}")));
        }
        if self.is_complete() {
            return Err(ProtocolViolation::new(format!(
                "round limit of {} reached",
                self.max_rounds
            )));
        }
        if speaker != self.next {
            return Err(ProtocolViolation::new(format!(
                "speaker {speaker} called out of turn in round {}; expected {}",
                self.current_round(),
                self.next
            )));
        }
        Ok(())
    }

    /// Close the current round and hand the floor to the other speaker.
    pub fn advance(&mut self) {
        self.completed += 1;
        self.next = self.next.opponent();
    }

    /// Enter the terminal error state. The first error wins.
    pub fn halt(&mut self, message: impl Into<String>) {
        if !self.status.is_error() {
            self.status = DebateStatus::Error(message.into());
        }
    }

    pub fn finish(&mut self) {
        if !self.status.is_error() {
            self.status = DebateStatus::Complete;
        }
    }
}
