//! JSONL event log: one line per debate state transition.
//!
//! The log is an audit artifact. The engine never reads it back.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::types::{CoherenceFlag, RejectionRecord, Speaker, Verdict};
use crate::memory::TurnView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    DebateStarted,
    RoundCommitted,
    Judged,
    Halted,
}

/// Debate state at the moment of an event. Collections are tails, not the
/// full history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub topic: String,
    /// Completed rounds.
    pub round_idx: u32,
    pub next_speaker: Speaker,
    pub status: &'static str,
    pub error: Option<String>,
    pub summary: String,
    pub coherence_flags: Vec<CoherenceFlag>,
    pub rejection_history: Vec<RejectionRecord>,
    pub turns_tail: Vec<TurnView>,
    pub verdict: Option<Verdict>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebateEvent {
    pub ts: String,
    pub debate_id: String,
    pub kind: EventKind,
    pub snapshot: Snapshot,
}

/// Receives every debate event. A failing sink halts the debate.
pub trait EventSink {
    fn emit(&mut self, event: &DebateEvent) -> Result<()>;
}

/// The event sink rejected a write; the debate cannot continue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkFailure {
    pub detail: String,
}

impl fmt::Display for SinkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event sink failure: {}", self.detail)
    }
}

impl std::error::Error for SinkFailure {}

/// Appends events as JSON lines, flushing after each one.
pub struct JsonlSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonlSink {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create log dir {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open event log {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for JsonlSink {
    fn emit(&mut self, event: &DebateEvent) -> Result<()> {
        let line = serde_json::to_string(event).context("serialize event")?;
        writeln!(self.writer, "{line}")
            .with_context(|| format!("append event to {}", self.path.display()))?;
        self.writer
            .flush()
            .with_context(|| format!("flush {}", self.path.display()))?;
        Ok(())
    }
}

/// Default log file name for a run started at `started`.
pub fn default_log_path(dir: &Path, started: chrono::DateTime<chrono::Local>) -> PathBuf {
    dir.join(format!("debate_log_{}.jsonl", started.format("%Y%m%d_%H%M%S")))
}
