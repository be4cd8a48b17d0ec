//! Test-only collaborators and builders for driving debates deterministically.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::path::PathBuf;

use anyhow::{Result, anyhow, bail};
use serde_json::json;
use tempfile::TempDir;

use crate::io::config::{DEFAULT_CONFIG_PATH, DebateConfig, write_config};
use crate::io::event_log::{DebateEvent, EventKind, EventSink};
use crate::io::generator::{CollaboratorUnavailable, GenerationRequest, Generator};

/// One scripted generator response.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Returned verbatim as the completion.
    Text(String),
    /// A soft generation failure.
    Fail(String),
    /// A fatal [`CollaboratorUnavailable`] failure.
    Unavailable,
}

/// Generator that replays scripted responses in order and records requests.
///
/// Once the script runs out it repeats `exhausted` (a soft failure by default).
pub struct ScriptedGenerator {
    script: RefCell<VecDeque<Scripted>>,
    exhausted: Scripted,
    requests: RefCell<Vec<GenerationRequest>>,
    calls: Cell<usize>,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: RefCell::new(script.into()),
            exhausted: Scripted::Fail("script exhausted".to_string()),
            requests: RefCell::new(Vec::new()),
            calls: Cell::new(0),
        }
    }

    /// Response used after the script is exhausted.
    pub fn then_always(mut self, response: Scripted) -> Self {
        self.exhausted = response;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.borrow().clone()
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.calls.set(self.calls.get() + 1);
        self.requests.borrow_mut().push(request.clone());
        let next = self
            .script
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| self.exhausted.clone());
        match next {
            Scripted::Text(text) => Ok(text),
            Scripted::Fail(message) => Err(anyhow!("{message}")),
            Scripted::Unavailable => Err(anyhow::Error::new(CollaboratorUnavailable {
                detail: "scripted outage".to_string(),
            })),
        }
    }
}

/// Sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub events: Vec<DebateEvent>,
}

impl MemorySink {
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.iter().map(|e| e.kind).collect()
    }
}

impl EventSink for MemorySink {
    fn emit(&mut self, event: &DebateEvent) -> Result<()> {
        self.events.push(event.clone());
        Ok(())
    }
}

/// Sink that accepts `accept` events and then fails every write.
#[derive(Debug, Default)]
pub struct FailingSink {
    pub accept: usize,
    pub written: usize,
}

impl FailingSink {
    pub fn after(accept: usize) -> Self {
        Self { accept, written: 0 }
    }
}

impl EventSink for FailingSink {
    fn emit(&mut self, _event: &DebateEvent) -> Result<()> {
        if self.written >= self.accept {
            bail!("disk full");
        }
        self.written += 1;
        Ok(())
    }
}

/// Default configuration with a generator command that is never spawned.
pub fn test_config() -> DebateConfig {
    let mut config = DebateConfig::default();
    config.generator.command = vec!["false".to_string()];
    config
}

/// Write `config` into a fresh temp directory; returns the directory guard
/// and the config path.
pub fn temp_config(config: &DebateConfig) -> Result<(TempDir, PathBuf)> {
    let dir = TempDir::new()?;
    let path = dir.path().join(DEFAULT_CONFIG_PATH);
    write_config(&path, config)?;
    Ok((dir, path))
}

/// JSON body of a structured turn.
pub fn structured_json(quote: &str, rebut: &str, new: &str, question: &str) -> String {
    json!({
        "quote": quote,
        "rebut": rebut,
        "new": new,
        "question": question,
    })
    .to_string()
}

/// JSON body of a verdict.
pub fn verdict_json(summary: &str, winner: &str, reason: &str) -> String {
    json!({
        "summary": summary,
        "winner": winner,
        "reason": reason,
    })
    .to_string()
}
