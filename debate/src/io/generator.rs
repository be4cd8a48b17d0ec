//! Text generation collaborator.
//!
//! The protocol only sees the [`Generator`] trait. [`CommandGenerator`] is the
//! production implementation: it pipes the prompt into a configured command
//! (a local model runner by default) and returns its stdout.

use std::fmt;
use std::process::Command;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::io::config::GeneratorConfig;
use crate::io::process::{SpawnFailure, run_command_with_timeout};

/// One generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system: String,
    pub user: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub seed: Option<u64>,
}

impl GenerationRequest {
    /// Single prompt text for collaborators without a separate system channel.
    pub fn prompt(&self) -> String {
        format!("{}\n\n{}\n", self.system.trim_end(), self.user.trim_end())
    }
}

/// Produces raw text for a request.
///
/// Errors are treated as a failed attempt unless they carry
/// [`CollaboratorUnavailable`].
pub trait Generator {
    fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

/// The generator cannot be reached at all; the debate cannot continue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollaboratorUnavailable {
    pub detail: String,
}

impl fmt::Display for CollaboratorUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "generator unavailable: {}", self.detail)
    }
}

impl std::error::Error for CollaboratorUnavailable {}

/// Runs a command per request, writing the prompt to stdin.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandGenerator {
    pub fn from_config(config: &GeneratorConfig) -> Result<Self> {
        if config.command.is_empty() {
            return Err(anyhow!("generator.command must be a non-empty array"));
        }
        Ok(Self {
            command: config.command.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
        })
    }

    fn build_command(&self, request: &GenerationRequest) -> Command {
        let args: Vec<String> = self
            .command
            .iter()
            .map(|arg| substitute(arg, request))
            .collect();
        let mut cmd = Command::new(&args[0]);
        cmd.args(&args[1..])
            .env("DEBATE_TEMPERATURE", format!("{:.2}", request.temperature))
            .env("DEBATE_MAX_TOKENS", request.max_tokens.to_string());
        if let Some(seed) = request.seed {
            cmd.env("DEBATE_SEED", seed.to_string());
        }
        cmd
    }
}

fn substitute(arg: &str, request: &GenerationRequest) -> String {
    let seed = request.seed.map(|s| s.to_string()).unwrap_or_default();
    arg.replace("{temperature}", &format!("{:.2}", request.temperature))
        .replace("{max_tokens}", &request.max_tokens.to_string())
        .replace("{seed}", &seed)
}

/// Only a command that cannot be started is fatal. I/O failures after spawn
/// are soft generation failures.
fn classify_run_error(program: &str, err: anyhow::Error) -> anyhow::Error {
    if err.downcast_ref::<SpawnFailure>().is_none() {
        return err;
    }
    warn!(err = %format!("{err:#}"), "generator command unavailable");
    anyhow::Error::new(CollaboratorUnavailable {
        detail: format!("{program}: {err:#}"),
    })
}

impl Generator for CommandGenerator {
    #[instrument(skip_all, fields(program = %self.command[0], temperature = request.temperature))]
    fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let cmd = self.build_command(request);
        let prompt = request.prompt();
        let output = run_command_with_timeout(
            cmd,
            Some(prompt.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .map_err(|err| classify_run_error(&self.command[0], err))?;

        if output.timed_out {
            return Err(anyhow!(
                "generator timed out after {}s",
                self.timeout.as_secs()
            ));
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "generator exited with {:?}: {}",
                output.status.code(),
                stderr.trim()
            ));
        }
        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(bytes = text.len(), "generator returned");
        Ok(text)
    }
}
