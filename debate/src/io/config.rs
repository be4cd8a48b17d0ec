//! Debate configuration stored in `debate.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::candidate::ContentShape;
use crate::core::fallback::{self, MAX_ROUNDS};
use crate::core::rules::ContentLimits;
use crate::core::similarity::DEFAULT_NGRAM;
use crate::core::types::{Persona, Speaker};

/// Default config file name, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "debate.toml";

/// Debate configuration (TOML).
///
/// Missing fields fall back to the defaults below, so an empty file is a
/// valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebateConfig {
    /// Rounds played before judgment, at most [`MAX_ROUNDS`].
    pub max_rounds: u32,

    /// Extra attempts per round; each round gets `max_retries + 1` attempts.
    pub max_retries: u32,

    pub starting_speaker: Speaker,

    pub content_shape: ContentShape,

    /// Characters of rolling summary shown in each memory slice.
    pub summary_chars: usize,

    /// Turns shown in each memory slice.
    pub recent_turns: usize,

    pub personas: PersonaConfig,
    pub rules: ContentLimits,
    pub similarity: SimilarityConfig,
    pub sampling: SamplingConfig,
    pub judge: JudgeConfig,
    pub generator: GeneratorConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PersonaConfig {
    pub a: Persona,
    pub b: Persona,
}

impl PersonaConfig {
    pub fn get(&self, speaker: Speaker) -> &Persona {
        match speaker {
            Speaker::A => &self.a,
            Speaker::B => &self.b,
        }
    }
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            a: Persona {
                name: "Scientist".to_string(),
                style: "Argue from evidence, feasibility, safety and measurable constraints."
                    .to_string(),
            },
            b: Persona {
                name: "Philosopher".to_string(),
                style: "Argue from ethics, definitions, governance and societal impact."
                    .to_string(),
            },
        }
    }
}

/// Duplicate-detection thresholds over normalized text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimilarityConfig {
    /// Character n-gram size.
    pub ngram: usize,
    pub same_speaker: f64,
    pub cross_speaker: f64,
    pub last_turn: f64,
    /// Same-speaker score that records a flag without rejecting.
    pub repetition_watch: f64,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            ngram: DEFAULT_NGRAM,
            same_speaker: 0.86,
            cross_speaker: 0.90,
            last_turn: 0.84,
            repetition_watch: 0.60,
        }
    }
}

/// Generation parameters and their escalation across attempts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SamplingConfig {
    pub base_temperature: f64,
    pub temperature_step: f64,
    pub temperature_cap: f64,
    pub max_tokens: u32,
    pub seed: Option<u64>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            base_temperature: 0.2,
            temperature_step: 0.15,
            temperature_cap: 0.9,
            max_tokens: 260,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct JudgeConfig {
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 420,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Command that reads a prompt on stdin and prints the completion
    /// (e.g. `["ollama","run","llama3.2:1b","--format","json"]`). Arguments may
    /// contain `{temperature}`, `{max_tokens}` and `{seed}` placeholders.
    pub command: Vec<String>,

    pub timeout_secs: u64,

    /// Truncate generator stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            command: ["ollama", "run", "llama3.2:1b", "--format", "json"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            timeout_secs: 120,
            output_limit_bytes: 100_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for JSONL event logs.
    pub log_dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self {
            max_rounds: 8,
            max_retries: 2,
            starting_speaker: Speaker::A,
            content_shape: ContentShape::Structured,
            summary_chars: 700,
            recent_turns: 3,
            personas: PersonaConfig::default(),
            rules: ContentLimits::default(),
            similarity: SimilarityConfig::default(),
            sampling: SamplingConfig::default(),
            judge: JudgeConfig::default(),
            generator: GeneratorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl DebateConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_rounds == 0 {
            return Err(anyhow!("max_rounds must be > 0"));
        }
        if self.max_rounds > MAX_ROUNDS {
            return Err(anyhow!("max_rounds must be <= {MAX_ROUNDS}"));
        }
        if self.summary_chars == 0 {
            return Err(anyhow!("summary_chars must be > 0"));
        }
        for (label, persona) in [
            ("personas.a", &self.personas.a),
            ("personas.b", &self.personas.b),
        ] {
            if persona.name.trim().is_empty() {
                return Err(anyhow!("{label}.name must be non-empty"));
            }
            if persona.style.trim().is_empty() {
                return Err(anyhow!("{label}.style must be non-empty"));
            }
        }
        if self.personas.a.name == self.personas.b.name {
            return Err(anyhow!("personas must have distinct names"));
        }

        let rules = &self.rules;
        if rules.min_argument_chars > rules.max_argument_chars {
            return Err(anyhow!(
                "rules.min_argument_chars must be <= rules.max_argument_chars"
            ));
        }
        if rules.keyword_cap == 0 {
            return Err(anyhow!("rules.keyword_cap must be > 0"));
        }
        fallback::check_limits(
            rules,
            self.content_shape,
            [&self.personas.a, &self.personas.b],
        )
        .map_err(|msg| anyhow!(msg))?;

        let sim = &self.similarity;
        if sim.ngram == 0 {
            return Err(anyhow!("similarity.ngram must be > 0"));
        }
        for (label, value) in [
            ("similarity.same_speaker", sim.same_speaker),
            ("similarity.cross_speaker", sim.cross_speaker),
            ("similarity.last_turn", sim.last_turn),
            ("similarity.repetition_watch", sim.repetition_watch),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(anyhow!("{label} must be in (0, 1]"));
            }
        }

        let sampling = &self.sampling;
        if sampling.temperature_step < 0.0 {
            return Err(anyhow!("sampling.temperature_step must be >= 0"));
        }
        for (label, value) in [
            ("sampling.base_temperature", sampling.base_temperature),
            ("sampling.temperature_cap", sampling.temperature_cap),
            ("judge.temperature", self.judge.temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(anyhow!("{label} must be in [0, 2]"));
            }
        }
        if sampling.base_temperature > sampling.temperature_cap {
            return Err(anyhow!(
                "sampling.base_temperature must be <= sampling.temperature_cap"
            ));
        }
        if sampling.max_tokens == 0 || self.judge.max_tokens == 0 {
            return Err(anyhow!("max_tokens must be > 0"));
        }

        let generator = &self.generator;
        if generator.command.is_empty() || generator.command[0].trim().is_empty() {
            return Err(anyhow!("generator.command must be a non-empty array"));
        }
        if generator.timeout_secs == 0 {
            return Err(anyhow!("generator.timeout_secs must be > 0"));
        }
        if generator.output_limit_bytes == 0 {
            return Err(anyhow!("generator.output_limit_bytes must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `DebateConfig::default()`.
pub fn load_config(path: &Path) -> Result<DebateConfig> {
    if !path.exists() {
        let cfg = DebateConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: DebateConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &DebateConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
