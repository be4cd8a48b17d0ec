//! Structured two-party debate CLI.
//!
//! `debate run` plays a full debate against the configured generator command,
//! prints each committed turn and the judge's verdict, and writes the JSONL
//! event log. `debate init` writes the default config.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use chrono::Local;
use clap::{Parser, Subcommand};
use debate::core::types::Topic;
use debate::debate::Debate;
use debate::exit_codes;
use debate::io::config::{DEFAULT_CONFIG_PATH, DebateConfig, load_config, write_config};
use debate::io::event_log::{JsonlSink, SinkFailure, default_log_path};
use debate::io::generator::CommandGenerator;
use debate::io::topic::read_topic;
use debate::schedule::ProtocolViolation;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "debate",
    version,
    about = "Structured two-party debate with validated turns"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a debate and print the transcript and verdict.
    Run {
        /// Config file (defaults apply when missing).
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Debate topic. Read from stdin when omitted.
        #[arg(long)]
        topic: Option<String>,
        /// Override `max_rounds`.
        #[arg(long)]
        rounds: Option<u32>,
        /// Override the sampling seed.
        #[arg(long)]
        seed: Option<u64>,
        /// Write the event log here instead of the log directory.
        #[arg(long)]
        log_path: Option<PathBuf>,
    },
    /// Write the default config file.
    Init {
        /// Config file to write.
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

fn main() {
    debate::logging::init();
    let code = match run() {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            config,
            topic,
            rounds,
            seed,
            log_path,
        } => cmd_run(&config, topic, rounds, seed, log_path),
        Command::Init { config, force } => cmd_init(&config, force),
    }
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<ProtocolViolation>().is_some() {
        exit_codes::PROTOCOL_VIOLATION
    } else if err.downcast_ref::<SinkFailure>().is_some() {
        exit_codes::SINK_FAILURE
    } else {
        exit_codes::INVALID
    }
}

fn cmd_run(
    config_path: &Path,
    topic: Option<String>,
    rounds: Option<u32>,
    seed: Option<u64>,
    log_path: Option<PathBuf>,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    apply_overrides(&mut config, rounds, seed)?;

    let raw_topic = match topic {
        Some(topic) => topic,
        None => read_topic(&mut io::stdin().lock(), &mut io::stdout())?,
    };
    let topic = Topic::parse(&raw_topic).map_err(|msg| anyhow!("invalid topic: {msg}"))?;

    let log_path =
        log_path.unwrap_or_else(|| default_log_path(&config.logging.log_dir, Local::now()));
    let mut sink = JsonlSink::create(&log_path)?;
    let generator = CommandGenerator::from_config(&config.generator)?;

    let mut debate = Debate::new(&config, topic, &generator, &mut sink);
    info!(debate_id = debate.debate_id(), log = %log_path.display(), "debate created");

    let mut stdout = io::stdout().lock();
    writeln!(
        stdout,
        "Starting debate between {} and {}... (log: {})",
        config.personas.a.name,
        config.personas.b.name,
        log_path.display()
    )
    .context("write start line")?;
    debate.start()?;
    while !debate.is_complete() {
        let speaker = debate.expected_speaker();
        let turn = debate.play_round(speaker)?;
        writeln!(stdout, "\n[Round {}] {}:\n{}", turn.round, turn.agent_name, turn.text)
            .context("write turn")?;
    }
    let verdict = debate.conclude()?;

    writeln!(stdout, "\n[Judge] Summary of debate:\n{}", verdict.summary).context("write verdict")?;
    writeln!(stdout, "\n[Judge] Winner: {}", verdict.winner_name).context("write verdict")?;
    writeln!(stdout, "Reason: {}", verdict.reason).context("write verdict")?;
    writeln!(stdout, "\nEvent log: {}", log_path.display()).context("write log path")?;
    Ok(())
}

fn apply_overrides(
    config: &mut DebateConfig,
    rounds: Option<u32>,
    seed: Option<u64>,
) -> Result<()> {
    if let Some(rounds) = rounds {
        config.max_rounds = rounds;
    }
    if seed.is_some() {
        config.sampling.seed = seed;
    }
    config.validate().context("invalid command-line override")
}

fn cmd_init(config_path: &Path, force: bool) -> Result<()> {
    if !force && config_path.exists() {
        bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }
    write_config(config_path, &DebateConfig::default())?;
    println!("wrote {}", config_path.display());
    Ok(())
}
