//! I/O collaborators: configuration, generation, prompts and the event log.

pub mod config;
pub mod event_log;
pub mod generator;
pub mod process;
pub mod prompt;
pub mod topic;
