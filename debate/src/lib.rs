//! Two-party structured debate engine.
//!
//! Every turn goes through a generation–validation protocol: a producer asks
//! the text generator for a structured candidate, retries with escalating
//! temperature and falls back to deterministic content, and the acceptance
//! review blocks near-duplicates before anything reaches the transcript. The
//! architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (normalization, similarity, content
//!   rules, fallback banks, round phases). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (config files, generator processes,
//!   prompt rendering, the JSONL event log). Isolated behind traits so tests
//!   can script them.
//!
//! Orchestration modules ([`produce`], [`accept`], [`memory`], [`schedule`],
//! [`judgment`], [`debate`]) coordinate core logic with I/O to run a debate.

pub mod accept;
pub mod core;
pub mod debate;
pub mod exit_codes;
pub mod io;
pub mod judgment;
pub mod logging;
pub mod memory;
pub mod produce;
pub mod schedule;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
