//! Deterministic, pure logic of the turn protocol.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod candidate;
pub mod escalate;
pub mod fallback;
pub mod normalize;
pub mod phase;
pub mod rules;
pub mod schema;
pub mod similarity;
pub mod types;
