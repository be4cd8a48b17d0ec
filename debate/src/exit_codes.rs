//! Stable exit codes for debate CLI commands.

/// Command succeeded; a verdict was printed.
pub const OK: i32 = 0;
/// Invalid topic, config or arguments, or any other error.
pub const INVALID: i32 = 1;
/// A turn was requested or committed out of protocol.
pub const PROTOCOL_VIOLATION: i32 = 3;
/// The event log could not be written.
pub const SINK_FAILURE: i32 = 4;
