//! Stable exit codes for taskloop CLI commands.

/// Command succeeded; for `run`, the goal is complete.
pub const OK: i32 = 0;
/// Invalid config, unreadable state, or any other error.
pub const INVALID: i32 = 1;
/// `taskloop run` could not parse the initial plan.
pub const PLANNING_FAILED: i32 = 2;
/// `taskloop run` hit `max_cycles` before the goal was complete.
pub const CYCLE_LIMIT: i32 = 3;
