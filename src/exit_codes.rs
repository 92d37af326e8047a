//! Stable exit codes for the CLI.

/// Run finished within its budget (limit reached or cancelled).
pub const OK: i32 = 0;
/// Invalid config/arguments, device failure, or other errors.
pub const INVALID: i32 = 1;
/// The profile stack ran out before the budget did.
pub const EXHAUSTED: i32 = 2;
/// The run ended stuck after exhausting its recovery ceiling.
pub const STUCK: i32 = 3;
