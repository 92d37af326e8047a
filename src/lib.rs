//! Verified swipe automation loop for a card-stack mobile app.
//!
//! The runner drives one device through a capture → analyze → decide →
//! execute → verify cycle until a profile budget, the end of the stack, or a
//! stuck state ends the run. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (snapshot comparison, decision
//!   policy, verification, recovery planning). No I/O, fully testable in
//!   isolation.
//! - **[`io`]**: Side-effecting collaborators (device transport, oracle
//!   processes, on-disk state). Isolated to enable scripting in tests.
//!
//! Orchestration modules ([`attempt`], [`session`]) coordinate core logic
//! with I/O to implement the run loop.

pub mod attempt;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
