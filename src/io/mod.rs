//! Side-effecting collaborators: device transport, oracle invocation, and
//! on-disk state.

pub mod analyzer;
pub mod attempt_log;
pub mod comment_store;
pub mod config;
pub mod device;
pub mod generator;
pub mod gestures;
pub mod process;
