//! Pure decision and comparison logic. Nothing here touches the device,
//! spawns processes, or reads the filesystem.

pub mod action;
pub mod policy;
pub mod recovery;
pub mod run_state;
pub mod snapshot;
pub mod verify;
