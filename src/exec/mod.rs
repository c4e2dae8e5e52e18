//! Execution control
//!
//! Spawns and supervises children confined to a session directory.

pub mod executor;
pub mod preexec;
