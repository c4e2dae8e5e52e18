//! Request execution core.
//!
//! The runner turns a submission into an [`ExecutionResult`]; the pool runs
//! many of them at once. Command screening lives here because it decides
//! whether a command reaches a session at all.
//!
//! [`ExecutionResult`]: crate::config::types::ExecutionResult

pub mod command_policy;
pub mod pool;
pub mod runner;
pub mod types;
