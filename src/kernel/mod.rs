//! Thin wrappers around Linux kernel primitives.
//!
//! Dependency direction: signal -> namespace -> mount

pub mod mount;
pub mod namespace;
pub mod signal;
