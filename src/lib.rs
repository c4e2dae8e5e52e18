//! treebox: translate JSON program trees into Python and run them, or plain
//! shell commands, inside per-request confined directories
//!
//! # Architecture
//!
//! ## Program trees ([`tree`], [`translate`])
//! - [`tree`]: The wire data model and the closed set of node kinds
//! - [`translate`]: Deterministic tree to source translation
//!
//! ## Execution Control ([`core`], [`exec`], [`lang`])
//! - [`core::runner`]: Request lifecycle and result classification
//! - [`core::pool`]: Bounded worker pool
//! - [`core::command_policy`]: Lexical screening of shell command lines
//! - [`exec::executor`]: Process-group supervision with timeouts
//! - [`exec::preexec`]: Resource limits applied in the child before exec
//! - [`lang`]: How each language's entry point is launched
//!
//! ## Kernel Primitives ([`kernel`])
//! - [`kernel::namespace`]: Optional user+network namespace isolation
//! - [`kernel::signal`]: Shutdown signals and process-group signalling
//!
//! ## Safety & Cleanup ([`safety`])
//! - [`safety::workspace`]: Per-request session directories
//! - [`safety::confine`]: Path confinement
//! - [`safety::safe_cleanup`]: Symlink-safe recursive removal
//!
//! ## Observability ([`observability`])
//! - [`observability::audit`]: Structured audit events
//!
//! ## Configuration ([`config`])
//! - [`config::settings`]: Runner configuration loading and validation
//! - [`config::types`]: Results, failure kinds and errors
//!
//! ## Utilities ([`utils`])
//! - [`utils::env_hygiene`]: Deterministic child environment
//! - [`utils::output`]: Bounded output collection
//!
//! ## Boundary ([`server`], [`cli`])
//! - [`server`]: HTTP API
//! - [`cli`]: Command line entry point

// Program trees
pub mod translate;
pub mod tree;

// Kernel Primitives
pub mod kernel;

// Execution Control
pub mod core;
pub mod exec;
pub mod lang;

// Safety & Cleanup
pub mod safety;

// Observability
pub mod observability;

// Configuration
pub mod config;

// Utilities
pub mod utils;

// Boundary
pub mod cli;
pub mod server;

pub use config::types::{ExecutionResult, FailureKind, RunStatus, SandboxError};
pub use core::runner::ExecutionRunner;
pub use translate::{convert, SourceArtifact, TranslationError, Translator};
pub use tree::Node;
