//! Configuration
//!
//! Runner settings loaded once at startup, plus the shared result and error types.

pub mod settings;
pub mod types;
