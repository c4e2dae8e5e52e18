//! Observability
//!
//! Structured security events for confinement violations, kills and session
//! lifecycle.

pub mod audit;
