//! Child process plumbing: environment and output capture

pub mod env_hygiene;
pub mod output;
