//! Safety and cleanup
//!
//! Session directories, path confinement and symlink-safe removal.

pub mod confine;
pub mod safe_cleanup;
pub mod workspace;
