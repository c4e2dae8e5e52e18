//! Program tree to Python source translation
//!
//! Translation is a pure function of the tree: no clock, randomness or
//! environment is consulted, so equal trees always produce byte-identical
//! source. Every string that reaches the output is either a fixed keyword,
//! a whitelisted operator, a validated identifier or a quoted literal.

mod emit;
mod error;
pub mod grammar;

pub use error::TranslationError;

use crate::tree::Node;
use emit::Emitter;
use serde::{Deserialize, Serialize};

/// File name used when the caller does not supply one
pub const DEFAULT_FILENAME: &str = "code.py";

/// Deepest tree accepted before translation gives up
pub const MAX_DEPTH: usize = 200;

/// Generated program text plus the name it will be stored under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceArtifact {
    pub filename: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct Translator {
    max_depth: usize,
}

impl Default for Translator {
    fn default() -> Self {
        Self::new()
    }
}

impl Translator {
    pub fn new() -> Self {
        Self {
            max_depth: MAX_DEPTH,
        }
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn convert(&self, tree: &Node) -> Result<SourceArtifact, TranslationError> {
        self.convert_named(tree, DEFAULT_FILENAME)
    }

    pub fn convert_named(
        &self,
        tree: &Node,
        filename: &str,
    ) -> Result<SourceArtifact, TranslationError> {
        let body = Emitter::new(self.max_depth).emit_program(tree)?;
        log::debug!(
            "translated {} nodes into {} bytes for {}",
            tree.size(),
            body.len(),
            filename
        );
        Ok(SourceArtifact {
            filename: filename.to_string(),
            body,
        })
    }
}

/// Translate with default settings
pub fn convert(tree: &Node) -> Result<SourceArtifact, TranslationError> {
    Translator::new().convert(tree)
}
