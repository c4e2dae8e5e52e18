use crate::tree::NodeKind;
use thiserror::Error;

/// Why a program tree could not be turned into source.
///
/// `path` fields locate the offending node as a JSON pointer into the
/// submitted tree, e.g. `/children/0/children/1`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslationError {
    #[error("unknown node kind {kind:?} at {path}")]
    UnknownKind { kind: String, path: String },

    #[error("'{kind}' at {path} expects {expected} children, found {found}")]
    Arity {
        kind: NodeKind,
        expected: &'static str,
        found: usize,
        path: String,
    },

    #[error("invalid identifier {name:?} at {path}")]
    InvalidIdentifier { name: String, path: String },

    #[error("invalid literal at {path}: {reason}")]
    InvalidLiteral { reason: String, path: String },

    #[error("unsupported operator {op:?} for '{kind}' at {path}")]
    InvalidOperator {
        op: String,
        kind: NodeKind,
        path: String,
    },

    #[error("'{kind}' is not allowed {context} at {path}")]
    Misplaced {
        kind: String,
        context: &'static str,
        path: String,
    },

    #[error("tree nesting exceeds the limit of {limit} levels")]
    TooDeep { limit: usize },
}

impl TranslationError {
    /// Human readable reason, as reported to the client on stderr
    pub fn reason(&self) -> String {
        format!("TranslationError: {self}")
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            TranslationError::UnknownKind { path, .. }
            | TranslationError::Arity { path, .. }
            | TranslationError::InvalidIdentifier { path, .. }
            | TranslationError::InvalidLiteral { path, .. }
            | TranslationError::InvalidOperator { path, .. }
            | TranslationError::Misplaced { path, .. } => Some(path),
            TranslationError::TooDeep { .. } => None,
        }
    }
}
