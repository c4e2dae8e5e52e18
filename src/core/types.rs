use crate::tree::Node;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A shell command line to run inside a fresh session.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandSpec {
    pub command_line: String,
    /// Base directory for the session; the runner's configured one when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(command_line: impl Into<String>) -> Self {
        Self {
            command_line: command_line.into(),
            sandbox_dir: None,
        }
    }

    pub fn in_dir(mut self, sandbox_dir: PathBuf) -> Self {
        self.sandbox_dir = Some(sandbox_dir);
        self
    }
}

/// Unit of work accepted by the runner and the worker pool.
#[derive(Clone, Debug)]
pub enum Submission {
    /// Translate `tree`, store it as `filename`, run it
    Program { filename: Option<String>, tree: Node },
    Command(CommandSpec),
}

impl Submission {
    pub fn program(tree: Node) -> Self {
        Submission::Program {
            filename: None,
            tree,
        }
    }

    pub fn command(command_line: impl Into<String>) -> Self {
        Submission::Command(CommandSpec::new(command_line))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Submission::Program { .. } => "program",
            Submission::Command(_) => "command",
        }
    }
}

/// Request lifecycle. Transitions only move forward; `Succeeded` and
/// `Failed` are terminal and are followed by session cleanup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestState {
    Received,
    Translating,
    Writing,
    Running,
    Succeeded,
    Failed,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Succeeded | RequestState::Failed)
    }

    pub fn can_advance_to(&self, next: RequestState) -> bool {
        use RequestState::*;
        match (self, next) {
            (Received, Translating | Writing | Failed) => true,
            (Translating, Writing | Failed) => true,
            (Writing, Running | Failed) => true,
            (Running, Succeeded | Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestState::Received => "received",
            RequestState::Translating => "translating",
            RequestState::Writing => "writing",
            RequestState::Running => "running",
            RequestState::Succeeded => "succeeded",
            RequestState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        use RequestState::*;
        assert!(Received.can_advance_to(Translating));
        assert!(Received.can_advance_to(Writing));
        assert!(Translating.can_advance_to(Failed));
        assert!(Running.can_advance_to(Succeeded));
        assert!(!Succeeded.can_advance_to(Running));
        assert!(!Running.can_advance_to(Translating));
        assert!(Failed.is_terminal());
    }

    #[test]
    fn test_command_spec_serde() {
        let spec: CommandSpec = serde_json::from_str(r#"{"command_line": "echo ok"}"#).unwrap();
        assert_eq!(spec, CommandSpec::new("echo ok"));
    }
}
