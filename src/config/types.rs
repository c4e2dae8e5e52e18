/// Core types shared by the sandbox, the runner and the HTTP boundary
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Outcome of one request as seen by the boundary layer
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Error,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Success => write!(f, "success"),
            RunStatus::Error => write!(f, "error"),
        }
    }
}

/// Machine-readable failure classification - closed set.
///
/// Callers use the code to tell fatal conditions (bad tree, escape attempt)
/// from ones that may succeed when resubmitted later (timeout, host trouble).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The program tree could not be translated
    TranslationError,
    /// A path or command tried to leave the session directory
    PathEscape,
    /// Target file exists and overwrite was not allowed
    AlreadyExists,
    /// The interpreter or shell could not be started
    LaunchFailure,
    /// Wall-clock budget exhausted; the process group was killed
    Timeout,
    /// The launched program itself failed (non-zero exit or stderr output)
    RuntimeFault,
    /// Host-side failure unrelated to the submission
    InternalError,
    /// Request body could not be decoded
    BadRequest,
}

impl FailureKind {
    pub fn code(&self) -> &'static str {
        match self {
            FailureKind::TranslationError => "translation_error",
            FailureKind::PathEscape => "path_escape",
            FailureKind::AlreadyExists => "already_exists",
            FailureKind::LaunchFailure => "launch_failure",
            FailureKind::Timeout => "timeout",
            FailureKind::RuntimeFault => "runtime_fault",
            FailureKind::InternalError => "internal_error",
            FailureKind::BadRequest => "bad_request",
        }
    }

    /// Whether resubmitting the identical request could plausibly succeed.
    /// Informational only: nothing in this crate retries.
    pub fn retryable(&self) -> bool {
        matches!(self, FailureKind::Timeout | FailureKind::InternalError)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Normalized result returned to the boundary.
///
/// `status == Error` implies `stderr` is non-empty and `stdout` is empty.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionResult {
    pub status: RunStatus,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FailureKind>,
}

impl ExecutionResult {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Success,
            stdout: stdout.into(),
            stderr: String::new(),
            error_kind: None,
        }
    }

    /// Build an error result; an empty message is replaced by the failure code
    /// so that callers always see a populated stderr.
    pub fn failure(kind: FailureKind, stderr: impl Into<String>) -> Self {
        let mut stderr = stderr.into();
        if stderr.trim().is_empty() {
            stderr = format!("{kind}: no diagnostic output");
        }
        Self {
            status: RunStatus::Error,
            stdout: String::new(),
            stderr,
            error_kind: Some(kind),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}

/// How completely a captured stream was collected
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputIntegrity {
    #[default]
    Complete,
    /// Stream exceeded its byte budget; the tail was dropped
    TruncatedByLimit,
    /// Reading the pipe failed part way through
    ReadError,
}

impl fmt::Display for OutputIntegrity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputIntegrity::Complete => write!(f, "complete"),
            OutputIntegrity::TruncatedByLimit => write!(f, "truncated_by_limit"),
            OutputIntegrity::ReadError => write!(f, "read_error"),
        }
    }
}

/// Errors raised by the sandbox and execution layers
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("path escapes the sandbox root: {path}")]
    PathEscape { path: String },

    #[error("path already exists: {path}")]
    AlreadyExists { path: String },

    #[error("failed to launch {program}: {reason}")]
    LaunchFailure { program: String, reason: String },

    #[error("execution exceeded the time limit of {limit_ms} ms and was killed")]
    Timeout { limit_ms: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Filesystem error: {0}")]
    Filesystem(String),

    #[error("Process error: {0}")]
    Process(String),
}

impl SandboxError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            SandboxError::PathEscape { .. } => FailureKind::PathEscape,
            SandboxError::AlreadyExists { .. } => FailureKind::AlreadyExists,
            SandboxError::LaunchFailure { .. } => FailureKind::LaunchFailure,
            SandboxError::Timeout { .. } => FailureKind::Timeout,
            SandboxError::Io(_)
            | SandboxError::Config(_)
            | SandboxError::Filesystem(_)
            | SandboxError::Process(_) => FailureKind::InternalError,
        }
    }

    pub fn path_escape(path: impl AsRef<std::path::Path>) -> Self {
        SandboxError::PathEscape {
            path: path.as_ref().display().to_string(),
        }
    }
}

impl From<nix::errno::Errno> for SandboxError {
    fn from(err: nix::errno::Errno) -> Self {
        SandboxError::Process(err.to_string())
    }
}

impl From<SandboxError> for ExecutionResult {
    fn from(err: SandboxError) -> Self {
        ExecutionResult::failure(err.failure_kind(), err.to_string())
    }
}

/// Result type alias for sandbox operations
pub type Result<T> = std::result::Result<T, SandboxError>;
