/// Security event logging for treebox
///
/// Events are rendered as one JSON object per line and routed through the
/// `log` facade under the `treebox::audit` target, so `RUST_LOG` filtering
/// applies to them like any other record.
use chrono::{DateTime, SecondsFormat, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const AUDIT_TARGET: &str = "treebox::audit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecuritySeverity {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    PathEscapeAttempt,
    CommandRejected,
    TimeoutKill,
    LaunchFailure,
    SessionCreated,
    SessionCleaned,
    CleanupFailure,
}

impl SecurityEventType {
    pub fn default_severity(&self) -> SecuritySeverity {
        match self {
            SecurityEventType::PathEscapeAttempt => SecuritySeverity::Critical,
            SecurityEventType::CommandRejected => SecuritySeverity::High,
            SecurityEventType::CleanupFailure => SecuritySeverity::High,
            SecurityEventType::TimeoutKill => SecuritySeverity::Medium,
            SecurityEventType::LaunchFailure => SecuritySeverity::Medium,
            SecurityEventType::SessionCreated => SecuritySeverity::Low,
            SecurityEventType::SessionCleaned => SecuritySeverity::Low,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub event_type: SecurityEventType,
    pub severity: SecuritySeverity,
    pub timestamp: DateTime<Utc>,
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

impl SecurityEvent {
    pub fn new(event_type: SecurityEventType, details: String) -> Self {
        Self {
            event_type,
            severity: event_type.default_severity(),
            timestamp: Utc::now(),
            details,
            session_id: None,
            command: None,
            file_path: None,
        }
    }

    pub fn with_session_id(mut self, session_id: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self
    }

    pub fn with_command(mut self, command: &str) -> Self {
        self.command = Some(command.to_string());
        self
    }

    pub fn with_file_path(mut self, file_path: &str) -> Self {
        self.file_path = Some(file_path.to_string());
        self
    }

    /// Single-line JSON record
    pub fn to_json_line(&self) -> String {
        let mut entry = serde_json::json!({
            "timestamp": self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            "event_type": self.event_type,
            "severity": self.severity,
            "details": self.details,
            "process_id": std::process::id(),
        });
        if let Some(id) = &self.session_id {
            entry["session_id"] = serde_json::json!(id);
        }
        if let Some(command) = &self.command {
            entry["command"] = serde_json::json!(command);
        }
        if let Some(path) = &self.file_path {
            entry["file_path"] = serde_json::json!(path);
        }
        entry.to_string()
    }
}

pub fn log_security_event(event: SecurityEvent) {
    let line = event.to_json_line();
    match event.severity {
        SecuritySeverity::Critical | SecuritySeverity::High => {
            error!(target: AUDIT_TARGET, "{}", line)
        }
        SecuritySeverity::Medium => warn!(target: AUDIT_TARGET, "{}", line),
        SecuritySeverity::Low => info!(target: AUDIT_TARGET, "{}", line),
    }
}

pub fn path_escape_attempt(root: &Path, requested: &str, check: &str) {
    log_security_event(
        SecurityEvent::new(
            SecurityEventType::PathEscapeAttempt,
            format!(
                "blocked path outside {} ({} check)",
                root.display(),
                check
            ),
        )
        .with_file_path(requested),
    );
}

pub fn command_rejected(command: &str, reason: &str) {
    log_security_event(
        SecurityEvent::new(
            SecurityEventType::CommandRejected,
            format!("shell command rejected: {}", reason),
        )
        .with_command(command),
    );
}

pub fn timeout_kill(session_id: &str, program: &str, limit_ms: u64) {
    log_security_event(
        SecurityEvent::new(
            SecurityEventType::TimeoutKill,
            format!("process group killed after {} ms", limit_ms),
        )
        .with_session_id(session_id)
        .with_command(program),
    );
}

pub fn launch_failure(program: &str, reason: &str) {
    log_security_event(
        SecurityEvent::new(SecurityEventType::LaunchFailure, reason.to_string())
            .with_command(program),
    );
}

pub fn session_created(session_id: &str, root: &Path) {
    log_security_event(
        SecurityEvent::new(
            SecurityEventType::SessionCreated,
            format!("session directory {}", root.display()),
        )
        .with_session_id(session_id),
    );
}

pub fn session_cleaned(session_id: &str, root: &Path) {
    log_security_event(
        SecurityEvent::new(
            SecurityEventType::SessionCleaned,
            format!("removed {}", root.display()),
        )
        .with_session_id(session_id),
    );
}

pub fn cleanup_failure(session_id: &str, root: &Path, error: &str) {
    log_security_event(
        SecurityEvent::new(
            SecurityEventType::CleanupFailure,
            format!("failed to remove {}: {}", root.display(), error),
        )
        .with_session_id(session_id),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_line_shape() {
        let event = SecurityEvent::new(
            SecurityEventType::PathEscapeAttempt,
            "blocked".to_string(),
        )
        .with_file_path("../etc/passwd")
        .with_session_id("abc");

        let line = event.to_json_line();
        assert!(!line.contains('\n'));

        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["event_type"], "path_escape_attempt");
        assert_eq!(value["severity"], "critical");
        assert_eq!(value["file_path"], "../etc/passwd");
        assert_eq!(value["session_id"], "abc");
        assert!(value.get("command").is_none());
        assert!(value["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_default_severities() {
        assert_eq!(
            SecurityEventType::SessionCreated.default_severity(),
            SecuritySeverity::Low
        );
        assert_eq!(
            SecurityEventType::CommandRejected.default_severity(),
            SecuritySeverity::High
        );
    }

    #[test]
    fn test_helpers_do_not_panic_without_logger() {
        path_escape_attempt(Path::new("/tmp/x"), "../y", "lexical");
        command_rejected("cd /", "cd is not allowed");
        timeout_kill("s", "/bin/sh", 10);
    }
}
