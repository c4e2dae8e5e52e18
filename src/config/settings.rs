/// Runner configuration loaded from a JSON file
use crate::config::types::{Result, SandboxError};
use crate::kernel::mount::DEFAULT_BINDS;
use crate::translate::MAX_DEPTH;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Process-wide configuration. Loaded once at startup and never mutated;
/// every request shares it read-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Address the HTTP server binds to
    pub bind_addr: String,
    /// Directory under which per-request session directories are created
    pub base_dir: PathBuf,
    /// Wall-clock budget per execution (milliseconds)
    pub timeout_ms: u64,
    /// Delay between SIGTERM and SIGKILL when a process group is stopped
    pub kill_grace_ms: u64,
    /// Captured stdout budget per execution (bytes)
    pub stdout_limit: usize,
    /// Captured stderr budget per execution (bytes)
    pub stderr_limit: usize,
    /// Largest accepted HTTP request body (bytes)
    pub max_request_bytes: usize,
    /// Worker threads executing submissions
    pub workers: usize,
    /// Pending submissions the pool accepts before callers block
    pub queue_depth: usize,
    /// Interpreter for generated programs
    pub python_path: PathBuf,
    /// Shell used for the command path
    pub shell_path: PathBuf,
    /// RLIMIT_FSIZE for spawned processes (bytes)
    pub file_size_limit: Option<u64>,
    /// RLIMIT_NOFILE for spawned processes
    pub fd_limit: Option<u64>,
    /// RLIMIT_AS for spawned processes (bytes)
    pub memory_limit: Option<u64>,
    /// Run children in fresh user+network namespaces (no network access)
    pub isolate_network: bool,
    /// Run children in a mount+pid namespace jail that only exposes the
    /// session directory (writable, at `/work`) and read-only system paths.
    /// Startup fails when the host cannot build one.
    pub filesystem_jail: bool,
    /// Host paths bound read-only into the jail. The interpreter and shell
    /// install prefixes are added automatically.
    pub jail_binds: Vec<PathBuf>,
    /// Deepest program tree the translator accepts
    pub max_tree_depth: usize,
    /// Session directories older than this are swept at startup (seconds)
    pub stale_session_secs: u64,
    /// Filename used when a submission does not name one
    pub default_filename: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
            base_dir: std::env::temp_dir().join("treebox"),
            timeout_ms: 10_000,
            kill_grace_ms: 100,
            stdout_limit: 1024 * 1024, // 1 MB
            stderr_limit: 256 * 1024,  // 256 KB
            max_request_bytes: 2 * 1024 * 1024,
            workers: 4,
            queue_depth: 64,
            python_path: PathBuf::from("python3"),
            shell_path: PathBuf::from("/bin/sh"),
            file_size_limit: Some(16 * 1024 * 1024),
            fd_limit: Some(64),
            memory_limit: Some(512 * 1024 * 1024),
            isolate_network: false,
            filesystem_jail: true,
            jail_binds: DEFAULT_BINDS.iter().map(PathBuf::from).collect(),
            max_tree_depth: MAX_DEPTH,
            stale_session_secs: 3600,
            default_filename: "code.py".to_string(),
        }
    }
}

impl RunnerConfig {
    /// Load configuration from a JSON file; missing fields take defaults
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SandboxError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: RunnerConfig = serde_json::from_str(&content)
            .map_err(|e| SandboxError::Config(format!("Failed to parse config JSON: {}", e)))?;

        config.validate()?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load from `path` when given, otherwise use defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load_from_file(p),
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(SandboxError::Config("timeout_ms must be positive".into()));
        }
        if self.stdout_limit == 0 || self.stderr_limit == 0 {
            return Err(SandboxError::Config(
                "stdout_limit and stderr_limit must be positive".into(),
            ));
        }
        if self.workers == 0 || self.queue_depth == 0 {
            return Err(SandboxError::Config(
                "workers and queue_depth must be positive".into(),
            ));
        }
        if self.max_request_bytes == 0 {
            return Err(SandboxError::Config(
                "max_request_bytes must be positive".into(),
            ));
        }
        if self.max_tree_depth == 0 {
            return Err(SandboxError::Config("max_tree_depth must be positive".into()));
        }
        if let Some(bind) = self.jail_binds.iter().find(|p| !p.is_absolute()) {
            return Err(SandboxError::Config(format!(
                "jail_binds entries must be absolute: {}",
                bind.display()
            )));
        }
        if self.base_dir.as_os_str().is_empty() {
            return Err(SandboxError::Config("base_dir must not be empty".into()));
        }
        crate::safety::confine::validate_filename(&self.default_filename).map_err(|_| {
            SandboxError::Config(format!(
                "default_filename is not a plain file name: {}",
                self.default_filename
            ))
        })?;
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    pub fn stale_session_age(&self) -> Duration {
        Duration::from_secs(self.stale_session_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = RunnerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_filename, "code.py");
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert!(config.filesystem_jail);
        assert!(config.jail_binds.contains(&PathBuf::from("/usr")));
    }

    #[test]
    fn test_rejects_relative_jail_bind() {
        let config = RunnerConfig {
            jail_binds: vec![PathBuf::from("usr")],
            ..RunnerConfig::default()
        };
        assert!(matches!(config.validate(), Err(SandboxError::Config(_))));
    }

    #[test]
    fn test_partial_file_takes_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"timeout_ms": 2500, "workers": 2}}"#).unwrap();

        let config = RunnerConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.timeout_ms, 2500);
        assert_eq!(config.workers, 2);
        assert_eq!(config.stdout_limit, RunnerConfig::default().stdout_limit);
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let config = RunnerConfig {
            timeout_ms: 0,
            ..RunnerConfig::default()
        };
        assert!(matches!(config.validate(), Err(SandboxError::Config(_))));
    }

    #[test]
    fn test_rejects_default_filename_with_directories() {
        let config = RunnerConfig {
            default_filename: "../code.py".into(),
            ..RunnerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            RunnerConfig::load_from_file(file.path()),
            Err(SandboxError::Config(_))
        ));
    }
}
