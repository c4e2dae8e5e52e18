use crate::config::settings::RunnerConfig;
use crate::config::types::{ExecutionResult, FailureKind, Result, SandboxError};
use crate::core::command_policy::CommandPolicy;
use crate::core::types::{CommandSpec, RequestState, Submission};
use crate::exec::executor::{SpawnOutcome, SpawnSpec};
use crate::exec::preexec::ResourceLimits;
use crate::kernel::mount::install_prefix;
use crate::kernel::namespace::NamespaceIsolation;
use crate::lang::adapter::LanguageAdapter;
use crate::lang::adapter_for;
use crate::observability::audit;
use crate::safety::confine::validate_filename;
use crate::safety::workspace::{SandboxSession, WorkspaceManager};
use crate::translate::{SourceArtifact, Translator};
use crate::tree::Node;
use crate::utils::output::OutputLimits;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Tracks one request through its lifecycle for logging
struct RequestTrace {
    id: u64,
    kind: &'static str,
    state: RequestState,
}

impl RequestTrace {
    fn new(id: u64, kind: &'static str) -> Self {
        log::debug!("request {} ({}) {}", id, kind, RequestState::Received);
        Self {
            id,
            kind,
            state: RequestState::Received,
        }
    }

    fn advance(&mut self, next: RequestState) {
        if self.state.is_terminal() {
            log::warn!(
                "request {} ({}) already {}, ignoring {}",
                self.id,
                self.kind,
                self.state,
                next
            );
            return;
        }
        if !self.state.can_advance_to(next) {
            log::warn!(
                "request {} ({}) unexpected transition {} -> {}",
                self.id,
                self.kind,
                self.state,
                next
            );
        }
        log::debug!("request {} ({}) {} -> {}", self.id, self.kind, self.state, next);
        self.state = next;
    }

    fn finish(&mut self, result: ExecutionResult) -> ExecutionResult {
        if result.is_success() {
            self.advance(RequestState::Succeeded);
        } else {
            self.advance(RequestState::Failed);
            log::info!(
                "request {} ({}) failed: {}",
                self.id,
                self.kind,
                result.error_kind.map(|k| k.code()).unwrap_or("unknown")
            );
        }
        result
    }
}

/// Executes programs and shell commands in fresh sessions and maps every
/// outcome to an [`ExecutionResult`]. Holds only immutable configuration, so
/// one instance is shared by all workers.
pub struct ExecutionRunner {
    config: RunnerConfig,
    workspace: WorkspaceManager,
    translator: Translator,
    program_adapter: Box<dyn LanguageAdapter>,
    shell_adapter: Box<dyn LanguageAdapter>,
    policy: CommandPolicy,
    /// Read-only jail binds, `None` when the jail is disabled
    jail_binds: Option<Vec<PathBuf>>,
    requests: AtomicU64,
}

impl ExecutionRunner {
    pub fn new(config: RunnerConfig) -> Result<Self> {
        config.validate()?;
        if config.isolate_network && !NamespaceIsolation::is_supported() {
            return Err(SandboxError::Config(
                "isolate_network is set but namespaces are not available".into(),
            ));
        }
        let workspace = WorkspaceManager::new(config.base_dir.clone())?;
        let program_adapter = adapter_for("python", &config)?;
        let shell_adapter = adapter_for("shell", &config)?;
        let jail_binds = config.filesystem_jail.then(|| jail_bind_paths(&config));
        let runner = Self {
            translator: Translator::with_max_depth(config.max_tree_depth),
            config,
            workspace,
            program_adapter,
            shell_adapter,
            policy: CommandPolicy::new(),
            jail_binds,
            requests: AtomicU64::new(0),
        };
        if runner.jail_binds.is_some() {
            runner.check_jail()?;
        }
        Ok(runner)
    }

    /// Run a no-op shell inside the jail once so a host without user
    /// namespaces fails at startup instead of on every request.
    fn check_jail(&self) -> Result<()> {
        let unavailable = |reason: String| {
            SandboxError::Config(format!(
                "filesystem jail is unavailable on this host ({reason}); \
                 set filesystem_jail to false to run without it"
            ))
        };
        let session = self.workspace.create_session()?;
        let argv = self.shell_adapter.run_command(":");
        let outcome = session
            .spawn(&self.spawn_spec(argv))
            .map_err(|e| unavailable(e.to_string()))?;
        if !outcome.exited_cleanly() {
            let stderr = outcome.stderr.render();
            return Err(unavailable(if stderr.is_empty() {
                format!("exit status {:?}", outcome.exit_code)
            } else {
                stderr
            }));
        }
        log::info!("filesystem jail verified under {}", self.config.base_dir.display());
        Ok(())
    }

    /// Whether children run inside the filesystem jail
    pub fn jailed(&self) -> bool {
        self.jail_binds.is_some()
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn workspace(&self) -> &WorkspaceManager {
        &self.workspace
    }

    fn next_request(&self, kind: &'static str) -> RequestTrace {
        RequestTrace::new(self.requests.fetch_add(1, Ordering::Relaxed) + 1, kind)
    }

    /// Full pipeline for one submission. Never panics, never returns an
    /// error: every failure is reported inside the result.
    pub fn submit(&self, submission: Submission) -> ExecutionResult {
        match submission {
            Submission::Program { filename, tree } => self.run_tree(filename.as_deref(), &tree),
            Submission::Command(spec) => self.run_command(&spec),
        }
    }

    /// Translate `tree` and run it. Translation failures return before any
    /// filesystem work happens.
    pub fn run_tree(&self, filename: Option<&str>, tree: &Node) -> ExecutionResult {
        let mut trace = self.next_request("program");
        let filename = filename
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.config.default_filename);
        if let Err(e) = validate_filename(filename) {
            return trace.finish(e.into());
        }

        trace.advance(RequestState::Translating);
        let artifact = match self.translator.convert_named(tree, filename) {
            Ok(artifact) => artifact,
            Err(e) => {
                return trace.finish(ExecutionResult::failure(
                    FailureKind::TranslationError,
                    e.reason(),
                ))
            }
        };

        let result = self.execute_artifact(&artifact, &mut trace);
        trace.finish(result)
    }

    /// Store an already generated program in a fresh session and run it
    pub fn run_program(&self, artifact: &SourceArtifact) -> ExecutionResult {
        let mut trace = self.next_request("program");
        let result = self.execute_artifact(artifact, &mut trace);
        trace.finish(result)
    }

    fn execute_artifact(&self, artifact: &SourceArtifact, trace: &mut RequestTrace) -> ExecutionResult {
        if let Err(e) = validate_filename(&artifact.filename) {
            return e.into();
        }

        trace.advance(RequestState::Writing);
        let session = match self.workspace.create_session() {
            Ok(session) => session,
            Err(e) => return e.into(),
        };
        if let Err(e) = session.write_file(&artifact.filename, artifact.body.as_bytes(), true) {
            return e.into();
        }

        trace.advance(RequestState::Running);
        log::debug!(
            "session {} runs {} program {}",
            session.id(),
            self.program_adapter.language(),
            artifact.filename
        );
        let argv = self.program_adapter.run_command(&artifact.filename);
        self.spawn_and_classify(&session, argv)
    }

    /// Screen and run a shell command line inside a fresh session
    pub fn run_command(&self, spec: &CommandSpec) -> ExecutionResult {
        let mut trace = self.next_request("command");

        if let Err(violation) = self.policy.screen(&spec.command_line) {
            audit::command_rejected(&spec.command_line, violation.reason);
            return trace.finish(ExecutionResult::failure(
                FailureKind::PathEscape,
                violation.to_string(),
            ));
        }

        trace.advance(RequestState::Writing);
        let session = match &spec.sandbox_dir {
            Some(dir) => WorkspaceManager::new(dir.clone()).and_then(|m| m.create_session()),
            None => self.workspace.create_session(),
        };
        let session = match session {
            Ok(session) => session,
            Err(e) => return trace.finish(e.into()),
        };

        trace.advance(RequestState::Running);
        let argv = self.shell_adapter.run_command(&spec.command_line);
        let result = self.spawn_and_classify(&session, argv);
        trace.finish(result)
    }

    fn spawn_spec(&self, mut argv: Vec<String>) -> SpawnSpec {
        let program = if argv.is_empty() {
            String::new()
        } else {
            argv.remove(0)
        };
        let mut spec = SpawnSpec::new(program, argv).with_timeout(self.config.timeout());
        spec.kill_grace = self.config.kill_grace();
        spec.limits = ResourceLimits {
            file_size: self.config.file_size_limit,
            open_files: self.config.fd_limit,
            address_space: self.config.memory_limit,
        };
        spec.output = OutputLimits {
            stdout_limit: self.config.stdout_limit,
            stderr_limit: self.config.stderr_limit,
            drain_timeout: Duration::from_secs(2),
        };
        spec.isolate_network = self.config.isolate_network;
        spec.jail_binds = self.jail_binds.clone();
        spec
    }

    fn spawn_and_classify(&self, session: &SandboxSession, argv: Vec<String>) -> ExecutionResult {
        let spec = self.spawn_spec(argv);
        match session.spawn(&spec) {
            Ok(outcome) => classify(&outcome, spec.timeout),
            Err(e) => e.into(),
        }
    }
}

/// Configured binds plus the install prefixes of both interpreters
fn jail_bind_paths(config: &RunnerConfig) -> Vec<PathBuf> {
    let mut binds = config.jail_binds.clone();
    for program in [&config.python_path, &config.shell_path] {
        if let Some(prefix) = install_prefix(program) {
            if !binds.iter().any(|bind| prefix.starts_with(bind)) {
                binds.push(prefix);
            }
        }
    }
    binds
}

/// Map a finished process to the boundary result.
///
/// Success needs exit status 0 and an empty stderr; anything the program
/// wrote to stderr is reported as a runtime fault.
pub fn classify(outcome: &SpawnOutcome, timeout: Duration) -> ExecutionResult {
    let stderr = outcome.stderr.render();

    if outcome.timed_out {
        let mut message = SandboxError::Timeout {
            limit_ms: timeout.as_millis() as u64,
        }
        .to_string();
        if !stderr.trim().is_empty() {
            message.push('\n');
            message.push_str(&stderr);
        }
        return ExecutionResult::failure(FailureKind::Timeout, message);
    }

    if outcome.exited_cleanly() && stderr.is_empty() {
        return ExecutionResult::success(outcome.stdout.render());
    }

    let message = if stderr.trim().is_empty() {
        match (outcome.exit_code, outcome.signal) {
            (Some(code), _) => format!("process exited with status {code}"),
            (None, Some(signal)) => format!("process terminated by signal {signal}"),
            (None, None) => "process failed".to_string(),
        }
    } else {
        stderr
    };
    ExecutionResult::failure(FailureKind::RuntimeFault, message)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{OutputIntegrity, RunStatus};
    use crate::utils::output::CapturedStream;
    use super::testing::{jail_supported, test_config};

    fn outcome(code: Option<i32>, stdout: &str, stderr: &str) -> SpawnOutcome {
        let stream = |s: &str| CapturedStream {
            data: s.as_bytes().to_vec(),
            integrity: OutputIntegrity::Complete,
            total_bytes: s.len() as u64,
        };
        SpawnOutcome {
            exit_code: code,
            signal: None,
            stdout: stream(stdout),
            stderr: stream(stderr),
            timed_out: false,
            wall_time: Duration::from_millis(5),
            pgid: 0,
        }
    }

    fn runner() -> (tempfile::TempDir, ExecutionRunner) {
        let base = tempfile::tempdir().unwrap();
        let config = test_config(&base.path().join("sessions"));
        (base, ExecutionRunner::new(config).unwrap())
    }

    #[test]
    fn test_classify_success() {
        let result = classify(&outcome(Some(0), "hi\n", ""), Duration::from_secs(1));
        assert_eq!(result, ExecutionResult::success("hi\n"));
    }

    #[test]
    fn test_classify_stderr_is_fault() {
        let result = classify(&outcome(Some(0), "partial", "Traceback\n"), Duration::from_secs(1));
        assert_eq!(result.status, RunStatus::Error);
        assert_eq!(result.error_kind, Some(FailureKind::RuntimeFault));
        assert_eq!(result.stderr, "Traceback\n");
        assert!(result.stdout.is_empty());
    }

    #[test]
    fn test_classify_silent_nonzero_exit() {
        let result = classify(&outcome(Some(2), "", ""), Duration::from_secs(1));
        assert_eq!(result.stderr, "process exited with status 2");
    }

    #[test]
    fn test_classify_timeout() {
        let mut timed_out = outcome(None, "", "");
        timed_out.timed_out = true;
        timed_out.signal = Some(9);
        let result = classify(&timed_out, Duration::from_millis(1500));
        assert_eq!(result.error_kind, Some(FailureKind::Timeout));
        assert!(result.stderr.contains("1500 ms"));
    }

    #[test]
    fn test_translation_error_short_circuits() {
        let (base, runner) = runner();
        let result = runner.run_tree(None, &Node::new("frobnicate"));
        assert_eq!(result.error_kind, Some(FailureKind::TranslationError));
        assert!(result.stderr.contains("frobnicate"));
        // no session directory was created
        let entries = std::fs::read_dir(base.path().join("sessions")).unwrap().count();
        assert_eq!(entries, 0);
    }

    #[test]
    fn test_empty_filename_takes_default() {
        let (base, runner) = runner();
        // translation fails after the name check, so nothing runs
        let result = runner.run_tree(Some(""), &Node::new("frobnicate"));
        assert_eq!(result.error_kind, Some(FailureKind::TranslationError));
        let entries = std::fs::read_dir(base.path().join("sessions")).unwrap().count();
        assert_eq!(entries, 0);
    }

    #[test]
    fn test_jail_binds_include_interpreter_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("venv/bin");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::write(bin.join("python3"), "").unwrap();
        let config = RunnerConfig {
            python_path: bin.join("python3"),
            ..RunnerConfig::default()
        };
        let binds = jail_bind_paths(&config);
        assert!(binds.contains(&dir.path().canonicalize().unwrap().join("venv")));
        assert!(binds.contains(&PathBuf::from("/usr")));
    }

    #[test]
    fn test_trace_ignores_moves_out_of_terminal_state() {
        let mut trace = RequestTrace::new(1, "program");
        trace.finish(ExecutionResult::success(""));
        trace.advance(RequestState::Running);
        assert_eq!(trace.state, RequestState::Succeeded);
    }

    #[test]
    fn test_bad_filename_is_path_escape() {
        let (_base, runner) = runner();
        let result = runner.run_tree(Some("../evil.py"), &Node::new("pass"));
        assert_eq!(result.error_kind, Some(FailureKind::PathEscape));
    }

    #[test]
    fn test_command_runs_in_session() {
        let (base, runner) = runner();
        let result = runner.run_command(&CommandSpec::new("echo ok"));
        assert_eq!(result, ExecutionResult::success("ok\n"));
        let leftover = std::fs::read_dir(base.path().join("sessions")).unwrap().count();
        assert_eq!(leftover, 0);
    }

    #[test]
    fn test_rejected_command_never_runs() {
        let (_base, runner) = runner();
        let result = runner.run_command(&CommandSpec::new("cat ../../etc/passwd"));
        assert_eq!(result.error_kind, Some(FailureKind::PathEscape));
        assert!(!result.stderr.contains("root:"));
    }

    #[test]
    fn test_command_timeout() {
        let (_base, runner) = runner();
        let result = runner.run_command(&CommandSpec::new("sleep 10"));
        assert_eq!(result.error_kind, Some(FailureKind::Timeout));
    }

    #[test]
    fn test_jailed_command_sees_only_the_session() {
        if !jail_supported() {
            eprintln!("filesystem jail unavailable, skipping");
            return;
        }
        let (_base, runner) = runner();
        assert!(runner.jailed());
        let result = runner.run_command(&CommandSpec::new(r#"pwd; ls "$(printf '\057')""#));
        assert!(result.is_success(), "{result:?}");
        let lines: Vec<&str> = result.stdout.lines().collect();
        assert_eq!(lines[0], "/work");
        assert!(lines.contains(&"usr") && lines.contains(&"work"));
        for host_only in ["home", "root", "tmp", "proc"] {
            assert!(!lines.contains(&host_only), "{host_only} visible: {lines:?}");
        }
    }

    #[test]
    fn test_runner_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ExecutionRunner>();
    }
}
