/// Process execution and supervision inside a session directory
use crate::config::types::{Result, SandboxError};
use crate::exec::preexec::{PreExecPlan, ResourceLimits};
use crate::kernel::mount::JailPlan;
use crate::kernel::namespace::NamespaceIsolation;
use crate::kernel::signal::{group_alive, signal_group};
use crate::observability::audit;
use crate::utils::output::{CapturedStream, OutputCollector, OutputLimits};
use nix::sys::signal::Signal;
use std::collections::BTreeMap;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// What to run and under which budgets
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
    /// Time between SIGTERM and SIGKILL on timeout
    pub kill_grace: Duration,
    pub limits: ResourceLimits,
    pub output: OutputLimits,
    pub isolate_network: bool,
    /// Host paths bound read-only into a filesystem jail; `None` runs
    /// without one
    pub jail_binds: Option<Vec<PathBuf>>,
}

impl SpawnSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: Duration::from_secs(10),
            kill_grace: Duration::from_millis(100),
            limits: ResourceLimits::default(),
            output: OutputLimits::default(),
            isolate_network: false,
            jail_binds: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone)]
pub struct SpawnOutcome {
    pub exit_code: Option<i32>,
    /// Terminating signal when the child did not exit normally
    pub signal: Option<i32>,
    pub stdout: CapturedStream,
    pub stderr: CapturedStream,
    pub timed_out: bool,
    pub wall_time: Duration,
    /// Process group the child led
    pub pgid: i32,
}

impl SpawnOutcome {
    pub fn exited_cleanly(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Runs one program with `cwd` and environment fixed to a session.
pub struct ProcessExecutor {
    workdir: PathBuf,
    env: BTreeMap<String, String>,
}

impl ProcessExecutor {
    pub fn new(workdir: &Path, env: BTreeMap<String, String>) -> Self {
        Self {
            workdir: workdir.to_path_buf(),
            env,
        }
    }

    /// Spawn, supervise until exit or timeout, and collect output.
    ///
    /// The child leads a fresh process group. On timeout the whole group gets
    /// SIGTERM, then SIGKILL after `kill_grace`. Once the leader is reaped any
    /// remaining group members are killed as well.
    pub fn execute(&self, spec: &SpawnSpec) -> Result<SpawnOutcome> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .current_dir(&self.workdir)
            .env_clear()
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);

        let plan = match &spec.jail_binds {
            Some(binds) => PreExecPlan::new(
                spec.limits,
                NamespaceIsolation::jailed(spec.isolate_network),
            )
            .with_jail(JailPlan::build(&self.workdir, binds)?),
            None => PreExecPlan::new(spec.limits, NamespaceIsolation::new(spec.isolate_network)),
        };
        unsafe {
            command.pre_exec(move || plan.apply());
        }

        let start = Instant::now();
        let mut child = command.spawn().map_err(|e| {
            audit::launch_failure(&spec.program, &e.to_string());
            SandboxError::LaunchFailure {
                program: spec.program.clone(),
                reason: e.to_string(),
            }
        })?;
        let pgid = child.id() as i32;
        log::debug!(
            "spawned {} (pgid {}) in {}",
            spec.program,
            pgid,
            self.workdir.display()
        );

        let collector =
            OutputCollector::start(child.stdout.take(), child.stderr.take(), &spec.output);

        let (status, timed_out) = match self.wait_with_timeout(&mut child, spec.timeout) {
            Ok(Some(status)) => (status, false),
            Ok(None) => (terminate_group(&mut child, pgid, spec.kill_grace)?, true),
            Err(e) => {
                let _ = signal_group(pgid, Signal::SIGKILL);
                let _ = child.wait();
                return Err(e);
            }
        };

        // grandchildren may still hold the pipes open
        if let Err(e) = signal_group(pgid, Signal::SIGKILL) {
            log::warn!("failed to sweep process group {}: {}", pgid, e);
        }

        let (stdout, stderr) = collector.finish();
        let wall_time = start.elapsed();

        Ok(SpawnOutcome {
            exit_code: status.code(),
            signal: status.signal(),
            stdout,
            stderr,
            timed_out,
            wall_time,
            pgid,
        })
    }

    /// `Ok(None)` when the deadline passed with the child still running
    fn wait_with_timeout(&self, child: &mut Child, timeout: Duration) -> Result<Option<ExitStatus>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

/// SIGTERM the group, wait up to `grace`, then SIGKILL and reap the leader.
fn terminate_group(child: &mut Child, pgid: i32, grace: Duration) -> Result<ExitStatus> {
    signal_group(pgid, Signal::SIGTERM)?;

    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if child.try_wait()?.is_some() && !group_alive(pgid) {
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }

    signal_group(pgid, Signal::SIGKILL)?;
    Ok(child.wait()?)
}
