/// Per-request sandbox sessions
///
/// Every request gets its own directory `<base_dir>/<uuid>`. Writes are
/// confined to it, children run inside it, and it is removed when the
/// session is dropped.
use crate::config::types::{Result, SandboxError};
use crate::exec::executor::{ProcessExecutor, SpawnOutcome, SpawnSpec};
use crate::kernel::mount::JAIL_WORKDIR;
use crate::observability::audit;
use crate::safety::{confine, safe_cleanup};
use crate::utils::env_hygiene::EnvHygiene;
use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use uuid::Uuid;

/// One confined directory plus the bookkeeping of the request that owns it.
pub struct SandboxSession {
    id: String,
    sequence: u64,
    root: PathBuf,
    created_at: DateTime<Utc>,
    temp_counter: AtomicU64,
    env: EnvHygiene,
    cleaned: bool,
}

impl SandboxSession {
    fn create(base_dir: &Path, sequence: u64) -> Result<Self> {
        let id = Uuid::new_v4().to_string();
        let root = base_dir.join(&id);

        fs::create_dir(&root).map_err(|e| {
            SandboxError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to create session directory {}: {}", root.display(), e),
            ))
        })?;
        fs::set_permissions(&root, fs::Permissions::from_mode(0o700))?;

        audit::session_created(&id, &root);
        Ok(Self {
            id,
            sequence,
            root,
            created_at: Utc::now(),
            temp_counter: AtomicU64::new(0),
            env: EnvHygiene::new(),
            cleaned: false,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Monotonic per-manager request number
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Atomically write `content` to `relative_path` inside the session.
    ///
    /// The data goes to a temp file in the destination directory, is synced,
    /// and is then renamed over the target (`overwrite`) or hard-linked to it,
    /// which fails if the target appeared meanwhile.
    pub fn write_file(
        &self,
        relative_path: impl AsRef<Path>,
        content: &[u8],
        overwrite: bool,
    ) -> Result<PathBuf> {
        let relative_path = relative_path.as_ref();
        let target = confine::resolve_within(&self.root, relative_path)?;
        let parent = confine::prepare_parent(&self.root, &target)?;
        let file_name = target
            .file_name()
            .ok_or_else(|| SandboxError::path_escape(relative_path))?;
        let final_path = parent.join(file_name);

        if !overwrite && fs::symlink_metadata(&final_path).is_ok() {
            return Err(SandboxError::AlreadyExists {
                path: relative_path.display().to_string(),
            });
        }

        let temp_path = parent.join(format!(
            ".{}.{}.tmp",
            file_name.to_string_lossy(),
            self.temp_counter.fetch_add(1, Ordering::Relaxed)
        ));
        let result = write_synced(&temp_path, content).and_then(|()| {
            if overwrite {
                fs::rename(&temp_path, &final_path).map_err(SandboxError::from)
            } else {
                match fs::hard_link(&temp_path, &final_path) {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                        Err(SandboxError::AlreadyExists {
                            path: relative_path.display().to_string(),
                        })
                    }
                    Err(e) => Err(SandboxError::Io(e)),
                }
            }
        });

        // after a rename the temp name is already gone
        if temp_path.exists() {
            if let Err(e) = fs::remove_file(&temp_path) {
                log::warn!(
                    "session {} left temp file {} behind: {}",
                    self.id,
                    temp_path.display(),
                    e
                );
            }
        }
        result?;

        match fs::File::open(&parent).and_then(|dir| dir.sync_all()) {
            Ok(()) => {}
            Err(e) => log::warn!(
                "session {} could not sync directory {}: {}",
                self.id,
                parent.display(),
                e
            ),
        }
        log::debug!(
            "session {} wrote {} bytes to {}",
            self.id,
            content.len(),
            relative_path.display()
        );
        Ok(final_path)
    }

    /// Run a program with its cwd, HOME and TMPDIR pinned to the session.
    /// Inside a jail the session is seen at [`JAIL_WORKDIR`].
    pub fn spawn(&self, spec: &SpawnSpec) -> Result<SpawnOutcome> {
        let home = if spec.jail_binds.is_some() {
            Path::new(JAIL_WORKDIR)
        } else {
            self.root.as_path()
        };
        let executor = ProcessExecutor::new(&self.root, self.env.environment(home));
        let outcome = executor.execute(spec)?;
        if outcome.timed_out {
            audit::timeout_kill(&self.id, &spec.program, spec.timeout.as_millis() as u64);
        }
        Ok(outcome)
    }

    /// Remove the session directory (idempotent)
    pub fn cleanup(&mut self) -> Result<()> {
        if self.cleaned {
            return Ok(());
        }
        match safe_cleanup::remove_tree_secure(&self.root) {
            Ok(()) => {
                self.cleaned = true;
                audit::session_cleaned(&self.id, &self.root);
                Ok(())
            }
            Err(e) => {
                audit::cleanup_failure(&self.id, &self.root, &e.to_string());
                Err(e)
            }
        }
    }
}

fn write_synced(path: &Path, content: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(content)?;
    file.sync_all()?;
    Ok(())
}

impl Drop for SandboxSession {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            log::warn!("Failed to remove session directory {}: {}", self.root.display(), e);
        }
    }
}

/// Creates sessions under one base directory and sweeps leftovers.
pub struct WorkspaceManager {
    base_dir: PathBuf,
    sequence: AtomicU64,
}

impl WorkspaceManager {
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_dir).map_err(|e| {
            SandboxError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to create workspace base directory {}: {}", base_dir.display(), e),
            ))
        })?;

        Ok(Self {
            base_dir,
            sequence: AtomicU64::new(0),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn create_session(&self) -> Result<SandboxSession> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        SandboxSession::create(&self.base_dir, sequence)
    }

    /// Remove session directories older than `max_age`.
    ///
    /// Only entries named like a session (a UUID) are considered, so a shared
    /// base directory never loses unrelated files.
    pub fn cleanup_stale(&self, max_age: Duration) -> Result<usize> {
        let mut cleaned = 0;
        let now = std::time::SystemTime::now();

        for entry in fs::read_dir(&self.base_dir)? {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    log::warn!("Failed to read directory entry: {}", e);
                    continue;
                }
            };

            let is_session_name = entry
                .file_name()
                .to_str()
                .map(|name| Uuid::parse_str(name).is_ok())
                .unwrap_or(false);
            if !is_session_name {
                continue;
            }

            let path = entry.path();
            let metadata = match fs::symlink_metadata(&path) {
                Ok(m) if m.is_dir() => m,
                Ok(_) => continue,
                Err(e) => {
                    log::warn!("Failed to get metadata for {}: {}", path.display(), e);
                    continue;
                }
            };

            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok());
            match age {
                Some(age) if age >= max_age => {}
                _ => continue,
            }

            log::info!("Removing stale session directory {}", path.display());
            match safe_cleanup::remove_tree_secure(&path) {
                Ok(()) => cleaned += 1,
                Err(e) => log::warn!("Failed to remove stale session {}: {}", path.display(), e),
            }
        }

        Ok(cleaned)
    }
}
