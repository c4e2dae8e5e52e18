/// Child-side setup between fork and exec.
///
/// The sequence is fixed:
/// 1. prctl(PR_SET_PDEATHSIG, SIGKILL) so the child dies with the server
/// 2. namespace unshare and id maps (when configured)
/// 3. filesystem jail and pivot_root (when configured)
/// 4. with a pid namespace, fork: the new process is pid 1 of the namespace
///    and goes on to exec, the old one stays behind as its supervisor
/// 5. rlimits
///
/// Process group placement is done by `Command::process_group` before this
/// hook runs. Nothing here allocates or logs; errors surface as the spawn
/// error in the parent.
use crate::kernel::mount::JailPlan;
use crate::kernel::namespace::{IdMaps, NamespaceIsolation};
use nix::sys::resource::{setrlimit, Resource};
use std::io;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceLimits {
    /// RLIMIT_FSIZE in bytes
    pub file_size: Option<u64>,
    /// RLIMIT_NOFILE
    pub open_files: Option<u64>,
    /// RLIMIT_AS in bytes
    pub address_space: Option<u64>,
}

#[derive(Debug)]
pub struct PreExecPlan {
    pub limits: ResourceLimits,
    pub namespaces: NamespaceIsolation,
    id_maps: IdMaps,
    jail: Option<JailPlan>,
}

fn limit(resource: Resource, value: u64) -> io::Result<()> {
    setrlimit(resource, value, value).map_err(io::Error::from)
}

fn die_with_parent() -> io::Result<()> {
    let rc = unsafe { libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL as libc::c_ulong) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

impl PreExecPlan {
    pub fn new(limits: ResourceLimits, namespaces: NamespaceIsolation) -> Self {
        Self {
            limits,
            namespaces,
            id_maps: namespaces.id_maps(),
            jail: None,
        }
    }

    /// Pivot into `jail` after the namespaces are in place
    pub fn with_jail(mut self, jail: JailPlan) -> Self {
        self.jail = Some(jail);
        self
    }

    pub fn apply(&self) -> io::Result<()> {
        die_with_parent()?;

        self.namespaces.apply_in_child(&self.id_maps)?;
        if let Some(jail) = &self.jail {
            jail.apply_in_child()?;
        }
        if self.namespaces.pid {
            become_namespace_init()?;
            die_with_parent()?;
        }

        limit(Resource::RLIMIT_CORE, 0)?;
        if let Some(bytes) = self.limits.file_size {
            limit(Resource::RLIMIT_FSIZE, bytes)?;
        }
        if let Some(count) = self.limits.open_files {
            limit(Resource::RLIMIT_NOFILE, count)?;
        }
        if let Some(bytes) = self.limits.address_space {
            limit(Resource::RLIMIT_AS, bytes)?;
        }
        Ok(())
    }
}

/// Fork into the pid namespace unshared earlier. Returns in the new child,
/// which is pid 1 there; when it dies the kernel kills everything else in
/// the namespace, including processes that left the process group.
///
/// The original process never returns: it closes every descriptor so the
/// parent's spawn sees the exec succeed, waits for pid 1 and exits the
/// same way it did.
fn become_namespace_init() -> io::Result<()> {
    match unsafe { libc::fork() } {
        -1 => Err(io::Error::last_os_error()),
        0 => Ok(()),
        init => supervise_init(init),
    }
}

fn supervise_init(init: libc::pid_t) -> ! {
    unsafe {
        if libc::syscall(libc::SYS_close_range, 0u32, u32::MAX, 0u32) != 0 {
            for fd in 0..1024 {
                libc::close(fd);
            }
        }

        let mut status = 0;
        loop {
            if libc::waitpid(init, &mut status, 0) == init {
                break;
            }
            if io::Error::last_os_error().raw_os_error() != Some(libc::EINTR) {
                libc::_exit(127);
            }
        }

        if libc::WIFSIGNALED(status) {
            let signal = libc::WTERMSIG(status);
            libc::signal(signal, libc::SIG_DFL);
            libc::kill(libc::getpid(), signal);
            libc::_exit(128 + signal);
        }
        libc::_exit(libc::WEXITSTATUS(status))
    }
}
