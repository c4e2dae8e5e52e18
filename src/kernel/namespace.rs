/// Namespace isolation for sandboxed children
///
/// Every mode that unshares anything starts with a user namespace so an
/// unprivileged server can own the mount, pid and network namespaces. The
/// caller's uid and gid are mapped onto themselves inside it.
use nix::sched::{unshare, CloneFlags};
use nix::unistd::{getgid, getuid};
use std::io;

const SETGROUPS_PATH: &[u8] = b"/proc/self/setgroups\0";
const UID_MAP_PATH: &[u8] = b"/proc/self/uid_map\0";
const GID_MAP_PATH: &[u8] = b"/proc/self/gid_map\0";

/// Namespaces a child can be moved into before exec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NamespaceIsolation {
    /// Private mount table, needed for the filesystem jail
    pub mount: bool,
    /// New pid namespace; the child's first fork becomes its init
    pub pid: bool,
    /// New network namespace containing only a down loopback device
    pub network: bool,
}

impl NamespaceIsolation {
    pub fn new(network: bool) -> Self {
        Self {
            network,
            ..Self::default()
        }
    }

    /// Mount and pid namespaces for the filesystem jail, plus network if asked
    pub fn jailed(network: bool) -> Self {
        Self {
            mount: true,
            pid: true,
            network,
        }
    }

    /// Check if namespaces are visible on this system
    pub fn is_supported() -> bool {
        std::fs::read_dir("/proc/self/ns").is_ok()
    }

    pub fn is_empty(&self) -> bool {
        !(self.mount || self.pid || self.network)
    }

    pub fn clone_flags(&self) -> CloneFlags {
        let mut flags = CloneFlags::empty();
        if self.is_empty() {
            return flags;
        }
        flags |= CloneFlags::CLONE_NEWUSER;
        if self.mount {
            flags |= CloneFlags::CLONE_NEWNS;
        }
        if self.pid {
            flags |= CloneFlags::CLONE_NEWPID;
        }
        if self.network {
            flags |= CloneFlags::CLONE_NEWNET;
        }
        flags
    }

    /// Identity maps for the current user, rendered in the parent
    pub fn id_maps(&self) -> IdMaps {
        IdMaps::current()
    }

    /// Unshare the configured namespaces for the calling process and write
    /// the id maps of the new user namespace.
    ///
    /// Runs between fork and exec: no allocation, no logging.
    pub fn apply_in_child(&self, maps: &IdMaps) -> io::Result<()> {
        let flags = self.clone_flags();
        if flags.is_empty() {
            return Ok(());
        }
        unshare(flags).map_err(io::Error::from)?;

        // setgroups must be denied before an unprivileged gid_map write
        write_proc(SETGROUPS_PATH, b"deny")?;
        write_proc(GID_MAP_PATH, &maps.gid_map)?;
        write_proc(UID_MAP_PATH, &maps.uid_map)?;
        Ok(())
    }
}

/// `"<id> <id> 1"` lines for uid_map and gid_map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdMaps {
    uid_map: Vec<u8>,
    gid_map: Vec<u8>,
}

impl IdMaps {
    pub fn current() -> Self {
        let uid = getuid().as_raw();
        let gid = getgid().as_raw();
        Self {
            uid_map: format!("{uid} {uid} 1").into_bytes(),
            gid_map: format!("{gid} {gid} 1").into_bytes(),
        }
    }
}

fn write_proc(path: &[u8], data: &[u8]) -> io::Result<()> {
    let fd = unsafe {
        libc::open(
            path.as_ptr() as *const libc::c_char,
            libc::O_WRONLY | libc::O_CLOEXEC,
        )
    };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    let written = unsafe { libc::write(fd, data.as_ptr() as *const libc::c_void, data.len()) };
    let result = if written < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    };
    unsafe { libc::close(fd) };
    result
}
