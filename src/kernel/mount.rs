/// Filesystem jail assembled from bind mounts
///
/// Inside a private mount namespace the session directory is covered by a
/// tmpfs that becomes the child's root. Host system directories are bound
/// into it read-only, a handful of device nodes are bound as-is, and the
/// session itself is bound writable at [`JAIL_WORKDIR`]. After `pivot_root`
/// the old root is detached, so no other host path can be named.
use crate::config::types::{Result, SandboxError};
use libc::{c_char, c_ulong};
use nix::sys::statvfs::{statvfs, FsFlags};
use std::collections::BTreeSet;
use std::ffi::CString;
use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Component, Path, PathBuf};
use std::ptr;

/// Where the session directory appears inside the jail
pub const JAIL_WORKDIR: &str = "/work";

/// Host paths every jail gets read-only. Missing ones are skipped.
pub const DEFAULT_BINDS: &[&str] = &[
    "/usr",
    "/bin",
    "/sbin",
    "/lib",
    "/lib32",
    "/lib64",
    "/etc/ld.so.cache",
    "/etc/alternatives",
];

const DEVICES: &[&str] = &["/dev/null", "/dev/zero", "/dev/random", "/dev/urandom"];

#[derive(Debug)]
enum EntryKind {
    Dir,
    File,
    /// Recreated inside the jail with the same link text
    Symlink(CString),
}

#[derive(Debug)]
struct JailEntry {
    source: CString,
    target: CString,
    kind: EntryKind,
    /// Flags for the read-only remount; `None` keeps the bind writable
    remount: Option<c_ulong>,
}

/// Every path and flag the child needs, rendered in the parent so the child
/// only issues syscalls.
#[derive(Debug)]
pub struct JailPlan {
    root: CString,
    dirs: Vec<CString>,
    entries: Vec<JailEntry>,
    work_mount: CString,
    workdir: CString,
}

impl JailPlan {
    /// Plan a jail whose root covers `session_root`.
    ///
    /// `binds` must be absolute. A path below an earlier directory bind is
    /// already visible and is skipped, as is a path missing on the host.
    pub fn build(session_root: &Path, binds: &[PathBuf]) -> Result<Self> {
        let root = session_root.canonicalize()?;
        let mut dirs = BTreeSet::new();
        let mut entries = Vec::new();
        let mut bound_dirs: Vec<&Path> = Vec::new();

        for source in binds {
            if bound_dirs.iter().any(|dir| source.starts_with(dir)) {
                continue;
            }
            let metadata = match fs::symlink_metadata(source) {
                Ok(m) => m,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    log::debug!("jail bind {} does not exist, skipping", source.display());
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let target = jail_path(&root, source)?;
            collect_parents(&root, &target, &mut dirs);

            let (kind, remount) = if metadata.file_type().is_symlink() {
                (EntryKind::Symlink(cstring(&fs::read_link(source)?)?), None)
            } else if metadata.is_dir() {
                bound_dirs.push(source);
                (EntryKind::Dir, Some(readonly_flags(source)?))
            } else {
                (EntryKind::File, Some(readonly_flags(source)?))
            };
            entries.push(JailEntry {
                source: cstring(source)?,
                target: cstring(&target)?,
                kind,
                remount,
            });
        }

        for device in DEVICES {
            let source = Path::new(device);
            if !source.exists() {
                continue;
            }
            let target = jail_path(&root, source)?;
            collect_parents(&root, &target, &mut dirs);
            entries.push(JailEntry {
                source: cstring(source)?,
                target: cstring(&target)?,
                kind: EntryKind::File,
                remount: None,
            });
        }

        let work_mount = jail_path(&root, Path::new(JAIL_WORKDIR))?;
        Ok(Self {
            root: cstring(&root)?,
            dirs: dirs
                .iter()
                .map(|dir| cstring(dir))
                .collect::<Result<Vec<_>>>()?,
            entries,
            work_mount: cstring(&work_mount)?,
            workdir: cstring(Path::new(JAIL_WORKDIR))?,
        })
    }

    /// Assemble the jail and pivot into it.
    ///
    /// Must run in a fresh mount namespace with the session root as cwd.
    /// Runs between fork and exec: no allocation, no logging.
    pub fn apply_in_child(&self) -> io::Result<()> {
        sys_mount(ptr::null(), lit(b"/\0"), ptr::null(), libc::MS_REC | libc::MS_PRIVATE, ptr::null())?;
        sys_mount(
            lit(b"tmpfs\0"),
            self.root.as_ptr(),
            lit(b"tmpfs\0"),
            libc::MS_NOSUID | libc::MS_NODEV,
            lit(b"mode=0755\0"),
        )?;

        for dir in &self.dirs {
            sys_mkdir(dir.as_ptr())?;
        }

        for entry in &self.entries {
            let target = entry.target.as_ptr();
            match &entry.kind {
                EntryKind::Dir => sys_mkdir(target)?,
                EntryKind::File => sys_touch(target)?,
                EntryKind::Symlink(link) => {
                    if unsafe { libc::symlink(link.as_ptr(), target) } != 0 {
                        return Err(io::Error::last_os_error());
                    }
                    continue;
                }
            }
            sys_mount(entry.source.as_ptr(), target, ptr::null(), libc::MS_BIND | libc::MS_REC, ptr::null())?;
            if let Some(flags) = entry.remount {
                sys_mount(ptr::null(), target, ptr::null(), flags, ptr::null())?;
            }
        }

        // "." is still the session directory underneath the tmpfs
        sys_mkdir(self.work_mount.as_ptr())?;
        sys_mount(lit(b".\0"), self.work_mount.as_ptr(), ptr::null(), libc::MS_BIND, ptr::null())?;

        sys_mount(
            ptr::null(),
            self.root.as_ptr(),
            ptr::null(),
            libc::MS_REMOUNT | libc::MS_RDONLY | libc::MS_NOSUID | libc::MS_NODEV,
            ptr::null(),
        )?;

        check(unsafe { libc::chdir(self.root.as_ptr()) })?;
        let rc = unsafe { libc::syscall(libc::SYS_pivot_root, lit(b".\0"), lit(b".\0")) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        check(unsafe { libc::umount2(lit(b".\0"), libc::MNT_DETACH) })?;
        check(unsafe { libc::chdir(self.workdir.as_ptr()) })?;
        Ok(())
    }
}

/// Install prefix of an interpreter, e.g. `/opt/conda` for
/// `/opt/conda/bin/python3`. `None` for bare names found through PATH.
pub fn install_prefix(program: &Path) -> Option<PathBuf> {
    if !program.is_absolute() {
        return None;
    }
    let resolved = program.canonicalize().ok()?;
    let prefix = resolved.parent()?.parent()?;
    if prefix == Path::new("/") {
        return None;
    }
    Some(prefix.to_path_buf())
}

fn jail_path(root: &Path, host: &Path) -> Result<PathBuf> {
    let mut path = root.to_path_buf();
    let mut absolute = false;
    for component in host.components() {
        match component {
            Component::RootDir => absolute = true,
            Component::Normal(part) => path.push(part),
            _ => absolute = false,
        }
    }
    if !absolute || path == root {
        return Err(SandboxError::Config(format!(
            "jail bind paths must be absolute and normalized: {}",
            host.display()
        )));
    }
    Ok(path)
}

fn collect_parents(root: &Path, target: &Path, dirs: &mut BTreeSet<PathBuf>) {
    let mut parent = target.parent();
    while let Some(dir) = parent {
        if dir == root || !dir.starts_with(root) {
            break;
        }
        dirs.insert(dir.to_path_buf());
        parent = dir.parent();
    }
}

/// Flags for a read-only bind remount that keep the host mount's locked
/// nodev/noexec/atime settings, which a user namespace cannot clear.
fn readonly_flags(source: &Path) -> Result<c_ulong> {
    let host = statvfs(source).map_err(io::Error::from)?.flags();
    let mut flags = libc::MS_REMOUNT | libc::MS_BIND | libc::MS_RDONLY | libc::MS_NOSUID;
    if host.contains(FsFlags::ST_NODEV) {
        flags |= libc::MS_NODEV;
    }
    if host.contains(FsFlags::ST_NOEXEC) {
        flags |= libc::MS_NOEXEC;
    }
    if host.contains(FsFlags::ST_NOATIME) {
        flags |= libc::MS_NOATIME;
    } else if host.contains(FsFlags::ST_RELATIME) {
        flags |= libc::MS_RELATIME;
    } else {
        flags |= libc::MS_STRICTATIME;
    }
    if host.contains(FsFlags::ST_NODIRATIME) {
        flags |= libc::MS_NODIRATIME;
    }
    Ok(flags)
}

fn cstring(path: &Path) -> Result<CString> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| {
        SandboxError::Config(format!("path contains a NUL byte: {}", path.display()))
    })
}

fn lit(bytes: &'static [u8]) -> *const c_char {
    bytes.as_ptr() as *const c_char
}

fn check(rc: libc::c_int) -> io::Result<()> {
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn sys_mount(
    source: *const c_char,
    target: *const c_char,
    fstype: *const c_char,
    flags: c_ulong,
    data: *const c_char,
) -> io::Result<()> {
    check(unsafe { libc::mount(source, target, fstype, flags, data as *const libc::c_void) })
}

fn sys_mkdir(path: *const c_char) -> io::Result<()> {
    if unsafe { libc::mkdir(path, 0o755) } == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::EEXIST) {
        return Ok(());
    }
    Err(err)
}

fn sys_touch(path: *const c_char) -> io::Result<()> {
    let fd = unsafe {
        libc::open(
            path,
            libc::O_CREAT | libc::O_WRONLY | libc::O_CLOEXEC,
            0o644 as libc::c_uint,
        )
    };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    unsafe { libc::close(fd) };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets(plan: &JailPlan) -> Vec<String> {
        plan.entries
            .iter()
            .map(|e| e.target.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_plan_skips_missing_and_nested_binds() {
        let session = tempfile::tempdir().unwrap();
        let root = session.path().canonicalize().unwrap();
        let binds = vec![
            PathBuf::from("/usr"),
            PathBuf::from("/usr/bin"),
            PathBuf::from("/treebox-no-such-dir"),
        ];
        let plan = JailPlan::build(session.path(), &binds).unwrap();
        let targets = targets(&plan);

        let usr = root.join("usr").display().to_string();
        assert_eq!(targets.iter().filter(|t| t.starts_with(&usr)).count(), 1);
        assert!(!targets.iter().any(|t| t.contains("treebox-no-such-dir")));
        assert_eq!(
            plan.work_mount.to_string_lossy(),
            root.join("work").display().to_string()
        );
    }

    #[test]
    fn test_system_binds_are_read_only_devices_are_not() {
        let session = tempfile::tempdir().unwrap();
        let plan = JailPlan::build(session.path(), &[PathBuf::from("/usr")]).unwrap();
        for entry in &plan.entries {
            let target = entry.target.to_string_lossy();
            if target.ends_with("/dev/null") {
                assert!(entry.remount.is_none());
            }
            if target.ends_with("/usr") {
                let flags = entry.remount.unwrap();
                assert_ne!(flags & libc::MS_RDONLY, 0);
                assert_ne!(flags & libc::MS_BIND, 0);
            }
        }
    }

    #[test]
    fn test_parents_are_created_before_children() {
        let session = tempfile::tempdir().unwrap();
        let root = session.path().canonicalize().unwrap();
        let plan = JailPlan::build(session.path(), &[PathBuf::from("/etc/ld.so.cache")]).unwrap();
        let dirs: Vec<_> = plan.dirs.iter().map(|d| d.to_string_lossy().into_owned()).collect();
        // /dev for the device nodes
        assert!(dirs.contains(&root.join("dev").display().to_string()));
        if Path::new("/etc/ld.so.cache").exists() {
            assert!(dirs.contains(&root.join("etc").display().to_string()));
        }
    }

    #[test]
    fn test_relative_bind_is_rejected() {
        let session = tempfile::tempdir().unwrap();
        std::fs::create_dir(session.path().join("lib")).unwrap();
        let err = JailPlan::build(session.path(), &[session.path().join("lib/../lib")]);
        assert!(matches!(err, Err(SandboxError::Config(_))));
    }

    #[test]
    fn test_install_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("env/bin");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::write(bin.join("python3"), "").unwrap();

        let prefix = install_prefix(&bin.join("python3")).unwrap();
        assert_eq!(prefix, dir.path().canonicalize().unwrap().join("env"));
        assert_eq!(install_prefix(Path::new("python3")), None);
    }
}
