use crate::config::types::{Result, SandboxError};
use nix::dir::Dir;
use nix::errno::Errno;
use nix::fcntl::{AtFlags, OFlag};
use nix::sys::stat::{fstatat, FileStat, Mode};
use nix::unistd::{unlinkat, UnlinkatFlags};
use std::ffi::{CStr, CString};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

fn dir_flags() -> OFlag {
    OFlag::O_RDONLY | OFlag::O_DIRECTORY | OFlag::O_CLOEXEC | OFlag::O_NOFOLLOW
}

fn fs_error(op: &'static str, what: String) -> impl FnOnce(Errno) -> SandboxError {
    move |errno| SandboxError::Filesystem(format!("{op} failed for {what}: {errno}"))
}

fn is_dir(st: &FileStat) -> bool {
    st.st_mode & libc::S_IFMT == libc::S_IFDIR
}

fn stat_at(dir_fd: RawFd, name: &CStr) -> Result<FileStat> {
    fstatat(dir_fd, name, AtFlags::AT_SYMLINK_NOFOLLOW)
        .map_err(fs_error("fstatat", format!("{name:?}")))
}

/// Empty and remove the directory `name` under `parent_fd`.
///
/// Entry names are collected before anything is unlinked so the directory
/// stream is never read while it is being modified.
fn remove_dir_at(parent_fd: RawFd, name: &CStr, root_dev: libc::dev_t) -> Result<()> {
    let mut dir = Dir::openat(parent_fd, name, dir_flags(), Mode::empty())
        .map_err(fs_error("openat", format!("{name:?}")))?;
    let dir_fd = dir.as_raw_fd();

    let mut names: Vec<CString> = Vec::new();
    for entry in dir.iter() {
        let entry = entry.map_err(fs_error("readdir", format!("{name:?}")))?;
        let entry_name = entry.file_name();
        if matches!(entry_name.to_bytes(), b"." | b"..") {
            continue;
        }
        names.push(entry_name.to_owned());
    }

    for entry_name in &names {
        let st = stat_at(dir_fd, entry_name)?;
        if is_dir(&st) {
            if st.st_dev != root_dev {
                return Err(SandboxError::Filesystem(format!(
                    "refusing to cross filesystem boundary at {entry_name:?}"
                )));
            }
            remove_dir_at(dir_fd, entry_name, root_dev)?;
        } else {
            unlinkat(Some(dir_fd), entry_name.as_c_str(), UnlinkatFlags::NoRemoveDir)
                .map_err(fs_error("unlinkat", format!("{entry_name:?}")))?;
        }
    }
    drop(dir);

    unlinkat(Some(parent_fd), name, UnlinkatFlags::RemoveDir)
        .map_err(fs_error("rmdir", format!("{name:?}")))
}

/// Remove `path` and everything below it without following symlinks.
///
/// A symlink inside the tree is unlinked, never traversed, so a hostile
/// program cannot redirect cleanup outside its session directory.
pub fn remove_tree_secure(path: &Path) -> Result<()> {
    match std::fs::symlink_metadata(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(SandboxError::Io(e)),
        Ok(_) => {}
    }

    let parent = path.parent().ok_or_else(|| {
        SandboxError::Filesystem(format!("cannot remove path without parent: {}", path.display()))
    })?;
    let name = path.file_name().ok_or_else(|| {
        SandboxError::Filesystem(format!("cannot remove path without file name: {}", path.display()))
    })?;
    let name = CString::new(name.as_bytes()).map_err(|_| {
        SandboxError::Filesystem(format!("path contains NUL byte: {}", path.display()))
    })?;

    let parent_dir = Dir::open(parent, dir_flags(), Mode::empty())
        .map_err(fs_error("open", parent.display().to_string()))?;
    let parent_fd = parent_dir.as_raw_fd();

    let st = stat_at(parent_fd, &name)?;
    if is_dir(&st) {
        remove_dir_at(parent_fd, &name, st.st_dev)
    } else {
        unlinkat(Some(parent_fd), name.as_c_str(), UnlinkatFlags::NoRemoveDir)
            .map_err(fs_error("unlinkat", path.display().to_string()))
    }
}
