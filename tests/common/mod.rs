#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use treebox::config::settings::RunnerConfig;
use treebox::core::runner::ExecutionRunner;
use treebox::tree::Node;

/// Absolute path of a host `python3`, if there is one
pub fn python3() -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join("python3"))
        .find(|candidate| candidate.is_file())
}

fn base_config(base: &Path) -> RunnerConfig {
    let mut config = RunnerConfig {
        base_dir: base.to_path_buf(),
        timeout_ms: 1_000,
        ..RunnerConfig::default()
    };
    if let Some(python) = python3() {
        config.python_path = python;
    }
    config
}

/// Whether this host lets an unprivileged process build the filesystem jail
pub fn jail_supported() -> bool {
    static SUPPORTED: OnceLock<bool> = OnceLock::new();
    *SUPPORTED.get_or_init(|| {
        let base = tempfile::tempdir().unwrap();
        match ExecutionRunner::new(base_config(base.path())) {
            Ok(_) => true,
            Err(e) => {
                eprintln!("running without the filesystem jail: {e}");
                false
            }
        }
    })
}

/// Config rooted at `base` with a short timeout and a resolved interpreter.
/// The jail is on wherever the host supports it.
pub fn config(base: &Path) -> RunnerConfig {
    RunnerConfig {
        filesystem_jail: jail_supported(),
        ..base_config(base)
    }
}

/// Processes whose command line contains `marker`, after giving killed ones
/// up to two seconds to be reaped
pub fn survivors(marker: &str) -> usize {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        let count = matching_processes(marker);
        if count == 0 || Instant::now() >= deadline {
            return count;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

fn matching_processes(marker: &str) -> usize {
    let Ok(proc) = std::fs::read_dir("/proc") else {
        return 0;
    };
    proc.filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().parse::<u32>().is_ok())
        .filter_map(|entry| std::fs::read(entry.path().join("cmdline")).ok())
        .filter(|cmdline| {
            let text: Vec<u8> = cmdline.iter().map(|&b| if b == 0 { b' ' } else { b }).collect();
            String::from_utf8_lossy(&text).contains(marker)
        })
        .count()
}

pub fn stmt(kind: &str, children: Vec<Node>) -> Node {
    Node::new(kind).with_children(children)
}

pub fn print(arg: Node) -> Node {
    Node::call(Node::identifier("print"), vec![arg])
}

/// Number of entries directly under `dir`
pub fn entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}
