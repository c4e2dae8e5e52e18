//! Integration tests for sessions, confinement and execution.
//!
//! Tests that execute generated programs need a `python3` on the host and
//! skip with a message when there is none.

mod common;

use common::{config, entries, jail_supported, print, python3, stmt, survivors};
use treebox::config::settings::RunnerConfig;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use treebox::config::types::{ExecutionResult, FailureKind, SandboxError};
use treebox::core::runner::ExecutionRunner;
use treebox::core::types::{CommandSpec, Submission};
use treebox::safety::workspace::WorkspaceManager;
use treebox::tree::Node;

macro_rules! require_jail {
    () => {
        if !jail_supported() {
            eprintln!("filesystem jail unavailable, skipping");
            return;
        }
    };
}

macro_rules! require_python {
    () => {
        if python3().is_none() {
            eprintln!("python3 not found, skipping");
            return;
        }
    };
}

#[test]
fn test_write_file_refuses_escapes() {
    let base = tempfile::tempdir().unwrap();
    let outside = tempfile::tempdir().unwrap();
    let manager = WorkspaceManager::new(base.path().to_path_buf()).unwrap();
    let session = manager.create_session().unwrap();

    std::os::unix::fs::symlink(outside.path(), session.root().join("link")).unwrap();

    for bad in ["../escape.py", "/tmp/escape.py", "link/escape.py", "a/../../escape.py"] {
        let err = session.write_file(bad, b"print(1)\n", true).unwrap_err();
        assert!(
            matches!(err, SandboxError::PathEscape { .. }),
            "{bad} should be refused, got {err:?}"
        );
    }
    assert_eq!(entries(outside.path()), 0);
    assert!(!base.path().join("escape.py").exists());
}

#[test]
fn test_write_file_without_overwrite() {
    let base = tempfile::tempdir().unwrap();
    let manager = WorkspaceManager::new(base.path().to_path_buf()).unwrap();
    let session = manager.create_session().unwrap();

    let path = session.write_file("code.py", b"first", false).unwrap();
    let err = session.write_file("code.py", b"second", false).unwrap_err();
    assert!(matches!(err, SandboxError::AlreadyExists { .. }));
    assert_eq!(std::fs::read(&path).unwrap(), b"first");

    session.write_file("code.py", b"third", true).unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), b"third");
}

#[test]
fn test_sessions_are_removed_after_use() {
    let base = tempfile::tempdir().unwrap();
    let manager = WorkspaceManager::new(base.path().to_path_buf()).unwrap();
    let root = {
        let session = manager.create_session().unwrap();
        session.write_file("pkg/mod.py", b"x = 1\n", true).unwrap();
        session.root().to_path_buf()
    };
    assert!(!root.exists());
    assert_eq!(entries(base.path()), 0);
}

#[test]
fn test_echo_ok() {
    let base = tempfile::tempdir().unwrap();
    let runner = ExecutionRunner::new(config(base.path())).unwrap();
    let result = runner.submit(Submission::command("echo ok"));
    assert_eq!(result, ExecutionResult::success("ok\n"));
}

#[test]
fn test_command_cannot_read_outside() {
    let base = tempfile::tempdir().unwrap();
    let runner = ExecutionRunner::new(config(base.path())).unwrap();
    let result = runner.submit(Submission::command("cat ../../etc/passwd"));
    assert!(!result.is_success());
    assert_eq!(result.error_kind, Some(FailureKind::PathEscape));
    assert!(!result.stderr.contains("root:"));
    assert!(result.stdout.is_empty());
}

#[test]
fn test_command_cwd_is_the_session() {
    let base = tempfile::tempdir().unwrap();
    let runner = ExecutionRunner::new(config(base.path())).unwrap();
    let result = runner.run_command(&CommandSpec::new("touch marker && ls"));
    assert_eq!(result, ExecutionResult::success("marker\n"));
    // the session and its marker are gone
    assert_eq!(entries(base.path()), 0);
}

#[test]
fn test_command_with_own_sandbox_dir() {
    let base = tempfile::tempdir().unwrap();
    let other = tempfile::tempdir().unwrap();
    let runner = ExecutionRunner::new(config(base.path())).unwrap();
    let spec = CommandSpec::new("pwd").in_dir(other.path().to_path_buf());
    let result = runner.run_command(&spec);
    assert!(result.is_success(), "{result:?}");
    let pwd = std::path::PathBuf::from(result.stdout.trim_end());
    if runner.jailed() {
        assert_eq!(pwd, std::path::Path::new("/work"));
    } else {
        let canonical_other = std::fs::canonicalize(other.path()).unwrap();
        assert!(pwd.starts_with(other.path()) || pwd.starts_with(&canonical_other));
    }
    assert_eq!(entries(other.path()), 0);
}

#[test]
fn test_command_timeout_kills_group() {
    let base = tempfile::tempdir().unwrap();
    let runner = ExecutionRunner::new(config(base.path())).unwrap();
    let started = Instant::now();
    let result = runner.submit(Submission::command("sleep 31.25 & sleep 31.5"));
    assert_eq!(result.error_kind, Some(FailureKind::Timeout));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(survivors("sleep 31.25"), 0);
    assert_eq!(survivors("sleep 31.5"), 0);
}

#[test]
fn test_new_session_does_not_escape_timeout() {
    require_jail!();
    if !std::path::Path::new("/usr/bin/setsid").exists() {
        eprintln!("setsid not found, skipping");
        return;
    }
    let base = tempfile::tempdir().unwrap();
    let runner = ExecutionRunner::new(config(base.path())).unwrap();
    let result = runner.submit(Submission::command("setsid sleep 41.75 & sleep 41.5"));
    assert_eq!(result.error_kind, Some(FailureKind::Timeout));
    assert_eq!(survivors("sleep 41.75"), 0);
}

#[test]
fn test_new_session_does_not_outlive_a_finished_command() {
    require_jail!();
    if !std::path::Path::new("/usr/bin/setsid").exists() {
        eprintln!("setsid not found, skipping");
        return;
    }
    let base = tempfile::tempdir().unwrap();
    let runner = ExecutionRunner::new(config(base.path())).unwrap();
    let result = runner.submit(Submission::command("setsid sleep 42.25 >sleep.log 2>&1 & echo ok"));
    assert_eq!(result, ExecutionResult::success("ok\n"));
    assert_eq!(survivors("sleep 42.25"), 0);
}

#[test]
fn test_encoded_host_path_is_not_reachable() {
    require_jail!();
    let base = tempfile::tempdir().unwrap();
    let runner = ExecutionRunner::new(config(base.path())).unwrap();
    // passes the lexical screen; only the jail stops it
    let result = runner.submit(Submission::command(r#"cat "$(printf '\057etc\057passwd')""#));
    assert!(!result.is_success());
    assert!(!result.stdout.contains("root:"));
    assert!(!result.stderr.contains("root:"));
}

#[test]
fn test_program_cannot_open_host_files() {
    require_jail!();
    require_python!();
    let base = tempfile::tempdir().unwrap();
    let runner = ExecutionRunner::new(config(base.path())).unwrap();
    let read_passwd = Node::call(
        Node::new("attribute")
            .with_value("read")
            .with_child(Node::call(Node::identifier("open"), vec![Node::literal("/etc/passwd")])),
        vec![],
    );
    let result = runner.submit(Submission::program(print(read_passwd)));
    assert_eq!(result.error_kind, Some(FailureKind::RuntimeFault));
    assert!(result.stderr.contains("FileNotFoundError"), "{result:?}");
    assert!(!result.stdout.contains("root:"));
}

#[test]
fn test_program_writes_land_in_its_session_only() {
    require_jail!();
    require_python!();
    let base = tempfile::tempdir().unwrap();
    let runner = ExecutionRunner::new(config(base.path())).unwrap();
    // the jail root is read-only outside /work
    let write_root = Node::call(Node::identifier("open"), vec![Node::literal("/escape.txt"), Node::literal("w")]);
    let result = runner.submit(Submission::program(write_root));
    assert_eq!(result.error_kind, Some(FailureKind::RuntimeFault));
    assert!(result.stderr.contains("Error"), "{result:?}");
    assert!(!std::path::Path::new("/escape.txt").exists());
}

#[test]
fn test_unavailable_jail_is_a_startup_error() {
    if jail_supported() {
        return;
    }
    let base = tempfile::tempdir().unwrap();
    let config = RunnerConfig {
        filesystem_jail: true,
        ..config(base.path())
    };
    match ExecutionRunner::new(config) {
        Err(SandboxError::Config(message)) => assert!(message.contains("filesystem_jail")),
        Err(other) => panic!("unexpected error {other:?}"),
        Ok(_) => panic!("jail reported unsupported but runner started"),
    }
}

#[test]
fn test_nonzero_exit_is_runtime_fault() {
    let base = tempfile::tempdir().unwrap();
    let runner = ExecutionRunner::new(config(base.path())).unwrap();
    let result = runner.submit(Submission::command("exit 3"));
    assert_eq!(result.error_kind, Some(FailureKind::RuntimeFault));
    assert_eq!(result.stderr, "process exited with status 3");
}

#[test]
fn test_print_hi_end_to_end() {
    require_python!();
    let base = tempfile::tempdir().unwrap();
    let runner = ExecutionRunner::new(config(base.path())).unwrap();
    let result = runner.submit(Submission::program(print(Node::literal("hi"))));
    assert_eq!(result, ExecutionResult::success("hi\n"));
}

#[test]
fn test_unknown_kind_end_to_end() {
    let base = tempfile::tempdir().unwrap();
    let runner = ExecutionRunner::new(config(base.path())).unwrap();
    let result = runner.submit(Submission::program(Node::new("frobnicate")));
    assert!(!result.is_success());
    assert_eq!(result.error_kind, Some(FailureKind::TranslationError));
    assert!(result.stderr.contains("frobnicate"));
}

#[test]
fn test_python_exception_is_runtime_fault() {
    require_python!();
    let base = tempfile::tempdir().unwrap();
    let runner = ExecutionRunner::new(config(base.path())).unwrap();
    let tree = print(Node::binary("/", Node::literal(1), Node::literal(0)));
    let result = runner.submit(Submission::program(tree));
    assert_eq!(result.error_kind, Some(FailureKind::RuntimeFault));
    assert!(result.stderr.contains("ZeroDivisionError"));
    assert!(result.stdout.is_empty());
}

#[test]
fn test_infinite_loop_times_out() {
    require_python!();
    let base = tempfile::tempdir().unwrap();
    let runner = ExecutionRunner::new(config(base.path())).unwrap();
    let tree = stmt("while", vec![Node::literal(true), Node::block(vec![Node::new("pass")])]);

    let started = Instant::now();
    let result = runner.submit(Submission::program(tree));
    assert_eq!(result.error_kind, Some(FailureKind::Timeout));
    assert!(result.stderr.contains("1000 ms"));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(entries(base.path()), 0);
}

#[test]
fn test_named_file_is_used() {
    require_python!();
    let base = tempfile::tempdir().unwrap();
    let runner = ExecutionRunner::new(config(base.path())).unwrap();
    // __file__ ends with the stored name
    let tree = print(Node::call(
        Node::new("attribute")
            .with_value("endswith")
            .with_child(Node::identifier("__file__")),
        vec![Node::literal("main.py")],
    ));
    let result = runner.submit(Submission::Program {
        filename: Some("main.py".into()),
        tree,
    });
    assert_eq!(result, ExecutionResult::success("True\n"));
}

#[test]
fn test_concurrent_default_filename_isolation() {
    require_python!();
    let base = tempfile::tempdir().unwrap();
    let runner = Arc::new(ExecutionRunner::new(config(base.path())).unwrap());

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let runner = Arc::clone(&runner);
            thread::spawn(move || {
                let tree = print(Node::literal(format!("request {i}").as_str()));
                (i, runner.submit(Submission::program(tree)))
            })
        })
        .collect();

    for handle in handles {
        let (i, result) = handle.join().unwrap();
        assert_eq!(result, ExecutionResult::success(format!("request {i}\n")));
    }
    assert_eq!(entries(base.path()), 0);
}

#[test]
fn test_stale_sessions_are_swept() {
    let base = tempfile::tempdir().unwrap();
    let manager = WorkspaceManager::new(base.path().to_path_buf()).unwrap();
    let stale = base.path().join(uuid::Uuid::new_v4().to_string());
    std::fs::create_dir(&stale).unwrap();
    std::fs::write(stale.join("code.py"), "print(1)").unwrap();
    std::fs::write(base.path().join("unrelated.txt"), "keep").unwrap();

    let removed = manager.cleanup_stale(Duration::ZERO).unwrap();
    assert_eq!(removed, 1);
    assert!(!stale.exists());
    assert!(base.path().join("unrelated.txt").exists());
}
