/// Bounded capture of child stdout/stderr
///
/// Each stream is drained by its own thread for as long as the pipe stays
/// open. Bytes beyond the per-stream budget are counted and discarded rather
/// than left in the pipe, so a chatty child never blocks on a full pipe.
use crate::config::types::OutputIntegrity;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::io::Read;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

/// Appended to a stream whose tail was dropped
pub const TRUNCATION_MARKER: &str = "\n[output truncated]\n";

#[derive(Debug, Clone, Copy)]
pub struct OutputLimits {
    pub stdout_limit: usize,
    pub stderr_limit: usize,
    /// How long to wait for readers once the child is gone
    pub drain_timeout: Duration,
}

impl Default for OutputLimits {
    fn default() -> Self {
        OutputLimits {
            stdout_limit: 1024 * 1024,
            stderr_limit: 256 * 1024,
            drain_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedStream {
    pub data: Vec<u8>,
    pub integrity: OutputIntegrity,
    /// Bytes the child wrote, including discarded ones
    pub total_bytes: u64,
}

impl CapturedStream {
    pub fn is_truncated(&self) -> bool {
        self.integrity == OutputIntegrity::TruncatedByLimit
    }

    /// Lossy UTF-8 text with the truncation marker when bytes were dropped
    pub fn render(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.data).into_owned();
        if self.is_truncated() {
            text.push_str(TRUNCATION_MARKER);
        }
        text
    }
}

fn lock(shared: &Mutex<CapturedStream>) -> MutexGuard<'_, CapturedStream> {
    match shared.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Read `stream` to EOF, keeping at most `limit` bytes in `shared`.
fn drain<R: Read>(mut stream: R, limit: usize, shared: &Mutex<CapturedStream>) {
    let mut chunk = [0u8; 8192];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                let mut captured = lock(shared);
                captured.total_bytes += n as u64;
                let room = limit.saturating_sub(captured.data.len());
                let keep = room.min(n);
                captured.data.extend_from_slice(&chunk[..keep]);
                if keep < n {
                    captured.integrity = OutputIntegrity::TruncatedByLimit;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                log::warn!("output stream read failed: {}", e);
                let mut captured = lock(shared);
                if captured.integrity == OutputIntegrity::Complete {
                    captured.integrity = OutputIntegrity::ReadError;
                }
                break;
            }
        }
    }
}

struct StreamReader {
    shared: Arc<Mutex<CapturedStream>>,
    done: Receiver<()>,
}

impl StreamReader {
    fn start<R: Read + Send + 'static>(stream: R, limit: usize) -> Self {
        let shared = Arc::new(Mutex::new(CapturedStream::default()));
        let (done_tx, done) = bounded(1);
        let worker_shared = Arc::clone(&shared);
        thread::spawn(move || {
            drain(stream, limit, &worker_shared);
            let _ = done_tx.send(());
        });
        StreamReader { shared, done }
    }

    /// Wait until `deadline` for EOF, then snapshot whatever was read
    fn finish(self, deadline: Instant) -> CapturedStream {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match self.done.recv_timeout(remaining) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            Err(RecvTimeoutError::Timeout) => {
                // a descendant outside the process group still holds the pipe
                log::warn!("output reader still busy after drain timeout; using partial capture");
            }
        }
        lock(&self.shared).clone()
    }
}

/// Collects both streams of one child process.
pub struct OutputCollector {
    stdout: Option<StreamReader>,
    stderr: Option<StreamReader>,
    drain_timeout: Duration,
}

impl OutputCollector {
    /// Start draining immediately; call before waiting on the child
    pub fn start<O, E>(stdout: Option<O>, stderr: Option<E>, limits: &OutputLimits) -> Self
    where
        O: Read + Send + 'static,
        E: Read + Send + 'static,
    {
        OutputCollector {
            stdout: stdout.map(|s| StreamReader::start(s, limits.stdout_limit)),
            stderr: stderr.map(|s| StreamReader::start(s, limits.stderr_limit)),
            drain_timeout: limits.drain_timeout,
        }
    }

    /// Returns `(stdout, stderr)`
    pub fn finish(self) -> (CapturedStream, CapturedStream) {
        let deadline = Instant::now() + self.drain_timeout;
        let stdout = self
            .stdout
            .map(|r| r.finish(deadline))
            .unwrap_or_default();
        let stderr = self
            .stderr
            .map(|r| r.finish(deadline))
            .unwrap_or_default();
        (stdout, stderr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::process::{Command, Stdio};

    #[test]
    fn test_drain_within_limit() {
        let shared = Mutex::new(CapturedStream::default());
        drain(Cursor::new(b"hello\n".to_vec()), 64, &shared);
        let captured = lock(&shared).clone();
        assert_eq!(captured.data, b"hello\n");
        assert_eq!(captured.integrity, OutputIntegrity::Complete);
        assert_eq!(captured.render(), "hello\n");
    }

    #[test]
    fn test_drain_truncates_but_counts_everything() {
        let shared = Mutex::new(CapturedStream::default());
        drain(Cursor::new(vec![b'a'; 50_000]), 100, &shared);
        let captured = lock(&shared).clone();
        assert_eq!(captured.data.len(), 100);
        assert_eq!(captured.total_bytes, 50_000);
        assert!(captured.is_truncated());
        assert!(captured.render().ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_collect_from_child_process() {
        let mut child = Command::new("/bin/sh")
            .arg("-c")
            .arg("head -c 200000 /dev/zero; echo err >&2")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();

        let limits = OutputLimits {
            stdout_limit: 1000,
            stderr_limit: 1000,
            drain_timeout: Duration::from_secs(5),
        };
        let collector = OutputCollector::start(child.stdout.take(), child.stderr.take(), &limits);
        // the child can only exit if the reader keeps draining past the limit
        let status = child.wait().unwrap();
        let (stdout, stderr) = collector.finish();

        assert!(status.success());
        assert_eq!(stdout.data.len(), 1000);
        assert_eq!(stdout.total_bytes, 200_000);
        assert!(stdout.is_truncated());
        assert_eq!(stderr.render(), "err\n");
    }

    #[test]
    fn test_missing_streams_are_empty() {
        let collector = OutputCollector::start::<Cursor<Vec<u8>>, Cursor<Vec<u8>>>(
            None,
            None,
            &OutputLimits::default(),
        );
        let (stdout, stderr) = collector.finish();
        assert!(stdout.data.is_empty());
        assert_eq!(stderr.integrity, OutputIntegrity::Complete);
    }
}
