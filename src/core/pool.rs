/// Fixed-size worker pool that runs submissions concurrently.
///
/// Jobs travel over a bounded crossbeam channel; each carries its own
/// single-slot reply channel, so results never cross between requests.
use crate::config::types::{ExecutionResult, FailureKind};
use crate::core::runner::ExecutionRunner;
use crate::core::types::Submission;
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{info, warn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

struct Job {
    submission: Submission,
    reply: Sender<ExecutionResult>,
}

pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(runner: Arc<ExecutionRunner>, workers: usize, queue_depth: usize) -> Self {
        let (sender, receiver) = bounded::<Job>(queue_depth.max(1));
        let handles = (0..workers.max(1))
            .map(|index| {
                let runner = Arc::clone(&runner);
                let receiver = receiver.clone();
                thread::Builder::new()
                    .name(format!("treebox-worker-{index}"))
                    .spawn(move || worker_loop(index, runner, receiver))
            })
            .filter_map(|spawned| match spawned {
                Ok(handle) => Some(handle),
                Err(e) => {
                    warn!("Failed to start worker thread: {}", e);
                    None
                }
            })
            .collect::<Vec<_>>();

        info!("Started worker pool with {} workers", handles.len());
        Self {
            sender: Some(sender),
            workers: handles,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Queue a submission and block until its result is ready
    pub fn submit(&self, submission: Submission) -> ExecutionResult {
        let sender = match &self.sender {
            Some(sender) if !self.workers.is_empty() => sender,
            _ => {
                return ExecutionResult::failure(
                    FailureKind::InternalError,
                    "worker pool is not running",
                )
            }
        };

        let (reply, result) = bounded(1);
        if sender.send(Job { submission, reply }).is_err() {
            return ExecutionResult::failure(FailureKind::InternalError, "worker pool is shut down");
        }
        result.recv().unwrap_or_else(|_| {
            ExecutionResult::failure(FailureKind::InternalError, "worker exited before replying")
        })
    }

    /// Stop accepting work and wait for queued jobs to finish
    pub fn shutdown(&mut self) {
        // closing the channel ends every worker loop once the queue is empty
        self.sender.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("Worker thread panicked during shutdown");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(index: usize, runner: Arc<ExecutionRunner>, jobs: Receiver<Job>) {
    for job in jobs.iter() {
        let label = job.submission.label();
        let submission = job.submission;
        let result = panic::catch_unwind(AssertUnwindSafe(|| runner.submit(submission)))
            .unwrap_or_else(|_| {
                warn!("Worker {} panicked while running a {} submission", index, label);
                ExecutionResult::failure(FailureKind::InternalError, "internal error while running submission")
            });
        // the caller may have gone away; nothing to do then
        let _ = job.reply.send(result);
    }
    log::debug!("Worker {} exiting", index);
}
