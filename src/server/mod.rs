//! HTTP boundary
//!
//! A small HTTP/1.1 server on `std::net`: one thread per connection, all
//! execution funnelled through the shared worker pool. The accept loop polls
//! so that SIGINT/SIGTERM or [`ServerHandle::stop`] end it promptly.

pub mod http;
pub mod routes;

use crate::config::settings::RunnerConfig;
use crate::config::types::{Result, SandboxError};
use crate::core::pool::WorkerPool;
use crate::core::runner::ExecutionRunner;
use crate::kernel::signal;
use http::{read_request, Response};
use log::{debug, info, warn};
use routes::AppState;
use std::io::{self, BufReader};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const ACCEPT_POLL: Duration = Duration::from_millis(50);
/// Upper bound on how long a client may take to send its request
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Stops a running server from another thread
#[derive(Clone)]
pub struct ServerHandle {
    stop: Arc<AtomicBool>,
}

impl ServerHandle {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

pub struct Server {
    listener: TcpListener,
    state: Arc<AppState>,
    stop: Arc<AtomicBool>,
}

impl Server {
    /// Bind to `config.bind_addr` and start the worker pool
    pub fn bind(config: RunnerConfig) -> Result<Self> {
        let runner = Arc::new(ExecutionRunner::new(config.clone())?);
        let pool = WorkerPool::new(runner, config.workers, config.queue_depth);
        if pool.worker_count() == 0 {
            return Err(SandboxError::Process("no worker threads could be started".into()));
        }

        let listener = TcpListener::bind(&config.bind_addr).map_err(|e| {
            SandboxError::Config(format!("Failed to bind {}: {}", config.bind_addr, e))
        })?;
        listener.set_nonblocking(true)?;

        Ok(Self {
            listener,
            state: Arc::new(AppState { config, pool }),
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            stop: Arc::clone(&self.stop),
        }
    }

    fn should_stop(&self) -> bool {
        self.stop.load(Ordering::SeqCst) || signal::shutdown_requested()
    }

    /// Serve until stopped. Connections already accepted finish on their own
    /// threads.
    pub fn run(self) -> Result<()> {
        info!("Listening on {}", self.local_addr()?);

        while !self.should_stop() {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    debug!("Accepted connection from {}", peer);
                    let state = Arc::clone(&self.state);
                    let spawned = thread::Builder::new()
                        .name("treebox-conn".into())
                        .spawn(move || {
                            if let Err(e) = serve_connection(stream, &state) {
                                debug!("Connection from {} ended with error: {}", peer, e);
                            }
                        });
                    if let Err(e) = spawned {
                        warn!("Failed to spawn connection thread: {}", e);
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(e) => warn!("accept error: {}", e),
            }
        }

        info!("Server stopped");
        Ok(())
    }
}

fn serve_connection(stream: TcpStream, state: &AppState) -> io::Result<()> {
    // accepted sockets may inherit non-blocking mode from the listener
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);

    let response = match read_request(&mut reader, state.config.max_request_bytes) {
        Ok(request) => routes::handle(&request, state),
        Err(e) if e.status() == 413 => Response::json(
            413,
            &serde_json::json!({"status": "error", "stderr": e.to_string()}),
        ),
        Err(e) => routes::bad_request(e.to_string()),
    };
    response.write_to(&mut writer)
}
