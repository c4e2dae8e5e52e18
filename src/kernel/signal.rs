/// Signal handling for the server and process-group termination for children
use log::info;
use nix::errno::Errno;
use nix::sys::signal::{self, killpg, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd::Pid;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);
static SIGNAL_RECEIVED: AtomicU32 = AtomicU32::new(0);

pub struct SignalHandler;

impl SignalHandler {
    /// Install SIGINT/SIGTERM handlers that only set an atomic flag.
    /// Call before spawning worker threads.
    pub fn init() -> Result<Self, String> {
        let action = SigAction::new(
            SigHandler::Handler(Self::signal_handler),
            SaFlags::SA_RESTART,
            SigSet::empty(),
        );

        unsafe {
            signal::sigaction(Signal::SIGINT, &action)
                .map_err(|e| format!("Failed to install SIGINT handler: {}", e))?;
            signal::sigaction(Signal::SIGTERM, &action)
                .map_err(|e| format!("Failed to install SIGTERM handler: {}", e))?;
        }

        info!("Signal handlers installed (SIGINT, SIGTERM)");
        Ok(Self)
    }

    // async-signal-safe: atomics only
    extern "C" fn signal_handler(signal: libc::c_int) {
        SIGNAL_RECEIVED.store(signal as u32, Ordering::SeqCst);
        SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
    }

    /// Signal that was received, 0 if none
    pub fn get_signal(&self) -> u32 {
        SIGNAL_RECEIVED.load(Ordering::SeqCst)
    }
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

/// Ask the accept loop to stop without a signal (tests, embedding)
pub fn request_shutdown() {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

#[cfg(test)]
pub(crate) fn reset() {
    SHUTDOWN_REQUESTED.store(false, Ordering::SeqCst);
    SIGNAL_RECEIVED.store(0, Ordering::SeqCst);
}

/// Send `sig` to every member of process group `pgid`.
///
/// Returns `Ok(false)` when the group no longer has members.
pub fn signal_group(pgid: i32, sig: Signal) -> Result<bool, Errno> {
    match killpg(Pid::from_raw(pgid), sig) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Whether any process is left in group `pgid`
pub fn group_alive(pgid: i32) -> bool {
    // signal 0 performs the permission and existence check only
    matches!(killpg(Pid::from_raw(pgid), None), Ok(()))
}
