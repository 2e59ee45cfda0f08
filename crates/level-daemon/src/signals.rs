//! Signal handling for graceful daemon shutdown.
//!
//! SIGTERM and SIGINT request shutdown, SIGHUP is recorded so the main loop
//! can report it. The handlers only touch static atomics; the flags are
//! drained into [`SignalState`] whenever the main loop asks.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

static SHUTDOWN_FLAG: AtomicBool = AtomicBool::new(false);
static HANGUP_FLAG: AtomicBool = AtomicBool::new(false);

/// Longest uninterrupted sleep while waiting for a tick.
const POLL_SLICE: Duration = Duration::from_millis(50);

/// Signal types that the daemon handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// SIGTERM or SIGINT.
    Terminate,
    /// SIGHUP.
    Hangup,
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalKind::Terminate => write!(f, "SIGTERM/SIGINT"),
            SignalKind::Hangup => write!(f, "SIGHUP"),
        }
    }
}

/// State shared between the handler and the main loop.
#[derive(Debug, Default)]
pub struct SignalState {
    shutdown_requested: AtomicBool,
    hangup_pending: AtomicBool,
    signal_count: AtomicU32,
}

impl SignalState {
    /// Create a new signal state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if shutdown has been requested.
    #[inline]
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Relaxed)
    }

    /// Check for a pending SIGHUP and clear it.
    #[inline]
    pub fn take_hangup(&self) -> bool {
        self.hangup_pending.swap(false, Ordering::Relaxed)
    }

    /// Request shutdown (can be called from any thread).
    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::Relaxed);
    }

    fn record_signal(&self, kind: SignalKind) {
        self.signal_count.fetch_add(1, Ordering::Relaxed);
        match kind {
            SignalKind::Terminate => self.request_shutdown(),
            SignalKind::Hangup => self.hangup_pending.store(true, Ordering::Relaxed),
        }
    }

    /// Number of signals received.
    pub fn signal_count(&self) -> u32 {
        self.signal_count.load(Ordering::Relaxed)
    }
}

/// Handle for signal management.
#[derive(Debug, Clone)]
pub struct SignalHandler {
    state: Arc<SignalState>,
}

impl SignalHandler {
    /// Create a handler and install the process signal handlers.
    ///
    /// # Errors
    ///
    /// Returns an error if a handler cannot be installed.
    pub fn new() -> std::io::Result<Self> {
        #[cfg(unix)]
        install_unix_handlers()?;

        Ok(Self {
            state: Arc::new(SignalState::new()),
        })
    }

    /// Move any signals delivered since the last call into the shared state.
    fn drain(&self) {
        if SHUTDOWN_FLAG.swap(false, Ordering::Relaxed) {
            info!(signal = %SignalKind::Terminate, "Shutdown signal received");
            self.state.record_signal(SignalKind::Terminate);
        }
        if HANGUP_FLAG.swap(false, Ordering::Relaxed) {
            self.state.record_signal(SignalKind::Hangup);
        }
    }

    /// Check if shutdown has been requested.
    pub fn shutdown_requested(&self) -> bool {
        self.drain();
        self.state.shutdown_requested()
    }

    /// Check for a pending SIGHUP (clears it).
    pub fn take_hangup(&self) -> bool {
        self.drain();
        self.state.take_hangup()
    }

    /// Manually request shutdown.
    pub fn request_shutdown(&self) {
        info!("Manual shutdown requested");
        self.state.request_shutdown();
    }

    /// Get the signal state for inspection.
    pub fn state(&self) -> &SignalState {
        &self.state
    }

    /// Sleep until `deadline`, waking early on shutdown.
    ///
    /// Returns `true` if shutdown was requested.
    pub fn sleep_until(&self, deadline: Instant) -> bool {
        loop {
            if self.shutdown_requested() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(POLL_SLICE.min(deadline - now));
        }
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn install_unix_handlers() -> std::io::Result<()> {
    use std::os::raw::c_int;

    extern "C" fn shutdown_handler(_: c_int) {
        SHUTDOWN_FLAG.store(true, Ordering::Relaxed);
    }

    extern "C" fn hangup_handler(_: c_int) {
        HANGUP_FLAG.store(true, Ordering::Relaxed);
    }

    let handlers: [(c_int, extern "C" fn(c_int)); 3] = [
        (libc::SIGTERM, shutdown_handler),
        (libc::SIGINT, shutdown_handler),
        (libc::SIGHUP, hangup_handler),
    ];

    for (signal, handler) in handlers {
        // SAFETY: the handlers only store to static atomics, which is
        // async-signal-safe.
        let previous = unsafe { libc::signal(signal, handler as libc::sighandler_t) };
        if previous == libc::SIG_ERR {
            return Err(std::io::Error::last_os_error());
        }
    }

    debug!("Unix signal handlers registered");
    Ok(())
}
