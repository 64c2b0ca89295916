//! Shutdown signal handling.
//!
//! SIGTERM and SIGINT request a graceful close of the slave. The raw
//! handlers only store the signal number; a watcher thread moves it into
//! [`ShutdownState`] where the main loop can wait on it.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Signal number written by the raw handler, zero when none is pending.
static PENDING_SIGNAL: AtomicI32 = AtomicI32::new(0);

/// Signals the daemon reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// SIGTERM.
    Terminate,
    /// SIGINT (Ctrl+C).
    Interrupt,
}

impl SignalKind {
    fn from_raw(signal: i32) -> Option<Self> {
        match signal {
            libc::SIGTERM => Some(Self::Terminate),
            libc::SIGINT => Some(Self::Interrupt),
            _ => None,
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalKind::Terminate => write!(f, "SIGTERM"),
            SignalKind::Interrupt => write!(f, "SIGINT"),
        }
    }
}

/// Shutdown flag shared between the watcher thread and the main loop.
#[derive(Debug, Default)]
pub struct ShutdownState {
    requested: AtomicBool,
    signal_count: AtomicU32,
}

impl ShutdownState {
    /// Whether shutdown has been requested.
    #[inline]
    pub fn requested(&self) -> bool {
        self.requested.load(Ordering::Relaxed)
    }

    /// Request shutdown from any thread.
    pub fn request(&self) {
        self.requested.store(true, Ordering::Relaxed);
    }

    fn record(&self, kind: SignalKind) {
        self.signal_count.fetch_add(1, Ordering::Relaxed);
        info!(signal = %kind, "Shutdown signal received");
        self.request();
    }

    /// Number of signals received so far.
    pub fn signal_count(&self) -> u32 {
        self.signal_count.load(Ordering::Relaxed)
    }
}

/// Cloneable handle onto the shutdown state.
#[derive(Debug, Clone, Default)]
pub struct SignalHandler {
    state: Arc<ShutdownState>,
}

impl SignalHandler {
    /// Register SIGTERM and SIGINT handlers and start the watcher thread.
    ///
    /// # Errors
    ///
    /// Fails if a handler cannot be registered or the thread cannot start.
    #[allow(unsafe_code)]
    pub fn install() -> std::io::Result<Self> {
        let handler = Self::default();

        for signal in [libc::SIGTERM, libc::SIGINT] {
            let action = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
            // SAFETY: the handler only performs an atomic store.
            let previous = unsafe { libc::signal(signal, action) };
            if previous == libc::SIG_ERR {
                return Err(std::io::Error::last_os_error());
            }
        }

        let state = Arc::clone(&handler.state);
        std::thread::Builder::new()
            .name("mbslave-signals".into())
            .spawn(move || {
                while !state.requested() {
                    let raw = PENDING_SIGNAL.swap(0, Ordering::Relaxed);
                    if let Some(kind) = SignalKind::from_raw(raw) {
                        state.record(kind);
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
            })?;

        debug!("Signal handlers registered");
        Ok(handler)
    }

    /// Whether shutdown has been requested.
    #[inline]
    pub fn shutdown_requested(&self) -> bool {
        self.state.requested()
    }

    /// Request shutdown without a signal.
    pub fn request_shutdown(&self) {
        info!("Manual shutdown requested");
        self.state.request();
    }

    /// Shared state for inspection.
    pub fn state(&self) -> &ShutdownState {
        &self.state
    }
}

extern "C" fn on_signal(signal: libc::c_int) {
    PENDING_SIGNAL.store(signal, Ordering::Relaxed);
}

/// Block until shutdown is requested or `timeout` expires.
///
/// Returns `true` if shutdown was requested.
pub fn wait_for_shutdown(handler: &SignalHandler, timeout: Duration) -> bool {
    let start = Instant::now();
    let poll_interval = Duration::from_millis(50);

    loop {
        if handler.shutdown_requested() {
            return true;
        }
        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return false;
        }
        std::thread::sleep(poll_interval.min(timeout - elapsed));
    }
}
