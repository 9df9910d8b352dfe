//! Interrupt handling for the request loop
//!
//! First SIGINT/SIGTERM: run the shutdown callback (clear sessions, stop the
//! pool) and exit. Second: exit immediately.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tracing::warn;

/// Exit code after an interrupt
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Action to take after receiving a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// First signal: graceful shutdown
    Shutdown,
    /// Second signal: exit without cleanup
    ImmediateExit,
    /// Third+ signal: ignore
    Ignore,
}

/// Counts received interrupts
#[derive(Debug, Default)]
pub struct SignalState {
    signal_count: AtomicU8,
}

impl SignalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether shutdown has started
    pub fn is_shutdown_requested(&self) -> bool {
        self.signal_count() > 0
    }

    pub fn signal_count(&self) -> u8 {
        self.signal_count.load(Ordering::SeqCst)
    }

    /// Record a signal and decide what to do
    pub fn handle_signal(&self) -> SignalAction {
        match self.signal_count.fetch_add(1, Ordering::SeqCst) {
            0 => SignalAction::Shutdown,
            1 => SignalAction::ImmediateExit,
            _ => SignalAction::Ignore,
        }
    }
}

/// Install the process-wide handler.
///
/// `on_shutdown` runs on the handler thread for the first signal; the process
/// then exits with [`EXIT_CODE_INTERRUPTED`]. Can only be installed once.
pub fn install<F>(state: Arc<SignalState>, on_shutdown: F) -> Result<(), ctrlc::Error>
where
    F: Fn() + Send + 'static,
{
    ctrlc::set_handler(move || match state.handle_signal() {
        SignalAction::Shutdown => {
            warn!("interrupt received; shutting down");
            on_shutdown();
            std::process::exit(EXIT_CODE_INTERRUPTED);
        }
        SignalAction::ImmediateExit => {
            warn!("second interrupt; exiting immediately");
            std::process::exit(EXIT_CODE_INTERRUPTED);
        }
        SignalAction::Ignore => {}
    })
}
