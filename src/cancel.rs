//! Process-wide cancellation.
//!
//! A single token is created at startup, set from the interrupt handler, and
//! threaded through every suspension point: the output-drain loop, the
//! interactive prompt, the per-file loop, and the watch-mode sleep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

/// Raised when the cancellation token is observed set. Unwinds the in-flight
/// evaluation (releasing the child process and the sandbox) and stops the
/// outer loop.
#[derive(Debug, Error)]
#[error("interrupted")]
pub struct Interrupted;

/// Shared cancellation flag, cheap to clone into signal handlers and loops.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Fails with [`Interrupted`] once the token is set.
    pub fn check(&self) -> Result<(), Interrupted> {
        if self.is_cancelled() {
            Err(Interrupted)
        } else {
            Ok(())
        }
    }
}
