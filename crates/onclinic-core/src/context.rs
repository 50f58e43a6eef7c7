//! Caller-supplied deadline and cancellation for blocking operations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

/// Why an operation stopped before completing.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    #[error("operation cancelled by caller")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Deadline and cancel flag checked between store round trips.
///
/// Checks happen before each retry attempt and before a write transaction
/// begins. Once a transaction has started it runs to commit or rollback.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancel: Option<Arc<AtomicBool>>,
}

impl CallContext {
    /// No deadline, never cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Share a flag the caller sets to abandon the operation.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn check(&self) -> Result<(), Interrupted> {
        if let Some(flag) = &self.cancel {
            if flag.load(Ordering::Acquire) {
                return Err(Interrupted::Cancelled);
            }
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(Interrupted::DeadlineExceeded);
            }
        }
        Ok(())
    }
}
