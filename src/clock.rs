//! Time source, cancellation flag, and the pacer that owns every deliberate sleep.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::constants::download::SLEEP_SLICE_MS;
use crate::errors::SyncError;

/// Wall clock plus blocking sleep.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;
    /// Block the current thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Real system clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Shared user-interrupt flag.
///
/// Cloning shares the flag; any holder may raise it and every loop in the
/// pipeline observes it at its next check.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create a lowered flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// True once the flag has been raised.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Return `Err(SyncError::Cancelled)` when the flag is raised.
    pub fn check(&self) -> Result<(), SyncError> {
        if self.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        Ok(())
    }
}

/// Performs fixed-duration waits in short slices so cancellation stays prompt.
#[derive(Clone)]
pub struct Pacer {
    clock: Arc<dyn Clock>,
    cancel: CancelFlag,
}

impl Pacer {
    /// Create a pacer over `clock` observing `cancel`.
    pub fn new(clock: Arc<dyn Clock>, cancel: CancelFlag) -> Self {
        Self { clock, cancel }
    }

    /// Current instant from the underlying clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Fail fast if the run was cancelled.
    pub fn checkpoint(&self) -> Result<(), SyncError> {
        self.cancel.check()
    }

    /// Sleep for `total`, checking for cancellation between slices.
    pub fn wait(&self, total: Duration) -> Result<(), SyncError> {
        self.cancel.check()?;
        let slice = Duration::from_millis(SLEEP_SLICE_MS);
        let mut remaining = total;
        while !remaining.is_zero() {
            let step = remaining.min(slice);
            self.clock.sleep(step);
            remaining = remaining.saturating_sub(step);
            self.cancel.check()?;
        }
        Ok(())
    }
}
