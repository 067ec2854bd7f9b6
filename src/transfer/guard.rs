//! Single-flight execution guard
//!
//! Acquisition never waits: a caller that finds the guard held is told so
//! and is expected to skip its work, not queue behind the holder.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};

#[derive(Debug, Default)]
pub struct ExecutionGuard {
    busy: AtomicBool,
}

/// Held while an execution is in flight; releases the guard on drop,
/// including when the holder unwinds.
#[derive(Debug)]
pub struct GuardPermit<'a> {
    guard: &'a ExecutionGuard,
}

impl ExecutionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the guard, or `Error::GuardBusy` while someone else holds it
    pub fn try_acquire(&self) -> Result<GuardPermit<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map(|_| GuardPermit { guard: self })
            .map_err(|_| Error::GuardBusy)
    }
}

impl Drop for GuardPermit<'_> {
    fn drop(&mut self) {
        self.guard.busy.store(false, Ordering::Release);
    }
}
