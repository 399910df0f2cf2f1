
use core::fmt;
use std::sync::Arc;

use crate::traits::*;
use crate::sys::utick;
use crate::sys::AtomicU64;
use crate::sys::AtomicOrdering;
use crate::sys::Parker;
use crate::Delta;


struct ManualClockState {
    now: AtomicU64,
    parker: Parker,
}

/// A clock that only moves when told to
///
/// Ticks are milliseconds. Clones share the same time, so one clone can be
/// handed to a queue while another drives it. Waiting on a ManualClock
/// blocks until the time changes or the queue is signaled, timeouts are
/// measured in the clock's own time, not wall time.
#[derive(Clone)]
pub struct ManualClock(Arc<ManualClockState>);

impl fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ManualClock")
            .field(&self.0.now.load(AtomicOrdering::SeqCst))
            .finish()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    pub fn starting_at(now: utick) -> Self {
        Self(Arc::new(ManualClockState {
            now: AtomicU64::new(now),
            parker: Parker::new(),
        }))
    }

    /// Set the current time, waking up any waiting dispatcher
    pub fn set(&self, now: utick) {
        self.0.now.store(now, AtomicOrdering::SeqCst);
        self.0.parker.signal();
    }

    /// Move time forward, waking up any waiting dispatcher
    pub fn advance(&self, delta: Delta) {
        self.0.now.fetch_add(delta.uticks(), AtomicOrdering::SeqCst);
        self.0.parker.signal();
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> utick {
        self.0.now.load(AtomicOrdering::SeqCst)
    }
}

impl Signal for ManualClock {
    fn signal(&self) {
        self.0.parker.signal();
    }
}

impl Sema for ManualClock {
    fn wait(&self) {
        self.0.parker.wait(None);
    }

    fn wait_timeout(&self, _delta: Delta) {
        // wall time means nothing here, wait until something changes
        self.0.parker.wait(None);
    }
}
