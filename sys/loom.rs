
// sys/loom.rs swaps atomics and waiting for loom's instrumented versions,
// waiting never actually blocks, loom explores wakeups by yielding
//

use core::fmt;
use core::time::Duration;

use std::time::Instant;

use crate::traits::*;
use crate::Delta;


// Memory allocation for the slot slab
pub(crate) use std::alloc::alloc;
pub(crate) use std::alloc::dealloc;


// Time primitives
#[allow(non_camel_case_types)] pub type utick = u64;
#[allow(non_camel_case_types)] pub type itick = i64;


// Atomic primitives
pub(crate) use loom::sync::atomic::AtomicBool;
pub(crate) use loom::sync::atomic::AtomicU64;
pub(crate) use core::sync::atomic::Ordering as AtomicOrdering;
pub(crate) use loom::hint::spin_loop;


// Parking primitive
pub(crate) struct Parker {
    signaled: AtomicBool,
}

impl fmt::Debug for Parker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parker")
            .field("signaled", &self.signaled.load(AtomicOrdering::SeqCst))
            .finish()
    }
}

impl Parker {
    pub(crate) fn new() -> Self {
        Self {
            signaled: AtomicBool::new(false),
        }
    }

    pub(crate) fn signal(&self) {
        self.signaled.store(true, AtomicOrdering::SeqCst);
    }

    pub(crate) fn wait(&self, _timeout: Option<Duration>) {
        if !self.signaled.swap(false, AtomicOrdering::SeqCst) {
            loom::thread::yield_now();
        }
    }
}


// Time/semaphore primitive
#[derive(Debug)]
pub struct SysClock {
    instant: Instant,
    parker: Parker,
}

impl SysClock {
    pub fn new() -> Self {
        Self {
            instant: Instant::now(),
            parker: Parker::new(),
        }
    }
}

impl Default for SysClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SysClock {
    fn now(&self) -> utick {
        self.instant.elapsed().as_micros() as utick
    }

    fn frequency(&self) -> utick {
        1_000_000
    }
}

impl Signal for SysClock {
    fn signal(&self) {
        self.parker.signal();
    }
}

impl Sema for SysClock {
    fn wait(&self) {
        self.parker.wait(None);
    }

    fn wait_timeout(&self, _delta: Delta) {
        self.parker.wait(None);
    }
}
