
// sys/std.rs provides clock, atomic, and waiting primitives on top of std
//

use core::fmt;
use core::time::Duration;

#[cfg(feature="async-io")] use core::future::Future;
#[cfg(feature="async-io")] use core::pin::Pin;
#[cfg(feature="async-io")] use core::task::Context;
#[cfg(feature="async-io")] use core::task::Poll;
#[cfg(feature="async-io")] use core::task::Waker;

use std::thread;
use std::thread::Thread;
use std::time::Instant;

use cfg_if::cfg_if;
#[cfg(feature="async-io")] use async_io::Timer;

use crate::traits::*;
use crate::util::*;
use crate::Delta;


// Memory allocation for the slot slab, only ever used in normal context
pub(crate) use std::alloc::alloc;
pub(crate) use std::alloc::dealloc;


// Time primitives
#[allow(non_camel_case_types)] pub type utick = u64;
#[allow(non_camel_case_types)] pub type itick = i64;


// Atomic primitives
pub(crate) use core::sync::atomic::AtomicBool;
pub(crate) use core::sync::atomic::AtomicU64;
pub(crate) use core::sync::atomic::Ordering as AtomicOrdering;
pub(crate) use core::hint::spin_loop;


// Parking primitive
//
// Signal never blocks, it takes the parker's spinlock for a handful of
// instructions and unparks whoever is waiting. A signal that arrives
// before the waiter parks is latched, so wakeups can't be lost.
#[derive(Default)]
struct ParkerState {
    signaled: bool,
    thread: Option<Thread>,
    #[cfg(feature="async-io")] waker: Option<Waker>,
}

pub(crate) struct Parker(SpinLock<ParkerState>);

impl fmt::Debug for Parker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0.lock();
        f.debug_struct("Parker")
            .field("signaled", &state.signaled)
            .field("waiting", &state.thread.is_some())
            .finish()
    }
}

impl Parker {
    pub(crate) fn new() -> Self {
        Self(SpinLock::new(ParkerState::default()))
    }

    pub(crate) fn signal(&self) {
        let mut state = self.0.lock();
        state.signaled = true;
        let thread = state.thread.clone();
        #[cfg(feature="async-io")] let waker = state.waker.take();
        drop(state);

        if let Some(thread) = thread {
            thread.unpark();
        }

        #[cfg(feature="async-io")]
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    pub(crate) fn wait(&self, timeout: Option<Duration>) {
        let current = thread::current();
        {
            let mut state = self.0.lock();
            if state.signaled {
                state.signaled = false;
                return;
            }
            state.thread = Some(current);
        }

        match timeout {
            Some(timeout) => thread::park_timeout(timeout),
            None => thread::park(),
        }

        let mut state = self.0.lock();
        state.thread = None;
        state.signaled = false;
    }

    #[cfg(feature="async-io")]
    fn poll_signaled(&self, waker: &Waker) -> bool {
        let mut state = self.0.lock();
        if state.signaled {
            state.signaled = false;
            state.waker = None;
            true
        } else {
            // only replace the waker if it changed, cloning may be expensive
            match state.waker {
                Some(ref old) if old.will_wake(waker) => {}
                _ => state.waker = Some(waker.clone()),
            }
            false
        }
    }

    #[cfg(feature="async-io")]
    fn clear_waker(&self) {
        self.0.lock().waker = None;
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
        (self.instant
            .elapsed()
            .as_nanos()
            * u128::from(self.frequency())
            / 1_000_000_000)
            as utick
    }

    /// The std clock ticks in microseconds
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

    fn wait_timeout(&self, delta: Delta) {
        self.parker.wait(Some(
            Duration::try_from_delta(delta, self.frequency())
                .unwrap_or(Duration::ZERO)
        ));
    }
}


cfg_if! {
    if #[cfg(feature="async-io")] {
        /// Future returned by SysClock's async waits
        #[derive(Debug)]
        pub struct SysClockAsyncWait<'a> {
            parker: &'a Parker,
            timer: Option<Timer>,
        }

        impl Future for SysClockAsyncWait<'_> {
            type Output = ();

            fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
                let this = self.get_mut();

                // already signaled?
                if this.parker.poll_signaled(cx.waker()) {
                    return Poll::Ready(());
                }

                match this.timer {
                    Some(ref mut timer) => Pin::new(timer).poll(cx).map(|_| ()),
                    None => Poll::Pending,
                }
            }
        }

        impl Drop for SysClockAsyncWait<'_> {
            fn drop(&mut self) {
                // make sure our waker is cleared
                self.parker.clear_waker();
            }
        }

        impl AsyncSema for SysClock {
            type AsyncWait<'a> = SysClockAsyncWait<'a>;

            fn wait_async(&self) -> Self::AsyncWait<'_> {
                SysClockAsyncWait {
                    parker: &self.parker,
                    timer: None,
                }
            }

            fn wait_timeout_async(&self, delta: Delta) -> Self::AsyncWait<'_> {
                SysClockAsyncWait {
                    parker: &self.parker,
                    timer: Some(Timer::after(
                        Duration::try_from_delta(delta, self.frequency())
                            .unwrap_or(Duration::ZERO)
                    )),
                }
            }
        }
    }
}
