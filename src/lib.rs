//! A bounded event queue for deferring work out of constrained contexts
//!
//! Callables are posted with [`EventQueue::call`], [`EventQueue::call_in`],
//! or [`EventQueue::call_every`] from any context, including contexts that
//! must never block or allocate, such as interrupt-like callbacks. They only
//! ever run inside [`EventQueue::dispatch`] (or one of its siblings), which
//! is expected to run on a worker of the application's choosing.
//!
//! ```
//! use deferq::EventQueue;
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use std::time::Duration;
//!
//! let count = AtomicU32::new(0);
//! let q = EventQueue::with_capacity(8).unwrap();
//!
//! q.call(|| { count.fetch_add(1, Ordering::SeqCst); }).unwrap();
//! q.call_in(Duration::from_millis(10), || { count.fetch_add(1, Ordering::SeqCst); }).unwrap();
//! q.dispatch(Duration::from_millis(50)).unwrap();
//!
//! assert_eq!(count.load(Ordering::SeqCst), 2);
//! ```

#![deny(missing_debug_implementations)]

use core::alloc::Layout;
use core::fmt;
use core::marker::PhantomData;
use core::mem::align_of;
use core::mem::size_of;
use core::num::NonZeroU64;
use core::ptr;
use core::ptr::NonNull;

use std::any::Any;
use std::panic;
use std::panic::AssertUnwindSafe;

use log::debug;
use log::error;
use log::trace;
use log::warn;

mod util;
use util::*;

mod slab;
use slab::Slab;
use slab::State;

pub mod traits;
pub use traits::*;

mod clock;
pub use clock::ManualClock;

#[cfg_attr(not(feature="loom"), path="../sys/std.rs")]
#[cfg_attr(feature="loom", path="../sys/loom.rs")]
pub mod sys;
pub use sys::utick;
pub use sys::itick;
pub use sys::SysClock;
use sys::AtomicBool;
use sys::AtomicOrdering;


// Default number of events a queue can hold, overridable at compile time
// with DEFERQ_CAPACITY
pub const DEFAULT_CAPACITY: usize = parse_const_usize(env!("DEFERQ_CAPACITY"));

// Default bytes of inline storage per event, overridable at compile time
// with DEFERQ_SLOT_SIZE
pub const DEFAULT_SLOT_SIZE: usize = parse_const_usize(env!("DEFERQ_SLOT_SIZE"));

pub const SLOT_ALIGN: usize = 16;


#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Error {
    CapacityExceeded,
    InvalidArgument,
    AlreadyDispatching,
    CallableFailure(String),
    NotFound,
    TooLarge,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::CapacityExceeded => write!(f, "Queue capacity exceeded"),
            Error::InvalidArgument => write!(f, "Invalid argument"),
            Error::AlreadyDispatching => write!(f, "Already dispatching"),
            Error::CallableFailure(msg) => write!(f, "Callable failed: {}", msg),
            Error::NotFound => write!(f, "Event not found"),
            Error::TooLarge => write!(f, "Callable too large for slot"),
        }
    }
}

impl std::error::Error for Error {}


#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Exit {
    Timeout,
    Break,
}


#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Delta(itick);

impl Delta {
    pub const ZERO: Delta = Delta(0);

    pub const fn new(ticks: itick) -> Delta {
        Delta(ticks)
    }

    pub const fn ticks(&self) -> itick {
        self.0
    }

    pub const fn uticks(&self) -> utick {
        if self.0 < 0 { 0 } else { self.0 as utick }
    }
}


/// An id we can use to cancel an event
///
/// Ids carry their slot's generation, so an id outlives its event safely,
/// operations on a stale id just don't find anything.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Id(NonZeroU64);

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // these really need to be in hex to be readable
        write!(f, "Id(0x{:x})", self.0)
    }
}

impl Id {
    fn new(idx: u32, gen: u32) -> Id {
        // idx+1 keeps us non-zero, idx < u32::MAX by construction
        let raw = (u64::from(gen) << 32) | (u64::from(idx) + 1);
        Id(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN))
    }

    fn idx(&self) -> u32 {
        (self.0.get() as u32).wrapping_sub(1)
    }

    fn gen(&self) -> u32 {
        (self.0.get() >> 32) as u32
    }
}


pub type ErrorHook<'a> = Box<dyn Fn(Id, Error) + Send + Sync + 'a>;

pub struct Config<'a, C> {
    pub clock: C,
    pub capacity: usize,
    pub slot_size: usize,
    pub memory_budget: Option<usize>,
    pub on_error: Option<ErrorHook<'a>>,
}

impl<C: fmt::Debug> fmt::Debug for Config<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("clock", &self.clock)
            .field("capacity", &self.capacity)
            .field("slot_size", &self.slot_size)
            .field("memory_budget", &self.memory_budget)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl<'a, C> Config<'a, C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock: clock,
            capacity: DEFAULT_CAPACITY,
            slot_size: DEFAULT_SLOT_SIZE,
            memory_budget: None,
            on_error: None,
        }
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn slot_size(mut self, slot_size: usize) -> Self {
        self.slot_size = slot_size;
        self
    }

    pub fn memory_budget(mut self, memory_budget: usize) -> Self {
        self.memory_budget = Some(memory_budget);
        self
    }

    pub fn on_error<F>(mut self, on_error: F) -> Self
    where
        F: Fn(Id, Error) + Send + Sync + 'a
    {
        self.on_error = Some(Box::new(on_error));
        self
    }
}


#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Usage {
    pub pending: usize,
    pub running: usize,
    pub reclaiming: usize,
    pub free: usize,
    pub capacity: usize,
    pub slot_size: usize,
    pub slab_bytes: usize,
}


// cb/drop thunks, these are how type-erased callables get called
unsafe fn once_thunk<F: PostOnce>(p: *mut u8) {
    ptr::read(p as *mut F).post_once();
}

unsafe fn mut_thunk<F: Post>(p: *mut u8) {
    (*(p as *mut F)).post();
}

unsafe fn drop_thunk<F>(p: *mut u8) {
    ptr::drop_in_place(p as *mut F);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        String::from(*msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        String::from("callable panicked")
    }
}


// an event that has been taken out of the queue for dispatch
struct Dispatch {
    idx: u32,
    gen: u32,
    target: utick,
    period: Option<Delta>,
    cb: unsafe fn(*mut u8),
    drop: unsafe fn(*mut u8),
}

// what the dispatch loop should do after a round
enum Step {
    Exit(Exit),
    Wait(Option<Delta>),
}

// clears the dispatching flag however dispatch exits
struct DispatchGuard<'q>(&'q AtomicBool);

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, AtomicOrdering::Release);
    }
}


/// Event queue struct
///
/// `'a` bounds everything stored in the queue, callables may borrow
/// anything that outlives the queue itself.
pub struct EventQueue<'a, C = SysClock> {
    slab: SpinLock<Slab>,
    storage: NonNull<u8>,
    layout: Layout,
    stride: usize,

    dispatching: AtomicBool,
    break_: AtomicBool,

    clock: C,
    on_error: Option<ErrorHook<'a>>,

    // invariant, callables must live exactly as long as 'a
    _lifetime: PhantomData<fn(&'a ()) -> &'a ()>,
}

// callables are Send and only one context touches a callable at a time,
// everything else is behind the spinlock
unsafe impl<C: Send> Send for EventQueue<'_, C> {}
unsafe impl<C: Sync> Sync for EventQueue<'_, C> {}

impl<C: fmt::Debug> fmt::Debug for EventQueue<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slab = self.slab.lock();
        f.debug_struct("EventQueue")
            .field("capacity", &slab.capacity())
            .field("pending", &slab.pending())
            .field("stride", &self.stride)
            .field("dispatching", &self.dispatching.load(AtomicOrdering::Relaxed))
            .field("clock", &self.clock)
            .finish()
    }
}

impl<'a> EventQueue<'a, SysClock> {
    pub fn with_capacity(capacity: usize) -> Result<Self, Error> {
        Self::with_config(Config::new(SysClock::new()).capacity(capacity))
    }

    pub fn with_size(size: usize) -> Result<Self, Error> {
        Self::with_config(
            Config::new(SysClock::new())
                .capacity(usize::MAX)
                .memory_budget(size)
        )
    }
}

impl<'a, C: Clock + Signal> EventQueue<'a, C> {
    pub fn with_config(config: Config<'a, C>) -> Result<Self, Error> {
        let Config { clock, capacity, slot_size, memory_budget, on_error } = config;

        // each slot costs its storage, its bookkeeping, and a heap entry
        let stride = alignup(max(slot_size, 1), SLOT_ALIGN);
        let per_slot = stride + size_of::<slab::Slot>() + size_of::<u32>();
        let mut capacity = min(capacity, u32::MAX as usize);
        if let Some(budget) = memory_budget {
            capacity = min(capacity, budget / per_slot);
        }

        if capacity == 0 {
            return Err(Error::InvalidArgument);
        }

        let layout = stride.checked_mul(capacity)
            .and_then(|size| Layout::from_size_align(size, SLOT_ALIGN).ok())
            .ok_or(Error::InvalidArgument)?;
        let storage = NonNull::new(unsafe { sys::alloc(layout) })
            .ok_or(Error::CapacityExceeded)?;

        debug!("new event queue, capacity {}, slot size {}", capacity, stride);

        Ok(EventQueue {
            slab: SpinLock::new(Slab::new(capacity as u32)),
            storage: storage,
            layout: layout,
            stride: stride,

            dispatching: AtomicBool::new(false),
            break_: AtomicBool::new(false),

            clock: clock,
            on_error: on_error,

            _lifetime: PhantomData,
        })
    }

    pub fn now(&self) -> utick {
        self.clock.now()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn poster(&self) -> Poster<'_, 'a, C> {
        Poster { q: self }
    }

    fn slot_ptr(&self, idx: u32) -> *mut u8 {
        debug_assert!((idx as usize) < self.layout.size() / self.stride);
        unsafe { self.storage.as_ptr().add(idx as usize * self.stride) }
    }

    fn delta<D: TryIntoDelta>(&self, delta: D) -> Result<Delta, Error> {
        delta.try_into_delta(self.clock.frequency())
            .map_err(|_| Error::InvalidArgument)
    }

    // Central post function
    //
    // This only ever takes the spinlock, and only copies the callable while
    // holding it, so it's safe from constrained contexts. On failure the
    // callable is dropped in the caller's context.
    fn post<F: Send + 'a>(
        &self,
        f: F,
        delay: Delta,
        period: Option<Delta>,
        cb: unsafe fn(*mut u8),
    ) -> Result<Id, Error> {
        if size_of::<F>() > self.stride || align_of::<F>() > SLOT_ALIGN {
            return Err(Error::TooLarge);
        }

        let target = self.clock.now().wrapping_add(delay.uticks());

        let id = {
            let mut slab = self.slab.lock();
            let idx = slab.alloc().ok_or(Error::CapacityExceeded)?;
            unsafe { (self.slot_ptr(idx) as *mut F).write(f) };

            let seq = slab.next_seq();
            let slot = &mut slab.slots[idx as usize];
            slot.cancelled = false;
            slot.target = target;
            slot.period = period;
            slot.seq = seq;
            slot.cb = cb;
            slot.drop = drop_thunk::<F>;
            let gen = slot.gen;
            slab.enqueue(idx);

            Id::new(idx, gen)
        };

        // signal queue has changed
        self.clock.signal();
        Ok(id)
    }

    pub fn call<F>(&self, f: F) -> Result<Id, Error>
    where
        F: PostOnce + Send + 'a
    {
        self.post(f, Delta::ZERO, None, once_thunk::<F>)
    }

    pub fn call_in<D, F>(&self, delay: D, f: F) -> Result<Id, Error>
    where
        D: TryIntoDelta,
        F: PostOnce + Send + 'a
    {
        let delay = self.delta(delay)?;
        if delay.ticks() < 0 {
            return Err(Error::InvalidArgument);
        }

        self.post(f, delay, None, once_thunk::<F>)
    }

    /// Post a callable to run every `period`, starting one period from now
    ///
    /// A run that overruns its period skips the missed runs, the next run is
    /// one period after the late one started.
    pub fn call_every<D, F>(&self, period: D, f: F) -> Result<Id, Error>
    where
        D: TryIntoDelta,
        F: Post + Send + 'a
    {
        let period = self.delta(period)?;
        if period.ticks() <= 0 {
            return Err(Error::InvalidArgument);
        }

        self.post(f, period, Some(period), mut_thunk::<F>)
    }

    /// Cancel an event
    ///
    /// Returns true if the event was pending, in which case it will never
    /// run again. A running event is never interrupted, but a running
    /// periodic event is not rearmed and still counts as cancelled.
    ///
    /// Safe from constrained contexts, the callable's destructor is deferred
    /// to the dispatcher.
    pub fn cancel(&self, id: Id) -> bool {
        let cancelled = {
            let mut slab = self.slab.lock();
            let (state, periodic, cancelled) = match slab.get(id.idx(), id.gen()) {
                Some(slot) => (slot.state, slot.period.is_some(), slot.cancelled),
                None => return false,
            };

            match state {
                State::Pending => {
                    slab.unqueue(id.idx());
                    slab.push_reclaim(id.idx());
                    true
                }
                State::Running if periodic && !cancelled => {
                    slab.slots[id.idx() as usize].cancelled = true;
                    true
                }
                _ => false,
            }
        };

        if cancelled {
            // let the dispatcher know there's something to reclaim
            self.clock.signal();
        }

        cancelled
    }

    pub fn time_left(&self, id: Id) -> Result<Delta, Error> {
        let now = self.clock.now();
        let slab = self.slab.lock();
        let slot = slab.get(id.idx(), id.gen()).ok_or(Error::NotFound)?;
        match slot.state {
            State::Pending => Ok(Delta::new(max(sdiff(slot.target, now), 0))),
            State::Running if !slot.cancelled => Ok(Delta::ZERO),
            _ => Err(Error::NotFound),
        }
    }

    /// Make any in-progress dispatch return after the current event
    ///
    /// If nothing is dispatching, the next dispatch returns immediately.
    pub fn break_dispatch(&self) {
        self.break_.store(true, AtomicOrdering::SeqCst);
        self.clock.signal();
    }

    /// Cancel every pending event, returns how many were cancelled
    ///
    /// Unlike cancel, this runs destructors in the calling context.
    pub fn clear(&self) -> usize {
        let count = self.slab.lock().cancel_all();
        self.reclaim();
        debug!("cleared {} events", count);
        count
    }

    pub fn usage(&self) -> Usage {
        let slab = self.slab.lock();
        let capacity = slab.capacity();
        let pending = slab.pending();
        Usage {
            pending: pending,
            running: slab.running,
            reclaiming: slab.reclaiming,
            free: capacity - pending - slab.running - slab.reclaiming,
            capacity: capacity,
            slot_size: self.stride,
            slab_bytes: self.layout.size(),
        }
    }

    fn report(&self, id: Id, err: Error) {
        match self.on_error {
            Some(ref hook) => {
                let result = panic::catch_unwind(AssertUnwindSafe(|| hook(id, err)));
                if result.is_err() {
                    warn!("error hook panicked while handling {:?}", id);
                }
            }
            None => error!("event {:?} failed: {}", id, err),
        }
    }

    // Run destructors of cancelled events and free their slots
    fn reclaim(&self) {
        let mut done = None;
        loop {
            let next = {
                let mut slab = self.slab.lock();
                if let Some(idx) = done.take() {
                    slab.running -= 1;
                    slab.dealloc(idx);
                }
                slab.pop_reclaim()
            };

            let (idx, drop) = match next {
                Some(next) => next,
                None => break,
            };

            let p = self.slot_ptr(idx);
            if panic::catch_unwind(AssertUnwindSafe(|| unsafe { drop(p) })).is_err() {
                warn!("destructor panicked while reclaiming slot {}", idx);
            }
            done = Some(idx);
        }
    }

    fn enter(&self) -> Result<DispatchGuard<'_>, Error> {
        self.dispatching
            .compare_exchange(
                false, true,
                AtomicOrdering::Acquire, AtomicOrdering::Relaxed
            )
            .map_err(|_| Error::AlreadyDispatching)?;
        Ok(DispatchGuard(&self.dispatching))
    }

    fn dequeue(&self, now: utick, seq: u64) -> Option<Dispatch> {
        let mut slab = self.slab.lock();
        let idx = slab.dequeue(now, seq)?;
        let slot = &slab.slots[idx as usize];
        Some(Dispatch {
            idx: idx,
            gen: slot.gen,
            target: slot.target,
            period: slot.period,
            cb: slot.cb,
            drop: slot.drop,
        })
    }

    // Run a single event outside of the lock, then rearm or free it
    fn run(&self, e: Dispatch) {
        let id = Id::new(e.idx, e.gen);
        let p = self.slot_ptr(e.idx);
        let start = self.clock.now();
        trace!("dispatching {:?}", id);

        // dispatch!
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| unsafe { (e.cb)(p) })) {
            self.report(id, Error::CallableFailure(panic_message(&*payload)));
        }

        let rearmed = {
            let mut slab = self.slab.lock();
            match e.period {
                Some(period) if !slab.slots[e.idx as usize].cancelled => {
                    // skip-missed, if we're already past the next occurrence
                    // coalesce everything we missed into one run and
                    // resynchronize
                    let mut target = e.target.wrapping_add(period.uticks());
                    if !scmp(target, start).is_gt() {
                        target = start.wrapping_add(period.uticks());
                    }

                    let seq = slab.next_seq();
                    let slot = &mut slab.slots[e.idx as usize];
                    slot.target = target;
                    slot.seq = seq;
                    slab.running -= 1;
                    slab.enqueue(e.idx);
                    true
                }
                // one-shot callables were consumed by the call
                None => {
                    slab.running -= 1;
                    slab.dealloc(e.idx);
                    true
                }
                _ => false,
            }
        };

        if !rearmed {
            // a cancelled periodic event, drop it outside of the lock
            if panic::catch_unwind(AssertUnwindSafe(|| unsafe { (e.drop)(p) })).is_err() {
                warn!("destructor panicked while dropping {:?}", id);
            }

            let mut slab = self.slab.lock();
            slab.running -= 1;
            slab.dealloc(e.idx);
        }
    }

    // One dispatch round, every event that is due when the round starts
    // runs, events posted during the round wait for the next one
    fn dispatch_round(&self, deadline: Option<utick>) -> Step {
        let now = self.clock.now();
        let seq = self.slab.lock().peek_seq();

        loop {
            // should we stop dispatching?
            if self.break_.swap(false, AtomicOrdering::SeqCst) {
                return Step::Exit(Exit::Break);
            }

            self.reclaim();

            match self.dequeue(now, seq) {
                Some(e) => self.run(e),
                None => break,
            }
        }

        // note that time could have changed _significantly_
        let now = self.clock.now();
        let left = deadline.map(|deadline| sdiff(deadline, now));
        if let Some(left) = left {
            if left <= 0 {
                return Step::Exit(Exit::Timeout);
            }
        }

        // ok how long should we sleep for
        let next = self.slab.lock().peek()
            .map(|slot| max(sdiff(slot.target, now), 0));
        let delay = match (next, left) {
            (Some(next), Some(left)) => Some(min(next, left)),
            (next, left) => next.or(left),
        };

        Step::Wait(delay.map(Delta::new))
    }

    // None means no deadline
    fn timeout<D>(&self, timeout: D) -> Result<Option<Delta>, Error>
    where
        D: TryIntoDelta,
        D::Error: Into<DeltaError>,
    {
        let timeout = timeout.try_into_delta(self.clock.frequency())
            .map_err(Into::<DeltaError>::into);
        match timeout {
            Ok(timeout) if timeout.ticks() < 0 => Err(Error::InvalidArgument),
            Ok(timeout) => Ok(Some(timeout)),
            Err(DeltaError::Overflow) => Ok(None),
            Err(DeltaError::Negative) => Err(Error::InvalidArgument),
        }
    }

    fn deadline(&self, timeout: Option<Delta>) -> Option<utick> {
        timeout.map(|timeout| self.clock.now().wrapping_add(timeout.uticks()))
    }
}

impl<'a, C: Clock + Sema> EventQueue<'a, C> {
    fn dispatch_(&self, timeout: Option<Delta>) -> Result<Exit, Error> {
        let _guard = self.enter()?;
        let deadline = self.deadline(timeout);
        debug!("dispatch start, timeout {:?}", timeout);

        loop {
            match self.dispatch_round(deadline) {
                Step::Exit(exit) => {
                    debug!("dispatch exit, {:?}", exit);
                    return Ok(exit);
                }
                Step::Wait(None) => self.clock.wait(),
                Step::Wait(Some(delay)) if delay.ticks() > 0 => {
                    self.clock.wait_timeout(delay)
                }
                Step::Wait(Some(_)) => {}
            }
        }
    }

    /// Dispatch events until `timeout` passes or dispatch is broken
    ///
    /// A timeout too large to represent in clock ticks, such as
    /// `Duration::MAX`, dispatches with no deadline.
    pub fn dispatch<D>(&self, timeout: D) -> Result<Exit, Error>
    where
        D: TryIntoDelta,
        D::Error: Into<DeltaError>,
    {
        let timeout = self.timeout(timeout)?;
        self.dispatch_(timeout)
    }

    pub fn dispatch_ready(&self) -> Result<Exit, Error> {
        self.dispatch_(Some(Delta::ZERO))
    }

    /// Dispatch events until dispatch is broken
    ///
    /// This is intended to be the sole job of a dedicated worker.
    pub fn dispatch_forever(&self) -> Result<Exit, Error> {
        self.dispatch_(None)
    }
}

impl<'a, C: Clock + AsyncSema> EventQueue<'a, C> {
    async fn dispatch_async_(&self, timeout: Option<Delta>) -> Result<Exit, Error> {
        let _guard = self.enter()?;
        let deadline = self.deadline(timeout);
        debug!("async dispatch start, timeout {:?}", timeout);

        loop {
            match self.dispatch_round(deadline) {
                Step::Exit(exit) => {
                    debug!("async dispatch exit, {:?}", exit);
                    return Ok(exit);
                }
                Step::Wait(None) => self.clock.wait_async().await,
                Step::Wait(Some(delay)) if delay.ticks() > 0 => {
                    self.clock.wait_timeout_async(delay).await
                }
                Step::Wait(Some(_)) => {}
            }
        }
    }

    pub async fn dispatch_async<D>(&self, timeout: D) -> Result<Exit, Error>
    where
        D: TryIntoDelta,
        D::Error: Into<DeltaError>,
    {
        let timeout = self.timeout(timeout)?;
        self.dispatch_async_(timeout).await
    }

    pub async fn dispatch_forever_async(&self) -> Result<Exit, Error> {
        self.dispatch_async_(None).await
    }
}

impl<C> Drop for EventQueue<'_, C> {
    fn drop(&mut self) {
        let storage = self.storage;
        let stride = self.stride;
        let slab = self.slab.get_mut();

        // nothing can be running, we have exclusive access
        let mut dropped = 0;
        for (idx, slot) in slab.slots.iter().enumerate() {
            if slot.state == State::Pending || slot.state == State::Reclaim {
                let p = unsafe { storage.as_ptr().add(idx * stride) };
                let drop = slot.drop;
                if panic::catch_unwind(AssertUnwindSafe(|| unsafe { drop(p) })).is_err() {
                    warn!("destructor panicked while dropping slot {}", idx);
                }
                dropped += 1;
            }
        }

        if dropped > 0 {
            debug!("dropped {} pending events", dropped);
        }

        unsafe { sys::dealloc(self.storage.as_ptr(), self.layout) };
    }
}


/// A handle limited to operations that are safe from constrained contexts
pub struct Poster<'q, 'a, C> {
    q: &'q EventQueue<'a, C>,
}

impl<C> Clone for Poster<'_, '_, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for Poster<'_, '_, C> {}

impl<C: fmt::Debug> fmt::Debug for Poster<'_, '_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Poster")
            .field("q", self.q)
            .finish()
    }
}

impl<'q, 'a, C: Clock + Signal> Poster<'q, 'a, C> {
    pub fn call<F>(&self, f: F) -> Result<Id, Error>
    where
        F: PostOnce + Send + 'a
    {
        self.q.call(f)
    }

    pub fn call_in<D, F>(&self, delay: D, f: F) -> Result<Id, Error>
    where
        D: TryIntoDelta,
        F: PostOnce + Send + 'a
    {
        self.q.call_in(delay, f)
    }

    pub fn call_every<D, F>(&self, period: D, f: F) -> Result<Id, Error>
    where
        D: TryIntoDelta,
        F: Post + Send + 'a
    {
        self.q.call_every(period, f)
    }

    pub fn cancel(&self, id: Id) -> bool {
        self.q.cancel(id)
    }

    pub fn break_dispatch(&self) {
        self.q.break_dispatch()
    }
}
