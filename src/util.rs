
use core::cell::UnsafeCell;
use core::cmp::Ordering;
use core::fmt;
use core::ops::Deref;
use core::ops::DerefMut;

use crate::sys::utick;
use crate::sys::itick;
use crate::sys::AtomicBool;
use crate::sys::AtomicOrdering;
use crate::sys::spin_loop;


// min/max
pub(crate) use core::cmp::min;
pub(crate) use core::cmp::max;

// alignup/aligndown
#[inline]
pub(crate) const fn aligndown(a: usize, align: usize) -> usize {
    a - (a % align)
}

#[inline]
pub(crate) const fn alignup(a: usize, align: usize) -> usize {
    aligndown(a + align-1, align)
}

// scmp/sdiff, ticks are allowed to wrap so all comparisons go through
// a signed difference
#[inline]
pub(crate) fn sdiff(a: utick, b: utick) -> itick {
    a.wrapping_sub(b) as itick
}

#[inline]
pub(crate) fn scmp(a: utick, b: utick) -> Ordering {
    sdiff(a, b).cmp(&0)
}

// parse integers at compile time
pub(crate) const fn parse_const_usize(s: &str) -> usize {
    let mut v = 0;
    let s = s.as_bytes();

    let mut i = 0;
    while i < s.len() {
        if s[i] >= b'0' && s[i] <= b'9' {
            v = v*10 + (s[i] - b'0') as usize;
        } else {
            panic!("invalid compile-time usize");
        }
        i += 1;
    }

    v
}


// Spinlock, the only lock producers ever take
//
// Critical sections never contain user code, so contention is bounded by
// the longest heap operation, which is O(log capacity)
pub(crate) struct SpinLock<T> {
    locked: AtomicBool,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub(crate) fn new(data: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }

    pub(crate) fn lock(&self) -> SpinLockGuard<'_, T> {
        loop {
            if self.locked.compare_exchange_weak(
                false, true,
                AtomicOrdering::Acquire, AtomicOrdering::Relaxed
            ).is_ok() {
                break;
            }

            // spin on a plain load to keep the cache line shared
            while self.locked.load(AtomicOrdering::Relaxed) {
                spin_loop();
            }
        }

        SpinLockGuard { lock: self }
    }

    pub(crate) fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<T: fmt::Debug> fmt::Debug for SpinLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpinLock")
            .field("data", &*self.lock())
            .finish()
    }
}

pub(crate) struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, AtomicOrdering::Release);
    }
}
