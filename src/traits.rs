
use core::convert::Infallible;
use core::fmt;
use core::fmt::Debug;
use core::future::Future;
use core::time::Duration;

use crate::Delta;
use crate::sys::utick;
use crate::sys::itick;


//// post traits ////

/// Post trait, for callables that can run more than once
pub trait Post {
    fn post(&mut self);
}

impl<F: FnMut()> Post for F {
    fn post(&mut self) {
        self()
    }
}

/// Post-once trait, a special case for one-shot events
pub trait PostOnce {
    fn post_once(self);
}

impl<F: FnOnce()> PostOnce for F {
    fn post_once(self) {
        self()
    }
}


//// System level traits ////

/// Some way to get the time, for some definition of time
///
/// The clock must be monotonic. Ticks are allowed to wrap, the queue only
/// ever compares them through their signed difference.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> utick;

    /// Ticks per second
    fn frequency(&self) -> utick {
        1000
    }
}

/// Wake up a waiting dispatcher, must be safe to call from any context
pub trait Signal: Send + Sync + Debug {
    fn signal(&self);
}

/// Binary semaphore, aka a waiting/signalling primitive
///
/// Spurious wakeups are fine, the dispatcher always rechecks the queue.
pub trait Sema: Signal {
    fn wait(&self);
    fn wait_timeout(&self, delta: Delta);
}

/// An asynchronous binary semaphore, for waiting asynchronously
pub trait AsyncSema: Signal {
    type AsyncWait<'a>: Future<Output=()> where Self: 'a;

    fn wait_async(&self) -> Self::AsyncWait<'_>;
    fn wait_timeout_async(&self, delta: Delta) -> Self::AsyncWait<'_>;
}


//// Into/From delta traits ////

/// A trait for converting to a delta in the clock's ticks
pub trait TryIntoDelta {
    type Error: Debug;
    fn try_into_delta(self, frequency: utick) -> Result<Delta, Self::Error>;
}

/// A trait for converting from a delta in the clock's ticks
pub trait TryFromDelta: Sized {
    type Error: Debug;
    fn try_from_delta(delta: Delta, frequency: utick) -> Result<Self, Self::Error>;
}

/// Delta conversion errors
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DeltaError {
    Overflow,
    Negative,
}

impl fmt::Display for DeltaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeltaError::Overflow => write!(f, "Delta overflow"),
            DeltaError::Negative => write!(f, "Negative delta"),
        }
    }
}

impl std::error::Error for DeltaError {}

impl From<Infallible> for DeltaError {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

impl TryIntoDelta for Delta {
    type Error = Infallible;
    #[inline]
    fn try_into_delta(self, _frequency: utick) -> Result<Delta, Self::Error> {
        Ok(self)
    }
}

impl TryIntoDelta for Duration {
    type Error = DeltaError;
    #[inline]
    fn try_into_delta(self, frequency: utick) -> Result<Delta, Self::Error> {
        // round up, a delay never fires early and a nonzero period
        // is never zero ticks
        self.as_nanos()
            .checked_mul(u128::from(frequency))
            .and_then(|ticks| ticks.checked_add(1_000_000_000-1))
            .map(|ticks| ticks / 1_000_000_000)
            .and_then(|ticks| itick::try_from(ticks).ok())
            .map(Delta::new)
            .ok_or(DeltaError::Overflow)
    }
}

impl TryFromDelta for Duration {
    type Error = DeltaError;
    #[inline]
    fn try_from_delta(delta: Delta, frequency: utick) -> Result<Self, Self::Error> {
        if delta.ticks() < 0 {
            return Err(DeltaError::Negative);
        }

        let nanos = u128::from(delta.uticks())
            .checked_mul(1_000_000_000)
            .ok_or(DeltaError::Overflow)?
            / u128::from(frequency.max(1));
        let secs = u64::try_from(nanos / 1_000_000_000)
            .map_err(|_| DeltaError::Overflow)?;
        Ok(Duration::new(secs, (nanos % 1_000_000_000) as u32))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_to_delta() {
        let d = Duration::from_millis(250);
        assert_eq!(d.try_into_delta(1000), Ok(Delta::new(250)));
        assert_eq!(d.try_into_delta(1_000_000), Ok(Delta::new(250_000)));
        assert_eq!(Duration::MAX.try_into_delta(utick::MAX), Err(DeltaError::Overflow));
    }

    #[test]
    fn test_duration_to_delta_rounds_up() {
        assert_eq!(Duration::ZERO.try_into_delta(1000), Ok(Delta::ZERO));
        assert_eq!(Duration::from_nanos(1).try_into_delta(1000), Ok(Delta::new(1)));
        assert_eq!(Duration::from_micros(500).try_into_delta(1000), Ok(Delta::new(1)));
        assert_eq!(Duration::from_micros(1500).try_into_delta(1000), Ok(Delta::new(2)));
        assert_eq!(Duration::from_micros(2000).try_into_delta(1000), Ok(Delta::new(2)));
    }

    #[test]
    fn test_delta_to_duration() {
        assert_eq!(
            Duration::try_from_delta(Delta::new(1500), 1000),
            Ok(Duration::from_millis(1500))
        );
        assert_eq!(
            Duration::try_from_delta(Delta::new(7), 1_000_000),
            Ok(Duration::from_micros(7))
        );
        assert_eq!(
            Duration::try_from_delta(Delta::new(-1), 1000),
            Err(DeltaError::Negative)
        );
    }
}
