//! Time abstractions
//!
//! Two clocks: a monotonic millisecond counter owned by the board, and an
//! external authority for wall-clock time that may be unavailable.

/// Errors from the authoritative time source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimeSourceError {
    /// No time is available right now (no network, no host update)
    Unavailable,
    /// The source answered with a value that cannot be wall time
    Invalid,
}

impl core::fmt::Display for TimeSourceError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TimeSourceError::Unavailable => f.write_str("time source unavailable"),
            TimeSourceError::Invalid => f.write_str("time source returned invalid time"),
        }
    }
}

/// Authoritative wall-clock time
pub trait TimeSource {
    /// Fetch the current Unix time in seconds
    fn fetch_unix_time(&mut self) -> Result<u64, TimeSourceError>;
}

impl<T: TimeSource + ?Sized> TimeSource for &mut T {
    fn fetch_unix_time(&mut self) -> Result<u64, TimeSourceError> {
        (**self).fetch_unix_time()
    }
}

/// Monotonic millisecond counter since boot
pub trait Monotonic {
    /// Milliseconds elapsed since an arbitrary fixed origin
    fn now_ms(&self) -> u64;
}

impl<T: Monotonic + ?Sized> Monotonic for &T {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}
