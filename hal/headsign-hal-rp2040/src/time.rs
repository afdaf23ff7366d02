//! RP2040 clocks
//!
//! [`EmbassyMonotonic`] reads the embassy time driver. Wall-clock time has
//! no battery-backed source on this board, so it comes from the host link:
//! the host sets a [`HostClock`] fix and [`HostTimeSource`] extrapolates
//! from it.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::Instant;

use headsign_hal::{Monotonic, TimeSource, TimeSourceError};

/// Earliest Unix time accepted from the host (2020-01-01)
pub const MIN_VALID_UNIX: u64 = 1_577_836_800;

/// Milliseconds since boot from the embassy time driver
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbassyMonotonic;

impl Monotonic for EmbassyMonotonic {
    fn now_ms(&self) -> u64 {
        Instant::now().as_millis()
    }
}

/// Unix time fixed at a boot-relative instant
#[derive(Debug, Clone, Copy)]
struct Fix {
    unix: u64,
    at_ms: u64,
}

/// Last wall-clock fix received from the host
pub struct HostClock {
    fix: Mutex<CriticalSectionRawMutex, Cell<Option<Fix>>>,
}

impl Default for HostClock {
    fn default() -> Self {
        Self::new()
    }
}

impl HostClock {
    pub const fn new() -> Self {
        Self {
            fix: Mutex::new(Cell::new(None)),
        }
    }

    /// Record host time; rejects values before [`MIN_VALID_UNIX`]
    pub fn set(&self, unix: u64) -> Result<(), TimeSourceError> {
        if unix < MIN_VALID_UNIX {
            return Err(TimeSourceError::Invalid);
        }
        let fix = Fix {
            unix,
            at_ms: EmbassyMonotonic.now_ms(),
        };
        self.fix.lock(|cell| cell.set(Some(fix)));
        Ok(())
    }

    fn get(&self) -> Option<Fix> {
        self.fix.lock(|cell| cell.get())
    }
}

/// Time source backed by a [`HostClock`]
pub struct HostTimeSource {
    clock: &'static HostClock,
    /// Fixes older than this are treated as stale
    max_age_ms: u64,
}

impl HostTimeSource {
    pub fn new(clock: &'static HostClock, max_age_ms: u64) -> Self {
        Self { clock, max_age_ms }
    }
}

impl TimeSource for HostTimeSource {
    fn fetch_unix_time(&mut self) -> Result<u64, TimeSourceError> {
        let fix = self.clock.get().ok_or(TimeSourceError::Unavailable)?;
        let age_ms = EmbassyMonotonic.now_ms().saturating_sub(fix.at_ms);
        if age_ms > self.max_age_ms {
            return Err(TimeSourceError::Unavailable);
        }
        Ok(fix.unix + age_ms / 1000)
    }
}
