//! Clock sync
//!
//! Keeps a best-known Unix time by extrapolating from the last fix with
//! the local monotonic clock, and refreshes the fix from a [`TimeSource`]
//! on a fixed interval. A failed refresh only means the estimate keeps
//! drifting until the next attempt.

use headsign_hal::{TimeSource, TimeSourceError};

use crate::store::Timestamp;

/// Error from a sync attempt
pub type SyncError = TimeSourceError;

/// Wall-clock estimator with periodic resync
pub struct ClockSync<C> {
    source: C,
    /// Unix time at `base_ms`
    base_time: Timestamp,
    base_ms: u64,
    sync_interval_ms: u64,
    last_attempt_ms: Option<u64>,
    last_sync_at: Option<Timestamp>,
    is_synced: bool,
    consecutive_failures: u32,
}

impl<C: TimeSource> ClockSync<C> {
    /// Start unsynced at Unix time 0
    pub fn new(source: C, sync_interval_s: u32, now_ms: u64) -> Self {
        Self {
            source,
            base_time: 0,
            base_ms: now_ms,
            sync_interval_ms: sync_interval_s as u64 * 1000,
            last_attempt_ms: None,
            last_sync_at: None,
            is_synced: false,
            consecutive_failures: 0,
        }
    }

    /// Best-known Unix time
    pub fn now(&self, now_ms: u64) -> Timestamp {
        self.base_time + now_ms.saturating_sub(self.base_ms) / 1000
    }

    /// Lift the estimate to at least `at`
    ///
    /// Used at boot so the clock does not run behind timestamps already in
    /// the store. Never moves the estimate backwards.
    pub fn seed(&mut self, at: Timestamp, now_ms: u64) {
        if at > self.now(now_ms) {
            debug!("clock: seeded at {}", at);
            self.base_time = at;
            self.base_ms = now_ms;
        }
    }

    /// Whether a sync attempt is due
    pub fn is_due(&self, now_ms: u64) -> bool {
        match self.last_attempt_ms {
            Some(at) => now_ms.saturating_sub(at) >= self.sync_interval_ms,
            None => true,
        }
    }

    /// Attempt a sync if one is due
    ///
    /// Returns `None` when no attempt was made, otherwise the outcome.
    pub fn tick(&mut self, now_ms: u64) -> Option<Result<Timestamp, SyncError>> {
        if !self.is_due(now_ms) {
            return None;
        }
        self.last_attempt_ms = Some(now_ms);

        match self.source.fetch_unix_time() {
            Ok(unix) => {
                if !self.is_synced {
                    info!("clock: synced to {}", unix);
                }
                self.base_time = unix;
                self.base_ms = now_ms;
                self.last_sync_at = Some(unix);
                self.is_synced = true;
                self.consecutive_failures = 0;
                Some(Ok(unix))
            }
            Err(e) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                warn!(
                    "clock: sync failed ({}), {} in a row",
                    e, self.consecutive_failures
                );
                Some(Err(e))
            }
        }
    }

    /// Make the next tick attempt a sync regardless of the interval
    pub fn request_sync(&mut self) {
        self.last_attempt_ms = None;
    }

    /// Whether any sync has succeeded since boot
    pub fn is_synced(&self) -> bool {
        self.is_synced
    }

    /// Unix time of the last successful sync
    pub fn last_sync_at(&self) -> Option<Timestamp> {
        self.last_sync_at
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn sync_interval_ms(&self) -> u64 {
        self.sync_interval_ms
    }

    pub fn source_mut(&mut self) -> &mut C {
        &mut self.source
    }
}

/// Local hour and minute for a Unix time shifted by `offset_minutes`
pub fn local_hh_mm(unix: Timestamp, offset_minutes: i16) -> (u8, u8) {
    let minutes_of_day = (unix / 60 % 1440) as i64;
    let local = (minutes_of_day + offset_minutes as i64).rem_euclid(1440);
    ((local / 60) as u8, (local % 60) as u8)
}
