//! Telemetry snapshots
//!
//! Pushed to an optional sink after every tick. Publishing is best-effort:
//! a failing sink never affects scheduling.

use crate::scheduler::SchedulerState;
use crate::store::{MessageId, Timestamp};

/// Controller state after one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Telemetry {
    /// Best-known Unix time
    pub now: Timestamp,
    /// Messages still eligible for display
    pub queue_depth: u8,
    /// Ephemeral messages still to be shown
    pub ephemeral_depth: u8,
    /// Message of record on screen
    pub last_shown: Option<MessageId>,
    pub state: SchedulerState,
    pub paused: bool,
    pub link_degraded: bool,
    pub frames_dropped: u32,
    pub clock_synced: bool,
}

/// The sink could not take the snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TelemetryError;

/// Destination for telemetry snapshots
pub trait TelemetrySink {
    fn publish(&mut self, telemetry: &Telemetry) -> Result<(), TelemetryError>;
}

impl<K: TelemetrySink + ?Sized> TelemetrySink for &mut K {
    fn publish(&mut self, telemetry: &Telemetry) -> Result<(), TelemetryError> {
        (**self).publish(telemetry)
    }
}

/// Sink that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTelemetry;

impl TelemetrySink for NoTelemetry {
    fn publish(&mut self, _telemetry: &Telemetry) -> Result<(), TelemetryError> {
        Ok(())
    }
}
