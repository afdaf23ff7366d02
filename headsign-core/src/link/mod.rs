//! Display link
//!
//! Streams frames to the sign as BUSE120 commands over a
//! [`SerialTransport`]. Only fields that changed since the last frame the
//! sign fully acknowledged are sent. A failed frame is dropped and the
//! link asks for a full refresh on the next tick.

use headsign_hal::{SerialTransport, TransportError};
use headsign_protocol::{BuseCommand, BuseError};

use crate::render::DisplayFrame;

/// Consecutive failures before the link reports itself degraded
pub const DEGRADED_AFTER: u8 = 3;

/// Errors from the display link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError {
    /// The sign did not acknowledge inside the ack window
    Timeout,
    /// The UART failed
    Bus,
    /// A command could not be encoded
    Encode,
}

impl From<TransportError> for LinkError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Timeout => LinkError::Timeout,
            TransportError::Bus => LinkError::Bus,
        }
    }
}

impl From<BuseError> for LinkError {
    fn from(_: BuseError) -> Self {
        LinkError::Encode
    }
}

impl core::fmt::Display for LinkError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            LinkError::Timeout => f.write_str("display ack timeout"),
            LinkError::Bus => f.write_str("display bus error"),
            LinkError::Encode => f.write_str("command encoding failed"),
        }
    }
}

/// Link health counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkHealth {
    pub consecutive_failures: u8,
    pub frames_sent: u32,
    pub frames_dropped: u32,
}

impl LinkHealth {
    pub fn is_degraded(&self) -> bool {
        self.consecutive_failures >= DEGRADED_AFTER
    }

    fn record_success(&mut self) {
        if self.is_degraded() {
            info!("link: recovered after {} failures", self.consecutive_failures);
        }
        self.consecutive_failures = 0;
    }

    fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.consecutive_failures == DEGRADED_AFTER {
            error!("link: degraded");
        }
    }
}

/// Frame sender with delta tracking and health accounting
pub struct DisplayLink<T> {
    transport: T,
    /// Frame waiting for the next flush
    pending: Option<DisplayFrame>,
    /// Clock update waiting for the next flush
    pending_time: Option<(u8, u8)>,
    /// Last frame the sign acknowledged in full; `None` forces a full send
    delivered: Option<DisplayFrame>,
    needs_refresh: bool,
    health: LinkHealth,
}

impl<T: SerialTransport> DisplayLink<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            pending: None,
            pending_time: None,
            delivered: None,
            needs_refresh: false,
            health: LinkHealth::default(),
        }
    }

    /// Queue a frame for the next flush, replacing any queued one
    pub fn queue(&mut self, frame: &DisplayFrame) {
        self.pending = Some(frame.clone());
    }

    /// Queue a `uHHMM` clock update for the next flush
    pub fn queue_time(&mut self, hour: u8, minute: u8) {
        self.pending_time = Some((hour, minute));
    }

    /// Whether anything waits for a flush
    pub fn has_pending(&self) -> bool {
        self.pending.is_some() || self.pending_time.is_some()
    }

    /// Send whatever is queued
    ///
    /// The frame goes first. A failed clock update is not retried; the next
    /// sync interval sends a fresh one.
    pub fn flush(&mut self) -> Result<(), LinkError> {
        let frame_result = match self.pending.take() {
            Some(frame) => self.send_frame(&frame),
            None => Ok(()),
        };

        if let Some((hour, minute)) = self.pending_time.take() {
            if let Err(e) = self.send_command(BuseCommand::Time { hour, minute }) {
                warn!("link: clock update failed: {}", e);
                frame_result?;
                return Err(e);
            }
        }
        frame_result
    }

    /// Send one frame now
    ///
    /// On failure the frame is dropped, and the next frame goes out in full.
    pub fn send_frame(&mut self, frame: &DisplayFrame) -> Result<(), LinkError> {
        let result = match &self.delivered {
            Some(previous) => write_commands(&mut self.transport, frame.changed_commands(previous)),
            None => write_commands(&mut self.transport, frame.commands().into_iter()),
        };

        match result {
            Ok(0) => {
                self.health.record_success();
                Ok(())
            }
            Ok(written) => {
                trace!("link: frame sent ({} commands)", written);
                self.delivered = Some(frame.clone());
                self.health.frames_sent = self.health.frames_sent.wrapping_add(1);
                self.health.record_success();
                Ok(())
            }
            Err(e) => {
                warn!("link: frame dropped: {}", e);
                self.delivered = None;
                self.needs_refresh = true;
                self.health.frames_dropped = self.health.frames_dropped.wrapping_add(1);
                self.health.record_failure();
                Err(e)
            }
        }
    }

    /// Send a single command outside the frame stream
    ///
    /// A raw command leaves the sign in an unknown state, so the next frame
    /// is sent in full.
    pub fn send_command(&mut self, command: BuseCommand<'_>) -> Result<(), LinkError> {
        if matches!(command, BuseCommand::Raw(_)) {
            self.delivered = None;
        }
        match write_commands(&mut self.transport, core::iter::once(command)) {
            Ok(_) => {
                self.health.record_success();
                Ok(())
            }
            Err(e) => {
                self.health.record_failure();
                Err(e)
            }
        }
    }

    /// Whether the current frame must be re-queued, clearing the request
    pub fn take_refresh(&mut self) -> bool {
        core::mem::take(&mut self.needs_refresh)
    }

    pub fn health(&self) -> LinkHealth {
        self.health
    }

    pub fn is_degraded(&self) -> bool {
        self.health.is_degraded()
    }

    /// Last frame the sign acknowledged in full
    pub fn delivered(&self) -> Option<&DisplayFrame> {
        self.delivered.as_ref()
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

/// Encode and write each command, stopping at the first failure
fn write_commands<'a, T: SerialTransport>(
    transport: &mut T,
    commands: impl Iterator<Item = BuseCommand<'a>>,
) -> Result<usize, LinkError> {
    let mut written = 0;
    for command in commands {
        let bytes = command.encode()?;
        transport.write(&bytes)?;
        written += 1;
    }
    Ok(written)
}
