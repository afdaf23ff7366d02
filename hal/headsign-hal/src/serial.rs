//! Serial link abstractions
//!
//! The display is driven over a UART. A write is only considered delivered
//! once the transport has seen an acknowledgment inside a bounded window.

use portable_atomic::{AtomicU32, Ordering};

/// Errors from transport writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// No acknowledgment arrived inside the ack window
    Timeout,
    /// The UART peripheral reported an error
    Bus,
}

impl core::fmt::Display for TransportError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TransportError::Timeout => f.write_str("ack timeout"),
            TransportError::Bus => f.write_str("uart bus error"),
        }
    }
}

/// Serial transport to the display
///
/// `write` sends the bytes and waits at most the implementation's ack
/// window. `Ok(())` means acknowledged (or, for displays that never
/// acknowledge, fully transmitted).
pub trait SerialTransport {
    /// Write data and wait for acknowledgment
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
}

impl<T: SerialTransport + ?Sized> SerialTransport for &mut T {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).write(bytes)
    }
}

/// Last-ack flag shared with the receive interrupt
///
/// The receive side only ever calls [`AckFlag::notify`]; the transmit side
/// takes a snapshot before writing and polls [`AckFlag::acknowledged_since`].
/// This is the only mutable state crossing the interrupt boundary.
#[derive(Debug)]
pub struct AckFlag {
    seq: AtomicU32,
}

impl Default for AckFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl AckFlag {
    /// Create a flag with no acknowledgments recorded
    pub const fn new() -> Self {
        Self {
            seq: AtomicU32::new(0),
        }
    }

    /// Record one acknowledgment (interrupt context)
    pub fn notify(&self) {
        self.seq.fetch_add(1, Ordering::Release);
    }

    /// Current acknowledgment sequence number
    pub fn snapshot(&self) -> u32 {
        self.seq.load(Ordering::Acquire)
    }

    /// Whether any acknowledgment arrived after `snapshot` was taken
    pub fn acknowledged_since(&self, snapshot: u32) -> bool {
        self.snapshot() != snapshot
    }
}

/// UART configuration
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UartConfig {
    /// Baud rate in bits per second
    pub baudrate: u32,
    /// Number of data bits (typically 8)
    pub data_bits: DataBits,
    /// Parity mode
    pub parity: Parity,
    /// Number of stop bits
    pub stop_bits: StopBits,
}

impl Default for UartConfig {
    /// IBIS-era destination signs run at 1200 baud
    fn default() -> Self {
        Self {
            baudrate: 1200,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

/// Number of data bits per frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataBits {
    Seven,
    Eight,
}

/// Parity mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// Number of stop bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StopBits {
    One,
    Two,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_flag_tracks_notifications() {
        let flag = AckFlag::new();
        let before = flag.snapshot();
        assert!(!flag.acknowledged_since(before));

        flag.notify();
        assert!(flag.acknowledged_since(before));

        let after = flag.snapshot();
        assert!(!flag.acknowledged_since(after));
    }

    #[test]
    fn test_ack_flag_wraps() {
        let flag = AckFlag {
            seq: AtomicU32::new(u32::MAX),
        };
        let before = flag.snapshot();
        flag.notify();
        assert!(flag.acknowledged_since(before));
        assert_eq!(flag.snapshot(), 0);
    }
}
