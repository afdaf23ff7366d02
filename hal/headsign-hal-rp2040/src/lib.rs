//! RP2040-specific HAL for the headsign firmware
//!
//! Implements the shared `headsign-hal` traits on RP2040 peripherals:
//!
//! - Flash record storage (implements `headsign_hal::RecordStorage`)
//! - BUSE display UART with acknowledgment window
//!   (implements `headsign_hal::SerialTransport`)
//! - Embassy monotonic clock and host-fed wall clock

#![no_std]

pub mod flash;
pub mod time;
pub mod uart;

// Re-export shared traits from headsign-hal for convenience
pub use headsign_hal::{RecordKey, RecordStorage, SerialTransport, TimeSource};
