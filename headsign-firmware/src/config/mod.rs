//! Firmware configuration
//!
//! The controller section maps onto [`ControllerConfig`]; the display and
//! host sections describe the two UARTs. Loaded from the embedded
//! `headsign.toml` by a small no_std parser.

pub mod toml;

use headsign_core::ControllerConfig;

pub use toml::{parse_config, ParseError, ParsedConfig};

/// Display UART settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DisplayLinkConfig {
    pub baudrate: u32,
    /// Ack wait per command; 0 for signs that never acknowledge
    pub ack_window_ms: u32,
}

impl Default for DisplayLinkConfig {
    fn default() -> Self {
        Self {
            baudrate: 1200,
            ack_window_ms: 250,
        }
    }
}

/// Host link UART settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HostLinkConfig {
    pub baudrate: u32,
    /// Host time fixes older than this are not used for syncs
    pub time_max_age_s: u32,
}

impl Default for HostLinkConfig {
    fn default() -> Self {
        Self {
            baudrate: 115_200,
            time_max_age_s: 86_400,
        }
    }
}

/// Everything `headsign.toml` configures
#[derive(Debug, Clone, Default)]
pub struct FirmwareConfig {
    pub controller: ControllerConfig,
    pub display: DisplayLinkConfig,
    pub host: HostLinkConfig,
}
