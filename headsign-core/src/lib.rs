//! Message scheduling and persistence engine for the headsign firmware
//!
//! Everything here is board-agnostic:
//!
//! - Message store with durable keyed records
//! - Scheduler (priority, recency, and emergency rules)
//! - Transition renderer
//! - Display link (BUSE120 over an acknowledged serial transport)
//! - Clock sync
//! - Controller tying them together behind `start` and `tick`
//!
//! Board crates supply the [`headsign_hal`] traits.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

// Must come first so the logging macros are visible to every module
#[macro_use]
mod fmt;

pub mod clock;
pub mod config;
pub mod controller;
pub mod link;
pub mod render;
pub mod scheduler;
pub mod store;

pub use clock::ClockSync;
pub use config::{ConfigError, ControllerConfig};
pub use controller::{
    Controller, NoTelemetry, SelfCheckReport, StartError, StartReport, Telemetry, TelemetrySink,
    TickReport,
};
pub use link::{DisplayLink, LinkError, LinkHealth};
pub use render::{DisplayFrame, Renderer};
pub use scheduler::{DisplaySlot, Scheduler, SchedulerState};
pub use store::{Message, MessageId, MessageStore, NewMessage, StoreError, Timestamp, ValidationError};
