//! Headsign Hardware Abstraction Layer
//!
//! This crate defines the seams between the message engine and the board it
//! runs on. Chip-specific crates implement these traits; host builds get
//! SQLite and in-memory storage behind the `std` feature.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  headsign-core (engine + controller)    │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  headsign-hal (this crate - traits)     │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │ headsign-hal- │       │  std backends │
//! │    rp2040     │       │(sqlite/memory)│
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`storage::RecordStorage`] - Durable keyed records
//! - [`serial::SerialTransport`] - Acknowledged serial writes
//! - [`time::TimeSource`] - Authoritative wall-clock time
//! - [`time::Monotonic`] - Local elapsed milliseconds

#![cfg_attr(not(any(feature = "std", test)), no_std)]
#![deny(unsafe_code)]

pub mod serial;
pub mod storage;
pub mod time;

#[cfg(any(feature = "std", test))]
pub mod sqlite;
#[cfg(any(feature = "std", test))]
pub mod memory;

// Re-export key traits at crate root for convenience
pub use serial::{AckFlag, SerialTransport, TransportError, UartConfig};
pub use storage::{RecordKey, RecordStorage, StorageError};
pub use time::{Monotonic, TimeSource, TimeSourceError};

#[cfg(any(feature = "std", test))]
pub use sqlite::SqliteStorage;
#[cfg(any(feature = "std", test))]
pub use memory::MemoryStorage;
