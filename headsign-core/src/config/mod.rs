//! Controller configuration
//!
//! The fixed set of parameters the controller is built with. Values arrive
//! from the board's configuration file and are validated once, before
//! anything else starts.

pub mod types;

pub use types::*;
