//! Embassy async tasks
//!
//! Each task runs independently and communicates via channels/signals.

pub mod controller;
pub mod display_ack;
pub mod host_link;
pub mod tick;

pub use controller::controller_task;
pub use display_ack::display_ack_task;
pub use host_link::{host_rx_task, host_tx_task};
pub use tick::tick_task;
