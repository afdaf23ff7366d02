//! Frame rendering
//!
//! Turns messages into display frames and animates between them.

pub mod frame;
pub mod transition;

pub use frame::DisplayFrame;
pub use transition::{Renderer, TransitionHandle};
