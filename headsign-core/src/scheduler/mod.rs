//! Message scheduler
//!
//! Selection rules live in [`selection`]; the tick-driven state machine that
//! applies them lives in [`executor`].

pub mod executor;
pub mod selection;

pub use executor::{Scheduler, SchedulerConfig, SchedulerState, SchedulerTick};
pub use selection::{choose, preempting_emergency, Choice, ChoiceReason, DisplaySlot};
