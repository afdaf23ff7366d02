//! Display scheduler
//!
//! Decides, once per tick, whether the sign should move to another message
//! and drives the renderer toward it. A transition is only committed
//! (counted as a showing) once the renderer has emitted its settled target.

use headsign_hal::RecordStorage;

use super::selection::{choose, preempting_emergency, DisplaySlot};
use crate::render::{DisplayFrame, Renderer, TransitionHandle};
use crate::store::{MessageId, MessageStore, StoreError, Timestamp};

/// Scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SchedulerState {
    /// Nothing committed yet
    Idle,
    /// A slot is settled on screen
    Displaying,
    /// The renderer is moving toward a new slot
    Transitioning,
}

/// Scheduler tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SchedulerConfig {
    /// Repeat-suppression window in seconds
    pub repeat_window_s: u32,
    /// Transition length in milliseconds
    pub transition_ms: u64,
}

/// What happened during one scheduler tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SchedulerTick {
    /// Transition completed this tick
    pub committed: Option<DisplaySlot>,
    /// Transition started this tick
    pub started: Option<DisplaySlot>,
    /// The started transition abandoned one in flight
    pub preempted: bool,
    /// Expired messages removed
    pub purged: usize,
    /// A replacement was held back by the dwell time
    pub damped: bool,
}

/// Message rotation state machine
#[derive(Debug, Clone)]
pub struct Scheduler {
    config: SchedulerConfig,
    state: SchedulerState,
    /// Slot settled on screen
    currently_displayed: Option<DisplaySlot>,
    /// Slot being transitioned to
    target: Option<(DisplaySlot, TransitionHandle)>,
    /// Wall time at which the current slot finished drawing
    last_transition_at: Option<Timestamp>,
    paused: bool,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            state: SchedulerState::Idle,
            currently_displayed: None,
            target: None,
            last_transition_at: None,
            paused: false,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Stored message of record on screen
    pub fn currently_displayed(&self) -> Option<MessageId> {
        self.currently_displayed.and_then(|slot| slot.message_id())
    }

    /// Slot of record on screen, including the fallback
    pub fn showing(&self) -> Option<DisplaySlot> {
        self.currently_displayed
    }

    /// Slot of the transition in flight
    pub fn target(&self) -> Option<DisplaySlot> {
        self.target.map(|(slot, _)| slot)
    }

    pub fn last_transition_at(&self) -> Option<Timestamp> {
        self.last_transition_at
    }

    /// Stop selecting new messages; a running transition still completes
    pub fn pause(&mut self) {
        if !self.paused {
            info!("scheduler: paused");
        }
        self.paused = true;
    }

    pub fn resume(&mut self) {
        if self.paused {
            info!("scheduler: resumed");
        }
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Run one scheduling step
    ///
    /// Store errors leave the scheduler as it was, so the same step is
    /// retried on the next tick.
    pub fn tick<S: RecordStorage>(
        &mut self,
        store: &mut MessageStore<S>,
        renderer: &mut Renderer,
        now: Timestamp,
        now_ms: u64,
    ) -> Result<SchedulerTick, StoreError> {
        let mut report = SchedulerTick::default();
        let window = self.config.repeat_window_s;

        if let Some((slot, handle)) = self.target {
            if renderer.is_complete(&handle) {
                self.commit(store, slot, &handle, now, now_ms)?;
                report.committed = Some(slot);
            } else {
                if !self.paused {
                    if let Some(next) = preempting_emergency(store, slot, now, window) {
                        warn!("scheduler: emergency {} preempts transition", next);
                        self.begin(store, renderer, next, now_ms);
                        report.started = Some(next);
                        report.preempted = true;
                    }
                }
                return Ok(report);
            }
        }

        if self.paused {
            return Ok(report);
        }

        report.purged = store.purge_expired(now)?;
        let on_screen = match self.currently_displayed {
            Some(DisplaySlot::Ephemeral(id)) => Some(id),
            _ => None,
        };
        report.purged += store.ephemeral_mut().purge(now, on_screen);

        let choice = choose(store, self.currently_displayed, now, window);
        if Some(choice.slot) == self.currently_displayed {
            return Ok(report);
        }

        if !choice.emergency && self.dwelling(store, now) {
            report.damped = true;
            return Ok(report);
        }

        debug!("scheduler: selected {} ({})", choice.slot, choice.reason);
        self.begin(store, renderer, choice.slot, now_ms);
        report.started = Some(choice.slot);
        Ok(report)
    }

    fn commit<S: RecordStorage>(
        &mut self,
        store: &mut MessageStore<S>,
        slot: DisplaySlot,
        handle: &TransitionHandle,
        now: Timestamp,
        now_ms: u64,
    ) -> Result<(), StoreError> {
        // Ticks may be sparse; date the showing from when drawing finished
        let late_s = now_ms.saturating_sub(handle.settles_at_ms()) / 1000;
        let settled_at = now.saturating_sub(late_s);

        match slot {
            DisplaySlot::Message(id) => match store.mark_shown(id, settled_at) {
                Ok(()) => {}
                Err(StoreError::NotFound) => {
                    debug!("scheduler: message {} removed mid-transition", id);
                }
                Err(e) => return Err(e),
            },
            DisplaySlot::Ephemeral(id) => {
                if !store.ephemeral_mut().mark_shown(id, settled_at) {
                    debug!("scheduler: ephemeral {} dropped mid-transition", id);
                }
            }
            DisplaySlot::Fallback => {}
        }

        self.currently_displayed = Some(slot);
        self.target = None;
        self.last_transition_at = Some(settled_at);
        self.state = SchedulerState::Displaying;
        Ok(())
    }

    fn begin<S: RecordStorage>(
        &mut self,
        store: &MessageStore<S>,
        renderer: &mut Renderer,
        slot: DisplaySlot,
        now_ms: u64,
    ) {
        let frame = match slot.resolve(store) {
            Some(message) => DisplayFrame::from_message(message),
            None => DisplayFrame::fallback(),
        };
        let handle = renderer.begin(frame, self.config.transition_ms, now_ms);
        self.target = Some((slot, handle));
        self.state = SchedulerState::Transitioning;
    }

    /// Whether the current message is still inside its dwell time
    fn dwelling<S: RecordStorage>(&self, store: &MessageStore<S>, now: Timestamp) -> bool {
        let current = self.currently_displayed.and_then(|slot| slot.resolve(store));
        match (current, self.last_transition_at) {
            (Some(message), Some(at)) if message.is_live(now) => {
                now.saturating_sub(at) < message.dwell_s() as u64
            }
            _ => false,
        }
    }
}
