//! Ephemeral messages
//!
//! RAM-only messages with a display budget. They never reach storage, are
//! gone after a reboot, and leave once their showings or their TTL run out.
//! The queue is kept highest priority first; equal priorities keep arrival
//! order.

use heapless::Vec;

use super::message::{Message, MessageId, NewMessage, Timestamp, ValidationError};

/// Maximum queued ephemeral messages
pub const MAX_EPHEMERAL: usize = 8;

/// An ephemeral message and its display budget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EphemeralMessage {
    pub message: Message,
    /// Showings left; `None` runs until the TTL
    pub remaining: Option<u16>,
}

impl EphemeralMessage {
    /// Whether the budget is used up or the TTL has passed
    pub fn is_spent(&self, now: Timestamp) -> bool {
        self.remaining == Some(0) || self.message.is_expired(now)
    }

    /// Whether the message may be selected at `now`
    pub fn is_live(&self, now: Timestamp) -> bool {
        !self.is_spent(now) && self.message.enabled
    }
}

/// Priority-ordered queue of ephemeral messages
///
/// Ids come from their own counter and never collide with stored ids in a
/// [`crate::scheduler::DisplaySlot`].
#[derive(Debug, Clone)]
pub struct EphemeralQueue {
    entries: Vec<EphemeralMessage, MAX_EPHEMERAL>,
    next_id: MessageId,
}

impl Default for EphemeralQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EphemeralQueue {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
        }
    }

    /// Queue a message for at most `display_count` showings
    ///
    /// A count of zero keeps it until its TTL. Spent entries make room when
    /// the queue is full.
    pub fn push(
        &mut self,
        draft: &NewMessage<'_>,
        display_count: u16,
        now: Timestamp,
    ) -> Result<MessageId, ValidationError> {
        draft.validate()?;
        if self.entries.is_full() {
            self.entries.retain(|e| !e.is_spent(now));
        }
        if self.entries.is_full() {
            return Err(ValidationError::Full);
        }

        let id = self.next_id;
        self.next_id = self.next_id.checked_add(1).unwrap_or(1);
        let entry = EphemeralMessage {
            message: Message::from_draft(id, draft, now)?,
            remaining: (display_count > 0).then_some(display_count),
        };

        let pos = self
            .entries
            .iter()
            .position(|e| e.message.priority < entry.message.priority)
            .unwrap_or(self.entries.len());
        // Room made above
        let _ = self.entries.insert(pos, entry);
        debug!(
            "ephemeral: queued {} priority {} count {}",
            id, draft.priority, display_count
        );
        Ok(id)
    }

    pub fn get(&self, id: MessageId) -> Option<&EphemeralMessage> {
        self.entries.iter().find(|e| e.message.id == id)
    }

    /// Drop one entry; returns whether it existed
    pub fn remove(&mut self, id: MessageId) -> bool {
        match self.entries.iter().position(|e| e.message.id == id) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in selection order, spent ones included
    pub fn iter(&self) -> impl Iterator<Item = &EphemeralMessage> {
        self.entries.iter()
    }

    /// Number of entries still selectable at `now`
    pub fn live_count(&self, now: Timestamp) -> usize {
        self.entries.iter().filter(|e| e.is_live(now)).count()
    }

    /// Best live entry outside its repeat window
    pub fn next_eligible(&self, now: Timestamp, window_s: u32) -> Option<&Message> {
        self.entries
            .iter()
            .filter(|e| e.is_live(now))
            .map(|e| &e.message)
            .find(|m| !m.shown_within(now, window_s))
    }

    /// Record one completed showing and spend one unit of budget
    ///
    /// A spent entry stays queued, so it can finish its dwell on screen,
    /// until [`EphemeralQueue::purge`] drops it.
    pub fn mark_shown(&mut self, id: MessageId, now: Timestamp) -> bool {
        let Some(entry) = self.entries.iter_mut().find(|e| e.message.id == id) else {
            return false;
        };
        entry.message.show_count = entry.message.show_count.saturating_add(1);
        entry.message.last_shown_at = Some(now);
        if let Some(left) = entry.remaining.as_mut() {
            *left = left.saturating_sub(1);
            if *left == 0 {
                info!("ephemeral: {} reached its display count", id);
            }
        }
        true
    }

    /// Drop spent entries other than `on_screen`
    ///
    /// Returns the number of entries dropped.
    pub fn purge(&mut self, now: Timestamp, on_screen: Option<MessageId>) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|e| !e.is_spent(now) || Some(e.message.id) == on_screen);
        let dropped = before - self.entries.len();
        if dropped > 0 {
            debug!("ephemeral: dropped {} spent messages", dropped);
        }
        dropped
    }
}
