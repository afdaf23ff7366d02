//! Message selection rules
//!
//! Pure functions over the store: which slot should be on screen next, and
//! whether an emergency should cut into a running transition.
//!
//! Ephemeral messages go ahead of stored ones, except that a stored
//! emergency of equal or higher priority still wins.

use headsign_hal::RecordStorage;

use crate::store::{Message, MessageId, MessageStore, Timestamp};

/// What the sign is showing or about to show
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DisplaySlot {
    /// The idle frame
    Fallback,
    /// A stored message
    Message(MessageId),
    /// A RAM-only message from the ephemeral queue
    Ephemeral(MessageId),
}

impl DisplaySlot {
    /// Id of the stored message, if this slot is one
    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            DisplaySlot::Message(id) => Some(*id),
            DisplaySlot::Fallback | DisplaySlot::Ephemeral(_) => None,
        }
    }

    /// Content behind this slot, spent ephemerals included
    pub fn resolve<'a, S: RecordStorage>(&self, store: &'a MessageStore<S>) -> Option<&'a Message> {
        match self {
            DisplaySlot::Message(id) => store.get(*id),
            DisplaySlot::Ephemeral(id) => store.ephemeral().get(*id).map(|e| &e.message),
            DisplaySlot::Fallback => None,
        }
    }

    /// Whether the slot may still be held on screen at `now`
    fn is_live<S: RecordStorage>(&self, store: &MessageStore<S>, now: Timestamp) -> bool {
        match self {
            DisplaySlot::Message(id) => store.get(*id).is_some_and(|m| m.is_live(now)),
            DisplaySlot::Ephemeral(id) => store.ephemeral().get(*id).is_some_and(|e| e.is_live(now)),
            DisplaySlot::Fallback => false,
        }
    }
}

/// Why a slot was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChoiceReason {
    /// Best candidate outside its repeat window
    Eligible,
    /// Everything is inside its window; keep what is on screen
    HoldCurrent,
    /// Everything is inside its window and the current message is gone
    BestAvailable,
    /// No candidates at all
    Empty,
}

/// Result of a selection pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Choice {
    pub slot: DisplaySlot,
    pub emergency: bool,
    pub reason: ChoiceReason,
}

/// Pick the slot that should be on screen at `now`
///
/// `current` is the slot on screen, if any.
pub fn choose<S: RecordStorage>(
    store: &MessageStore<S>,
    current: Option<DisplaySlot>,
    now: Timestamp,
    window_s: u32,
) -> Choice {
    let threshold = store.emergency_threshold();
    let mut candidates = store.get_candidates(now);

    let stored = candidates.clone().find(|m| !m.shown_within(now, window_s));
    let ephemeral = store.ephemeral().next_eligible(now, window_s);
    let eligible = match (stored, ephemeral) {
        (Some(s), Some(e)) if s.is_emergency(threshold) && s.priority >= e.priority => {
            Some(DisplaySlot::Message(s.id))
        }
        (_, Some(e)) => Some(DisplaySlot::Ephemeral(e.id)),
        (Some(s), None) => Some(DisplaySlot::Message(s.id)),
        (None, None) => None,
    };
    if let Some(slot) = eligible {
        return Choice {
            slot,
            emergency: is_emergency(store, slot),
            reason: ChoiceReason::Eligible,
        };
    }

    if let Some(slot) = current.filter(|slot| slot.is_live(store, now)) {
        return Choice {
            slot,
            emergency: is_emergency(store, slot),
            reason: ChoiceReason::HoldCurrent,
        };
    }

    match candidates.next() {
        Some(m) => Choice {
            slot: DisplaySlot::Message(m.id),
            emergency: m.is_emergency(threshold),
            reason: ChoiceReason::BestAvailable,
        },
        None => Choice {
            slot: DisplaySlot::Fallback,
            emergency: false,
            reason: ChoiceReason::Empty,
        },
    }
}

fn is_emergency<S: RecordStorage>(store: &MessageStore<S>, slot: DisplaySlot) -> bool {
    slot.resolve(store)
        .is_some_and(|m| m.is_emergency(store.emergency_threshold()))
}

/// Emergency that should abandon a transition toward `target`
///
/// Only an emergency outside its repeat window that outranks the target
/// qualifies: any emergency beats the fallback or a normal message, and
/// between emergencies only a strictly higher priority preempts. Stored
/// and ephemeral emergencies compete on priority; a tie goes to the stored
/// one.
pub fn preempting_emergency<S: RecordStorage>(
    store: &MessageStore<S>,
    target: DisplaySlot,
    now: Timestamp,
    window_s: u32,
) -> Option<DisplaySlot> {
    let threshold = store.emergency_threshold();
    let target_msg = target.resolve(store);

    let stored = store
        .get_candidates(now)
        .take_while(|m| m.is_emergency(threshold))
        .find(|m| DisplaySlot::Message(m.id) != target && !m.shown_within(now, window_s))
        .map(|m| (DisplaySlot::Message(m.id), m.priority));
    let ephemeral = store
        .ephemeral()
        .iter()
        .filter(|e| e.is_live(now) && e.message.is_emergency(threshold))
        .map(|e| &e.message)
        .find(|m| DisplaySlot::Ephemeral(m.id) != target && !m.shown_within(now, window_s))
        .map(|m| (DisplaySlot::Ephemeral(m.id), m.priority));

    let (slot, priority) = match (stored, ephemeral) {
        (Some(s), Some(e)) if e.1 > s.1 => e,
        (Some(s), _) => s,
        (None, Some(e)) => e,
        (None, None) => return None,
    };

    let outranks = match target_msg {
        Some(t) if t.is_emergency(threshold) => priority > t.priority,
        _ => true,
    };
    outranks.then_some(slot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NewMessage;
    use headsign_hal::MemoryStorage;

    fn store() -> MessageStore<MemoryStorage> {
        let mut store = MessageStore::new(MemoryStorage::new(), 95);
        store.load().unwrap();
        store
    }

    #[test]
    fn test_empty_store_falls_back() {
        let store = store();
        let choice = choose(&store, None, 0, 30);
        assert_eq!(choice.slot, DisplaySlot::Fallback);
        assert_eq!(choice.reason, ChoiceReason::Empty);
    }

    #[test]
    fn test_emergency_wins() {
        let mut store = store();
        store.insert(&NewMessage::new("normal", 90), 0).unwrap();
        let e = store.insert(&NewMessage::new("alert", 97), 1).unwrap();
        let choice = choose(&store, None, 2, 30);
        assert_eq!(choice.slot, DisplaySlot::Message(e));
        assert!(choice.emergency);
    }

    #[test]
    fn test_window_skips_recent() {
        let mut store = store();
        let a = store.insert(&NewMessage::new("a", 80), 0).unwrap();
        let b = store.insert(&NewMessage::new("b", 20), 0).unwrap();
        store.mark_shown(a, 10).unwrap();

        let (sa, sb) = (DisplaySlot::Message(a), DisplaySlot::Message(b));
        assert_eq!(choose(&store, Some(sa), 20, 30).slot, sb);
        assert_eq!(choose(&store, Some(sb), 40, 30).slot, sa);
    }

    #[test]
    fn test_hold_current_when_all_recent() {
        let mut store = store();
        let a = store.insert(&NewMessage::new("a", 10), 0).unwrap();
        let b = store.insert(&NewMessage::new("b", 20), 0).unwrap();
        store.mark_shown(a, 10).unwrap();
        store.mark_shown(b, 12).unwrap();

        let choice = choose(&store, Some(DisplaySlot::Message(a)), 15, 30);
        assert_eq!(choice.slot, DisplaySlot::Message(a));
        assert_eq!(choice.reason, ChoiceReason::HoldCurrent);
    }

    #[test]
    fn test_removed_current_is_replaced() {
        let mut store = store();
        let a = store.insert(&NewMessage::new("a", 10), 0).unwrap();
        let b = store.insert(&NewMessage::new("b", 20), 0).unwrap();
        store.mark_shown(a, 10).unwrap();
        store.mark_shown(b, 12).unwrap();
        store.remove(a).unwrap();

        let choice = choose(&store, Some(DisplaySlot::Message(a)), 15, 30);
        assert_eq!(choice.slot, DisplaySlot::Message(b));
        assert_eq!(choice.reason, ChoiceReason::BestAvailable);
    }

    #[test]
    fn test_only_candidate_redisplayed() {
        let mut store = store();
        let a = store.insert(&NewMessage::new("a", 10), 0).unwrap();
        store.mark_shown(a, 10).unwrap();
        assert_eq!(choose(&store, None, 15, 30).slot, DisplaySlot::Message(a));
    }

    #[test]
    fn test_preemption_rules() {
        let mut store = store();
        let normal = store.insert(&NewMessage::new("n", 50), 0).unwrap();
        assert_eq!(
            preempting_emergency(&store, DisplaySlot::Message(normal), 1, 30),
            None
        );

        let e1 = store.insert(&NewMessage::new("e1", 96), 1).unwrap();
        assert_eq!(
            preempting_emergency(&store, DisplaySlot::Message(normal), 2, 30),
            Some(DisplaySlot::Message(e1))
        );
        assert_eq!(
            preempting_emergency(&store, DisplaySlot::Fallback, 2, 30),
            Some(DisplaySlot::Message(e1))
        );
        // Already heading there
        assert_eq!(
            preempting_emergency(&store, DisplaySlot::Message(e1), 2, 30),
            None
        );

        let e2 = store.insert(&NewMessage::new("e2", 99), 2).unwrap();
        assert_eq!(
            preempting_emergency(&store, DisplaySlot::Message(e1), 3, 30),
            Some(DisplaySlot::Message(e2))
        );
        assert_eq!(
            preempting_emergency(&store, DisplaySlot::Message(e2), 3, 30),
            None
        );
    }

    #[test]
    fn test_ephemeral_goes_ahead_of_stored() {
        let mut store = store();
        store.insert(&NewMessage::new("stored", 90), 0).unwrap();
        let e = store
            .insert_ephemeral(&NewMessage::new("ephemeral", 10), 1, 0)
            .unwrap();
        let choice = choose(&store, None, 1, 30);
        assert_eq!(choice.slot, DisplaySlot::Ephemeral(e));
        assert!(!choice.emergency);
    }

    #[test]
    fn test_stored_emergency_beats_lower_ephemeral() {
        let mut store = store();
        let alert = store.insert(&NewMessage::new("alert", 96), 0).unwrap();
        store
            .insert_ephemeral(&NewMessage::new("ephemeral", 50), 1, 0)
            .unwrap();
        assert_eq!(choose(&store, None, 1, 30).slot, DisplaySlot::Message(alert));

        let urgent = store
            .insert_ephemeral(&NewMessage::new("urgent", 99), 1, 0)
            .unwrap();
        let choice = choose(&store, None, 1, 30);
        assert_eq!(choice.slot, DisplaySlot::Ephemeral(urgent));
        assert!(choice.emergency);
    }

    #[test]
    fn test_spent_ephemeral_not_held() {
        let mut store = store();
        let a = store.insert(&NewMessage::new("a", 10), 0).unwrap();
        store.mark_shown(a, 0).unwrap();
        let e = store
            .insert_ephemeral(&NewMessage::new("once", 10), 1, 0)
            .unwrap();
        store.ephemeral_mut().mark_shown(e, 1);

        // Spent: resolvable for its dwell, but never chosen or held
        assert!(DisplaySlot::Ephemeral(e).resolve(&store).is_some());
        let choice = choose(&store, Some(DisplaySlot::Ephemeral(e)), 5, 30);
        assert_eq!(choice.slot, DisplaySlot::Message(a));
        assert_eq!(choice.reason, ChoiceReason::BestAvailable);
    }

    #[test]
    fn test_disabled_current_not_held() {
        let mut store = store();
        let a = store.insert(&NewMessage::new("a", 10), 0).unwrap();
        store.mark_shown(a, 10).unwrap();
        store.set_enabled(a, false).unwrap();

        let choice = choose(&store, Some(DisplaySlot::Message(a)), 15, 30);
        assert_eq!(choice.slot, DisplaySlot::Fallback);
        assert_eq!(choice.reason, ChoiceReason::Empty);
    }

    #[test]
    fn test_ephemeral_emergency_preempts() {
        let mut store = store();
        let normal = store.insert(&NewMessage::new("n", 50), 0).unwrap();
        let e = store
            .insert_ephemeral(&NewMessage::new("evacuate", 98), 1, 1)
            .unwrap();
        assert_eq!(
            preempting_emergency(&store, DisplaySlot::Message(normal), 2, 30),
            Some(DisplaySlot::Ephemeral(e))
        );
        assert_eq!(
            preempting_emergency(&store, DisplaySlot::Ephemeral(e), 2, 30),
            None
        );

        let stored = store.insert(&NewMessage::new("s", 98), 2).unwrap();
        // Tie goes to the stored emergency
        assert_eq!(
            preempting_emergency(&store, DisplaySlot::Message(normal), 3, 30),
            Some(DisplaySlot::Message(stored))
        );
    }
}
