//! Durable message store
//!
//! Keeps an in-memory cache of every live message and mirrors each mutation
//! to [`RecordStorage`] before returning. The cache only changes after the
//! commit succeeds, so a failed write leaves the store as it was.
//!
//! Ephemeral messages ride alongside in an [`EphemeralQueue`] and never
//! touch storage.
//!
//! Record layout:
//! - `RecordKey::Index`: [`StoreIndex`] (format version, next id, live ids)
//! - `RecordKey::Message(id)`: one postcard-encoded [`Message`]

use core::cmp::Ordering;

use heapless::Vec;

use headsign_hal::{RecordKey, RecordStorage, StorageError};

use super::ephemeral::EphemeralQueue;
use super::index::{StoreIndex, FIRST_ID, FORMAT_VERSION, MAX_INDEX_SIZE};
use super::message::{
    Message, MessageId, NewMessage, Timestamp, ValidationError, MAX_MESSAGES,
};

/// Maximum encoded message record size
pub const MAX_RECORD_SIZE: usize = 1280;

/// Errors from store operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError {
    /// The draft was refused
    Validation(ValidationError),
    /// No message with this id
    NotFound,
    /// Persisted data could not be decoded
    Corrupt,
    /// The storage medium failed
    Storage(StorageError),
}

impl From<ValidationError> for StoreError {
    fn from(e: ValidationError) -> Self {
        StoreError::Validation(e)
    }
}

impl From<StorageError> for StoreError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Corrupted => StoreError::Corrupt,
            other => StoreError::Storage(other),
        }
    }
}

impl core::fmt::Display for StoreError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StoreError::Validation(e) => write!(f, "invalid message: {}", e),
            StoreError::NotFound => f.write_str("message not found"),
            StoreError::Corrupt => f.write_str("message store corrupt"),
            StoreError::Storage(e) => write!(f, "storage error: {}", e),
        }
    }
}

/// Message store over a keyed record storage
pub struct MessageStore<S> {
    storage: S,
    index: StoreIndex,
    /// Live messages in insertion order, parallel to `index.ids`
    messages: Vec<Message, MAX_MESSAGES>,
    ephemeral: EphemeralQueue,
    emergency_threshold: u8,
}

impl<S: RecordStorage> MessageStore<S> {
    /// Create an empty store; call [`MessageStore::load`] before use
    pub fn new(storage: S, emergency_threshold: u8) -> Self {
        Self {
            storage,
            index: StoreIndex::default(),
            messages: Vec::new(),
            ephemeral: EphemeralQueue::new(),
            emergency_threshold,
        }
    }

    /// Load the index and every listed message from storage
    ///
    /// Empty storage is a fresh store. Anything that cannot be decoded, or
    /// a listed message that is missing, is reported as
    /// [`StoreError::Corrupt`] and the cache is left empty.
    pub fn load(&mut self) -> Result<(), StoreError> {
        self.index = StoreIndex::default();
        self.messages.clear();

        let mut buf = [0u8; MAX_INDEX_SIZE];
        let index: StoreIndex = match self.storage.read(RecordKey::Index, &mut buf) {
            Ok(len) => postcard::from_bytes(&buf[..len]).map_err(|_| StoreError::Corrupt)?,
            Err(StorageError::NotFound) => {
                debug!("store: no index, starting fresh");
                return Ok(());
            }
            Err(StorageError::BufferTooSmall) => return Err(StoreError::Corrupt),
            Err(e) => return Err(e.into()),
        };
        if index.version != FORMAT_VERSION || index.next_id < FIRST_ID {
            warn!("store: unsupported index version {}", index.version);
            return Err(StoreError::Corrupt);
        }

        let mut messages = Vec::new();
        let mut record = [0u8; MAX_RECORD_SIZE];
        for &id in index.ids.iter() {
            let len = match self.storage.read(RecordKey::Message(id), &mut record) {
                Ok(len) => len,
                Err(StorageError::Io) => return Err(StoreError::Storage(StorageError::Io)),
                Err(_) => {
                    warn!("store: message {} listed but unreadable", id);
                    return Err(StoreError::Corrupt);
                }
            };
            let message: Message =
                postcard::from_bytes(&record[..len]).map_err(|_| StoreError::Corrupt)?;
            if message.id != id || id >= index.next_id {
                return Err(StoreError::Corrupt);
            }
            messages.push(message).map_err(|_| StoreError::Corrupt)?;
        }

        info!(
            "store: loaded {} messages, next id {}",
            messages.len(),
            index.next_id
        );
        self.index = index;
        self.messages = messages;
        Ok(())
    }

    /// Insert a new message, returning its id once committed
    pub fn insert(&mut self, draft: &NewMessage<'_>, now: Timestamp) -> Result<MessageId, StoreError> {
        draft.validate()?;
        if self.messages.is_full() {
            return Err(ValidationError::Full.into());
        }

        let id = self.index.next_id;
        let message = Message::from_draft(id, draft, now)?;

        let mut next = self.index.clone();
        next.next_id = id.checked_add(1).ok_or(StoreError::Storage(StorageError::Full))?;
        next.ids.push(id).map_err(|_| ValidationError::Full)?;

        self.write_message(&message)?;
        if let Err(e) = self.write_index(&next) {
            // Not listed, so harmless if this also fails
            let _ = self.storage.remove(RecordKey::Message(id));
            return Err(e);
        }

        debug!("store: inserted message {} priority {}", id, message.priority);
        self.index = next;
        // Capacity checked above
        let _ = self.messages.push(message);
        Ok(id)
    }

    /// Insert unless a live message already has identical text
    pub fn insert_unique(
        &mut self,
        draft: &NewMessage<'_>,
        now: Timestamp,
    ) -> Result<MessageId, StoreError> {
        let duplicate = self
            .messages
            .iter()
            .any(|m| m.is_live(now) && m.text.as_str() == draft.text);
        if duplicate {
            return Err(ValidationError::Duplicate.into());
        }
        self.insert(draft, now)
    }

    /// Replace the content of an existing message, including its enabled flag
    ///
    /// Keeps id, creation time, show count, and last shown time.
    pub fn update(
        &mut self,
        id: MessageId,
        draft: &NewMessage<'_>,
        now: Timestamp,
    ) -> Result<(), StoreError> {
        let pos = self.position(id).ok_or(StoreError::NotFound)?;
        let current = &self.messages[pos];

        let mut updated = Message::from_draft(id, draft, now)?;
        updated.created_at = current.created_at;
        updated.show_count = current.show_count;
        updated.last_shown_at = current.last_shown_at;

        self.write_message(&updated)?;
        self.messages[pos] = updated;
        Ok(())
    }

    /// Enable or disable a message without touching its content
    ///
    /// A disabled message keeps its id and history but is never a candidate.
    pub fn set_enabled(&mut self, id: MessageId, enabled: bool) -> Result<(), StoreError> {
        let pos = self.position(id).ok_or(StoreError::NotFound)?;
        if self.messages[pos].enabled == enabled {
            return Ok(());
        }
        let mut updated = self.messages[pos].clone();
        updated.enabled = enabled;

        self.write_message(&updated)?;
        self.messages[pos] = updated;
        debug!("store: message {} enabled {}", id, enabled);
        Ok(())
    }

    /// Delete one message
    pub fn remove(&mut self, id: MessageId) -> Result<(), StoreError> {
        let pos = self.position(id).ok_or(StoreError::NotFound)?;
        let next = self.index.without(&[id]);
        self.write_index(&next)?;
        self.drop_record(id);

        self.index = next;
        self.messages.remove(pos);
        debug!("store: removed message {}", id);
        Ok(())
    }

    /// Look up a message by id
    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Number of stored messages, expired or not
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of enabled, unexpired messages at `now`
    pub fn active_count(&self, now: Timestamp) -> usize {
        self.messages.iter().filter(|m| m.is_live(now)).count()
    }

    /// Newest timestamp recorded anywhere in the store
    pub fn latest_timestamp(&self) -> Option<Timestamp> {
        self.messages.iter().map(Message::latest_timestamp).max()
    }

    /// Threshold at or above which a message is an emergency
    pub fn emergency_threshold(&self) -> u8 {
        self.emergency_threshold
    }

    /// Enabled, non-expired messages in selection order
    ///
    /// Emergencies first; then higher priority. Among emergencies the
    /// oldest `created_at` wins; among the rest never-shown comes first,
    /// then oldest `last_shown_at`, then oldest `created_at`. Remaining
    /// ties keep insertion order.
    pub fn get_candidates(&self, now: Timestamp) -> Candidates<'_> {
        let threshold = self.emergency_threshold;
        let mut order: Vec<u8, MAX_MESSAGES> = Vec::new();
        for (pos, message) in self.messages.iter().enumerate() {
            if message.is_live(now) {
                // Bounded by MAX_MESSAGES
                let _ = order.push(pos as u8);
            }
        }

        let messages = self.messages.as_slice();
        order.sort_unstable_by(|&a, &b| {
            let (ma, mb) = (&messages[a as usize], &messages[b as usize]);
            selection_order(ma, mb, threshold).then(a.cmp(&b))
        });

        Candidates {
            messages,
            order,
            pos: 0,
        }
    }

    /// Record one completed showing of `id`
    pub fn mark_shown(&mut self, id: MessageId, now: Timestamp) -> Result<(), StoreError> {
        let pos = self.position(id).ok_or(StoreError::NotFound)?;
        let mut updated = self.messages[pos].clone();
        updated.show_count = updated.show_count.saturating_add(1);
        updated.last_shown_at = Some(now);

        self.write_message(&updated)?;
        self.messages[pos] = updated;
        Ok(())
    }

    /// Remove every message whose expiry is at or before `now`
    ///
    /// Returns the number of messages removed.
    pub fn purge_expired(&mut self, now: Timestamp) -> Result<usize, StoreError> {
        let expired: Vec<MessageId, MAX_MESSAGES> = self
            .messages
            .iter()
            .filter(|m| m.is_expired(now))
            .map(|m| m.id)
            .collect();
        if expired.is_empty() {
            return Ok(0);
        }

        let next = self.index.without(&expired);
        self.write_index(&next)?;
        for &id in expired.iter() {
            self.drop_record(id);
        }

        self.index = next;
        self.messages.retain(|m| !expired.contains(&m.id));
        info!("store: purged {} expired messages", expired.len());
        Ok(expired.len())
    }

    /// Queue a RAM-only message for at most `display_count` showings
    pub fn insert_ephemeral(
        &mut self,
        draft: &NewMessage<'_>,
        display_count: u16,
        now: Timestamp,
    ) -> Result<MessageId, StoreError> {
        Ok(self.ephemeral.push(draft, display_count, now)?)
    }

    pub fn ephemeral(&self) -> &EphemeralQueue {
        &self.ephemeral
    }

    pub fn ephemeral_mut(&mut self) -> &mut EphemeralQueue {
        &mut self.ephemeral
    }

    /// Erase every message, keeping the id counter
    ///
    /// The empty index carrying the counter is committed before any record
    /// is removed, so a failure part way never loses `next_id`.
    pub fn wipe_all(&mut self) -> Result<(), StoreError> {
        let next_id = self.index.next_id;
        self.write_index(&StoreIndex::fresh(next_id))?;

        let old = core::mem::replace(&mut self.index, StoreIndex::fresh(next_id));
        self.messages.clear();
        self.ephemeral.clear();
        for &id in old.ids.iter() {
            self.drop_record(id);
        }
        info!("store: wiped, next id {}", next_id);
        Ok(())
    }

    /// Erase unreadable storage and start over from the first id
    ///
    /// Only for boot recovery: ids handed out before the corruption are
    /// unknowable, so the counter restarts.
    pub fn recover_corrupt(&mut self) -> Result<(), StoreError> {
        self.storage.erase_all()?;
        self.messages.clear();
        self.index = StoreIndex::default();
        self.write_index(&StoreIndex::default())?;
        warn!("store: corrupt storage erased");
        Ok(())
    }

    /// Direct access to the backing storage
    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    fn position(&self, id: MessageId) -> Option<usize> {
        self.messages.iter().position(|m| m.id == id)
    }

    fn write_message(&mut self, message: &Message) -> Result<(), StoreError> {
        let mut buf = [0u8; MAX_RECORD_SIZE];
        let bytes = postcard::to_slice(message, &mut buf)
            .map_err(|_| StoreError::Storage(StorageError::BufferTooSmall))?;
        self.storage
            .write(RecordKey::Message(message.id), bytes)
            .map_err(StoreError::Storage)
    }

    fn write_index(&mut self, index: &StoreIndex) -> Result<(), StoreError> {
        let mut buf = [0u8; MAX_INDEX_SIZE];
        let bytes = postcard::to_slice(index, &mut buf)
            .map_err(|_| StoreError::Storage(StorageError::BufferTooSmall))?;
        self.storage
            .write(RecordKey::Index, bytes)
            .map_err(StoreError::Storage)
    }

    /// Remove an unlisted record; a leftover is ignored on load
    fn drop_record(&mut self, id: MessageId) {
        if let Err(e) = self.storage.remove(RecordKey::Message(id)) {
            warn!("store: orphaned record {}: {}", id, e);
        }
    }
}

/// Selection order between two candidates (less = preferred)
pub(crate) fn selection_order(a: &Message, b: &Message, threshold: u8) -> Ordering {
    let (ea, eb) = (a.is_emergency(threshold), b.is_emergency(threshold));
    eb.cmp(&ea)
        .then(b.priority.cmp(&a.priority))
        .then_with(|| {
            if ea && eb {
                a.created_at.cmp(&b.created_at)
            } else {
                // None sorts before Some: never-shown first
                a.last_shown_at
                    .cmp(&b.last_shown_at)
                    .then(a.created_at.cmp(&b.created_at))
            }
        })
}

/// Candidate iterator returned by [`MessageStore::get_candidates`]
///
/// Finite and cheap to clone; [`Candidates::rewind`] restarts it.
#[derive(Debug, Clone)]
pub struct Candidates<'a> {
    messages: &'a [Message],
    order: Vec<u8, MAX_MESSAGES>,
    pos: usize,
}

impl<'a> Candidates<'a> {
    /// Restart from the best candidate
    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    /// Total number of candidates
    pub fn total(&self) -> usize {
        self.order.len()
    }
}

impl<'a> Iterator for Candidates<'a> {
    type Item = &'a Message;

    fn next(&mut self) -> Option<Self::Item> {
        let idx = *self.order.get(self.pos)?;
        self.pos += 1;
        self.messages.get(idx as usize)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.order.len() - self.pos;
        (left, Some(left))
    }
}
