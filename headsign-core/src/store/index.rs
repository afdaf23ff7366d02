//! Store index record
//!
//! The index is the commit point of every store mutation: a message record
//! only becomes part of the store once an index listing its id is written.

use heapless::Vec;
use serde::{Deserialize, Serialize};

use super::message::{MessageId, MAX_MESSAGES};

/// Index format version; bump when the record layout changes
pub const FORMAT_VERSION: u8 = 2;

/// First id handed out by a fresh store
pub const FIRST_ID: MessageId = 1;

/// Maximum encoded index size
pub const MAX_INDEX_SIZE: usize = 192;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreIndex {
    pub version: u8,
    /// Next id to assign; survives removals and wipes
    pub next_id: MessageId,
    /// Live message ids in insertion order
    pub ids: Vec<MessageId, MAX_MESSAGES>,
}

impl Default for StoreIndex {
    fn default() -> Self {
        Self::fresh(FIRST_ID)
    }
}

impl StoreIndex {
    /// Empty index continuing from `next_id`
    pub fn fresh(next_id: MessageId) -> Self {
        Self {
            version: FORMAT_VERSION,
            next_id,
            ids: Vec::new(),
        }
    }

    /// Copy of this index without the given ids
    pub fn without(&self, removed: &[MessageId]) -> Self {
        let mut next = self.clone();
        next.ids.retain(|id| !removed.contains(id));
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_index_fits_buffer() {
        let mut index = StoreIndex::fresh(u32::MAX);
        for id in 0..MAX_MESSAGES as u32 {
            index.ids.push(u32::MAX - id).unwrap();
        }
        let mut buf = [0u8; MAX_INDEX_SIZE];
        let used = postcard::to_slice(&index, &mut buf).unwrap();
        let decoded: StoreIndex = postcard::from_bytes(used).unwrap();
        assert_eq!(decoded, index);
    }

    #[test]
    fn test_without_keeps_order() {
        let mut index = StoreIndex::default();
        index.ids.extend_from_slice(&[3, 5, 7, 9]).unwrap();
        let next = index.without(&[5, 9]);
        assert_eq!(next.ids.as_slice(), &[3, 7]);
        assert_eq!(next.next_id, index.next_id);
    }
}
