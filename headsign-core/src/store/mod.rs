//! Message store
//!
//! Durable storage of prioritized messages, with candidate ordering for the
//! scheduler, plus the RAM-only ephemeral queue.

pub mod ephemeral;
mod index;
pub mod message;
pub mod message_store;

pub use ephemeral::{EphemeralMessage, EphemeralQueue, MAX_EPHEMERAL};
pub use index::{StoreIndex, FIRST_ID, FORMAT_VERSION};
pub use message::{
    Message, MessageId, NewMessage, Timestamp, ValidationError, MAX_LABEL_LEN, MAX_MESSAGES,
    MAX_PRIORITY, MAX_TEXT_BYTES,
};
pub use message_store::{Candidates, MessageStore, StoreError, MAX_RECORD_SIZE};
