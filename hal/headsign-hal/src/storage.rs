//! Record storage abstractions
//!
//! Provides a keyed record store that chip-specific HALs back with their
//! flash memory and host builds back with SQLite.

/// Size of an encoded [`RecordKey`] in bytes
pub const RECORD_KEY_SIZE: usize = 5;

/// Storage keys for persisted records
///
/// The message engine keeps one index record plus one record per message.
/// The storage implementation handles wear leveling and data integrity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecordKey {
    /// Store index: format version, id counter, live message ids
    Index,
    /// A single message, keyed by its id
    Message(u32),
    /// Scratch slot used by the startup self-check
    Scratch,
}

impl RecordKey {
    const TAG_INDEX: u8 = 0;
    const TAG_MESSAGE: u8 = 1;
    const TAG_SCRATCH: u8 = 2;

    /// Encode the key as a tag byte followed by a little-endian id
    pub fn to_bytes(self) -> [u8; RECORD_KEY_SIZE] {
        let (tag, id) = match self {
            RecordKey::Index => (Self::TAG_INDEX, 0),
            RecordKey::Message(id) => (Self::TAG_MESSAGE, id),
            RecordKey::Scratch => (Self::TAG_SCRATCH, 0),
        };
        let id = id.to_le_bytes();
        [tag, id[0], id[1], id[2], id[3]]
    }

    /// Decode a key from its byte form
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < RECORD_KEY_SIZE {
            return None;
        }
        let id = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        match bytes[0] {
            Self::TAG_INDEX => Some(RecordKey::Index),
            Self::TAG_MESSAGE => Some(RecordKey::Message(id)),
            Self::TAG_SCRATCH => Some(RecordKey::Scratch),
            _ => None,
        }
    }
}

/// Errors from record storage operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    /// Underlying medium (flash, filesystem) failed
    Io,
    /// Key not found
    NotFound,
    /// Buffer too small for the data
    BufferTooSmall,
    /// Backing data is corrupted or unreadable
    Corrupted,
    /// Storage is full
    Full,
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            StorageError::Io => "storage I/O failed",
            StorageError::NotFound => "record not found",
            StorageError::BufferTooSmall => "buffer too small for record",
            StorageError::Corrupted => "storage corrupted",
            StorageError::Full => "storage full",
        };
        f.write_str(msg)
    }
}

/// Durable keyed record storage
///
/// Every successful `write`, `remove`, and `erase_all` must be committed to
/// the medium before the call returns; callers rely on this to survive an
/// immediate power loss.
pub trait RecordStorage {
    /// Read a record into the provided buffer
    ///
    /// # Returns
    /// The number of bytes read, or an error. A missing key yields
    /// [`StorageError::NotFound`].
    fn read(&mut self, key: RecordKey, buffer: &mut [u8]) -> Result<usize, StorageError>;

    /// Write (insert or replace) a record
    fn write(&mut self, key: RecordKey, data: &[u8]) -> Result<(), StorageError>;

    /// Remove a record. Removing a missing key is not an error.
    fn remove(&mut self, key: RecordKey) -> Result<(), StorageError>;

    /// Erase all stored records
    ///
    /// Irreversible. Also clears any corruption marker left by a bad open.
    fn erase_all(&mut self) -> Result<(), StorageError>;
}

impl<T: RecordStorage + ?Sized> RecordStorage for &mut T {
    fn read(&mut self, key: RecordKey, buffer: &mut [u8]) -> Result<usize, StorageError> {
        (**self).read(key, buffer)
    }

    fn write(&mut self, key: RecordKey, data: &[u8]) -> Result<(), StorageError> {
        (**self).write(key, data)
    }

    fn remove(&mut self, key: RecordKey) -> Result<(), StorageError> {
        (**self).remove(key)
    }

    fn erase_all(&mut self) -> Result<(), StorageError> {
        (**self).erase_all()
    }
}

// Implement the sequential-storage Key trait when the feature is enabled
#[cfg(feature = "sequential-storage")]
impl sequential_storage::map::Key for RecordKey {
    fn serialize_into(
        &self,
        buffer: &mut [u8],
    ) -> Result<usize, sequential_storage::map::SerializationError> {
        if buffer.len() < RECORD_KEY_SIZE {
            return Err(sequential_storage::map::SerializationError::BufferTooSmall);
        }
        buffer[..RECORD_KEY_SIZE].copy_from_slice(&self.to_bytes());
        Ok(RECORD_KEY_SIZE)
    }

    fn deserialize_from(
        buffer: &[u8],
    ) -> Result<(Self, usize), sequential_storage::map::SerializationError> {
        if buffer.len() < RECORD_KEY_SIZE {
            return Err(sequential_storage::map::SerializationError::BufferTooSmall);
        }
        match RecordKey::from_bytes(buffer) {
            Some(key) => Ok((key, RECORD_KEY_SIZE)),
            None => Err(sequential_storage::map::SerializationError::InvalidFormat),
        }
    }
}
