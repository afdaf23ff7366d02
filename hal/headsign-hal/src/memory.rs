//! In-memory record storage
//!
//! Volatile backend for host tests and simulation. Clones share the same
//! records, so a clone handed to a fresh store behaves like the same flash
//! seen after a reboot. Faults can be injected to exercise recovery paths.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::vec::Vec;

use crate::storage::{RecordKey, RecordStorage, StorageError};

#[derive(Debug, Default)]
struct Inner {
    records: BTreeMap<RecordKey, Vec<u8>>,
    fail_writes: bool,
    /// Commits left before writes start failing
    commit_budget: Option<usize>,
    corrupted: bool,
}

impl Inner {
    /// Spend one commit, or refuse it when writes are failing
    fn commit(&mut self) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::Io);
        }
        match self.commit_budget {
            Some(0) => {
                self.fail_writes = true;
                self.commit_budget = None;
                Err(StorageError::Io)
            }
            Some(left) => {
                self.commit_budget = Some(left - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

/// Shared in-memory record storage
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Rc<RefCell<Inner>>,
}

impl MemoryStorage {
    /// Create an empty storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following write/remove fail with [`StorageError::Io`]
    pub fn set_fail_writes(&self, fail: bool) {
        let mut inner = self.inner.borrow_mut();
        inner.fail_writes = fail;
        inner.commit_budget = None;
    }

    /// Let the next `count` writes, removes or erases succeed, then fail
    /// every one after them as [`MemoryStorage::set_fail_writes`] does
    pub fn fail_after_commits(&self, count: usize) {
        let mut inner = self.inner.borrow_mut();
        inner.fail_writes = false;
        inner.commit_budget = Some(count);
    }

    /// Make every following read fail with [`StorageError::Corrupted`]
    /// until `erase_all` is called
    pub fn set_corrupted(&self, corrupted: bool) {
        self.inner.borrow_mut().corrupted = corrupted;
    }

    /// Overwrite a record with raw bytes, bypassing fault injection
    pub fn put_raw(&self, key: RecordKey, data: &[u8]) {
        self.inner.borrow_mut().records.insert(key, data.to_vec());
    }

    /// Number of records currently stored
    pub fn record_count(&self) -> usize {
        self.inner.borrow().records.len()
    }

    /// Whether a record exists
    pub fn contains(&self, key: RecordKey) -> bool {
        self.inner.borrow().records.contains_key(&key)
    }
}

impl RecordStorage for MemoryStorage {
    fn read(&mut self, key: RecordKey, buffer: &mut [u8]) -> Result<usize, StorageError> {
        let inner = self.inner.borrow();
        if inner.corrupted {
            return Err(StorageError::Corrupted);
        }
        let data = inner.records.get(&key).ok_or(StorageError::NotFound)?;
        if buffer.len() < data.len() {
            return Err(StorageError::BufferTooSmall);
        }
        buffer[..data.len()].copy_from_slice(data);
        Ok(data.len())
    }

    fn write(&mut self, key: RecordKey, data: &[u8]) -> Result<(), StorageError> {
        let mut inner = self.inner.borrow_mut();
        inner.commit()?;
        inner.records.insert(key, data.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: RecordKey) -> Result<(), StorageError> {
        let mut inner = self.inner.borrow_mut();
        inner.commit()?;
        inner.records.remove(&key);
        Ok(())
    }

    fn erase_all(&mut self) -> Result<(), StorageError> {
        let mut inner = self.inner.borrow_mut();
        inner.commit()?;
        inner.records.clear();
        inner.corrupted = false;
        Ok(())
    }
}
