//! SQLite-backed record storage
//!
//! Host backend used when the engine runs off-target. Records live in one
//! table at the configured database path, keyed by the encoded
//! [`RecordKey`]. The connection runs with `synchronous = FULL` and every
//! mutation is its own transaction, so a call that returned `Ok` survives a
//! power cut.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::vec::Vec;

use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use crate::storage::{RecordKey, RecordStorage, StorageError};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS records (
    key  BLOB PRIMARY KEY,
    data BLOB NOT NULL
);";

/// Record storage in a SQLite database file
#[derive(Debug)]
pub struct SqliteStorage {
    path: PathBuf,
    conn: Connection,
    corrupted: bool,
}

impl SqliteStorage {
    /// Open (or create) the database at `path`
    ///
    /// A damaged database does not fail the open; every call reports
    /// [`StorageError::Corrupted`] until [`RecordStorage::erase_all`]
    /// recreates it, leaving the recovery decision to the caller.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(map_sqlite_err)?;
        let mut storage = Self {
            path,
            conn,
            corrupted: false,
        };
        match prepare(&storage.conn) {
            Ok(()) => {}
            Err(StorageError::Corrupted) => storage.corrupted = true,
            Err(e) => return Err(e),
        }
        Ok(storage)
    }

    /// Path of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the database failed its integrity check on open
    pub fn is_corrupted(&self) -> bool {
        self.corrupted
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.corrupted {
            Err(StorageError::Corrupted)
        } else {
            Ok(())
        }
    }

    /// Delete the damaged file and start a fresh database in its place
    fn recreate(&mut self) -> Result<(), StorageError> {
        let old = std::mem::replace(
            &mut self.conn,
            Connection::open_in_memory().map_err(map_sqlite_err)?,
        );
        old.close().map_err(|(_, e)| map_sqlite_err(e))?;

        let mut journal = self.path.clone().into_os_string();
        journal.push("-journal");
        for file in [self.path.clone(), PathBuf::from(journal)] {
            match fs::remove_file(&file) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(_) => return Err(StorageError::Io),
            }
        }

        self.conn = Connection::open(&self.path).map_err(map_sqlite_err)?;
        prepare(&self.conn)?;
        self.corrupted = false;
        Ok(())
    }
}

/// Connection settings, integrity check and schema
fn prepare(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch("PRAGMA synchronous = FULL;")
        .map_err(map_sqlite_err)?;

    let verdict: String = conn
        .query_row("PRAGMA integrity_check", [], |row| row.get(0))
        .map_err(map_sqlite_err)?;
    if verdict != "ok" {
        return Err(StorageError::Corrupted);
    }

    conn.execute_batch(SCHEMA).map_err(map_sqlite_err)
}

fn map_sqlite_err(e: rusqlite::Error) -> StorageError {
    match e.sqlite_error_code() {
        Some(ErrorCode::NotADatabase) | Some(ErrorCode::DatabaseCorrupt) => StorageError::Corrupted,
        Some(ErrorCode::DiskFull) => StorageError::Full,
        _ => StorageError::Io,
    }
}

impl RecordStorage for SqliteStorage {
    fn read(&mut self, key: RecordKey, buffer: &mut [u8]) -> Result<usize, StorageError> {
        self.check()?;
        let key = key.to_bytes();
        let data: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT data FROM records WHERE key = ?1",
                params![&key[..]],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_sqlite_err)?;

        let data = data.ok_or(StorageError::NotFound)?;
        let dest = buffer
            .get_mut(..data.len())
            .ok_or(StorageError::BufferTooSmall)?;
        dest.copy_from_slice(&data);
        Ok(data.len())
    }

    fn write(&mut self, key: RecordKey, data: &[u8]) -> Result<(), StorageError> {
        self.check()?;
        let key = key.to_bytes();
        let tx = self.conn.transaction().map_err(map_sqlite_err)?;
        tx.execute(
            "INSERT INTO records (key, data) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET data = excluded.data",
            params![&key[..], data],
        )
        .map_err(map_sqlite_err)?;
        tx.commit().map_err(map_sqlite_err)
    }

    fn remove(&mut self, key: RecordKey) -> Result<(), StorageError> {
        self.check()?;
        let key = key.to_bytes();
        let tx = self.conn.transaction().map_err(map_sqlite_err)?;
        tx.execute("DELETE FROM records WHERE key = ?1", params![&key[..]])
            .map_err(map_sqlite_err)?;
        tx.commit().map_err(map_sqlite_err)
    }

    fn erase_all(&mut self) -> Result<(), StorageError> {
        if self.corrupted {
            return self.recreate();
        }
        let tx = self.conn.transaction().map_err(map_sqlite_err)?;
        tx.execute("DELETE FROM records", [])
            .map_err(map_sqlite_err)?;
        tx.commit().map_err(map_sqlite_err)
    }
}
