//! Durable key-value store organized into named collections.
//!
//! Every collection holds one record type, fixed at compile time through the
//! [`Record`] trait. Writes are single SQL statements, so a `put` is atomic per
//! `(collection, id)` and the last writer wins.

mod error;
pub mod schema;

pub use error::StoreError;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// Known collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
  Settings,
  Cache,
  Sync,
  Contents,
}

impl Collection {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Settings => "settings",
      Self::Cache => "cache",
      Self::Sync => "sync",
      Self::Contents => "contents",
    }
  }
}

impl std::fmt::Display for Collection {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A record type bound to exactly one collection.
pub trait Record: Serialize + DeserializeOwned {
  const COLLECTION: Collection;
}

/// SQLite-backed durable store.
pub struct Database {
  conn: Mutex<Connection>,
}

/// File name of the store inside the data directory.
pub const STORE_FILE: &str = "store.db";

impl Database {
  /// `$XDG_DATA_HOME/wsync/store.db`, when the platform has a data directory.
  pub fn default_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("wsync").join(STORE_FILE))
  }

  /// Open or create the store at `path`.
  pub fn open(path: &Path) -> Result<Self, StoreError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;
    debug!(path = %path.display(), "Opened durable store");
    Self::init(conn)
  }

  /// Open a private in-memory store. Nothing survives the process.
  pub fn open_in_memory() -> Result<Self, StoreError> {
    Self::init(Connection::open_in_memory()?)
  }

  fn init(conn: Connection) -> Result<Self, StoreError> {
    // In-memory databases answer "memory" here, which is fine.
    let mode: String =
      conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", "FULL")?;
    conn.execute_batch(schema::SCHEMA)?;
    debug!(journal_mode = %mode, "Store schema ready");

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
    self
      .conn
      .lock()
      .map_err(|e| StoreError::Lock(e.to_string()))
  }

  /// Insert or replace a record. An existing id keeps its insertion position.
  pub fn put<T: Record>(&self, id: &str, record: &T) -> Result<(), StoreError> {
    let data = serde_json::to_vec(record)?;
    let conn = self.lock()?;

    conn.execute(
      "INSERT INTO records (collection, id, data, updated_at)
       VALUES (?1, ?2, ?3, datetime('now'))
       ON CONFLICT(collection, id) DO UPDATE SET
         data = excluded.data,
         updated_at = excluded.updated_at",
      params![T::COLLECTION.as_str(), id, data],
    )?;

    Ok(())
  }

  /// Fetch a record by id.
  pub fn get<T: Record>(&self, id: &str) -> Result<Option<T>, StoreError> {
    let conn = self.lock()?;

    let data: Option<Vec<u8>> = conn
      .query_row(
        "SELECT data FROM records WHERE collection = ?1 AND id = ?2",
        params![T::COLLECTION.as_str(), id],
        |row| row.get(0),
      )
      .optional()?;

    match data {
      Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
      None => Ok(None),
    }
  }

  /// Delete a record. Returns whether it existed.
  pub fn delete(&self, collection: Collection, id: &str) -> Result<bool, StoreError> {
    let conn = self.lock()?;
    let removed = conn.execute(
      "DELETE FROM records WHERE collection = ?1 AND id = ?2",
      params![collection.as_str(), id],
    )?;
    Ok(removed > 0)
  }

  /// All records of a collection in insertion order.
  ///
  /// Rows that no longer deserialize into `T` are skipped with a warning.
  pub fn all<T: Record>(&self) -> Result<Vec<(String, T)>, StoreError> {
    let rows: Vec<(String, Vec<u8>)> = {
      let conn = self.lock()?;
      let mut stmt =
        conn.prepare("SELECT id, data FROM records WHERE collection = ?1 ORDER BY rowid")?;
      let rows = stmt
        .query_map(params![T::COLLECTION.as_str()], |row| {
          Ok((row.get(0)?, row.get(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
      rows
    };

    let records = rows
      .into_iter()
      .filter_map(|(id, data)| match serde_json::from_slice::<T>(&data) {
        Ok(record) => Some((id, record)),
        Err(e) => {
          warn!(collection = %T::COLLECTION, id = %id, error = %e, "Skipping unreadable record");
          None
        }
      })
      .collect();

    Ok(records)
  }

  /// Visit every record of a collection in insertion order.
  ///
  /// The store lock is released before `f` runs, so `f` may write back.
  pub fn for_each<T, F>(&self, mut f: F) -> Result<(), StoreError>
  where
    T: Record,
    F: FnMut(&str, T),
  {
    for (id, record) in self.all::<T>()? {
      f(&id, record);
    }
    Ok(())
  }

  /// Delete every record of `T` for which `predicate` holds, in one transaction.
  pub fn delete_where<T, P>(&self, predicate: P) -> Result<usize, StoreError>
  where
    T: Record,
    P: Fn(&T) -> bool,
  {
    let doomed: Vec<String> = self
      .all::<T>()?
      .into_iter()
      .filter(|(_, record)| predicate(record))
      .map(|(id, _)| id)
      .collect();

    if doomed.is_empty() {
      return Ok(0);
    }

    let mut conn = self.lock()?;
    let tx = conn.transaction()?;
    let mut removed = 0;
    for id in &doomed {
      removed += tx.execute(
        "DELETE FROM records WHERE collection = ?1 AND id = ?2",
        params![T::COLLECTION.as_str(), id],
      )?;
    }
    tx.commit()?;

    Ok(removed)
  }

  /// Remove every record of a collection. Returns how many were removed.
  pub fn clear(&self, collection: Collection) -> Result<usize, StoreError> {
    let conn = self.lock()?;
    let removed = conn.execute(
      "DELETE FROM records WHERE collection = ?1",
      params![collection.as_str()],
    )?;
    Ok(removed)
  }

  /// Number of records in a collection.
  pub fn count(&self, collection: Collection) -> Result<usize, StoreError> {
    let conn = self.lock()?;
    let count: i64 = conn.query_row(
      "SELECT COUNT(*) FROM records WHERE collection = ?1",
      params![collection.as_str()],
      |row| row.get(0),
    )?;
    Ok(count as usize)
  }
}
