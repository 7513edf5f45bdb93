use thiserror::Error;

/// Errors raised by the durable store.
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("database error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("failed to (de)serialize record: {0}")]
  Serde(#[from] serde_json::Error),

  #[error("failed to prepare store location: {0}")]
  Io(#[from] std::io::Error),

  #[error("lock poisoned: {0}")]
  Lock(String),

  #[error("record `{id}` not found in `{collection}`")]
  NotFound { collection: &'static str, id: String },
}
