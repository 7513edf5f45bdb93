//! Sync queue storage and management.
//!
//! Provides persistence and querying of operations waiting for connectivity.

use std::sync::Arc;
use tracing::info;

use crate::clock::Clock;
use crate::db::{Collection, Database, StoreError};

use super::operation::{Descriptor, OperationKind, OperationPayload, QueuedOperation};

/// Durable queue of operations done while offline.
#[derive(Clone)]
pub struct SyncQueue {
  db: Arc<Database>,
  clock: Arc<dyn Clock>,
  /// Held for the duration of a replay pass
  pub(super) replaying: Arc<tokio::sync::Mutex<()>>,
}

impl SyncQueue {
  pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>) -> Self {
    Self {
      db,
      clock,
      replaying: Arc::new(tokio::sync::Mutex::new(())),
    }
  }

  /// Add an operation, or replace the identical one already waiting.
  ///
  /// Only touches local storage. A replaced operation keeps its place in line.
  pub fn enqueue(
    &self,
    payload: OperationPayload,
    site_id: &str,
    descriptor: Descriptor,
  ) -> Result<QueuedOperation, StoreError> {
    let id = payload.operation_id();
    let queued_at = match self.db.get::<QueuedOperation>(&id)? {
      Some(existing) => existing.queued_at,
      None => self.clock.now(),
    };

    let operation = QueuedOperation {
      id: id.clone(),
      payload,
      site_id: site_id.to_string(),
      descriptor,
      queued_at,
    };
    self.db.put(&id, &operation)?;

    info!(
      id = %id,
      kind = %operation.kind(),
      site_id,
      name = %operation.descriptor.name,
      "Queued operation for later"
    );
    Ok(operation)
  }

  /// All waiting operations in insertion order.
  pub fn list(&self) -> Result<Vec<QueuedOperation>, StoreError> {
    Ok(
      self
        .db
        .all::<QueuedOperation>()?
        .into_iter()
        .map(|(_, op)| op)
        .collect(),
    )
  }

  /// Waiting operations of one kind, in insertion order.
  pub fn list_kind(&self, kind: OperationKind) -> Result<Vec<QueuedOperation>, StoreError> {
    Ok(
      self
        .list()?
        .into_iter()
        .filter(|op| op.kind() == kind)
        .collect(),
    )
  }

  pub fn get(&self, id: &str) -> Result<Option<QueuedOperation>, StoreError> {
    self.db.get(id)
  }

  /// Drop an operation. Returns whether it was queued.
  pub fn remove(&self, id: &str) -> Result<bool, StoreError> {
    self.db.delete(Collection::Sync, id)
  }

  /// Drop every waiting operation.
  pub fn clear(&self) -> Result<usize, StoreError> {
    let removed = self.db.clear(Collection::Sync)?;
    info!(removed, "Cleared sync queue");
    Ok(removed)
  }

  pub fn len(&self) -> Result<usize, StoreError> {
    self.db.count(Collection::Sync)
  }

  pub fn is_empty(&self) -> Result<bool, StoreError> {
    Ok(self.len()? == 0)
  }
}
