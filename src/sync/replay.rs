//! Replaying queued operations once the device is back online.

use tracing::{debug, info, warn};

use crate::client::{CallError, CallOptions, CallOutcome, RemoteClient};

use super::operation::{OperationKind, OperationPayload, QueuedOperation};
use super::queue::SyncQueue;

/// Why a replay pass did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
  Offline,
  Disabled,
  AlreadyRunning,
  /// The queue or settings could not be read
  StoreUnavailable,
}

/// Summary of one replay pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
  /// Operations that succeeded and were removed
  pub completed: usize,
  /// Operations that failed and stay queued
  pub failed: usize,
  /// Operations bound to another site, left untouched
  pub skipped_other_site: usize,
  /// Set when the pass did not run at all
  pub skipped: Option<SkipReason>,
}

impl ReplayReport {
  fn skipped(reason: SkipReason) -> Self {
    Self {
      skipped: Some(reason),
      ..Self::default()
    }
  }

  fn merge(&mut self, other: ReplayReport) {
    self.completed += other.completed;
    self.failed += other.failed;
    self.skipped_other_site += other.skipped_other_site;
  }
}

impl SyncQueue {
  /// Attempt every queued operation once.
  ///
  /// Kinds run concurrently; within a kind operations run one after another in
  /// insertion order. Failures are logged and the operation stays queued, so a
  /// later pass retries it. Only one pass runs at a time.
  pub async fn replay_all(&self, client: &RemoteClient) -> ReplayReport {
    let Ok(_pass) = self.replaying.try_lock() else {
      debug!("Replay pass already running");
      return ReplayReport::skipped(SkipReason::AlreadyRunning);
    };

    match client.settings().sync_enabled() {
      Ok(true) => {}
      Ok(false) => {
        info!("Sync process is disabled");
        return ReplayReport::skipped(SkipReason::Disabled);
      }
      Err(e) => {
        warn!(error = %e, "Could not read sync setting");
        return ReplayReport::skipped(SkipReason::StoreUnavailable);
      }
    }

    if !client.oracle().is_connected() {
      debug!("Offline, not replaying");
      return ReplayReport::skipped(SkipReason::Offline);
    }

    let current_site = match client.settings().current_site_id() {
      Ok(site) => site,
      Err(e) => {
        warn!(error = %e, "Could not read current site");
        return ReplayReport::skipped(SkipReason::StoreUnavailable);
      }
    };

    let pending = match self.list() {
      Ok(pending) => pending,
      Err(e) => {
        warn!(error = %e, "Could not read sync queue");
        return ReplayReport::skipped(SkipReason::StoreUnavailable);
      }
    };

    if pending.is_empty() {
      return ReplayReport::default();
    }
    info!(pending = pending.len(), "Executing sync process");

    let of_kind = |kind: OperationKind| -> Vec<QueuedOperation> {
      pending.iter().filter(|op| op.kind() == kind).cloned().collect()
    };
    let site = current_site.as_deref();

    let (calls, uploads, downloads) = futures::join!(
      self.replay_kind(client, of_kind(OperationKind::RemoteCall), site),
      self.replay_kind(client, of_kind(OperationKind::FileUpload), site),
      self.replay_kind(client, of_kind(OperationKind::FileDownload), site),
    );

    let mut report = ReplayReport::default();
    report.merge(calls);
    report.merge(uploads);
    report.merge(downloads);

    info!(
      completed = report.completed,
      failed = report.failed,
      skipped_other_site = report.skipped_other_site,
      "Sync process finished"
    );
    report
  }

  async fn replay_kind(
    &self,
    client: &RemoteClient,
    operations: Vec<QueuedOperation>,
    current_site: Option<&str>,
  ) -> ReplayReport {
    let mut report = ReplayReport::default();

    for op in operations {
      if current_site != Some(op.site_id.as_str()) {
        debug!(id = %op.id, site_id = %op.site_id, "Skipping operation of another site");
        report.skipped_other_site += 1;
        continue;
      }

      debug!(id = %op.id, kind = %op.kind(), name = %op.descriptor.name, "Replaying operation");
      match replay_one(client, &op).await {
        Ok(()) => match self.remove(&op.id) {
          Ok(_) => {
            info!(id = %op.id, kind = %op.kind(), "Replayed operation");
            report.completed += 1;
          }
          Err(e) => {
            warn!(id = %op.id, error = %e, "Replayed operation but could not dequeue it");
            report.failed += 1;
          }
        },
        Err(e) => {
          warn!(id = %op.id, kind = %op.kind(), error = %e, "Replay failed, keeping operation");
          report.failed += 1;
        }
      }
    }

    report
  }
}

async fn replay_one(client: &RemoteClient, op: &QueuedOperation) -> Result<(), CallError> {
  match &op.payload {
    OperationPayload::RemoteCall { method, args, .. } => {
      match client
        .call_params(method, args.clone(), CallOptions::replay())
        .await?
      {
        CallOutcome::Completed(_) => Ok(()),
        // Replay options are never syncable; keep the operation if it happens anyway.
        CallOutcome::Queued(_) => Err(CallError::Connectivity),
      }
    }
    OperationPayload::FileUpload { request, .. } => client.perform_upload(request).await,
    OperationPayload::FileDownload { request } => {
      client.perform_download(request).await.map(|_| ())
    }
  }
}
