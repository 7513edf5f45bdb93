//! Durable queue of operations performed while offline.
//!
//! Operations wait here until connectivity returns and are removed only after
//! they succeed. There is no failed state: a failing operation is retried on
//! every replay pass until it works or the queue is cleared.

mod operation;
mod queue;
mod replay;

pub use operation::{
  Descriptor, DownloadRequest, OperationKind, OperationPayload, QueuedOperation, UploadRequest,
};
pub use queue::SyncQueue;
pub use replay::{ReplayReport, SkipReason};
