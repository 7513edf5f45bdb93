//! Operations that can wait in the sync queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::cache::{hash_parts, Params};
use crate::db::{Collection, Record};

/// Kind of queued work. Each kind is replayed independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
  RemoteCall,
  FileUpload,
  FileDownload,
}

impl OperationKind {
  pub const ALL: [OperationKind; 3] = [Self::RemoteCall, Self::FileUpload, Self::FileDownload];

  pub fn display_name(&self) -> &'static str {
    match self {
      Self::RemoteCall => "remote call",
      Self::FileUpload => "upload",
      Self::FileDownload => "download",
    }
  }
}

impl std::fmt::Display for OperationKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.display_name())
  }
}

/// A file to send to the site's upload endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRequest {
  /// Local file to send
  pub file: PathBuf,
  /// Multipart field name of the file part
  pub file_key: String,
  pub file_name: String,
  pub mime_type: String,
}

impl UploadRequest {
  /// Upload `file` under the default `file` field, naming it after the path.
  pub fn new(file: impl Into<PathBuf>, mime_type: impl Into<String>) -> Self {
    let file = file.into();
    let file_name = file
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| "upload".to_string());

    Self {
      file,
      file_key: "file".to_string(),
      file_name,
      mime_type: mime_type.into(),
    }
  }
}

/// A file to fetch into local storage for a piece of content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
  pub url: String,
  pub destination: PathBuf,
  /// Content record whose file entry receives the local path
  pub content_id: String,
  pub file_index: usize,
}

/// What to do when the operation is replayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationPayload {
  RemoteCall {
    method: String,
    /// Normalized arguments, including `wsfunction`
    args: Params,
    /// Endpoint the call targeted when queued
    target: String,
  },
  FileUpload {
    request: UploadRequest,
    target: String,
  },
  FileDownload {
    request: DownloadRequest,
  },
}

impl OperationPayload {
  pub fn kind(&self) -> OperationKind {
    match self {
      Self::RemoteCall { .. } => OperationKind::RemoteCall,
      Self::FileUpload { .. } => OperationKind::FileUpload,
      Self::FileDownload { .. } => OperationKind::FileDownload,
    }
  }

  /// Identity of the operation: hash of its target and serialized body.
  ///
  /// Submitting the same operation twice yields the same id.
  pub fn operation_id(&self) -> String {
    match self {
      Self::RemoteCall { target, args, .. } => {
        hash_parts(target, &serde_json::to_string(args).unwrap_or_default())
      }
      Self::FileUpload { target, request } => {
        hash_parts(target, &serde_json::to_string(request).unwrap_or_default())
      }
      Self::FileDownload { request } => hash_parts(
        &request.url,
        &serde_json::to_string(request).unwrap_or_default(),
      ),
    }
  }
}

/// Label shown while an operation waits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
  pub name: String,
  #[serde(default)]
  pub description: String,
}

impl Descriptor {
  pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      description: description.into(),
    }
  }
}

/// A pending operation. It stays queued until it succeeds or is cleared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedOperation {
  pub id: String,
  pub payload: OperationPayload,
  pub site_id: String,
  pub descriptor: Descriptor,
  pub queued_at: DateTime<Utc>,
}

impl Record for QueuedOperation {
  const COLLECTION: Collection = Collection::Sync;
}

impl QueuedOperation {
  pub fn kind(&self) -> OperationKind {
    self.payload.kind()
  }
}
