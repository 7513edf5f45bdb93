//! Remote call dispatcher: decides between cache, queue and network.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cache::{CacheManager, Params, TtlPolicy};
use crate::connectivity::ConnectivityOracle;
use crate::content::ContentModel;
use crate::settings::{self, Settings};
use crate::sync::{
  Descriptor, DownloadRequest, OperationPayload, ReplayReport, SyncQueue, UploadRequest,
};

use super::args;
use super::envelope;
use super::error::CallError;
use super::events::ClientEvent;
use super::transport::Transport;

/// Per-call switches.
#[derive(Debug, Clone)]
pub struct CallOptions {
  /// Serve from and write to the cache
  pub use_cache: bool,
  /// Queue the call instead of failing when offline
  pub syncable: bool,
  /// Log failures instead of reporting them to the user
  pub silent: bool,
  /// Token to use instead of the current one
  pub token: Option<String>,
  /// Site to call instead of the current one
  pub site_url: Option<String>,
  /// Label for the queued operation
  pub descriptor: Option<Descriptor>,
}

impl Default for CallOptions {
  fn default() -> Self {
    Self {
      use_cache: true,
      syncable: false,
      silent: false,
      token: None,
      site_url: None,
      descriptor: None,
    }
  }
}

impl CallOptions {
  pub fn no_cache(mut self) -> Self {
    self.use_cache = false;
    self
  }

  pub fn syncable(mut self, descriptor: Descriptor) -> Self {
    self.syncable = true;
    self.descriptor = Some(descriptor);
    self
  }

  pub fn silent(mut self) -> Self {
    self.silent = true;
    self
  }

  pub fn with_token(mut self, token: impl Into<String>) -> Self {
    self.token = Some(token.into());
    self
  }

  pub fn with_site_url(mut self, site_url: impl Into<String>) -> Self {
    self.site_url = Some(site_url.into());
    self
  }

  /// Options for re-issuing a queued call.
  pub fn replay() -> Self {
    Self::default().no_cache().silent()
  }
}

/// Where returned data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
  Network,
  Cache,
  /// Cache entry past its TTL, served because the device is offline
  StaleCache,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallResult {
  pub data: Value,
  pub source: Source,
  /// When the data was cached (if from cache)
  pub stored_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
  Completed(CallResult),
  /// Stored in the sync queue under this id
  Queued(String),
}

impl CallOutcome {
  pub fn data(&self) -> Option<&Value> {
    match self {
      Self::Completed(result) => Some(&result.data),
      Self::Queued(_) => None,
    }
  }

  pub fn into_data(self) -> Option<Value> {
    match self {
      Self::Completed(result) => Some(result.data),
      Self::Queued(_) => None,
    }
  }

  pub fn is_queued(&self) -> bool {
    matches!(self, Self::Queued(_))
  }
}

/// Outcome of an upload or download request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
  Done,
  Queued(String),
}

/// Entry point for everything that talks to the site.
#[derive(Clone)]
pub struct RemoteClient {
  transport: Arc<dyn Transport>,
  cache: CacheManager,
  queue: SyncQueue,
  oracle: ConnectivityOracle,
  settings: Settings,
  contents: Arc<dyn ContentModel>,
  events: Option<mpsc::UnboundedSender<ClientEvent>>,
}

impl RemoteClient {
  pub fn new(
    transport: Arc<dyn Transport>,
    cache: CacheManager,
    queue: SyncQueue,
    oracle: ConnectivityOracle,
    settings: Settings,
    contents: Arc<dyn ContentModel>,
  ) -> Self {
    Self {
      transport,
      cache,
      queue,
      oracle,
      settings,
      contents,
      events: None,
    }
  }

  /// Deliver user-facing notifications to `tx`.
  pub fn with_events(mut self, tx: mpsc::UnboundedSender<ClientEvent>) -> Self {
    self.events = Some(tx);
    self
  }

  pub fn cache(&self) -> &CacheManager {
    &self.cache
  }

  pub fn queue(&self) -> &SyncQueue {
    &self.queue
  }

  pub fn oracle(&self) -> &ConnectivityOracle {
    &self.oracle
  }

  pub fn settings(&self) -> &Settings {
    &self.settings
  }

  /// Call `method` with a JSON object of arguments.
  pub async fn call(
    &self,
    method: &str,
    args: &Value,
    options: CallOptions,
  ) -> Result<CallOutcome, CallError> {
    let params = args::normalize(args)?;
    self.call_params(method, params, options).await
  }

  /// Call `method` with already-normalized parameters.
  pub async fn call_params(
    &self,
    method: &str,
    mut params: Params,
    options: CallOptions,
  ) -> Result<CallOutcome, CallError> {
    let token = self.resolve(options.token.clone(), settings::CURRENT_TOKEN)?;
    let site_url = self.resolve(options.site_url.clone(), settings::CURRENT_SITE_URL)?;

    params.insert("wsfunction".to_string(), method.to_string());
    let url = envelope::rest_url(&site_url, &token)?;
    let online = self.oracle.is_connected();

    if options.syncable && !online {
      let descriptor = options
        .descriptor
        .clone()
        .unwrap_or_else(|| Descriptor::new(method, ""));
      let payload = OperationPayload::RemoteCall {
        method: method.to_string(),
        args: params,
        target: url,
      };
      let id = self.enqueue(payload, descriptor)?;
      return Ok(CallOutcome::Queued(id));
    }

    if options.use_cache {
      // Offline, an expired entry is better than nothing.
      match self.cache.get(&url, &params, !online)? {
        Some(hit) => {
          debug!(method, expired = hit.expired, "Serving call from cache");
          return Ok(CallOutcome::Completed(CallResult {
            data: hit.value,
            source: if hit.expired {
              Source::StaleCache
            } else {
              Source::Cache
            },
            stored_at: Some(hit.stored_at),
          }));
        }
        None if !online => return Err(self.fail(CallError::Connectivity, options.silent)),
        None => {}
      }
    }

    if !online {
      return Err(self.fail(CallError::Connectivity, options.silent));
    }

    debug!(method, "Calling web service");
    let response = match self.transport.post_form(&url, &params).await {
      Ok(value) => value,
      Err(e) => {
        warn!(method, error = %e, "Web service call failed");
        return Err(self.fail(CallError::Transport(e), options.silent));
      }
    };

    let data = match envelope::into_result(response) {
      Ok(data) => data,
      Err(e) => {
        warn!(method, error = %e, "Web service returned an error");
        return Err(self.fail(e, options.silent));
      }
    };

    if let Some(items) = data.as_array() {
      debug!(method, count = items.len(), "Received items");
    }

    if options.use_cache {
      if let Err(e) = self.cache.put(&url, &params, &data, TtlPolicy::Default) {
        warn!(method, error = %e, "Failed to cache call result");
      }
    }

    // The cache holds its own serialized copy; this value belongs to the caller.
    Ok(CallOutcome::Completed(CallResult {
      data,
      source: Source::Network,
      stored_at: None,
    }))
  }

  /// Upload a file now, or queue it when offline.
  pub async fn upload_file(
    &self,
    request: UploadRequest,
    descriptor: Option<Descriptor>,
  ) -> Result<TransferOutcome, CallError> {
    if !self.oracle.is_connected() {
      let site_url = self.resolve(None, settings::CURRENT_SITE_URL)?;
      let descriptor =
        descriptor.unwrap_or_else(|| Descriptor::new("Upload", request.file_name.clone()));
      let payload = OperationPayload::FileUpload {
        request,
        target: envelope::upload_url(&site_url)?,
      };
      let id = self.enqueue(payload, descriptor)?;
      return Ok(TransferOutcome::Queued(id));
    }

    self
      .perform_upload(&request)
      .await
      .map_err(|e| self.fail(e, false))?;
    Ok(TransferOutcome::Done)
  }

  /// Download a content file now, or queue it when offline.
  pub async fn download_content(
    &self,
    request: DownloadRequest,
    descriptor: Option<Descriptor>,
  ) -> Result<TransferOutcome, CallError> {
    if !self.oracle.is_connected() {
      let descriptor = descriptor
        .unwrap_or_else(|| Descriptor::new("Download", request.destination.display().to_string()));
      let id = self.enqueue(OperationPayload::FileDownload { request }, descriptor)?;
      return Ok(TransferOutcome::Queued(id));
    }

    self
      .perform_download(&request)
      .await
      .map_err(|e| self.fail(e, false))?;
    Ok(TransferOutcome::Done)
  }

  /// Send a file to the current site's upload endpoint.
  pub async fn perform_upload(&self, request: &UploadRequest) -> Result<(), CallError> {
    let token = self.resolve(None, settings::CURRENT_TOKEN)?;
    let site_url = self.resolve(None, settings::CURRENT_SITE_URL)?;
    let url = envelope::upload_url(&site_url)?;

    self.transport.upload(&url, request, &token).await?;
    info!(file = %request.file_name, "Upload finished");
    Ok(())
  }

  /// Fetch a content file and record its local path on the content.
  pub async fn perform_download(&self, request: &DownloadRequest) -> Result<u64, CallError> {
    let token = self.resolve(None, settings::CURRENT_TOKEN)?;
    let url = envelope::with_token(&request.url, &token)?;

    let bytes = self
      .transport
      .download(&url, &request.destination)
      .await?;
    self
      .contents
      .set_local_path(&request.content_id, request.file_index, &request.destination)?;

    info!(
      url = %request.url,
      path = %request.destination.display(),
      bytes,
      "Download finished"
    );
    Ok(bytes)
  }

  /// Authenticated URL for a site file link.
  pub fn pluginfile_url(&self, url: &str) -> Result<String, CallError> {
    let token = self.resolve(None, settings::CURRENT_TOKEN)?;
    envelope::pluginfile_url(url, &token)
  }

  /// Replay everything in the sync queue.
  pub async fn sync(&self) -> ReplayReport {
    self.queue.replay_all(self).await
  }

  fn enqueue(&self, payload: OperationPayload, descriptor: Descriptor) -> Result<String, CallError> {
    let site_id = self.settings.current_site_id()?.unwrap_or_default();
    let operation = self.queue.enqueue(payload, &site_id, descriptor)?;

    self.emit(ClientEvent::Queued {
      id: operation.id.clone(),
      descriptor: operation.descriptor,
    });
    Ok(operation.id)
  }

  fn resolve(&self, explicit: Option<String>, name: &'static str) -> Result<String, CallError> {
    if let Some(value) = explicit.filter(|v| !v.is_empty()) {
      return Ok(value);
    }

    let value = match name {
      settings::CURRENT_SITE_URL => self.settings.current_site_url()?,
      _ => self.settings.get_str(name)?,
    };
    value.ok_or(CallError::NotConfigured(name))
  }

  /// Tell the presentation layer about `error` unless silent, and hand it back.
  fn fail(&self, error: CallError, silent: bool) -> CallError {
    match &error {
      CallError::SessionInvalidated { message } => {
        let site_id = self.settings.current_site_id().ok().flatten();
        self.emit(ClientEvent::SessionInvalidated {
          site_id,
          message: message.clone(),
        });
      }
      _ if silent => {}
      CallError::Transport(e) => self.emit(ClientEvent::Error {
        message: e.user_message(),
      }),
      other => self.emit(ClientEvent::Error {
        message: other.to_string(),
      }),
    }
    error
  }

  fn emit(&self, event: ClientEvent) {
    if let Some(tx) = &self.events {
      if tx.send(event).is_err() {
        debug!("Event receiver dropped");
      }
    }
  }
}
