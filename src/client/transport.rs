//! HTTP transport for calls, uploads and downloads.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{multipart, Client};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::cache::Params;
use crate::sync::UploadRequest;

use super::error::TransportError;

/// Connect timeout; requests otherwise run until the server answers.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Moves bytes between the device and the site.
#[async_trait]
pub trait Transport: Send + Sync {
  /// POST form fields and decode the JSON answer.
  async fn post_form(&self, url: &str, form: &Params) -> Result<Value, TransportError>;

  /// Multipart upload of a local file with a `token` field.
  async fn upload(
    &self,
    url: &str,
    request: &UploadRequest,
    token: &str,
  ) -> Result<(), TransportError>;

  /// GET `url` into `destination`. Returns the number of bytes written.
  async fn download(&self, url: &str, destination: &Path) -> Result<u64, TransportError>;
}

/// reqwest-backed transport.
#[derive(Clone)]
pub struct HttpTransport {
  client: Client,
}

impl HttpTransport {
  pub fn new() -> Result<Self, TransportError> {
    let client = Client::builder()
      .connect_timeout(CONNECT_TIMEOUT)
      .user_agent(concat!("wsync/", env!("CARGO_PKG_VERSION")))
      .build()?;
    Ok(Self { client })
  }

  pub fn with_client(client: Client) -> Self {
    Self { client }
  }
}

#[async_trait]
impl Transport for HttpTransport {
  async fn post_form(&self, url: &str, form: &Params) -> Result<Value, TransportError> {
    let response = self.client.post(url).form(form).send().await?;

    let status = response.status();
    if !status.is_success() {
      return Err(TransportError::Status {
        status: status.as_u16(),
      });
    }

    let value: Value = response.json().await?;

    debug!(url, "Received web service response");
    Ok(value)
  }

  async fn upload(
    &self,
    url: &str,
    request: &UploadRequest,
    token: &str,
  ) -> Result<(), TransportError> {
    let data = tokio::fs::read(&request.file).await?;
    let size = data.len();

    let part = multipart::Part::bytes(data)
      .file_name(request.file_name.clone())
      .mime_str(&request.mime_type)
      .map_err(|e| TransportError::Decode(format!("invalid mime type: {}", e)))?;

    let form = multipart::Form::new()
      .text("token", token.to_string())
      .part(request.file_key.clone(), part);

    info!(file = %request.file_name, size, "Uploading file");

    let response = self.client.post(url).multipart(form).send().await?;
    let status = response.status();
    if !status.is_success() {
      return Err(TransportError::Status {
        status: status.as_u16(),
      });
    }

    Ok(())
  }

  async fn download(&self, url: &str, destination: &Path) -> Result<u64, TransportError> {
    let response = self.client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
      return Err(TransportError::Status {
        status: status.as_u16(),
      });
    }

    if let Some(parent) = destination.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }

    // Stream into a sibling temp file so a broken transfer never leaves a
    // truncated file at the destination.
    let mut partial = destination.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    let written = match save_body(response, &partial, destination).await {
      Ok(written) => written,
      Err(e) => {
        if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
          debug!(path = %partial.display(), error = %cleanup, "No partial download to remove");
        }
        return Err(e);
      }
    };

    info!(path = %destination.display(), bytes = written, "Downloaded file");
    Ok(written)
  }
}

/// Write the response body to `partial`, then move it to `destination`.
async fn save_body(
  response: reqwest::Response,
  partial: &Path,
  destination: &Path,
) -> Result<u64, TransportError> {
  let mut file = tokio::fs::File::create(partial).await?;
  let mut stream = response.bytes_stream();
  let mut written = 0u64;

  while let Some(chunk) = stream.next().await {
    let chunk = chunk?;
    file.write_all(&chunk).await?;
    written += chunk.len() as u64;
  }

  file.flush().await?;
  file.sync_all().await?;
  drop(file);
  tokio::fs::rename(partial, destination).await?;
  Ok(written)
}
