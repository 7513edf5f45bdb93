use thiserror::Error;

use crate::db::StoreError;

/// Failures below the application protocol: no response, bad status, unreadable body.
#[derive(Debug, Error)]
pub enum TransportError {
  #[error("cannot connect to the site: {0}")]
  Network(String),

  #[error("site answered with HTTP {status}")]
  Status { status: u16 },

  #[error("unreadable response: {0}")]
  Decode(String),

  #[error("local file error: {0}")]
  Io(#[from] std::io::Error),
}

impl TransportError {
  /// A 404 from the web service endpoint usually means a wrong URL scheme.
  pub fn is_invalid_scheme(&self) -> bool {
    matches!(self, Self::Status { status: 404 })
  }

  /// Message suitable for showing to a user.
  pub fn user_message(&self) -> String {
    if self.is_invalid_scheme() {
      "Invalid site address: the web service endpoint was not found".to_string()
    } else {
      "Cannot connect to the site".to_string()
    }
  }
}

impl From<reqwest::Error> for TransportError {
  fn from(e: reqwest::Error) -> Self {
    if let Some(status) = e.status() {
      Self::Status {
        status: status.as_u16(),
      }
    } else if e.is_decode() {
      Self::Decode(e.to_string())
    } else {
      Self::Network(e.to_string())
    }
  }
}

/// Why a remote call did not produce data.
#[derive(Debug, Error)]
pub enum CallError {
  #[error(transparent)]
  Transport(#[from] TransportError),

  /// The service answered with an error envelope. Never retried automatically.
  #[error("{message}")]
  Application {
    errorcode: Option<String>,
    message: String,
  },

  /// The token is no longer accepted; the user must sign in again.
  #[error("session is no longer valid: {message}")]
  SessionInvalidated { message: String },

  #[error("no network connection and no cached data")]
  Connectivity,

  #[error("missing setting `{0}`")]
  NotConfigured(&'static str),

  #[error("invalid URL `{url}`: {reason}")]
  InvalidUrl { url: String, reason: String },

  #[error("invalid arguments: {0}")]
  InvalidArguments(String),

  #[error(transparent)]
  Store(#[from] StoreError),
}
