//! Notifications for the presentation layer.

use crate::sync::Descriptor;

/// Something the user should be told about.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
  /// An operation was stored for later because the device is offline
  Queued { id: String, descriptor: Descriptor },
  /// A failure that is not silent
  Error { message: String },
  /// The site rejected the token; the user has to sign in again
  SessionInvalidated {
    site_id: Option<String>,
    message: String,
  },
}
