//! Remote calls against a Moodle-style web service.
//!
//! [`RemoteClient`] is the single entry point: every call is served from the
//! cache, queued for later, or sent over the network, and failures come back
//! as a [`CallError`].

pub mod args;
mod dispatcher;
pub mod envelope;
mod error;
mod events;
mod transport;

pub use dispatcher::{CallOptions, CallOutcome, CallResult, RemoteClient, Source, TransferOutcome};
pub use error::{CallError, TransportError};
pub use events::ClientEvent;
pub use transport::{HttpTransport, Transport};
