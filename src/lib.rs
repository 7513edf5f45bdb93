//! Offline-first client for Moodle-style web services.
//!
//! Idempotent calls are cached with a per-site TTL and served stale when the
//! device is offline. Calls, uploads and downloads that cannot run offline are
//! stored in a durable queue and replayed when connectivity returns.

pub mod cache;
pub mod client;
pub mod clock;
pub mod config;
pub mod connectivity;
pub mod content;
pub mod context;
pub mod db;
pub mod settings;
pub mod sync;

pub use client::{CallError, CallOptions, CallOutcome, ClientEvent, RemoteClient};
pub use context::AppContext;
