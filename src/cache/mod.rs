//! Transparent caching of call results with offline fallback.
//!
//! This module provides:
//! - Deterministic keys from endpoint + sorted parameters
//! - Per-site TTL expiry, plus entries kept until purged
//! - Stale reads for when the network is unavailable
//! - Purging of everything, expired entries, or a predicate match

mod entry;
mod key;
mod manager;

pub use entry::{CacheEntry, CacheHit, Purge, TtlPolicy};
pub use key::{compute_key, hash_parts, Params};
pub use manager::CacheManager;
