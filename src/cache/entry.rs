//! Cache records and lookup results.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::{Collection, Record};

/// How long an entry stays fresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtlPolicy {
  /// Expires after the site-configured TTL
  #[default]
  Default,
  /// Kept until explicitly purged (remote stylesheets and similar)
  UntilPurged,
}

/// A cached call result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
  pub key: String,
  /// Endpoint the key was computed from
  pub url: String,
  pub value: Value,
  pub stored_at: DateTime<Utc>,
  #[serde(default)]
  pub policy: TtlPolicy,
}

impl Record for CacheEntry {
  const COLLECTION: Collection = Collection::Cache;
}

impl CacheEntry {
  /// True once `stored_at + ttl` lies in the past. `UntilPurged` never expires.
  pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
    match self.policy {
      TtlPolicy::Default => self.stored_at + ttl < now,
      TtlPolicy::UntilPurged => false,
    }
  }
}

/// A successful cache lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
  pub value: Value,
  pub stored_at: DateTime<Utc>,
  /// Served past its TTL because stale reads were allowed
  pub expired: bool,
}

/// Which entries a purge removes.
pub enum Purge<'a> {
  All,
  Expired,
  Matching(&'a dyn Fn(&CacheEntry) -> bool),
}
