//! Cache manager: TTL-aware reads and writes of call results.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::db::{Collection, Database, StoreError};
use crate::settings::Settings;

use super::entry::{CacheEntry, CacheHit, Purge, TtlPolicy};
use super::key::{compute_key, Params};

/// Pseudo-endpoint under which named elements are stored.
const ELEMENT_SCOPE: &str = "wsync:element:";

/// Reads and writes the `cache` collection.
///
/// TTL comes from the settings on every lookup, so a site-level change applies
/// to entries that are already stored.
#[derive(Clone)]
pub struct CacheManager {
  db: Arc<Database>,
  settings: Settings,
  clock: Arc<dyn Clock>,
}

impl CacheManager {
  pub fn new(db: Arc<Database>, settings: Settings, clock: Arc<dyn Clock>) -> Self {
    Self {
      db,
      settings,
      clock,
    }
  }

  pub fn compute_key(&self, url: &str, params: &Params) -> String {
    compute_key(url, params)
  }

  /// Look up a call result.
  ///
  /// Expired entries count as absent unless `allow_stale` is set, in which case
  /// age is ignored: when disconnected, expired data beats no data.
  pub fn get(
    &self,
    url: &str,
    params: &Params,
    allow_stale: bool,
  ) -> Result<Option<CacheHit>, StoreError> {
    let key = compute_key(url, params);
    self.get_by_key(&key, allow_stale)
  }

  fn get_by_key(&self, key: &str, allow_stale: bool) -> Result<Option<CacheHit>, StoreError> {
    let Some(entry) = self.db.get::<CacheEntry>(key)? else {
      debug!(key, "Cache miss");
      return Ok(None);
    };

    let expired = entry.is_expired(self.settings.cache_ttl()?, self.clock.now());
    if expired && !allow_stale {
      debug!(key, stored_at = %entry.stored_at, "Cache entry expired");
      return Ok(None);
    }

    debug!(key, expired, "Cache hit");
    Ok(Some(CacheHit {
      value: entry.value,
      stored_at: entry.stored_at,
      expired,
    }))
  }

  /// Store a call result, replacing any previous entry for the same key.
  pub fn put(
    &self,
    url: &str,
    params: &Params,
    value: &Value,
    policy: TtlPolicy,
  ) -> Result<(), StoreError> {
    let key = compute_key(url, params);
    let entry = CacheEntry {
      key: key.clone(),
      url: url.to_string(),
      value: value.clone(),
      stored_at: self.clock.now(),
      policy,
    };
    self.db.put(&key, &entry)
  }

  /// Store a named payload that is not the result of a call.
  pub fn put_element(&self, name: &str, value: &Value, policy: TtlPolicy) -> Result<(), StoreError> {
    self.put(&element_url(name), &Params::new(), value, policy)
  }

  pub fn get_element(&self, name: &str, allow_stale: bool) -> Result<Option<Value>, StoreError> {
    Ok(
      self
        .get(&element_url(name), &Params::new(), allow_stale)?
        .map(|hit| hit.value),
    )
  }

  /// Delete entries. Returns the number removed.
  pub fn purge(&self, scope: Purge<'_>) -> Result<usize, StoreError> {
    let removed = match scope {
      Purge::All => self.db.clear(Collection::Cache)?,
      Purge::Expired => {
        let ttl = self.settings.cache_ttl()?;
        let now = self.clock.now();
        self
          .db
          .delete_where::<CacheEntry, _>(|entry| entry.is_expired(ttl, now))?
      }
      Purge::Matching(predicate) => self.db.delete_where::<CacheEntry, _>(predicate)?,
    };

    info!(removed, "Purged cache entries");
    Ok(removed)
  }

  pub fn len(&self) -> Result<usize, StoreError> {
    self.db.count(Collection::Cache)
  }

  pub fn is_empty(&self) -> Result<bool, StoreError> {
    Ok(self.len()? == 0)
  }
}

fn element_url(name: &str) -> String {
  format!("{}{}", ELEMENT_SCOPE, name)
}
