//! Runtime settings persisted in the `settings` collection.
//!
//! The configuration file seeds these on startup; everything at runtime reads
//! through here so a change (e.g. toggling offline mode) is seen by the next call.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::db::{Collection, Database, Record, StoreError};

pub const CURRENT_TOKEN: &str = "current_token";
pub const CURRENT_SITE_URL: &str = "current_site_url";
pub const CURRENT_SITE_ID: &str = "current_site_id";
pub const CACHE_TTL_SECS: &str = "cache_ttl_secs";
pub const DEV_OFFLINE: &str = "dev_offline";
pub const SYNC_WS_ON: &str = "sync_ws_on";

/// Cache lifetime used when no `cache_ttl_secs` setting exists.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
  pub name: String,
  pub value: Value,
}

impl Record for Setting {
  const COLLECTION: Collection = Collection::Settings;
}

/// Named settings backed by the durable store.
#[derive(Clone)]
pub struct Settings {
  db: Arc<Database>,
}

impl Settings {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }

  pub fn get(&self, name: &str) -> Result<Option<Value>, StoreError> {
    Ok(self.db.get::<Setting>(name)?.map(|s| s.value))
  }

  pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<(), StoreError> {
    let setting = Setting {
      name: name.to_string(),
      value: value.into(),
    };
    self.db.put(name, &setting)
  }

  pub fn unset(&self, name: &str) -> Result<bool, StoreError> {
    self.db.delete(Collection::Settings, name)
  }

  pub fn all(&self) -> Result<Vec<Setting>, StoreError> {
    Ok(self.db.all::<Setting>()?.into_iter().map(|(_, s)| s).collect())
  }

  /// Read a string setting. Empty strings count as absent.
  pub fn get_str(&self, name: &str) -> Result<Option<String>, StoreError> {
    Ok(match self.get(name)? {
      Some(Value::String(s)) if !s.is_empty() => Some(s),
      Some(Value::Number(n)) => Some(n.to_string()),
      _ => None,
    })
  }

  /// Read a boolean setting, accepting `true`/`false`, 0/1 and their string forms.
  pub fn get_bool(&self, name: &str) -> Result<Option<bool>, StoreError> {
    Ok(match self.get(name)? {
      Some(Value::Bool(b)) => Some(b),
      Some(Value::Number(n)) => n.as_i64().map(|n| n != 0),
      Some(Value::String(s)) => match s.as_str() {
        "1" | "true" => Some(true),
        "0" | "false" | "" => Some(false),
        _ => None,
      },
      _ => None,
    })
  }

  pub fn current_token(&self) -> Result<Option<String>, StoreError> {
    self.get_str(CURRENT_TOKEN)
  }

  pub fn current_site_url(&self) -> Result<Option<String>, StoreError> {
    Ok(
      self
        .get_str(CURRENT_SITE_URL)?
        .map(|url| url.trim_end_matches('/').to_string()),
    )
  }

  pub fn current_site_id(&self) -> Result<Option<String>, StoreError> {
    self.get_str(CURRENT_SITE_ID)
  }

  pub fn cache_ttl(&self) -> Result<chrono::Duration, StoreError> {
    let secs = match self.get(CACHE_TTL_SECS)? {
      Some(Value::Number(n)) => n.as_u64(),
      Some(Value::String(s)) => s.parse().ok(),
      _ => None,
    }
    .unwrap_or(DEFAULT_CACHE_TTL_SECS);

    Ok(chrono::Duration::seconds(secs.min(u32::MAX as u64) as i64))
  }

  /// Developer override that makes the device look disconnected.
  pub fn force_offline(&self) -> Result<bool, StoreError> {
    Ok(self.get_bool(DEV_OFFLINE)?.unwrap_or(false))
  }

  /// Whether queued operations are replayed. On unless switched off.
  pub fn sync_enabled(&self) -> Result<bool, StoreError> {
    Ok(self.get_bool(SYNC_WS_ON)?.unwrap_or(true))
  }
}
