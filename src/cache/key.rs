//! Deterministic cache and queue keys.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Call parameters after normalization: every value is text, sorted by name.
pub type Params = BTreeMap<String, String>;

/// Key for a call to `url` with `params`.
///
/// Parameters are hashed in name order, so insertion order never matters and
/// the key is stable across restarts.
pub fn compute_key(url: &str, params: &Params) -> String {
  let body = serde_json::to_string(params).unwrap_or_default();
  hash_parts(url, &body)
}

/// SHA-256 hex of a target and a serialized body.
pub fn hash_parts(target: &str, body: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(target.as_bytes());
  hasher.update(b"\n");
  hasher.update(body.as_bytes());
  hex::encode(hasher.finalize())
}
