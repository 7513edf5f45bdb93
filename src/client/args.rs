//! Argument normalization.
//!
//! Every value is sent as text, so `{"userid": 5}` and `{"userid": "5"}` are the
//! same call and hash to the same cache key and queue id.

use serde_json::Value;

use crate::cache::Params;

use super::error::CallError;

/// Normalize a JSON object into text parameters.
pub fn normalize(args: &Value) -> Result<Params, CallError> {
  match args {
    Value::Object(map) => Ok(
      map
        .iter()
        .map(|(name, value)| (name.clone(), stringify(value)))
        .collect(),
    ),
    Value::Null => Ok(Params::new()),
    other => Err(CallError::InvalidArguments(format!(
      "expected an object, got {}",
      other
    ))),
  }
}

/// Parse `name=value` pairs, as given on a command line.
pub fn from_pairs<I, S>(pairs: I) -> Result<Params, CallError>
where
  I: IntoIterator<Item = S>,
  S: AsRef<str>,
{
  pairs
    .into_iter()
    .map(|pair| {
      let pair = pair.as_ref();
      pair
        .split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| CallError::InvalidArguments(format!("expected name=value, got `{}`", pair)))
    })
    .collect()
}

fn stringify(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    Value::Null => "null".to_string(),
    Value::Bool(b) => b.to_string(),
    Value::Number(n) => n.to_string(),
    // Nested structures travel as compact JSON text
    other => other.to_string(),
  }
}
