//! Web service wire format: endpoint URLs and the error envelope.

use serde_json::Value;
use url::Url;

use super::error::CallError;

const REST_PATH: &str = "/webservice/rest/server.php";
const UPLOAD_PATH: &str = "/webservice/upload.php";

/// Error codes that mean the token is no longer accepted.
const SESSION_ERROR_CODES: &[&str] = &["invalidtoken", "accessexception"];

/// Fields the service sets when a call fails.
///
/// A field counts as set when the key is present, whatever its JSON type.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ErrorEnvelope {
  pub exception: Option<String>,
  pub errorcode: Option<String>,
  pub message: Option<String>,
  pub debuginfo: Option<String>,
}

impl ErrorEnvelope {
  pub fn read(value: &Value) -> Self {
    Self {
      exception: value.get("exception").map(field_text),
      errorcode: value.get("errorcode").and_then(scalar_text),
      message: value.get("message").and_then(Value::as_str).map(str::to_string),
      debuginfo: value.get("debuginfo").map(field_text),
    }
  }
}

fn field_text(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

fn scalar_text(value: &Value) -> Option<String> {
  match value {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

fn parse_url(raw: &str) -> Result<Url, CallError> {
  Url::parse(raw).map_err(|e| CallError::InvalidUrl {
    url: raw.to_string(),
    reason: e.to_string(),
  })
}

/// `<site>/webservice/rest/server.php?wstoken=<token>&moodlewsrestformat=json`
pub fn rest_url(site_url: &str, token: &str) -> Result<String, CallError> {
  let mut url = parse_url(&format!("{}{}", site_url.trim_end_matches('/'), REST_PATH))?;
  url
    .query_pairs_mut()
    .append_pair("wstoken", token)
    .append_pair("moodlewsrestformat", "json");
  Ok(url.into())
}

/// `<site>/webservice/upload.php`
pub fn upload_url(site_url: &str) -> Result<String, CallError> {
  Ok(parse_url(&format!("{}{}", site_url.trim_end_matches('/'), UPLOAD_PATH))?.into())
}

/// Append the token as a `token` query parameter.
pub fn with_token(url: &str, token: &str) -> Result<String, CallError> {
  let mut url = parse_url(url)?;
  url.query_pairs_mut().append_pair("token", token);
  Ok(url.into())
}

/// Route a browser pluginfile URL through the token-authenticated web service one.
pub fn pluginfile_url(url: &str, token: &str) -> Result<String, CallError> {
  let rewritten = if url.contains("/webservice/pluginfile") {
    url.to_string()
  } else {
    url.replacen("/pluginfile", "/webservice/pluginfile", 1)
  };
  with_token(&rewritten, token)
}

/// Split a decoded response into data or the error it carries.
pub fn into_result(value: Value) -> Result<Value, CallError> {
  if !value.is_object() {
    return Ok(value);
  }

  let envelope = ErrorEnvelope::read(&value);

  if envelope.exception.is_some() {
    let message = envelope
      .message
      .unwrap_or_else(|| "Unknown error".to_string());

    let session_lost = envelope
      .errorcode
      .as_deref()
      .is_some_and(|code| SESSION_ERROR_CODES.contains(&code));

    if session_lost {
      return Err(CallError::SessionInvalidated { message });
    }
    return Err(CallError::Application {
      errorcode: envelope.errorcode,
      message: format!("Error. {}", message),
    });
  }

  if let Some(debuginfo) = envelope.debuginfo {
    tracing::debug!(%debuginfo, "Response carried debug info");
    return Err(CallError::Application {
      errorcode: envelope.errorcode,
      message: "An unexpected error occurred".to_string(),
    });
  }

  Ok(value)
}
