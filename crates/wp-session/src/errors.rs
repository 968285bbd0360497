use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// Separator used when a `detail` field carries several sub-errors
pub const DETAIL_SEPARATOR: &str = " • ";

/// Error message extracted from a failed response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedError {
    pub message: String,
    pub status: Option<u16>,
}

impl NormalizedError {
    pub fn new(message: impl Into<String>, status: Option<u16>) -> Self {
        Self {
            message: message.into(),
            status,
        }
    }

    /// Interpret a response body that has already been read.
    ///
    /// Priority: `detail` → `message` → `error` → `errors[0]` → raw text →
    /// a generic message naming the status.
    pub fn from_body(status: u16, body: &str) -> Self {
        let parsed = serde_json::from_str::<Value>(body).ok();
        let message = parsed
            .as_ref()
            .and_then(message_from_json)
            .or_else(|| non_empty(body.trim()))
            .unwrap_or_else(|| format!("Request failed with status {status}"));

        Self::new(message, Some(status))
    }
}

impl fmt::Display for NormalizedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

fn message_from_json(body: &Value) -> Option<String> {
    let object = body.as_object()?;

    if let Some(detail) = object.get("detail") {
        let message = match detail {
            Value::Array(items) => {
                let parts: Vec<String> = items.iter().filter_map(item_message).collect();
                non_empty(&parts.join(DETAIL_SEPARATOR))
            }
            other => item_message(other),
        };
        if message.is_some() {
            return message;
        }
    }

    object
        .get("message")
        .and_then(item_message)
        .or_else(|| object.get("error").and_then(item_message))
        .or_else(|| {
            object
                .get("errors")
                .and_then(Value::as_array)
                .and_then(|errors| errors.first())
                .and_then(item_message)
        })
}

/// Message of a single error entry: a string, or an object with `msg`/`message`
fn item_message(item: &Value) -> Option<String> {
    match item {
        Value::Null => None,
        Value::String(s) => non_empty(s),
        Value::Object(map) => map
            .get("msg")
            .or_else(|| map.get("message"))
            .and_then(Value::as_str)
            .and_then(non_empty)
            .or_else(|| Some(item.to_string())),
        other => Some(other.to_string()),
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Failure of an authenticated request
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("{0}")]
    Failed(NormalizedError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid JSON response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
}

impl RequestError {
    /// HTTP status of the failed response, if one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Failed(err) => err.status,
            Self::Network(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Text suitable for the blocking status view
    pub fn user_message(&self) -> String {
        match self {
            Self::Failed(err) => err.message.clone(),
            other => other.to_string(),
        }
    }
}

/// Failure to exchange a link credential for a session
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("{0}")]
    Rejected(NormalizedError),

    #[error("Session bridge returned no access token")]
    MissingAccessToken,

    #[error(transparent)]
    Transport(RequestError),
}

impl From<RequestError> for BridgeError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::Failed(normalized) => Self::Rejected(normalized),
            other => Self::Transport(other),
        }
    }
}

/// Storage backend failure. Never surfaced past the token store.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt storage data: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Configuration loading failure
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Could not determine config directory")]
    NoConfigDir,
}

pub type Result<T> = std::result::Result<T, RequestError>;
