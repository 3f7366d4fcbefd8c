//! Error types and request helpers shared by every backend call.

use std::fmt;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Standard User-Agent header for quarry requests.
pub const USER_AGENT: &str = concat!("quarry/", env!("CARGO_PKG_VERSION"));

/// Default origin of the research backend.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Environment variable that overrides the configured backend origin.
pub const BASE_URL_ENV: &str = "QUARRY_BACKEND_URL";

/// Resolves the backend base URL with precedence: env > config > default.
///
/// Trailing slashes are stripped so endpoint paths can be appended directly.
///
/// # Errors
/// Returns an error if the selected URL does not parse.
pub fn resolve_base_url(
    config_base_url: Option<&str>,
    env_var: &str,
    default_url: &str,
) -> Result<String> {
    if let Ok(env_url) = std::env::var(env_var) {
        let trimmed = env_url.trim();
        if !trimmed.is_empty() {
            validate_url(trimmed)?;
            return Ok(trimmed.trim_end_matches('/').to_string());
        }
    }

    if let Some(config_url) = config_base_url {
        let trimmed = config_url.trim();
        if !trimmed.is_empty() {
            validate_url(trimmed)?;
            return Ok(trimmed.trim_end_matches('/').to_string());
        }
    }

    Ok(default_url.to_string())
}

/// Validates that a URL is well-formed.
///
/// # Errors
/// Returns an error if the URL does not parse.
pub fn validate_url(url: &str) -> Result<()> {
    url::Url::parse(url).with_context(|| format!("Invalid backend URL: {url}"))?;
    Ok(())
}

/// Categories of backend errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendErrorKind {
    /// Non-success HTTP status (4xx, 5xx)
    HttpStatus,
    /// Request or stream idle deadline expired
    Timeout,
    /// Connection refused, reset, DNS failure, ...
    Network,
    /// Response body did not match the protocol (bad JSON, missing fields)
    Parse,
    /// Error reported on, or abnormal termination of, the event stream
    Stream,
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendErrorKind::HttpStatus => write!(f, "http_status"),
            BackendErrorKind::Timeout => write!(f, "timeout"),
            BackendErrorKind::Network => write!(f, "network"),
            BackendErrorKind::Parse => write!(f, "parse"),
            BackendErrorKind::Stream => write!(f, "stream"),
        }
    }
}

/// Structured error from the backend with kind and details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendError {
    /// Error category
    pub kind: BackendErrorKind,
    /// One-line summary suitable for display
    pub message: String,
    /// Optional additional details (e.g., raw error body)
    pub details: Option<String>,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    /// Creates an HTTP status error.
    ///
    /// The backend reports failures as `{"detail": "..."}`; when present the
    /// detail is folded into the summary.
    pub fn http_status(status: u16, body: &str) -> Self {
        if body.is_empty() {
            return Self::new(BackendErrorKind::HttpStatus, format!("HTTP {status}"));
        }

        if let Ok(json) = serde_json::from_str::<Value>(body)
            && let Some(detail) = json.get("detail").and_then(Value::as_str)
        {
            return Self {
                kind: BackendErrorKind::HttpStatus,
                message: format!("HTTP {status}: {detail}"),
                details: Some(body.to_string()),
            };
        }

        Self {
            kind: BackendErrorKind::HttpStatus,
            message: format!("HTTP {status}"),
            details: Some(body.to_string()),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Timeout, message)
    }

    /// Creates a parse error for a response that lacks required fields.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Parse, message)
    }

    pub fn stream(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Stream, message)
    }

    /// Returns true when repeating the same action may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            BackendErrorKind::Timeout | BackendErrorKind::Network | BackendErrorKind::Stream
        ) || self.message.starts_with("HTTP 5")
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for BackendError {}

/// Result type for backend operations.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Maps a reqwest failure onto a backend error kind.
pub fn classify_reqwest_error(e: &reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::timeout(format!("Request timed out: {e}"))
    } else if e.is_connect() {
        BackendError::new(BackendErrorKind::Network, format!("Connection failed: {e}"))
    } else if e.is_decode() {
        BackendError::malformed(format!("Invalid response body: {e}"))
    } else if e.is_request() {
        BackendError::new(BackendErrorKind::Network, format!("Request error: {e}"))
    } else {
        BackendError::new(BackendErrorKind::Network, format!("Network error: {e}"))
    }
}
