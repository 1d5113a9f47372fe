//! Structured errors returned by the portal client.

use std::fmt;

use serde_json::Value;

/// Message used when an error response carries no usable text.
pub const FALLBACK_HTTP_MESSAGE: &str = "request failed";

/// Message used when no response was obtained at all.
pub const NETWORK_FAILURE_MESSAGE: &str = "network request failed";

/// Error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// Non-2xx response from the portal
    Http,
    /// No response obtained (connect failure, timeout, broken body)
    Network,
    /// 2xx response whose body did not have the expected shape
    Parse,
    /// Refresh path exhausted; the session was cleared
    SessionExpired,
    /// The operation needs a token the session does not hold
    NotAuthenticated,
    /// Authenticated, but the role does not allow the operation
    PermissionDenied,
    /// The session could not be persisted or loaded
    Storage,
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiErrorKind::Http => write!(f, "http"),
            ApiErrorKind::Network => write!(f, "network"),
            ApiErrorKind::Parse => write!(f, "parse"),
            ApiErrorKind::SessionExpired => write!(f, "session_expired"),
            ApiErrorKind::NotAuthenticated => write!(f, "not_authenticated"),
            ApiErrorKind::PermissionDenied => write!(f, "permission_denied"),
            ApiErrorKind::Storage => write!(f, "storage"),
        }
    }
}

/// Error raised by the HTTP client, auth coordinator and controllers.
#[derive(Debug, Clone)]
pub struct ApiError {
    /// Error category
    pub kind: ApiErrorKind,
    /// One-line summary suitable for display
    pub message: String,
    /// HTTP status for `Http` errors
    pub status: Option<u16>,
    /// Parsed response body for `Http` errors (None if absent or not JSON)
    pub data: Option<Value>,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            data: None,
        }
    }

    /// Creates an HTTP status error, taking the message from the body's
    /// `error`, `message` or `msg` field (first string present).
    pub fn http(status: u16, data: Option<Value>) -> Self {
        let message = data
            .as_ref()
            .and_then(extract_message)
            .unwrap_or(FALLBACK_HTTP_MESSAGE)
            .to_string();
        Self {
            kind: ApiErrorKind::Http,
            message,
            status: Some(status),
            data,
        }
    }

    pub fn network() -> Self {
        Self::new(ApiErrorKind::Network, NETWORK_FAILURE_MESSAGE)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Parse, message)
    }

    pub fn session_expired() -> Self {
        Self::new(
            ApiErrorKind::SessionExpired,
            "session expired, please log in again",
        )
    }

    pub fn not_authenticated(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::NotAuthenticated, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::PermissionDenied, message)
    }

    pub fn storage(err: &anyhow::Error) -> Self {
        Self::new(ApiErrorKind::Storage, format!("{err:#}"))
    }

    pub fn is_unauthorized(&self) -> bool {
        self.kind == ApiErrorKind::Http && self.status == Some(401)
    }

    /// True when the user has to log in (again) before retrying.
    pub fn needs_login(&self) -> bool {
        matches!(
            self.kind,
            ApiErrorKind::SessionExpired | ApiErrorKind::NotAuthenticated
        )
    }
}

fn extract_message(data: &Value) -> Option<&str> {
    ["error", "message", "msg"]
        .into_iter()
        .find_map(|key| {
            data.get(key)
                .and_then(Value::as_str)
                .filter(|msg| !msg.is_empty())
        })
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (HTTP {status})", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ApiError {}

/// Result type for portal operations.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
