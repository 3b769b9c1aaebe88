//! Error types for pco-client.
//!
//! Every failure surfaced by the dispatcher is an [`Error`]. HTTP-level
//! failures carry an [`ApiError`]: the status, status text, the JSON:API
//! `errors` array and the rate-limit snapshot observed at failure time.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::rate_limit::RateLimitSnapshot;

/// Result type alias for pco-client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for pco-client operations.
#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional source error.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Create a new error with the given kind.
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, source: None }
    }

    /// Create a new error with the given kind and source.
    pub fn with_source(
        kind: ErrorKind,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            source: Some(Box::new(source)),
        }
    }

    /// Classify this error into the retry taxonomy.
    ///
    /// Returns `None` for local failures (serialization, configuration)
    /// that never reached the network.
    pub fn failure_class(&self) -> Option<FailureClass> {
        match &self.kind {
            ErrorKind::Timeout | ErrorKind::Connection(_) => Some(FailureClass::TransientNetwork),
            ErrorKind::Api(api) => Some(FailureClass::from_status(api.status)),
            ErrorKind::Authentication(_) => Some(FailureClass::ClientFault),
            _ => None,
        }
    }

    /// Returns true if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.failure_class()
            .map(FailureClass::is_retryable)
            .unwrap_or(false)
    }

    /// Returns true if this is a rate limit error.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self.failure_class(), Some(FailureClass::RateLimited))
    }

    /// Returns true if this is an authentication error.
    pub fn is_auth_error(&self) -> bool {
        match &self.kind {
            ErrorKind::Authentication(_) => true,
            ErrorKind::Api(api) => api.status == 401,
            _ => false,
        }
    }

    /// HTTP status, if the failure came from a response.
    pub fn status(&self) -> Option<u16> {
        self.api_error().map(|api| api.status)
    }

    /// The structured API error, if any.
    pub fn api_error(&self) -> Option<&ApiError> {
        match &self.kind {
            ErrorKind::Api(api) => Some(api),
            _ => None,
        }
    }

    /// The `Retry-After` hint sent with the failing response.
    pub fn retry_after(&self) -> Option<Duration> {
        self.api_error().and_then(|api| api.retry_after)
    }
}

/// The kind of error that occurred.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    /// Non-2xx response from the API.
    #[error("API error: {0}")]
    Api(ApiError),

    /// Credentials were rejected and could not be refreshed.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Request timeout.
    #[error("Request timeout")]
    Timeout,

    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Failure taxonomy driving retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// Timeout or connection failure.
    TransientNetwork,
    /// HTTP 429.
    RateLimited,
    /// HTTP 401. Recoverable only through a credential refresh.
    AuthExpired,
    /// HTTP 5xx.
    ServerFault,
    /// Any other 4xx, including validation failures (422).
    ClientFault,
}

impl FailureClass {
    /// Classify a non-2xx HTTP status.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => FailureClass::AuthExpired,
            429 => FailureClass::RateLimited,
            500..=599 => FailureClass::ServerFault,
            _ => FailureClass::ClientFault,
        }
    }

    /// Returns true if the retry scheduler may retry this class.
    ///
    /// `AuthExpired` is not retryable here: it goes through the
    /// single refresh-and-retry path instead.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            FailureClass::TransientNetwork | FailureClass::RateLimited | FailureClass::ServerFault
        )
    }
}

/// A structured API failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    /// HTTP status code.
    pub status: u16,
    /// Canonical status text (e.g. "Unprocessable Entity").
    pub status_text: String,
    /// Error records from the response body, in order.
    pub errors: Vec<ApiErrorRecord>,
    /// Rate-limit state at the time of the failure.
    pub rate_limit: RateLimitSnapshot,
    /// `Retry-After` sent with this particular response.
    pub retry_after: Option<Duration>,
}

impl ApiError {
    /// Build from a status and raw response body.
    ///
    /// Falls back to a single record carrying the status text when the body
    /// has no JSON:API `errors` array.
    pub fn from_body(
        status: u16,
        body: &[u8],
        rate_limit: RateLimitSnapshot,
        retry_after: Option<Duration>,
    ) -> Self {
        let status_text = status_text(status);

        let mut errors = serde_json::from_slice::<ErrorEnvelope>(body)
            .map(|envelope| envelope.errors)
            .unwrap_or_default();
        for record in &mut errors {
            record.title = sanitize_error_message(&record.title);
            if let Some(serde_json::Value::String(detail)) = record.detail.as_mut() {
                *detail = sanitize_error_message(detail);
            }
        }

        if errors.is_empty() {
            errors.push(ApiErrorRecord {
                status: status.to_string(),
                title: status_text.clone(),
                detail: None,
            });
        }

        Self {
            status,
            status_text,
            errors,
            rate_limit,
            retry_after,
        }
    }

    /// First error record's title, if any.
    pub fn title(&self) -> Option<&str> {
        self.errors.first().map(|e| e.title.as_str())
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status, self.status_text)?;
        if let Some(first) = self.errors.first() {
            if first.title != self.status_text {
                write!(f, ": {}", first.title)?;
            }
            match &first.detail {
                Some(serde_json::Value::String(detail)) => write!(f, " - {}", detail)?,
                Some(serde_json::Value::Null) | None => {}
                Some(other) => write!(f, " - {}", other)?,
            }
        }
        if self.errors.len() > 1 {
            write!(f, " (+{} more)", self.errors.len() - 1)?;
        }
        Ok(())
    }
}

/// One entry of the JSON:API `errors` array.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ApiErrorRecord {
    #[serde(default, deserialize_with = "string_or_number")]
    pub status: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    errors: Vec<ApiErrorRecord>,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Canonical reason phrase for a status code.
pub(crate) fn status_text(status: u16) -> String {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown Status")
        .to_string()
}

/// Sanitize an error message to prevent exposing credentials.
///
/// Redacts bearer tokens and `access_token`/`refresh_token` parameters and
/// truncates messages longer than 500 characters.
fn sanitize_error_message(message: &str) -> String {
    const MAX_LENGTH: usize = 500;

    let mut sanitized = message.to_string();

    if let Ok(bearer) = regex_lite::Regex::new(r"(?i)bearer\s+[A-Za-z0-9\-._~+/]+=*") {
        sanitized = bearer
            .replace_all(&sanitized, "Bearer [REDACTED]")
            .to_string();
    }

    if let Ok(param) = regex_lite::Regex::new(r"(access_token|refresh_token)=[^&\s]+") {
        sanitized = param.replace_all(&sanitized, "$1=[REDACTED]").to_string();
    }

    if sanitized.len() > MAX_LENGTH {
        let mut cut = MAX_LENGTH;
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized.truncate(cut);
        sanitized.push_str("...[truncated]");
    }

    sanitized
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ErrorKind::Timeout
        } else if err.is_connect() {
            ErrorKind::Connection(err.to_string())
        } else if err.is_request() || err.is_body() {
            ErrorKind::Connection(err.to_string())
        } else {
            ErrorKind::Other(err.to_string())
        };

        Error::with_source(kind, err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::with_source(ErrorKind::Json(err.to_string()), err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::with_source(ErrorKind::InvalidUrl(err.to_string()), err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16) -> Error {
        Error::new(ErrorKind::Api(ApiError::from_body(
            status,
            b"",
            RateLimitSnapshot::default(),
            None,
        )))
    }

    #[test]
    fn test_failure_classes() {
        assert_eq!(FailureClass::from_status(429), FailureClass::RateLimited);
        assert_eq!(FailureClass::from_status(401), FailureClass::AuthExpired);
        assert_eq!(FailureClass::from_status(500), FailureClass::ServerFault);
        assert_eq!(FailureClass::from_status(503), FailureClass::ServerFault);
        assert_eq!(FailureClass::from_status(422), FailureClass::ClientFault);
        assert_eq!(FailureClass::from_status(404), FailureClass::ClientFault);
    }

    #[test]
    fn test_error_is_retryable() {
        assert!(Error::new(ErrorKind::Timeout).is_retryable());
        assert!(Error::new(ErrorKind::Connection("refused".into())).is_retryable());
        assert!(api(429).is_retryable());
        assert!(api(502).is_retryable());

        for status in [400, 401, 403, 404, 409, 422] {
            assert!(!api(status).is_retryable(), "HTTP {status} should NOT be retryable");
        }
        assert!(!Error::new(ErrorKind::Json("eof".into())).is_retryable());
        assert!(!Error::new(ErrorKind::Authentication("refresh failed".into())).is_retryable());
    }

    #[test]
    fn test_error_is_auth_error() {
        assert!(api(401).is_auth_error());
        assert!(Error::new(ErrorKind::Authentication("expired".into())).is_auth_error());
        assert!(!api(403).is_auth_error());
    }

    #[test]
    fn test_api_error_from_json_api_body() {
        let body = br#"{"errors":[
            {"status":"422","title":"Unprocessable Entity","detail":"first_name can't be blank"},
            {"status":"422","title":"Unprocessable Entity","detail":{"source":"last_name"}}
        ]}"#;
        let err = ApiError::from_body(422, body, RateLimitSnapshot::default(), None);

        assert_eq!(err.status, 422);
        assert_eq!(err.status_text, "Unprocessable Entity");
        assert_eq!(err.errors.len(), 2);
        assert_eq!(err.errors[0].status, "422");
        assert_eq!(
            err.errors[0].detail,
            Some(serde_json::json!("first_name can't be blank"))
        );
        assert_eq!(
            err.errors[1].detail,
            Some(serde_json::json!({"source": "last_name"}))
        );
        assert!(err.to_string().contains("first_name can't be blank"));
        assert!(err.to_string().contains("(+1 more)"));
    }

    #[test]
    fn test_api_error_numeric_status_in_body() {
        let body = br#"{"errors":[{"status":404,"title":"Not Found"}]}"#;
        let err = ApiError::from_body(404, body, RateLimitSnapshot::default(), None);
        assert_eq!(err.errors[0].status, "404");
    }

    #[test]
    fn test_api_error_falls_back_to_status_text() {
        let err =
            ApiError::from_body(503, b"<html>down</html>", RateLimitSnapshot::default(), None);
        assert_eq!(err.errors.len(), 1);
        assert_eq!(err.errors[0].status, "503");
        assert_eq!(err.errors[0].title, "Service Unavailable");
        assert_eq!(err.to_string(), "503 Service Unavailable");

        let err = ApiError::from_body(400, br#"{"errors":[]}"#, RateLimitSnapshot::default(), None);
        assert_eq!(err.errors[0].title, "Bad Request");
    }

    #[test]
    fn test_api_error_keeps_snapshot_and_retry_after() {
        let snapshot = RateLimitSnapshot {
            count: Some(100),
            limit: Some(100),
            ..Default::default()
        };
        let err = Error::new(ErrorKind::Api(ApiError::from_body(
            429,
            b"",
            snapshot.clone(),
            Some(Duration::from_secs(2)),
        )));

        assert!(err.is_rate_limited());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
        assert_eq!(err.api_error().map(|a| &a.rate_limit), Some(&snapshot));
    }

    #[test]
    fn test_sanitize_redacts_tokens() {
        let msg = "token rejected: Bearer abc123.def-456 was invalid";
        let sanitized = sanitize_error_message(msg);
        assert!(sanitized.contains("Bearer [REDACTED]"));
        assert!(!sanitized.contains("abc123"));

        let msg = "bad grant refresh_token=xyz789&client_id=1";
        let sanitized = sanitize_error_message(msg);
        assert!(sanitized.contains("refresh_token=[REDACTED]"));
        assert!(!sanitized.contains("xyz789"));
    }

    #[test]
    fn test_sanitize_truncates_long_messages() {
        let sanitized = sanitize_error_message(&"x".repeat(600));
        assert!(sanitized.ends_with("...[truncated]"));
        assert!(sanitized.len() < 600);
    }

    #[test]
    fn test_error_kind_display_messages() {
        let cases: Vec<(ErrorKind, &str)> = vec![
            (
                ErrorKind::Authentication("refresh failed".into()),
                "Authentication error: refresh failed",
            ),
            (ErrorKind::Timeout, "Request timeout"),
            (ErrorKind::Connection("refused".into()), "Connection error: refused"),
            (ErrorKind::Json("unexpected EOF".into()), "JSON error: unexpected EOF"),
            (ErrorKind::InvalidUrl("no scheme".into()), "Invalid URL: no scheme"),
            (ErrorKind::Config("missing token".into()), "Configuration error: missing token"),
            (ErrorKind::Other("something else".into()), "something else"),
        ];

        for (kind, expected) in cases {
            let display = kind.to_string();
            assert!(display.contains(expected), "Expected '{display}' to contain '{expected}'");
        }
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<String>("not valid json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err.kind, ErrorKind::Json(_)));
        assert!(err.source.is_some());
        assert_eq!(err.failure_class(), None);
    }
}
