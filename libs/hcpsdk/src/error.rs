use std::time::Duration;
use thiserror::Error;

use crate::ips::IpsError;

/// Classification of URL validation failures.
///
/// Provides programmatic matching for different failure modes without
/// relying on unstable error message strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    /// URL could not be parsed (malformed syntax)
    ParseError,
    /// URL is missing required host/authority component
    MissingAuthority,
    /// URL is missing required scheme (http/https)
    MissingScheme,
}

/// Errors surfaced by the HCP client.
///
/// Transport-level failures (`Transport`, `Timeout`, `Tls`) are kept apart from
/// failures reported by HCP itself (`HttpStatus`, `Authentication`). HCP puts a
/// human readable reason into the `X-HCP-ErrorMessage` response header; it is
/// carried as `hcp_error_message` when present.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HcpError {
    /// Request building failed
    #[error("Failed to build request: {0}")]
    RequestBuild(#[from] http::Error),

    /// Invalid header name
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// Invalid header value
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Single request attempt timed out
    #[error("Request attempt timed out after {0:?}")]
    Timeout(Duration),

    /// Total operation deadline exceeded (including all retries)
    #[error("Operation deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    /// Transport error (network, connection refused, reset, ...)
    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// TLS setup error
    #[error("TLS error: {0}")]
    Tls(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Name resolution of the target failed
    #[error("Resolving target failed: {0}")]
    Resolve(#[from] IpsError),

    /// Response body exceeded size limit
    #[error("Response body too large: limit {limit} bytes, got {actual} bytes")]
    BodyTooLarge { limit: usize, actual: usize },

    /// HCP rejected the credentials (401) or the operation (403)
    #[error("HTTP {status}: authentication failed{}", fmt_reason(.hcp_error_message.as_deref()))]
    Authentication {
        status: http::StatusCode,
        hcp_error_message: Option<String>,
    },

    /// HTTP non-2xx status
    #[error("HTTP {status}{}", fmt_reason(.hcp_error_message.as_deref()))]
    HttpStatus {
        status: http::StatusCode,
        /// Content of the `X-HCP-ErrorMessage` header, if any
        hcp_error_message: Option<String>,
        body_preview: String,
        /// Parsed `Retry-After` header value, if present and valid
        retry_after: Option<Duration>,
    },

    /// JSON parsing error
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// XML parsing error
    #[error("XML parsing failed: {0}")]
    Xml(String),

    /// Local I/O error (writing a download, reading a CA bundle)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid object name handed to the path builder
    #[error("Invalid object name '{0}'")]
    InvalidObjectName(String),

    /// MAPI refused to start a log preparation because one is already running
    #[error("Log preparation already in progress{}", fmt_reason(.0.as_deref()))]
    LogsInProgress(Option<String>),

    /// Log preparation asked for a range that ends before it starts
    #[error("Invalid log date range: start {start} is after end {end}")]
    InvalidDateRange {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    /// Log download requested before HCP finished preparing the logs
    #[error("Logs are not ready for streaming")]
    LogsNotReady,

    /// Service overloaded (concurrency limit reached, fail-fast)
    #[error("Service overloaded: concurrency limit reached")]
    Overloaded,

    /// Internal service failure (buffer worker died, channel closed)
    #[error("Service unavailable: internal failure")]
    ServiceClosed,

    /// Invalid URL (failed to parse)
    ///
    /// Use the `kind` field for programmatic matching. The `reason` field contains
    /// a diagnostic message intended for logging only.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUri {
        url: String,
        kind: InvalidUriKind,
        reason: String,
    },

    /// Invalid URL scheme for transport security configuration
    #[error("URL scheme '{scheme}' not allowed: {reason}")]
    InvalidScheme { scheme: String, reason: String },
}

fn fmt_reason(reason: Option<&str>) -> String {
    reason.map(|r| format!(" - {r}")).unwrap_or_default()
}

impl HcpError {
    /// HTTP status reported by HCP, if this error came from a response
    #[must_use]
    pub fn status(&self) -> Option<http::StatusCode> {
        match self {
            HcpError::HttpStatus { status, .. } | HcpError::Authentication { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// Returns true for a 404 response
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(http::StatusCode::NOT_FOUND)
    }
}

impl From<hyper::Error> for HcpError {
    fn from(err: hyper::Error) -> Self {
        HcpError::Transport(Box::new(err))
    }
}

impl From<hyper_util::client::legacy::Error> for HcpError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        HcpError::Transport(Box::new(err))
    }
}

impl From<quick_xml::Error> for HcpError {
    fn from(err: quick_xml::Error) -> Self {
        HcpError::Xml(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for HcpError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        HcpError::Xml(err.to_string())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::error::Error;
    use std::fmt;

    #[derive(Debug)]
    struct TestError(&'static str);

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl Error for TestError {}

    #[test]
    fn test_transport_error_preserves_source() {
        let err = HcpError::Transport(Box::new(TestError("connection refused")));

        let source = err.source().unwrap();
        let downcast = source.downcast_ref::<TestError>().unwrap();
        assert_eq!(downcast.0, "connection refused");
    }

    #[test]
    fn test_status_error_display_includes_hcp_message() {
        let err = HcpError::HttpStatus {
            status: http::StatusCode::CONFLICT,
            hcp_error_message: Some("Object already exists".to_owned()),
            body_preview: String::new(),
            retry_after: None,
        };
        assert_eq!(err.to_string(), "HTTP 409 Conflict - Object already exists");
        assert_eq!(err.status(), Some(http::StatusCode::CONFLICT));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_authentication_error_display_without_message() {
        let err = HcpError::Authentication {
            status: http::StatusCode::FORBIDDEN,
            hcp_error_message: None,
        };
        assert_eq!(err.to_string(), "HTTP 403 Forbidden: authentication failed");
    }

    #[test]
    fn test_is_not_found() {
        let err = HcpError::HttpStatus {
            status: http::StatusCode::NOT_FOUND,
            hcp_error_message: None,
            body_preview: String::new(),
            retry_after: None,
        };
        assert!(err.is_not_found());
        assert!(!HcpError::Overloaded.is_not_found());
    }
}
