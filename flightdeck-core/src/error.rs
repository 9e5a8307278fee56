//! Error types for Flightdeck API operations

use thiserror::Error;

/// Substrings that identify a transport-level failure in an error message.
const NETWORK_MARKERS: &[&str] = &[
    "network",
    "failed to fetch",
    "connection",
    "timed out",
    "dns error",
];

/// Error raised by the API client and stored in failed cache entries.
///
/// Cloneable so the same failure can be handed to every caller awaiting a
/// coalesced fetch and kept in the cache entry at the same time.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Failed to decode response: {message}")]
    Decode { message: String },

    #[error("Request cancelled")]
    Cancelled,
}

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Classification driving which message the user sees and who handles it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 401 - handled globally (session expiry).
    Unauthorized,
    /// 403 - handled globally.
    Forbidden,
    /// 404
    NotFound,
    /// 400 / 422
    Validation,
    /// 503
    ServiceUnavailable,
    /// 500 / 502
    Server,
    Network,
    Cancelled,
    Other,
}

impl ApiError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// HTTP status code, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Human-readable message without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            ApiError::Http { message, .. }
            | ApiError::Network { message }
            | ApiError::Decode { message } => message,
            ApiError::Cancelled => "Request cancelled",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ApiError::Cancelled)
    }

    /// True for transport failures and for any message carrying a
    /// recognizable network-failure marker.
    pub fn is_network_failure(&self) -> bool {
        match self {
            ApiError::Network { .. } => true,
            ApiError::Cancelled => false,
            other => {
                let message = other.message().to_ascii_lowercase();
                NETWORK_MARKERS.iter().any(|marker| message.contains(marker))
            }
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Cancelled => ErrorKind::Cancelled,
            ApiError::Network { .. } => ErrorKind::Network,
            ApiError::Http { status, .. } => match status {
                401 => ErrorKind::Unauthorized,
                403 => ErrorKind::Forbidden,
                404 => ErrorKind::NotFound,
                400 | 422 => ErrorKind::Validation,
                503 => ErrorKind::ServiceUnavailable,
                500 | 502 => ErrorKind::Server,
                _ if self.is_network_failure() => ErrorKind::Network,
                _ => ErrorKind::Other,
            },
            ApiError::Decode { .. } if self.is_network_failure() => ErrorKind::Network,
            ApiError::Decode { .. } => ErrorKind::Other,
        }
    }

    /// Auth failures are owned by the global error observer.
    pub fn is_auth(&self) -> bool {
        matches!(self.kind(), ErrorKind::Unauthorized | ErrorKind::Forbidden)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_http_error_display() {
        let err = ApiError::http(404, "Alert not found");
        let msg = format!("{}", err);
        assert!(msg.contains("404"));
        assert!(msg.contains("Alert not found"));
        assert_eq!(err.message(), "Alert not found");
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn test_kind_by_status() {
        assert_eq!(ApiError::http(401, "x").kind(), ErrorKind::Unauthorized);
        assert_eq!(ApiError::http(403, "x").kind(), ErrorKind::Forbidden);
        assert_eq!(ApiError::http(404, "x").kind(), ErrorKind::NotFound);
        assert_eq!(ApiError::http(400, "x").kind(), ErrorKind::Validation);
        assert_eq!(ApiError::http(422, "x").kind(), ErrorKind::Validation);
        assert_eq!(ApiError::http(503, "x").kind(), ErrorKind::ServiceUnavailable);
        assert_eq!(ApiError::http(500, "x").kind(), ErrorKind::Server);
        assert_eq!(ApiError::http(502, "x").kind(), ErrorKind::Server);
        assert_eq!(ApiError::http(418, "x").kind(), ErrorKind::Other);
    }

    #[test]
    fn test_network_marker_in_message() {
        let err = ApiError::http(0, "Network Error");
        assert_eq!(err.kind(), ErrorKind::Network);
        let err = ApiError::decode("connection reset by peer");
        assert_eq!(err.kind(), ErrorKind::Network);
        assert_eq!(ApiError::network("boom").kind(), ErrorKind::Network);
    }

    #[test]
    fn test_cancelled_is_not_network() {
        assert!(!ApiError::Cancelled.is_network_failure());
        assert_eq!(ApiError::Cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_auth_kinds() {
        assert!(ApiError::http(401, "").is_auth());
        assert!(ApiError::http(403, "").is_auth());
        assert!(!ApiError::http(404, "").is_auth());
    }

    proptest! {
        #[test]
        fn status_always_reported(status in 100u16..600, message in "[a-z ]{0,20}") {
            let err = ApiError::http(status, message.clone());
            prop_assert_eq!(err.status(), Some(status));
            prop_assert_eq!(err.message(), message.as_str());
        }
    }
}
