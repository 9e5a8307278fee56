//! User-facing messages for failed and successful operations.

use crate::notifications::Toast;
use flightdeck_core::{ApiError, ErrorKind};
use std::fmt;

pub const SESSION_EXPIRED: &str = "Session expired";
pub const ACCESS_DENIED: &str = "Access denied";
pub const SERVER_ERROR: &str = "Server error";
pub const CONNECTION_ERROR: &str = "Connection error";
pub const GENERIC_ERROR: &str = "Something went wrong";

/// Resource a write operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Alert,
    Analysis,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Alert => f.write_str("Alert"),
            Resource::Analysis => f.write_str("Analysis"),
        }
    }
}

impl Resource {
    fn lowercase(&self) -> &'static str {
        match self {
            Resource::Alert => "alert",
            Resource::Analysis => "analysis",
        }
    }
}

pub fn session_expired() -> Toast {
    Toast::destructive(SESSION_EXPIRED).with_description("Please log in again.")
}

pub fn access_denied() -> Toast {
    Toast::destructive(ACCESS_DENIED)
        .with_description("You do not have permission to perform this action.")
}

pub fn server_error() -> Toast {
    Toast::destructive(SERVER_ERROR)
        .with_description("The server encountered an error. Please try again later.")
}

pub fn connection_error() -> Toast {
    Toast::destructive(CONNECTION_ERROR)
        .with_description("Unable to reach the server. Please check your connection.")
}

fn message_or_default(error: &ApiError, fallback: &str) -> String {
    let message = error.message().trim();
    if message.is_empty() {
        fallback.to_string()
    } else {
        message.to_string()
    }
}

/// Toast for a failed read, as shown by the global error observer.
///
/// Auth failures are handled separately and 404s are left to the view.
pub fn query_failure(error: &ApiError) -> Option<Toast> {
    match error.kind() {
        ErrorKind::Cancelled
        | ErrorKind::NotFound
        | ErrorKind::Unauthorized
        | ErrorKind::Forbidden => None,
        ErrorKind::Server | ErrorKind::ServiceUnavailable => Some(server_error()),
        ErrorKind::Network => Some(connection_error()),
        ErrorKind::Validation | ErrorKind::Other => {
            Some(Toast::destructive(message_or_default(error, GENERIC_ERROR)))
        }
    }
}

/// Toast for a failed write, shown by the write operation itself.
///
/// Returns `None` for auth failures (the global observer owns those) and
/// for cancellations.
pub fn mutation_failure(resource: Resource, error: &ApiError, fallback: &str) -> Option<Toast> {
    let title = match error.kind() {
        ErrorKind::Cancelled | ErrorKind::Unauthorized | ErrorKind::Forbidden => return None,
        ErrorKind::NotFound => format!("{} not found", resource),
        ErrorKind::Validation => format!("Invalid {} data", resource.lowercase()),
        ErrorKind::ServiceUnavailable => format!("{} service not ready", resource),
        ErrorKind::Network => return Some(connection_error()),
        ErrorKind::Server | ErrorKind::Other => message_or_default(error, fallback),
    };
    Some(Toast::destructive(title))
}
