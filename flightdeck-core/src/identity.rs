//! Identity types for Flightdeck records.
//!
//! Identifiers are assigned by the backend. The client only ever echoes them
//! back, so they are opaque string newtypes rather than parsed UUIDs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Empty identifiers never address a real record.
            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Server-assigned alert identifier.
    AlertId
);

string_id!(
    /// Server-assigned flight analysis identifier.
    AnalysisId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_serializes_as_plain_string() {
        let id = AlertId::new("a1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"a1\"");
        let back: AlertId = serde_json::from_str("\"a1\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_blank_id_is_empty() {
        assert!(AnalysisId::new("").is_empty());
        assert!(AnalysisId::new("   ").is_empty());
        assert!(!AnalysisId::new("an-7").is_empty());
    }
}
