//! Flightdeck Core - Domain Types
//!
//! Alert and analysis records as the fleet backend returns them, the typed
//! API error every other crate propagates, and the identity newtypes.
//! This crate contains ONLY data types - no I/O.

pub mod alert;
pub mod analysis;
pub mod error;
pub mod identity;

pub use alert::{mark_alert, Alert, AlertSeverity, AlertStats, AlertStatus, AlertStatusParseError};
pub use analysis::{Analysis, AnalysisStatus, CreateAnalysisRequest};
pub use error::{ApiError, ApiResult, ErrorKind};
pub use identity::{AlertId, AnalysisId, Timestamp};
