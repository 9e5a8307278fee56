//! Flightdeck client library exports.
//!
//! Client-side synchronization between the fleet telemetry backend and its
//! consumers: read hooks over a shared query cache, optimistic and plain
//! write operations, and a global observer for failed requests.

pub mod api_client;
pub mod app;
pub mod config;
pub mod error;
pub mod error_observer;
pub mod messages;
pub mod mutations;
pub mod nav;
pub mod notifications;
pub mod persistence;
pub mod queries;
pub mod telemetry;
