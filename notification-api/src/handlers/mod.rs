//! HTTP handlers for notification-api.

pub mod health;
pub mod notifications;

pub use health::{health_check, metrics_endpoint, readiness_check};
