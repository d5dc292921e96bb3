//! Forwarding of unhandled errors to an external error tracker.
//!
//! The error boundary hands every unhandled failure to an [`ErrorReporter`].
//! [`SentryReporter`] hands them to the Sentry SDK, [`LogReporter`] only
//! logs, and [`RecordingReporter`] keeps events in memory for tests.

use crate::error::{AppError, UnhandledError};
use crate::middleware::tracing::RequestContext;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentry::protocol::{Event, Exception, Level};
use sentry::types::Dsn;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::SystemTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEvent {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub error: UnhandledError,
    pub request: RequestContext,
}

impl ErrorEvent {
    pub fn new(error: UnhandledError, request: RequestContext) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            error,
            request,
        }
    }
}

#[async_trait]
pub trait ErrorReporter: Send + Sync {
    /// Report an event. Delivery failures are logged, never returned.
    async fn report(&self, event: &ErrorEvent);
}

fn log_event(event: &ErrorEvent) {
    tracing::error!(
        event_id = %event.event_id,
        request_id = %event.request.request_id,
        method = %event.request.method,
        uri = %event.request.uri,
        error.name = %event.error.name,
        error.message = %event.error.message,
        error.causes = ?event.error.causes,
        "Unhandled error reported"
    );
}

/// Reporter used when no DSN is configured.
#[derive(Debug, Default, Clone)]
pub struct LogReporter;

#[async_trait]
impl ErrorReporter for LogReporter {
    async fn report(&self, event: &ErrorEvent) {
        log_event(event);
    }
}

/// Install the process-wide Sentry client.
///
/// The returned guard flushes pending events on drop and must outlive the
/// server.
pub fn init_sentry(
    dsn: &str,
    environment: &str,
    release: &str,
) -> Result<sentry::ClientInitGuard, AppError> {
    let dsn: Dsn = dsn
        .parse()
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid SENTRY_DSN: {}", e)))?;

    Ok(sentry::init(sentry::ClientOptions {
        dsn: Some(dsn),
        environment: Some(environment.to_string().into()),
        release: Some(release.to_string().into()),
        ..Default::default()
    }))
}

/// Sends events through the Sentry hub bound to the current request.
///
/// Request details come from `sentry_tower::SentryHttpLayer`; the event
/// carries the boundary's error record and request id.
#[derive(Debug, Default, Clone)]
pub struct SentryReporter;

impl SentryReporter {
    fn to_sentry_event(event: &ErrorEvent) -> Event<'static> {
        let mut tags = BTreeMap::new();
        tags.insert("request_id".to_string(), event.request.request_id.clone());

        let mut extra = BTreeMap::new();
        extra.insert("causes".to_string(), serde_json::json!(event.error.causes));
        extra.insert("method".to_string(), serde_json::json!(event.request.method));
        extra.insert("uri".to_string(), serde_json::json!(event.request.uri));
        if let Some(ip) = event.request.client_ip {
            extra.insert("client_ip".to_string(), serde_json::json!(ip));
        }

        Event {
            event_id: event.event_id,
            timestamp: SystemTime::from(event.timestamp),
            level: Level::Error,
            logger: Some("error_boundary".to_string()),
            message: Some(event.error.message.clone()),
            exception: vec![Exception {
                ty: event.error.name.clone(),
                value: Some(event.error.message.clone()),
                ..Default::default()
            }]
            .into(),
            tags,
            extra,
            ..Default::default()
        }
    }
}

#[async_trait]
impl ErrorReporter for SentryReporter {
    async fn report(&self, event: &ErrorEvent) {
        log_event(event);

        let event_id = sentry::Hub::current().capture_event(Self::to_sentry_event(event));
        tracing::debug!(event_id = %event_id, "Error event captured");
    }
}

/// Keeps reported events in memory.
#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<ErrorEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ErrorEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ErrorReporter for RecordingReporter {
    async fn report(&self, event: &ErrorEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
