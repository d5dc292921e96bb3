//! Single catch point for unhandled failures.
//!
//! Handlers and inner middleware turn unhandled failures into a 500 carrying
//! an [`UnhandledError`] extension (see `AppError::into_response`); panics are
//! converted the same way by [`panic_response`] behind `CatchPanicLayer`.
//! The boundary reports each one exactly once and renders it: a structured
//! breakdown in development, a fixed generic body otherwise.

use crate::error::UnhandledError;
use crate::middleware::tracing::RequestContext;
use crate::observability::{ErrorEvent, ErrorReporter};
use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderName, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Clone)]
pub struct ErrorBoundary {
    expose_details: bool,
    reporter: Arc<dyn ErrorReporter>,
}

impl ErrorBoundary {
    pub fn new(expose_details: bool, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self {
            expose_details,
            reporter,
        }
    }

    fn render(&self, status: StatusCode, event: &ErrorEvent) -> Response {
        if !self.expose_details {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(UnhandledError::generic_body()),
            )
                .into_response();
        }

        (
            status,
            Json(serde_json::json!({
                "error": {
                    "name": event.error.name,
                    "message": event.error.message,
                    "status": status.as_u16(),
                    "causes": event.error.causes,
                },
                "request": {
                    "id": event.request.request_id,
                    "method": event.request.method,
                    "url": event.request.uri,
                },
                "event_id": event.event_id,
            })),
        )
            .into_response()
    }
}

pub async fn error_boundary_middleware(
    State(boundary): State<ErrorBoundary>,
    request: Request,
    next: Next,
) -> Response {
    let context = request
        .extensions()
        .get::<RequestContext>()
        .cloned()
        .unwrap_or_else(|| RequestContext::from_request(&request));

    let response = next.run(request).await;
    let Some(error) = response.extensions().get::<UnhandledError>().cloned() else {
        return response;
    };

    metrics::counter!("errors_reported_total", "name" => error.name.clone()).increment(1);
    let event = ErrorEvent::new(error, context);
    boundary.reporter.report(&event).await;

    let (parts, _) = response.into_parts();
    let mut rendered = boundary.render(parts.status, &event);

    // Keep headers set further in (CORS, rate limit) so clients can read the error.
    // Every value of a multi-valued header such as Vary or Set-Cookie is kept.
    let own: HashSet<HeaderName> = rendered.headers().keys().cloned().collect();
    for (name, value) in parts.headers.iter() {
        if name != header::CONTENT_LENGTH && !own.contains(name) {
            rendered.headers_mut().append(name.clone(), value.clone());
        }
    }

    rendered
}

/// Response factory for `tower_http::catch_panic::CatchPanicLayer::custom`.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let error = UnhandledError::from_panic(payload.as_ref());
    tracing::error!(message = %error.message, "Request handler panicked");
    error.into_response()
}
