//! Origin allow-list enforcement.
//!
//! `tower_http`'s `CorsLayer` only decides which CORS headers to send; it
//! still lets requests from unknown origins reach the handlers. The guard
//! here denies them outright, and [`CorsPolicy::layer`] supplies the regular
//! CORS headers and preflight answers for the origins that pass.

use crate::error::AppError;
use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderName, HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};

pub const CORS_REJECTION_MESSAGE: &str = "Not allowed by CORS";

#[derive(Debug, Clone)]
pub struct CorsPolicy {
    allowed_origins: Arc<Vec<HeaderValue>>,
    allowed_headers: Arc<Vec<HeaderName>>,
}

impl CorsPolicy {
    pub fn new<I, S>(origins: I) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed_origins = origins
            .into_iter()
            .map(|origin| {
                origin.as_ref().parse::<HeaderValue>().map_err(|e| {
                    AppError::ConfigError(anyhow::anyhow!(
                        "Invalid CORS origin '{}': {}",
                        origin.as_ref(),
                        e
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            allowed_origins: Arc::new(allowed_origins),
            allowed_headers: Arc::new(vec![header::AUTHORIZATION, header::CONTENT_TYPE]),
        })
    }

    /// Extra request headers browsers may send on cross-origin calls.
    pub fn with_allowed_header(mut self, name: HeaderName) -> Self {
        Arc::make_mut(&mut self.allowed_headers).push(name);
        self
    }

    pub fn allows(&self, origin: Option<&HeaderValue>) -> bool {
        origin.is_some_and(|origin| self.allowed_origins.contains(origin))
    }

    pub fn layer(&self) -> CorsLayer {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(self.allowed_origins.iter().cloned()))
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers(AllowHeaders::list(self.allowed_headers.iter().cloned()))
    }
}

/// Deny requests whose `Origin` header is absent or not on the allow-list.
pub async fn cors_guard_middleware(
    State(policy): State<CorsPolicy>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request.headers().get(header::ORIGIN).cloned();
    tracing::debug!(origin = ?origin, "Checking request origin");

    if policy.allows(origin.as_ref()) {
        return next.run(request).await;
    }

    tracing::warn!(
        origin = ?origin,
        method = %request.method(),
        uri = %request.uri(),
        "Request rejected by CORS policy"
    );
    metrics::counter!("cors_rejections_total").increment(1);

    (
        StatusCode::FORBIDDEN,
        Json(serde_json::json!({ "error": CORS_REJECTION_MESSAGE })),
    )
        .into_response()
}
