use axum::extract::ConnectInfo;
use axum::http::HeaderValue;
use axum::{extract::Request, middleware::Next, response::Response};
use serde::Serialize;
use std::net::{IpAddr, SocketAddr};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-request facts kept for error reporting.
#[derive(Debug, Clone, Serialize)]
pub struct RequestContext {
    pub request_id: String,
    pub method: String,
    pub uri: String,
    pub client_ip: Option<IpAddr>,
}

impl RequestContext {
    pub fn from_request(req: &Request) -> Self {
        let request_id = req
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_string())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self {
            request_id,
            method: req.method().to_string(),
            uri: req.uri().to_string(),
            client_ip: req
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip()),
        }
    }
}

/// Error-capture entry: assigns the request id and records the request
/// context before anything else can fail.
pub async fn request_context_middleware(mut req: Request, next: Next) -> Response {
    let context = RequestContext::from_request(&req);

    if let Ok(header_value) = HeaderValue::from_str(&context.request_id) {
        req.headers_mut().insert(REQUEST_ID_HEADER, header_value);
    }
    let request_id = context.request_id.clone();
    req.extensions_mut().insert(context);

    let mut response = next.run(req).await;

    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(REQUEST_ID_HEADER, header_value);
    }

    response
}
