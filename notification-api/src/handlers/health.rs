use crate::services::get_metrics;
use crate::startup::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use service_core::error::AppError;

fn check(result: &Result<(), AppError>) -> Value {
    match result {
        Ok(()) => json!({ "status": "ok" }),
        Err(e) => json!({ "status": "unhealthy", "error": e.to_string() }),
    }
}

/// Liveness with a per-store breakdown.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let (postgres, mongodb, redis) = tokio::join!(
        state.users.health_check(),
        state.notifications.health_check(),
        state.rate_limit_store.health_check(),
    );
    let healthy = postgres.is_ok() && mongodb.is_ok() && redis.is_ok();

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if healthy { "ok" } else { "unhealthy" },
            "service": state.config.service_name,
            "version": env!("CARGO_PKG_VERSION"),
            "checks": {
                "postgres": check(&postgres),
                "mongodb": check(&mongodb),
                "redis": check(&redis),
            },
        })),
    )
}

/// Readiness check: both data stores must answer.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let (postgres, mongodb) = tokio::join!(
        state.users.health_check(),
        state.notifications.health_check(),
    );
    match (postgres, mongodb) {
        (Ok(()), Ok(())) => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub async fn metrics_endpoint() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}
