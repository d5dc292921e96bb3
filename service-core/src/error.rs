use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::any::Any;
use thiserror::Error;

pub const GENERIC_ERROR_MESSAGE: &str = "Internal Server Error";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(anyhow::Error),

    #[error("Too many requests: {0}")]
    TooManyRequests(String, Option<u64>),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        AppError::DatabaseError(anyhow::Error::new(err))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(anyhow::Error::new(err))
    }
}

/// Failure that escaped every handler.
///
/// Attached to the response extensions of 5xx responses so the error
/// boundary can report it and decide how much of it to render.
#[derive(Debug, Clone, Serialize)]
pub struct UnhandledError {
    pub name: String,
    pub message: String,
    pub causes: Vec<String>,
}

impl UnhandledError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            causes: Vec::new(),
        }
    }

    fn from_anyhow(name: &str, err: &anyhow::Error) -> Self {
        Self {
            name: name.to_string(),
            message: err.to_string(),
            causes: err.chain().skip(1).map(|cause| cause.to_string()).collect(),
        }
    }

    /// Build from a caught panic payload.
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else {
            "handler panicked".to_string()
        };
        Self::new("Panic", message)
    }

    /// The body every non-development client sees.
    pub fn generic_body() -> serde_json::Value {
        serde_json::json!({ "error": GENERIC_ERROR_MESSAGE })
    }

    /// Plain 500 carrying `self` for the error boundary.
    pub fn into_response(self) -> Response {
        let mut res = (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(Self::generic_body()),
        )
            .into_response();
        res.extensions_mut().insert(self);
        res
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::TooManyRequests(..) => StatusCode::TOO_MANY_REQUESTS,
            AppError::InternalError(_)
            | AppError::DatabaseError(_)
            | AppError::RedisError(_)
            | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Unhandled failures are the ones the boundary reports.
    pub fn unhandled(&self) -> Option<UnhandledError> {
        match self {
            AppError::InternalError(err) => Some(UnhandledError::from_anyhow("InternalError", err)),
            AppError::DatabaseError(err) => Some(UnhandledError::from_anyhow("DatabaseError", err)),
            AppError::ConfigError(err) => Some(UnhandledError::from_anyhow("ConfigError", err)),
            AppError::RedisError(err) => Some(UnhandledError::new("RedisError", err.to_string())),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            details: Option<String>,
        }

        if let Some(unhandled) = self.unhandled() {
            tracing::error!(
                error.name = %unhandled.name,
                error.message = %unhandled.message,
                "Unhandled error"
            );
            return unhandled.into_response();
        }

        let status = self.status();
        let (error_message, details, retry_after) = match self {
            AppError::ValidationError(err) => {
                ("Validation error".to_string(), Some(err.to_string()), None)
            }
            AppError::BadRequest(err) | AppError::NotFound(err) | AppError::Unauthorized(err) => {
                (err.to_string(), None, None)
            }
            AppError::TooManyRequests(msg, retry) => (msg, None, retry),
            // Unhandled variants returned above.
            other => (other.to_string(), None, None),
        };

        let mut res = (
            status,
            Json(ErrorResponse {
                error: error_message,
                details,
            }),
        )
            .into_response();

        if let Some(retry) = retry_after {
            res.headers_mut()
                .insert(axum::http::header::RETRY_AFTER, retry.into());
        }

        res
    }
}
