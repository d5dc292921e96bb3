use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Id of the signed-in user.
///
/// Authentication happens upstream; the gateway forwards the resolved id in
/// `X-User-ID`. A missing or non-numeric value is rejected with 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub i32);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing X-User-ID header")))?;

        let user_id = raw.trim().parse::<i32>().map_err(|_| {
            AppError::Unauthorized(anyhow::anyhow!("Invalid X-User-ID header"))
        })?;

        tracing::Span::current().record("user_id", user_id);

        Ok(AuthenticatedUser(user_id))
    }
}
