use crate::middleware::AuthenticatedUser;
use crate::models::NotificationResponse;
use crate::services::{record_notification_acknowledged, record_notifications_listed};
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use mongodb::bson::oid::ObjectId;
use serde::Serialize;
use service_core::error::AppError;

/// Most notifications returned by a single listing.
pub const LIST_LIMIT: i64 = 20;

#[derive(Debug, Serialize)]
pub struct NotificationListResponse {
    pub notifications: Vec<NotificationResponse>,
}

#[derive(Debug, Serialize)]
pub struct NotificationEnvelope {
    pub notification: NotificationResponse,
}

/// GET /notifications
#[tracing::instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<Json<NotificationListResponse>, AppError> {
    // Only providers have a notification inbox
    if state.users.find_provider(user_id).await?.is_none() {
        tracing::info!(user_id, "Notification listing refused for non-provider");
        return Err(AppError::BadRequest(anyhow::anyhow!("User is not a provider")));
    }

    let notifications = state
        .notifications
        .list_for_user(user_id, LIST_LIMIT)
        .await?;
    record_notifications_listed(notifications.len());

    Ok(Json(NotificationListResponse {
        notifications: notifications.into_iter().map(Into::into).collect(),
    }))
}

/// PUT /notifications/:id
///
/// Any signed-in user may acknowledge; ownership is not checked.
#[tracing::instrument(skip(state))]
pub async fn update(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<Json<NotificationEnvelope>, AppError> {
    let object_id = ObjectId::parse_str(&id)
        .map_err(|_| AppError::BadRequest(anyhow::anyhow!("Invalid notification id")))?;

    let updated = state.notifications.mark_read(&object_id).await?;
    record_notification_acknowledged(updated.is_some());

    let notification = updated
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Notification not found")))?;
    tracing::info!(notification_id = %id, user_id, "Notification marked as read");

    Ok(Json(NotificationEnvelope {
        notification: notification.into(),
    }))
}
