use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// Document in the `notifications` collection.
///
/// Written by the appointment scheduler; this service only lists and
/// acknowledges them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub content: String,
    /// Id of the addressed user in the relational store.
    pub user: i32,
    #[serde(default)]
    pub read: bool,
    #[serde(
        rename = "createdAt",
        with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime"
    )]
    pub created_at: DateTime<Utc>,
    #[serde(
        rename = "updatedAt",
        with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime"
    )]
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(user: i32, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ObjectId::new(),
            content: content.into(),
            user,
            read: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_read(&mut self) {
        self.read = true;
        self.updated_at = Utc::now();
    }
}

/// JSON shape returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationResponse {
    #[serde(rename = "_id")]
    pub id: String,
    pub content: String,
    pub user: i32,
    pub read: bool,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl From<Notification> for NotificationResponse {
    fn from(n: Notification) -> Self {
        Self {
            id: n.id.to_hex(),
            content: n.content,
            user: n.user,
            read: n.read,
            created_at: n.created_at,
            updated_at: n.updated_at,
        }
    }
}
