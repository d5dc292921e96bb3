//! User model - rows of the `users` table, owned by user management.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Columns read by this service. The password hash is never selected.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub provider: bool,
    pub avatar_id: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: i32, name: impl Into<String>, email: impl Into<String>, provider: bool) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            email: email.into(),
            provider,
            avatar_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}
