//! Read access to the relational user store.

use crate::models::User;
use async_trait::async_trait;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::instrument;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// The user with `id`, only if the account is flagged as a provider.
    async fn find_provider(&self, id: i32) -> Result<Option<User>, AppError>;
    async fn health_check(&self) -> Result<(), AppError>;
}

/// PostgreSQL-backed user lookups.
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, AppError> {
        tracing::info!(max_connections = max_connections, "Connecting to PostgreSQL");

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        tracing::info!("PostgreSQL connection pool established");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    #[instrument(skip(self))]
    async fn find_provider(&self, id: i32) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, provider, avatar_id, created_at, updated_at
            FROM users
            WHERE id = $1 AND provider = true
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to look up provider {}: {}", id, e);
            AppError::DatabaseError(anyhow::anyhow!(e))
        })
    }

    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                AppError::DatabaseError(anyhow::anyhow!("Database health check failed: {}", e))
            })?;
        Ok(())
    }
}

/// In-process user table for local runs and tests.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: Mutex<HashMap<i32, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: User) {
        if let Ok(mut users) = self.users.lock() {
            users.insert(user.id, user);
        }
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_provider(&self, id: i32) -> Result<Option<User>, AppError> {
        let users = self
            .users
            .lock()
            .map_err(|_| AppError::InternalError(anyhow::anyhow!("user store lock poisoned")))?;
        Ok(users.get(&id).filter(|user| user.provider).cloned())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}
