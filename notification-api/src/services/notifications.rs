use crate::models::Notification;
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, DateTime as BsonDateTime},
    options::{FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument},
    Client as MongoClient, Collection, Database, IndexModel,
};
use service_core::error::AppError;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Up to `limit` notifications addressed to `user`, newest first.
    async fn list_for_user(&self, user: i32, limit: i64) -> Result<Vec<Notification>, AppError>;

    /// Set `read = true` and return the updated document, `None` if no
    /// document has that id.
    async fn mark_read(&self, id: &ObjectId) -> Result<Option<Notification>, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct MongoNotificationStore {
    client: MongoClient,
    db: Database,
}

impl MongoNotificationStore {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, AppError> {
        tracing::info!("Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!("Failed to connect to MongoDB: {}", e);
            AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
        })?;
        let db = client.database(database);
        tracing::info!(database = %database, "Successfully connected to MongoDB database");
        Ok(Self { client, db })
    }

    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        tracing::info!("Creating MongoDB indexes for notification-api");

        // Serves the per-user, newest-first listing
        let user_created_index = IndexModel::builder()
            .keys(doc! { "user": 1, "createdAt": -1 })
            .options(
                IndexOptions::builder()
                    .name("user_created_at_idx".to_string())
                    .build(),
            )
            .build();

        self.notifications()
            .create_index(user_created_index, None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create user/createdAt index: {}", e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })?;

        tracing::info!("Successfully created all MongoDB indexes");
        Ok(())
    }

    pub fn notifications(&self) -> Collection<Notification> {
        self.db.collection("notifications")
    }
}

#[async_trait]
impl NotificationStore for MongoNotificationStore {
    #[tracing::instrument(skip(self))]
    async fn list_for_user(&self, user: i32, limit: i64) -> Result<Vec<Notification>, AppError> {
        let find_options = FindOptions::builder()
            .sort(doc! { "createdAt": -1 })
            .limit(limit)
            .build();

        let cursor = self
            .notifications()
            .find(doc! { "user": user }, find_options)
            .await
            .map_err(|e| {
                tracing::error!("Failed to list notifications: {}", e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })?;

        let notifications: Vec<Notification> = cursor.try_collect().await.map_err(|e| {
            tracing::error!("Failed to collect notifications: {}", e);
            AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
        })?;

        Ok(notifications)
    }

    #[tracing::instrument(skip(self))]
    async fn mark_read(&self, id: &ObjectId) -> Result<Option<Notification>, AppError> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        self.notifications()
            .find_one_and_update(
                doc! { "_id": id },
                doc! { "$set": { "read": true, "updatedAt": BsonDateTime::now() } },
                options,
            )
            .await
            .map_err(|e| {
                tracing::error!("Failed to mark notification {} as read: {}", id, e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })
    }

    async fn health_check(&self) -> Result<(), AppError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })?;
        Ok(())
    }
}

/// In-process collection for local runs and tests.
#[derive(Default)]
pub struct InMemoryNotificationStore {
    notifications: Mutex<Vec<Notification>>,
    list_calls: AtomicUsize,
    unavailable: AtomicBool,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, notification: Notification) {
        if let Ok(mut notifications) = self.notifications.lock() {
            notifications.push(notification);
        }
    }

    /// Number of listing queries served so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Make every call fail as if the server were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), AppError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "notification store unavailable"
            )));
        }
        Ok(())
    }

    fn lock_poisoned() -> AppError {
        AppError::InternalError(anyhow::anyhow!("notification store lock poisoned"))
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn list_for_user(&self, user: i32, limit: i64) -> Result<Vec<Notification>, AppError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let notifications = self.notifications.lock().map_err(|_| Self::lock_poisoned())?;
        let mut matching: Vec<Notification> = notifications
            .iter()
            .filter(|n| n.user == user)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(limit.max(0) as usize);
        Ok(matching)
    }

    async fn mark_read(&self, id: &ObjectId) -> Result<Option<Notification>, AppError> {
        self.check_available()?;

        let mut notifications = self.notifications.lock().map_err(|_| Self::lock_poisoned())?;
        Ok(notifications.iter_mut().find(|n| &n.id == id).map(|n| {
            n.mark_read();
            n.clone()
        }))
    }

    async fn health_check(&self) -> Result<(), AppError> {
        self.check_available()
    }
}
