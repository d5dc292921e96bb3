#![allow(dead_code)]

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use notification_api::config::{
    CorsConfig, MongoConfig, NotificationConfig, PostgresConfig, RateLimitConfig, RedisConfig,
    SentryConfig, UploadsConfig,
};
use notification_api::services::{InMemoryNotificationStore, InMemoryUserStore};
use notification_api::startup::{build_router, AppState};
use service_core::config::{Config as CoreConfig, Environment};
use service_core::middleware::rate_limit::MemoryRateLimitStore;
use service_core::observability::RecordingReporter;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;

pub const ALLOWED_ORIGIN: &str = "http://localhost:3000";

pub fn test_config(environment: Environment, uploads_dir: PathBuf) -> NotificationConfig {
    NotificationConfig {
        common: CoreConfig { port: 0 },
        environment,
        service_name: "notification-api".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        postgres: PostgresConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
        },
        mongodb: MongoConfig {
            uri: "mongodb://unused".to_string(),
            database: "notifications_test".to_string(),
        },
        redis: RedisConfig {
            host: "127.0.0.1".to_string(),
            port: 6379,
        },
        sentry: SentryConfig { dsn: None },
        cors: CorsConfig {
            allowed_origins: vec![ALLOWED_ORIGIN.to_string()],
        },
        rate_limit: RateLimitConfig::default(),
        uploads: UploadsConfig {
            directory: uploads_dir,
            url_prefix: "/files".to_string(),
        },
    }
}

/// Router wired to in-memory collaborators.
pub struct TestApp {
    pub router: Router,
    pub users: Arc<InMemoryUserStore>,
    pub notifications: Arc<InMemoryNotificationStore>,
    pub reporter: Arc<RecordingReporter>,
    uploads: tempfile::TempDir,
}

impl TestApp {
    pub fn new(environment: Environment) -> Self {
        Self::with_config(|config| config.environment = environment)
    }

    pub fn with_config(customize: impl FnOnce(&mut NotificationConfig)) -> Self {
        let uploads = tempfile::tempdir().expect("Failed to create upload dir");
        let mut config = test_config(Environment::Test, uploads.path().to_path_buf());
        customize(&mut config);

        let users = Arc::new(InMemoryUserStore::new());
        let notifications = Arc::new(InMemoryNotificationStore::new());
        let reporter = Arc::new(RecordingReporter::new());

        let state = AppState {
            config,
            users: users.clone(),
            notifications: notifications.clone(),
            rate_limit_store: Arc::new(MemoryRateLimitStore::new()),
            reporter: reporter.clone(),
        };
        let router = build_router(state).expect("Failed to build router");

        TestApp {
            router,
            users,
            notifications,
            reporter,
            uploads,
        }
    }

    pub fn uploads_dir(&self) -> &std::path::Path {
        self.uploads.path()
    }

    /// Request builder from a fixed client address with the allowed origin.
    pub fn request(method: Method, uri: &str) -> axum::http::request::Builder {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("origin", ALLOWED_ORIGIN)
            .extension(ConnectInfo(SocketAddr::from(([203, 0, 113, 7], 51000))))
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request")
    }

    pub async fn get_notifications(&self, user_id: i32) -> Response<Body> {
        self.send(
            Self::request(Method::GET, "/notifications")
                .header("x-user-id", user_id.to_string())
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn acknowledge(&self, id: &str) -> Response<Body> {
        self.send(
            Self::request(Method::PUT, &format!("/notifications/{}", id))
                .header("x-user-id", "1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}
