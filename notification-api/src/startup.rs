//! Application startup and lifecycle management.
//!
//! Stage order, outermost first: Sentry hub, request context, request
//! tracing, security headers, metrics, error boundary, panic catcher. The
//! public routes add the CORS guard, body limit, static mount and (outside
//! development) the rate limiter. Operational routes skip CORS and rate
//! limiting.

use crate::config::NotificationConfig;
use crate::handlers::{self, notifications};
use crate::middleware::USER_ID_HEADER;
use crate::services::{MongoNotificationStore, NotificationStore, PgUserStore, UserStore};
use axum::{
    extract::DefaultBodyLimit,
    http::HeaderName,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, put},
    Router,
};
use sentry_tower::{NewSentryLayer, SentryHttpLayer};
use service_core::error::AppError;
use service_core::middleware::{
    cors::{cors_guard_middleware, CorsPolicy},
    error_boundary::{error_boundary_middleware, panic_response, ErrorBoundary},
    metrics::metrics_middleware,
    rate_limit::{ip_rate_limit_middleware, IpRateLimiter, RateLimitStore, RedisRateLimitStore},
    security_headers::security_headers_middleware,
    tracing::{request_context_middleware, REQUEST_ID_HEADER},
};
use service_core::observability::{init_sentry, ErrorReporter, LogReporter, SentryReporter};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Largest accepted request body.
pub const BODY_LIMIT_BYTES: usize = 100 * 1024;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: NotificationConfig,
    pub users: Arc<dyn UserStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub rate_limit_store: Arc<dyn RateLimitStore>,
    pub reporter: Arc<dyn ErrorReporter>,
}

pub fn build_router(state: AppState) -> Result<Router, AppError> {
    let config = &state.config;

    let cors = CorsPolicy::new(&config.cors.allowed_origins)?
        .with_allowed_header(HeaderName::from_static(USER_ID_HEADER));

    let mut api = Router::new()
        .route("/notifications", get(notifications::index))
        .route("/notifications/:id", put(notifications::update));

    if config.rate_limit_enabled() {
        let limiter = IpRateLimiter::new(config.rate_limit.policy(), state.rate_limit_store.clone());
        api = api.layer(from_fn_with_state(limiter, ip_rate_limit_middleware));
    } else {
        tracing::info!(environment = %config.environment, "Rate limiting disabled");
    }

    // Static files are mounted ahead of the limiter and never count against it.
    let public = Router::new()
        .nest_service(
            &config.uploads.url_prefix,
            ServeDir::new(&config.uploads.directory),
        )
        .merge(api)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(cors.layer())
        .layer(from_fn_with_state(cors, cors_guard_middleware));

    let ops = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint));

    let boundary = ErrorBoundary::new(config.environment.is_development(), state.reporter.clone());

    let router = public
        .merge(ops)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(from_fn_with_state(boundary, error_boundary_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    user_id = tracing::field::Empty,
                )
            }),
        )
        .layer(from_fn(request_context_middleware))
        // Per-request Sentry hub carrying the HTTP request details
        .layer(
            ServiceBuilder::new()
                .layer(NewSentryLayer::<axum::extract::Request>::new_from_top())
                .layer(SentryHttpLayer::with_transaction()),
        )
        .with_state(state);

    Ok(router)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
    sentry_guard: Option<sentry::ClientInitGuard>,
}

impl Application {
    /// Connect every collaborator and bind the listener.
    pub async fn build(config: NotificationConfig) -> Result<Self, AppError> {
        let users = PgUserStore::connect(&config.postgres.url, config.postgres.max_connections)
            .await
            .map_err(|e| {
                tracing::error!("Failed to connect to PostgreSQL: {}", e);
                e
            })?;

        let notifications =
            MongoNotificationStore::connect(&config.mongodb.uri, &config.mongodb.database)
                .await
                .map_err(|e| {
                    tracing::error!("Failed to connect to MongoDB: {}", e);
                    e
                })?;
        notifications.initialize_indexes().await.map_err(|e| {
            tracing::error!("Failed to initialize database indexes: {}", e);
            e
        })?;

        let rate_limit_store = RedisRateLimitStore::connect(&config.redis.url())
            .await
            .map_err(|e| {
                tracing::error!("Failed to connect to Redis: {}", e);
                e
            })?;

        let sentry_guard = match config.sentry.dsn.as_deref() {
            Some(dsn) => {
                tracing::info!("Sentry error reporting enabled");
                Some(init_sentry(
                    dsn,
                    config.environment.as_str(),
                    env!("CARGO_PKG_VERSION"),
                )?)
            }
            None => {
                tracing::info!("SENTRY_DSN not set, errors are only logged");
                None
            }
        };
        let reporter: Arc<dyn ErrorReporter> = if sentry_guard.is_some() {
            Arc::new(SentryReporter)
        } else {
            Arc::new(LogReporter)
        };

        tokio::fs::create_dir_all(&config.uploads.directory)
            .await
            .map_err(|e| {
                tracing::error!(
                    "Failed to create upload directory {}: {}",
                    config.uploads.directory.display(),
                    e
                );
                AppError::from(e)
            })?;

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let state = AppState {
            config,
            users: Arc::new(users),
            notifications: Arc::new(notifications),
            rate_limit_store: Arc::new(rate_limit_store),
            reporter,
        };
        let router = build_router(state)?;

        // Port 0 binds a random port for testing
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Listening on {}", port);

        Ok(Self {
            port,
            listener,
            router,
            sentry_guard,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serve until SIGINT or SIGTERM, then drain in-flight requests.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(
            self.listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        tracing::info!("Service shutdown complete");
        // Flushes queued error events
        drop(self.sentry_guard);
        Ok(())
    }
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
