use crate::error::AppError;
use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use redis::{Client, aio::ConnectionManager};
use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::{Duration, Instant},
};

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// Counter state for one key after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitHit {
    pub count: u64,
    pub reset_after: Duration,
}

/// Shared counter store backing the limiter.
///
/// Windows are fixed per key: the first hit starts the window and the
/// counter disappears when it ends.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn increment(&self, key: &str, window: Duration) -> Result<RateLimitHit, AppError>;
    async fn health_check(&self) -> Result<(), AppError>;
}

/// Redis-backed store, shared by every instance pointed at the same server.
#[derive(Clone)]
pub struct RedisRateLimitStore {
    manager: ConnectionManager,
}

impl RedisRateLimitStore {
    pub async fn connect(url: &str) -> Result<Self, AppError> {
        tracing::info!(url = %url, "Connecting to Redis");
        let client = Client::open(url)?;

        // ConnectionManager reconnects on its own
        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            AppError::RedisError(e)
        })?;

        tracing::info!("Successfully connected to Redis");
        Ok(Self { manager })
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<RateLimitHit, AppError> {
        let mut conn = self.manager.clone();
        let window_ms = window.as_millis() as u64;

        let (count, ttl): (u64, i64) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .pttl(key)
            .query_async(&mut conn)
            .await?;

        // No expiry yet: this hit opened the window.
        let reset_ms = if ttl < 0 {
            redis::cmd("PEXPIRE")
                .arg(key)
                .arg(window_ms)
                .query_async::<_, ()>(&mut conn)
                .await?;
            window_ms
        } else {
            ttl as u64
        };

        Ok(RateLimitHit {
            count,
            reset_after: Duration::from_millis(reset_ms),
        })
    }

    async fn health_check(&self) -> Result<(), AppError> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| {
                tracing::error!("Redis health check failed: {}", e);
                AppError::RedisError(e)
            })?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u64,
    resets_at: Instant,
}

/// Process-local store for single-instance runs and tests.
#[derive(Debug, Default)]
pub struct MemoryRateLimitStore {
    windows: DashMap<String, Window>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<RateLimitHit, AppError> {
        let now = Instant::now();
        let mut entry = self.windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            resets_at: now + window,
        });

        if entry.resets_at <= now {
            *entry = Window {
                count: 0,
                resets_at: now + window,
            };
        }
        entry.count += 1;

        Ok(RateLimitHit {
            count: entry.count,
            reset_after: entry.resets_at.saturating_duration_since(now),
        })
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    pub window: Duration,
    pub max: u64,
    pub key_prefix: String,
    pub message: String,
    /// Take the client address from `X-Forwarded-For` instead of the socket.
    pub trust_proxy: bool,
}

/// Rate limiter keyed by client IP address.
#[derive(Clone)]
pub struct IpRateLimiter {
    policy: Arc<RateLimitPolicy>,
    store: Arc<dyn RateLimitStore>,
}

impl IpRateLimiter {
    pub fn new(policy: RateLimitPolicy, store: Arc<dyn RateLimitStore>) -> Self {
        Self {
            policy: Arc::new(policy),
            store,
        }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    fn client_ip(&self, request: &Request) -> Option<IpAddr> {
        let forwarded_ip = if self.policy.trust_proxy {
            request
                .headers()
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.split(',').next())
                .and_then(|s| s.trim().parse::<IpAddr>().ok())
        } else {
            None
        };

        forwarded_ip.or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        })
    }
}

fn set_limit_headers(response: &mut Response, limit: u64, remaining: u64) {
    let headers = response.headers_mut();
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(remaining));
}

/// Middleware for IP-based rate limiting
pub async fn ip_rate_limit_middleware(
    State(limiter): State<IpRateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(ip) = limiter.client_ip(&request) else {
        tracing::warn!("Could not determine IP for rate limiting");
        return Ok(next.run(request).await);
    };

    let policy = limiter.policy();
    let key = format!("{}{}", policy.key_prefix, ip);
    let hit = limiter.store.increment(&key, policy.window).await?;
    let remaining = policy.max.saturating_sub(hit.count);

    if hit.count > policy.max {
        tracing::warn!(ip = %ip, count = hit.count, "Rate limit exceeded");
        metrics::counter!("rate_limit_rejections_total").increment(1);

        let retry_after = hit.reset_after.as_millis().div_ceil(1000) as u64;
        let mut response =
            AppError::TooManyRequests(policy.message.clone(), Some(retry_after)).into_response();
        set_limit_headers(&mut response, policy.max, remaining);
        return Ok(response);
    }

    let mut response = next.run(request).await;
    set_limit_headers(&mut response, policy.max, remaining);
    Ok(response)
}
