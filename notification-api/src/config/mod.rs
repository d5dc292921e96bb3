use serde::Deserialize;
use service_core::config::{self as core_config, Environment};
use service_core::error::AppError;
use service_core::middleware::rate_limit::RateLimitPolicy;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

pub const DEFAULT_RATE_LIMIT_MESSAGE: &str = "Many simultaneous requests to the system from this IP were detected, for security reasons, access will be blocked for 15 minutes.";

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NotificationConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub postgres: PostgresConfig,
    pub mongodb: MongoConfig,
    pub redis: RedisConfig,
    pub sentry: SentryConfig,
    #[validate(nested)]
    pub cors: CorsConfig,
    #[validate(nested)]
    pub rate_limit: RateLimitConfig,
    #[validate(nested)]
    pub uploads: UploadsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
}

impl RedisConfig {
    pub fn url(&self) -> String {
        format!("redis://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SentryConfig {
    /// Reporting is log-only when unset.
    pub dsn: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CorsConfig {
    #[validate(length(min = 1, message = "at least one allowed origin is required"))]
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RateLimitConfig {
    #[validate(range(min = 1))]
    pub window_ms: u64,
    #[validate(range(min = 1))]
    pub max: u64,
    #[validate(length(min = 1))]
    pub key_prefix: String,
    pub message: String,
    pub trust_proxy: bool,
}

impl RateLimitConfig {
    pub fn policy(&self) -> RateLimitPolicy {
        RateLimitPolicy {
            window: Duration::from_millis(self.window_ms),
            max: self.max,
            key_prefix: self.key_prefix.clone(),
            message: self.message.clone(),
            trust_proxy: self.trust_proxy,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: 15 * 60 * 1000,
            max: 1000,
            key_prefix: "request_limit:".to_string(),
            message: DEFAULT_RATE_LIMIT_MESSAGE.to_string(),
            trust_proxy: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UploadsConfig {
    pub directory: PathBuf,
    #[validate(custom(function = "validate_url_prefix"))]
    pub url_prefix: String,
}

fn validate_url_prefix(prefix: &str) -> Result<(), validator::ValidationError> {
    if prefix.len() > 1 && prefix.starts_with('/') && !prefix.ends_with('/') {
        Ok(())
    } else {
        Err(validator::ValidationError::new("url_prefix"))
    }
}

impl NotificationConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        // Anything but an explicit development mode keeps protections on.
        let mode = env::var("ENVIRONMENT").or_else(|_| env::var("NODE_ENV")).ok();
        let environment = Environment::from_setting(mode.as_deref());
        let strict = !environment.is_development();

        let defaults = RateLimitConfig::default();

        let config = NotificationConfig {
            common: common_config,
            environment,
            service_name: get_env("SERVICE_NAME", Some("notification-api"), strict)?,
            log_level: get_env("LOG_LEVEL", Some("info"), strict)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|v| !v.is_empty()),
            postgres: PostgresConfig {
                url: get_env("DATABASE_URL", None, strict)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 5)?,
            },
            mongodb: MongoConfig {
                uri: get_env("MONGODB_URI", None, strict)?,
                database: get_env("MONGODB_DATABASE", Some("notifications"), strict)?,
            },
            redis: RedisConfig {
                host: get_env("REDIS_HOST", Some("127.0.0.1"), false)?,
                port: parse_env("REDIS_PORT", 6379)?,
            },
            sentry: SentryConfig {
                dsn: env::var("SENTRY_DSN").ok().filter(|v| !v.is_empty()),
            },
            cors: CorsConfig {
                allowed_origins: get_env("CORS_ALLOWED_ORIGINS", Some("http://localhost:3000"), false)?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            rate_limit: RateLimitConfig {
                window_ms: parse_env("RATE_LIMIT_WINDOW_MS", defaults.window_ms)?,
                max: parse_env("RATE_LIMIT_MAX", defaults.max)?,
                key_prefix: get_env("RATE_LIMIT_KEY_PREFIX", Some(&defaults.key_prefix), false)?,
                message: defaults.message,
                trust_proxy: parse_env("RATE_LIMIT_TRUST_PROXY", false)?,
            },
            uploads: UploadsConfig {
                directory: PathBuf::from(get_env("UPLOADS_DIR", Some("temp/upload"), false)?),
                url_prefix: get_env("UPLOADS_URL_PREFIX", Some("/files"), false)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Rate limiting only runs outside development.
    pub fn rate_limit_enabled(&self) -> bool {
        !self.environment.is_development()
    }
}

fn get_env(key: &str, default: Option<&str>, strict: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if strict && default.is_none() {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required outside development but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(val) => val.trim().parse().map_err(|e: T::Err| {
            AppError::ConfigError(anyhow::anyhow!("{} has an invalid value '{}': {}", key, val, e))
        }),
        Err(_) => Ok(default),
    }
}
