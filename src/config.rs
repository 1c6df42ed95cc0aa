// src/config.rs

use std::env;

use dotenvy::dotenv;
use thiserror::Error;

/// Consecutive failed logins that lock an administrator account.
pub const MAX_FAILED_LOGIN_ATTEMPTS: i32 = 5;

/// How long a locked account stays locked.
pub const LOGIN_LOCK_MINUTES: i64 = 15;

/// Minimum length of a review reason (after trimming).
pub const MIN_REVIEW_REASON_LEN: usize = 10;

pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 100;

const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has an invalid value: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("{0} must be at least 32 characters")]
    WeakSecret(&'static str),
}

/// Per-client request budget. Disabled when `RATE_LIMIT_MAX_REQUESTS=0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub window_seconds: u64,
    pub max_requests: u32,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Unset means the in-memory store is used.
    pub database_url: Option<String>,
    pub port: u16,
    pub jwt_access_secret: String,
    pub jwt_refresh_secret: String,
    pub jwt_access_expiration: u64,
    pub jwt_refresh_expiration: u64,
    pub rust_log: String,
    pub cors_origin: String,
    pub rate_limit: Option<RateLimit>,
    pub cache_enabled: bool,
    pub cache_ttl_seconds: u64,
    pub queue_enabled: bool,
    pub queue_capacity: usize,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub admin_display_name: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let jwt_access_secret = get("JWT_ACCESS_SECRET").ok_or(ConfigError::Missing("JWT_ACCESS_SECRET"))?;
        if jwt_access_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::WeakSecret("JWT_ACCESS_SECRET"));
        }

        let jwt_refresh_secret =
            get("JWT_REFRESH_SECRET").ok_or(ConfigError::Missing("JWT_REFRESH_SECRET"))?;
        if jwt_refresh_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::WeakSecret("JWT_REFRESH_SECRET"));
        }

        let max_requests: u32 = parse_or(get("RATE_LIMIT_MAX_REQUESTS"), "RATE_LIMIT_MAX_REQUESTS", 60)?;
        let window_seconds: u64 =
            parse_or(get("RATE_LIMIT_WINDOW_SECONDS"), "RATE_LIMIT_WINDOW_SECONDS", 60)?;
        let rate_limit = (max_requests > 0 && window_seconds > 0).then_some(RateLimit {
            window_seconds,
            max_requests,
        });

        Ok(Self {
            database_url: get("DATABASE_URL"),
            port: parse_or(get("PORT"), "PORT", 5000)?,
            jwt_access_secret,
            jwt_refresh_secret,
            jwt_access_expiration: parse_or(get("JWT_ACCESS_EXPIRATION"), "JWT_ACCESS_EXPIRATION", 900)?,
            jwt_refresh_expiration: parse_or(
                get("JWT_REFRESH_EXPIRATION"),
                "JWT_REFRESH_EXPIRATION",
                7 * 24 * 3600,
            )?,
            rust_log: get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            cors_origin: get("CORS_ORIGIN").unwrap_or_else(|| "*".to_string()),
            rate_limit,
            cache_enabled: parse_flag(get("CACHE_ENABLED"), "CACHE_ENABLED", true)?,
            cache_ttl_seconds: parse_or(get("CACHE_TTL_SECONDS"), "CACHE_TTL_SECONDS", 60)?,
            queue_enabled: parse_flag(get("QUEUE_ENABLED"), "QUEUE_ENABLED", true)?,
            queue_capacity: parse_or(get("QUEUE_CAPACITY"), "QUEUE_CAPACITY", 1024)?,
            admin_username: get("ADMIN_USERNAME"),
            admin_password: get("ADMIN_PASSWORD"),
            admin_display_name: get("ADMIN_DISPLAY_NAME"),
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    raw: Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

fn parse_flag(raw: Option<String>, key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match raw.as_deref().map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(_) => Err(ConfigError::Invalid {
            key,
            value: raw.unwrap_or_default(),
        }),
    }
}
