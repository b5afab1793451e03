//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use chrono::Duration;
use std::net::SocketAddr;
use study_notes_core::{FavoritesMode, FeatureConfig};
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    /// Base address used in verification links.
    pub app_base_url: String,
    pub cors_origin: String,

    pub s3_bucket: String,
    /// Custom endpoint for MinIO or other S3-compatible stores. `None` means AWS.
    pub s3_endpoint: Option<String>,
    pub s3_region: String,
    /// Prefix under which stored objects are publicly readable.
    pub s3_public_base_url: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,

    /// E-mail addresses that receive the admin role when they sign up.
    pub admin_emails: Vec<String>,
    pub session_ttl: Duration,
    pub max_upload_bytes: usize,
    pub features: FeatureConfig,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let required = |key: &str| lookup(key).ok_or_else(|| ConfigError::MissingVar(key.to_string()));

        // --- Load Server and Database Settings ---
        let bind_address = parse_var("BIND_ADDRESS", &var_or("BIND_ADDRESS", "0.0.0.0:3000"))?;
        let database_url = required("DATABASE_URL")?;

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let app_base_url = var_or("APP_BASE_URL", "http://localhost:3000");
        let cors_origin = var_or("CORS_ORIGIN", "http://localhost:5173");

        // --- Load Object Storage Settings ---
        let s3_bucket = var_or("S3_BUCKET", "study-materials");
        let s3_endpoint = lookup("S3_ENDPOINT").filter(|v| !v.trim().is_empty());
        let s3_region = var_or("S3_REGION", "us-east-1");
        let s3_public_base_url = match lookup("S3_PUBLIC_BASE_URL") {
            Some(url) => url,
            None => match &s3_endpoint {
                Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), s3_bucket),
                None => format!("https://{}.s3.{}.amazonaws.com", s3_bucket, s3_region),
            },
        };
        let aws_access_key_id = required("AWS_ACCESS_KEY_ID")?;
        let aws_secret_access_key = required("AWS_SECRET_ACCESS_KEY")?;

        // --- Load Account and Feature Settings ---
        let admin_emails = parse_list(&var_or("ADMIN_EMAILS", ""));
        let session_ttl_days: i64 = parse_var("SESSION_TTL_DAYS", &var_or("SESSION_TTL_DAYS", "30"))?;
        if session_ttl_days <= 0 {
            return Err(ConfigError::InvalidValue(
                "SESSION_TTL_DAYS".to_string(),
                "must be at least one day".to_string(),
            ));
        }
        let max_upload_bytes = parse_var("MAX_UPLOAD_BYTES", &var_or("MAX_UPLOAD_BYTES", "20971520"))?;

        let favorites = var_or("FAVORITES_MODE", "synced")
            .parse::<FavoritesMode>()
            .map_err(|e| ConfigError::InvalidValue("FAVORITES_MODE".to_string(), e.to_string()))?;
        let admin_panel = parse_var("ADMIN_PANEL", &var_or("ADMIN_PANEL", "true"))?;
        let favorites_category = parse_var("FAVORITES_CATEGORY", &var_or("FAVORITES_CATEGORY", "true"))?;

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            app_base_url,
            cors_origin,
            s3_bucket,
            s3_endpoint,
            s3_region,
            s3_public_base_url,
            aws_access_key_id,
            aws_secret_access_key,
            admin_emails,
            session_ttl: Duration::days(session_ttl_days),
            max_upload_bytes,
            features: FeatureConfig {
                favorites,
                admin_panel,
                favorites_category,
            },
        })
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string()))
}

/// Splits a comma-separated list, lower-casing and dropping blanks.
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().to_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}
