use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use dotenvy::dotenv;

use crate::classifier::DEFAULT_CONFIDENCE_THRESHOLD;

#[derive(Clone, Debug)]
pub struct Config {
    /// Unset runs against the in-memory stores.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub server_addr: String,
    pub access_token_ttl: usize,
    pub refresh_token_ttl: usize,

    // Rate limiting
    pub rate_limit_enabled: bool,
    pub rate_login_per_min: u32,
    pub rate_register_per_min: u32,
    pub rate_refresh_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,

    // Photo classifier
    pub photo_classifier: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub photo_confidence_threshold: f64,

    // Photo storage
    pub blob_backend: String,
    pub s3_bucket: Option<String>,
    pub s3_endpoint: Option<String>,
    pub photo_public_base_url: Option<String>,
    pub upload_max_attempts: usize,
    pub upload_backoff_ms: u64,

    pub overlay_ttl_secs: u64,
    pub report_utc_offset_hours: i32,
}

fn var_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value {:?}", key, raw)),
        Err(_) => Ok(default),
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let config = Self {
            server_addr: env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string()),
            database_url: optional("DATABASE_URL"),
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            access_token_ttl: var_or("ACCESS_TOKEN_TTL", 900)?, // default 15 min
            refresh_token_ttl: var_or("REFRESH_TOKEN_TTL", 604800)?, // default 7 days

            rate_limit_enabled: var_or("RATE_LIMIT_ENABLED", true)?,
            rate_login_per_min: var_or("RATE_LOGIN_PER_MIN", 60)?,
            rate_register_per_min: var_or("RATE_REGISTER_PER_MIN", 30)?,
            rate_refresh_per_min: var_or("RATE_REFRESH_PER_MIN", 30)?,
            rate_protected_per_min: var_or("RATE_PROTECTED_PER_MIN", 1000)?,

            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),

            photo_classifier: env::var("PHOTO_CLASSIFIER")
                .unwrap_or_else(|_| "disabled".to_string())
                .to_lowercase(),
            gemini_api_key: optional("GEMINI_API_KEY"),
            gemini_model: env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-2.5-flash".to_string()),
            photo_confidence_threshold: var_or(
                "PHOTO_CONFIDENCE_THRESHOLD",
                DEFAULT_CONFIDENCE_THRESHOLD,
            )?,

            blob_backend: env::var("BLOB_BACKEND")
                .unwrap_or_else(|_| "memory".to_string())
                .to_lowercase(),
            s3_bucket: optional("S3_BUCKET"),
            s3_endpoint: optional("S3_ENDPOINT"),
            photo_public_base_url: optional("PHOTO_PUBLIC_BASE_URL"),
            upload_max_attempts: var_or("UPLOAD_MAX_ATTEMPTS", 4)?,
            upload_backoff_ms: var_or("UPLOAD_BACKOFF_MS", 500)?,

            overlay_ttl_secs: var_or("OVERLAY_TTL_SECS", 300)?,
            report_utc_offset_hours: var_or("REPORT_UTC_OFFSET_HOURS", 7)?, // WIB
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.photo_confidence_threshold) {
            anyhow::bail!("PHOTO_CONFIDENCE_THRESHOLD must be within 0..=1");
        }
        if !(-12..=14).contains(&self.report_utc_offset_hours) {
            anyhow::bail!("REPORT_UTC_OFFSET_HOURS must be within -12..=14");
        }
        if self.blob_backend == "s3" && self.s3_bucket.is_none() {
            anyhow::bail!("BLOB_BACKEND=s3 requires S3_BUCKET");
        }
        if self.upload_max_attempts == 0 {
            anyhow::bail!("UPLOAD_MAX_ATTEMPTS must be at least 1");
        }
        Ok(())
    }

    /// Defaults suitable for tests: in-memory stores, no rate limiting,
    /// no classifier.
    pub fn for_tests(jwt_secret: &str) -> Self {
        Self {
            database_url: None,
            jwt_secret: jwt_secret.to_string(),
            server_addr: "127.0.0.1:0".to_string(),
            access_token_ttl: 900,
            refresh_token_ttl: 604800,
            rate_limit_enabled: false,
            rate_login_per_min: 60,
            rate_register_per_min: 30,
            rate_refresh_per_min: 30,
            rate_protected_per_min: 1000,
            api_prefix: "/api".to_string(),
            photo_classifier: "disabled".to_string(),
            gemini_api_key: None,
            gemini_model: "gemini-2.5-flash".to_string(),
            photo_confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            blob_backend: "memory".to_string(),
            s3_bucket: None,
            s3_endpoint: None,
            photo_public_base_url: None,
            upload_max_attempts: 2,
            upload_backoff_ms: 1,
            overlay_ttl_secs: 60,
            report_utc_offset_hours: 7,
        }
    }
}
