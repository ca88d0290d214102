use dotenvy::dotenv;
use std::env;

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    /// Custom endpoint for local stacks (minio etc); None for real AWS.
    pub endpoint: Option<String>,
    pub region: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub s3: S3Config,

    /// Messages older than this move to cold storage.
    pub retention_days: i64,
    pub archive_interval_secs: u64,
    pub cleanup_interval_secs: u64,
    pub activity_retention_days: i64,

    pub fanout_chunk_size: usize,
    pub edit_window_minutes: i64,
    pub page_limit_default: i64,

    pub archive_cache_ttl_secs: u64,
    pub activity_cache_ttl_secs: u64,
    pub members_cache_ttl_secs: u64,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, crate::error::AppError> {
        dotenv().ok();
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| crate::error::AppError::Config("DATABASE_URL missing".into()))?;
        let redis_url = env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());

        let bucket = env::var("ARCHIVE_S3_BUCKET")
            .map_err(|_| crate::error::AppError::Config("ARCHIVE_S3_BUCKET missing".into()))?;
        let endpoint = env::var("ARCHIVE_S3_ENDPOINT")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let region = env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".into());

        Ok(Self {
            database_url,
            redis_url,
            s3: S3Config {
                bucket,
                endpoint,
                region,
            },
            retention_days: env_parse("MESSAGE_RETENTION_DAYS", 30),
            archive_interval_secs: env_parse("ARCHIVE_INTERVAL_SECS", 86_400),
            cleanup_interval_secs: env_parse("CLEANUP_INTERVAL_SECS", 3_600),
            activity_retention_days: env_parse("ACTIVITY_RETENTION_DAYS", 90),
            fanout_chunk_size: env_parse("FANOUT_CHUNK_SIZE", 50),
            edit_window_minutes: env_parse("EDIT_WINDOW_MINUTES", 15),
            page_limit_default: env_parse("PAGE_LIMIT_DEFAULT", 50),
            archive_cache_ttl_secs: env_parse("ARCHIVE_CACHE_TTL_SECS", 300),
            activity_cache_ttl_secs: env_parse("ACTIVITY_CACHE_TTL_SECS", 30),
            members_cache_ttl_secs: env_parse("MEMBERS_CACHE_TTL_SECS", 60),
        })
    }

    pub fn test_defaults() -> Self {
        Self {
            database_url: "postgres://localhost/chat_test".into(),
            redis_url: "redis://127.0.0.1:6379/0".into(),
            s3: S3Config {
                bucket: "chat-archives-test".into(),
                endpoint: None,
                region: "us-east-1".into(),
            },
            retention_days: 30,
            archive_interval_secs: 86_400,
            cleanup_interval_secs: 3_600,
            activity_retention_days: 90,
            fanout_chunk_size: 50,
            edit_window_minutes: 15,
            page_limit_default: 50,
            archive_cache_ttl_secs: 300,
            activity_cache_ttl_secs: 30,
            members_cache_ttl_secs: 60,
        }
    }
}
