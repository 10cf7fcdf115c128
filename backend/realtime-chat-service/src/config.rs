use crate::error::AppError;
use dotenvy::dotenv;
use std::env;

/// Which `ChatRepository` / `UserDirectory` implementation to run against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaBackend {
    S3,
    Memory,
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    /// Public URL prefix for stored objects, e.g. a CDN origin
    pub public_base_url: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub storage: StorageBackend,
    pub database_url: Option<String>,
    pub message_encryption_secret: String,
    pub jwt_public_key_pem: String,
    pub jwt_private_key_pem: Option<String>,
    pub media: MediaBackend,
    pub s3: S3Config,
    pub max_upload_bytes: usize,
    pub typing_ttl_secs: u64,
    pub log_json: bool,
}

const MIN_SECRET_LEN: usize = 16;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8080);

        let database_url = env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());
        let storage = match env::var("STORAGE_BACKEND").ok().as_deref() {
            Some("memory") => StorageBackend::Memory,
            Some("postgres") => StorageBackend::Postgres,
            Some(other) => {
                return Err(AppError::Config(format!("unknown STORAGE_BACKEND {other}")))
            }
            None if database_url.is_some() => StorageBackend::Postgres,
            None => StorageBackend::Memory,
        };
        if storage == StorageBackend::Postgres && database_url.is_none() {
            return Err(AppError::Config("DATABASE_URL missing".into()));
        }

        let message_encryption_secret = env::var("MESSAGE_ENCRYPTION_SECRET")
            .map_err(|_| AppError::Config("MESSAGE_ENCRYPTION_SECRET missing".into()))?;
        if message_encryption_secret.len() < MIN_SECRET_LEN {
            return Err(AppError::Config(format!(
                "MESSAGE_ENCRYPTION_SECRET must be at least {MIN_SECRET_LEN} characters"
            )));
        }

        let jwt_public_key_pem = env::var("JWT_PUBLIC_KEY_PEM")
            .map_err(|_| AppError::Config("JWT_PUBLIC_KEY_PEM missing".into()))?;
        let jwt_private_key_pem = env::var("JWT_PRIVATE_KEY_PEM").ok().filter(|s| !s.is_empty());

        let media = match env::var("MEDIA_BACKEND").ok().as_deref() {
            Some("memory") => MediaBackend::Memory,
            Some("s3") | None => MediaBackend::S3,
            Some(other) => return Err(AppError::Config(format!("unknown MEDIA_BACKEND {other}"))),
        };

        let bucket = env::var("S3_BUCKET").unwrap_or_else(|_| "nova-chat-media".into());
        let region = env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into());
        let s3 = S3Config {
            public_base_url: env::var("MEDIA_PUBLIC_BASE_URL")
                .unwrap_or_else(|_| format!("https://{bucket}.s3.{region}.amazonaws.com")),
            endpoint: env::var("S3_ENDPOINT").ok().filter(|s| !s.is_empty()),
            bucket,
            region,
        };

        let max_upload_bytes = env::var("MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);
        let typing_ttl_secs = env::var("TYPING_TTL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);
        let log_json = env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);

        Ok(Self {
            port,
            storage,
            database_url,
            message_encryption_secret,
            jwt_public_key_pem,
            jwt_private_key_pem,
            media,
            s3,
            max_upload_bytes,
            typing_ttl_secs,
            log_json,
        })
    }

    /// In-memory configuration used by tests and local runs
    pub fn test_defaults() -> Self {
        Self {
            port: 0,
            storage: StorageBackend::Memory,
            database_url: None,
            message_encryption_secret: "test-message-encryption-secret".into(),
            jwt_public_key_pem: String::new(),
            jwt_private_key_pem: None,
            media: MediaBackend::Memory,
            s3: S3Config {
                bucket: "test-bucket".into(),
                region: "us-east-1".into(),
                endpoint: None,
                public_base_url: "https://media.test".into(),
            },
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            typing_ttl_secs: 5,
            log_json: false,
        }
    }
}
