//! Opaque media storage. Objects are addressed by key and served from a
//! public URL; the chat service never reads them back.

use crate::config::S3Config;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use dashmap::DashMap;
use uuid::Uuid;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `body` under `key` and return its public URL
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> AppResult<String>;
}

/// Object key for an uploaded chat attachment
pub fn media_key(conversation_id: Uuid, file_name: &str) -> String {
    let safe: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("chat-media/{conversation_id}/{}-{safe}", Uuid::new_v4())
}

pub struct S3BlobStore {
    client: Client,
    bucket: String,
    public_base_url: String,
}

impl S3BlobStore {
    pub async fn from_config(config: &S3Config) -> Self {
        let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> AppResult<String> {
        let size = body.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(key = %key, error = %e, "S3 put_object failed");
                AppError::Upload(e.to_string())
            })?;

        tracing::debug!(key = %key, size, "stored chat attachment");
        Ok(format!("{}/{}", self.public_base_url, key))
    }
}

/// Keeps objects in memory. Used by tests and `MEDIA_BACKEND=memory`.
pub struct MemoryBlobStore {
    base_url: String,
    objects: DashMap<String, (String, Vec<u8>)>,
}

impl MemoryBlobStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            objects: DashMap::new(),
        }
    }

    /// Content type and bytes stored under `key`
    pub fn get(&self, key: &str) -> Option<(String, Vec<u8>)> {
        self.objects.get(key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> AppResult<String> {
        self.objects
            .insert(key.to_string(), (content_type.to_string(), body));
        Ok(format!("{}/{}", self.base_url.trim_end_matches('/'), key))
    }
}
