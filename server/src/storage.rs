//! Where uploaded bytes end up: the local uploads directory and, when configured,
//! an S3-compatible bucket.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::StorageConfig;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to store object {key}: {message}")]
    Put { key: String, message: String },

    #[error("Object storage misconfigured: {0}")]
    Config(String),
}

/// Reduces a client-supplied file name to a single safe path component.
///
/// Directory parts are dropped and characters other than letters, digits, `.`, `-`,
/// `_` and space become `_`. Names that end up empty or made only of dots are replaced
/// by a generated one.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        format!("upload-{}", Uuid::new_v4())
    } else {
        cleaned.to_string()
    }
}

/// The local directory uploads are written to
#[derive(Debug, Clone)]
pub struct UploadDir {
    root: PathBuf,
}

impl UploadDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes `bytes` under the sanitized `file_name`, replacing any existing file
    pub async fn save(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, StorageError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| StorageError::Io {
                path: self.root.clone(),
                source,
            })?;

        let path = self.root.join(sanitize_file_name(file_name));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| StorageError::Io {
                path: path.clone(),
                source,
            })?;

        debug!(path = %path.display(), bytes = bytes.len(), "Saved upload");
        Ok(path)
    }

    /// Reads a saved file back as text, replacing invalid UTF-8
    pub async fn read_text(&self, path: &Path) -> Result<String, StorageError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| StorageError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Destination for raw upload bytes outside the local disk
#[async_trait]
pub trait ObjectSink: Send + Sync {
    /// Stores `bytes` under `key` and returns the object's public URL
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str)
        -> Result<String, StorageError>;
}

/// Uploads objects to an S3 bucket, or any S3-compatible store when an endpoint is set
#[derive(Debug, Clone)]
pub struct S3Sink {
    client: Client,
    bucket: String,
    region: String,
    endpoint: Option<String>,
}

impl S3Sink {
    /// Builds a sink from a complete [`StorageConfig`].
    ///
    /// The remaining SDK settings (retries, timeouts) come from the usual AWS
    /// environment and profile files.
    pub async fn from_config(config: &StorageConfig) -> Result<Self, StorageError> {
        let required = |field: &Option<String>, name: &str| {
            field
                .clone()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| StorageError::Config(format!("{} is required", name)))
        };
        let bucket = required(&config.bucket, "bucket")?;
        let region = required(&config.region, "region")?;
        let access_key_id = required(&config.access_key_id, "access_key_id")?;
        let secret_access_key = required(&config.secret_access_key, "secret_access_key")?;
        let endpoint = config
            .endpoint
            .as_deref()
            .filter(|v| !v.is_empty())
            .map(|v| v.trim_end_matches('/').to_string());

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.clone()))
            .credentials_provider(Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                "chatlens-config",
            ));
        if let Some(endpoint) = &endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        // Custom endpoints (MinIO, R2, localstack) rarely support virtual-hosted buckets
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(endpoint.is_some())
            .build();

        Ok(Self {
            client: Client::from_conf(s3_config),
            bucket,
            region,
            endpoint,
        })
    }

    /// Public URL of `key`: virtual-hosted style on AWS, path style on custom endpoints
    pub fn object_url(&self, key: &str) -> String {
        let encoded = urlencoding::encode(key);
        match &self.endpoint {
            Some(endpoint) => format!("{}/{}/{}", endpoint, self.bucket, encoded),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, encoded
            ),
        }
    }
}

#[async_trait]
impl ObjectSink for S3Sink {
    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes.to_vec()))
            .send()
            .await
            .map_err(|e| StorageError::Put {
                key: key.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        info!(bucket = %self.bucket, key, bytes = bytes.len(), "Stored object");
        Ok(self.object_url(key))
    }
}
