//! S3-compatible asset store client.

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// A published asset: its public URL and the store-side handle needed
/// to delete it later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedAsset {
    /// Publicly addressable URL
    pub url: String,
    /// Object key within the store
    pub handle: String,
}

/// Durable asset store capability.
///
/// Each upload is independent; callers decide whether a failed upload
/// is fatal.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Upload a local file under `folder`, tagged with the owning
    /// story, returning its public URL and deletion handle.
    async fn upload(
        &self,
        local_path: &Path,
        folder: &str,
        story_id: &str,
    ) -> StorageResult<UploadedAsset>;

    /// Delete previously uploaded assets by handle. Returns the number
    /// of handles submitted for deletion.
    async fn delete_assets(&self, handles: &[String]) -> StorageResult<u32>;
}

/// Configuration for the S3-compatible store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// S3 API endpoint URL
    pub endpoint_url: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Region (usually "auto" for R2-style endpoints)
    pub region: String,
    /// Public base URL assets are served from
    pub public_base_url: String,
}

impl StoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("ASSET_STORE_ENDPOINT_URL")
                .map_err(|_| StorageError::config_error("ASSET_STORE_ENDPOINT_URL not set"))?,
            access_key_id: std::env::var("ASSET_STORE_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("ASSET_STORE_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("ASSET_STORE_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("ASSET_STORE_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("ASSET_STORE_BUCKET")
                .map_err(|_| StorageError::config_error("ASSET_STORE_BUCKET not set"))?,
            region: std::env::var("ASSET_STORE_REGION").unwrap_or_else(|_| "auto".to_string()),
            public_base_url: std::env::var("ASSET_STORE_PUBLIC_URL")
                .map_err(|_| StorageError::config_error("ASSET_STORE_PUBLIC_URL not set"))?,
        })
    }
}

/// Asset store backed by an S3-compatible bucket.
#[derive(Clone)]
pub struct S3AssetStore {
    client: Client,
    bucket: String,
    public_base_url: String,
}

impl S3AssetStore {
    /// Create a new store client from configuration.
    pub async fn new(config: StoreConfig) -> StorageResult<Self> {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "fabula",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> StorageResult<Self> {
        Self::new(StoreConfig::from_env()?).await
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }

    /// Check connectivity by performing a head bucket operation.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StorageError::AwsSdk(format!("store connectivity check failed: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl AssetStore for S3AssetStore {
    async fn upload(
        &self,
        local_path: &Path,
        folder: &str,
        story_id: &str,
    ) -> StorageResult<UploadedAsset> {
        let file_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StorageError::InvalidKey(local_path.display().to_string()))?;
        let key = format!("{}/{}", folder.trim_matches('/'), file_name);

        debug!("Uploading {} to {}", local_path.display(), key);

        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(body)
            .content_type(content_type_for(file_name))
            .tagging(format!("story_id={}", story_id))
            .send()
            .await
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("PreconditionFailed") || msg.contains("already exists") {
                    StorageError::AlreadyExists(key.clone())
                } else {
                    StorageError::upload_failed(msg)
                }
            })?;

        info!("Uploaded {} to {}", local_path.display(), key);
        Ok(UploadedAsset {
            url: self.public_url(&key),
            handle: key,
        })
    }

    async fn delete_assets(&self, handles: &[String]) -> StorageResult<u32> {
        if handles.is_empty() {
            return Ok(0);
        }

        debug!("Deleting {} objects", handles.len());

        let objects = handles
            .iter()
            .map(|k| {
                aws_sdk_s3::types::ObjectIdentifier::builder()
                    .key(k)
                    .build()
                    .map_err(|e| StorageError::InvalidKey(e.to_string()))
            })
            .collect::<StorageResult<Vec<_>>>()?;

        let delete = aws_sdk_s3::types::Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| StorageError::delete_failed(e.to_string()))?;

        self.client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| StorageError::delete_failed(e.to_string()))?;

        info!("Deleted {} objects", handles.len());
        Ok(handles.len() as u32)
    }
}

/// Content type from the file extension.
fn content_type_for(file_name: &str) -> &'static str {
    match file_name.rsplit('.').next().map(|e| e.to_ascii_lowercase()) {
        Some(ext) if ext == "png" => "image/png",
        Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg",
        Some(ext) if ext == "mp3" => "audio/mpeg",
        Some(ext) if ext == "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}
