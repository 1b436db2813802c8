//! MinIO/S3-compatible storage client
//!
//! Stages settlement files fetched from the provider and serves them back
//! to the import job. Uses rust-s3 crate for lightweight S3 operations.

use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, BucketConfiguration, Region};
use std::path::Path;
use tracing::{debug, info, warn};

use super::{KeyPage, ObjectStorage};
use crate::core::config::MinIOConfig;
use crate::core::error::{AppError, Result};
use crate::shared::constants::extension_of;

/// MinIO/S3-compatible storage client
pub struct MinIOClient {
    bucket: Box<Bucket>,
    region: Region,
    credentials: Credentials,
    endpoint: String,
}

impl MinIOClient {
    /// Create a new MinIO client from configuration
    pub fn new(config: MinIOConfig) -> Result<Self> {
        let credentials = Credentials::new(
            Some(&config.access_key),
            Some(&config.secret_key),
            None,
            None,
            None,
        )
        .map_err(|e| AppError::Storage(format!("Failed to create MinIO credentials: {}", e)))?;

        let region = Region::Custom {
            region: config.region.clone(),
            endpoint: config.endpoint.clone(),
        };

        let mut bucket = Bucket::new(&config.bucket, region.clone(), credentials.clone())
            .map_err(|e| AppError::Storage(format!("Failed to create MinIO bucket: {}", e)))?;

        // Use path-style URLs for MinIO (http://endpoint/bucket instead of http://bucket.endpoint)
        bucket.set_path_style();

        info!(
            "MinIO client initialized for endpoint: {}, bucket: {}",
            config.endpoint,
            bucket.name()
        );

        Ok(Self {
            bucket,
            region,
            credentials,
            endpoint: config.endpoint,
        })
    }

    /// Ensure the bucket exists, create if not
    pub async fn ensure_bucket_exists(&self) -> Result<()> {
        match self.create_bucket().await {
            Ok(_) => {
                info!("Bucket '{}' created successfully", self.bucket.name());
                Ok(())
            }
            Err(e) => {
                let error_str = e.to_string();
                if error_str.contains("BucketAlreadyOwnedByYou")
                    || error_str.contains("BucketAlreadyExists")
                    || error_str.contains("already own it")
                {
                    debug!("Bucket '{}' already exists", self.bucket.name());
                } else {
                    warn!(
                        "Could not create bucket '{}': {}. Assuming it exists.",
                        self.bucket.name(),
                        e
                    );
                }
                Ok(())
            }
        }
    }

    async fn create_bucket(&self) -> Result<()> {
        Bucket::create_with_path_style(
            &self.bucket.name(),
            self.region.clone(),
            self.credentials.clone(),
            BucketConfiguration::default(),
        )
        .await
        .map_err(|e| {
            AppError::Storage(format!(
                "Failed to create bucket '{}': {}",
                self.bucket.name(),
                e
            ))
        })?;

        Ok(())
    }

    /// Get the bucket name
    pub fn bucket_name(&self) -> String {
        self.bucket.name()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// MIME type recorded on uploaded settlement files
pub fn content_type_for(key: &str) -> &'static str {
    match extension_of(key).as_deref() {
        Some("csv") => "text/csv",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl ObjectStorage for MinIOClient {
    async fn upload_file(&self, key: &str, local_path: &Path) -> Result<()> {
        let data = tokio::fs::read(local_path).await?;
        let size = data.len();

        self.bucket
            .put_object_with_content_type(key, &data, content_type_for(key))
            .await
            .map_err(|e| AppError::Storage(format!("Failed to upload file '{}': {}", key, e)))?;

        debug!(
            "Uploaded file '{}' ({} bytes) to bucket '{}'",
            key,
            size,
            self.bucket.name()
        );
        Ok(())
    }

    async fn list_keys_page(
        &self,
        prefix: &str,
        continuation_token: Option<String>,
        max_keys: usize,
    ) -> Result<KeyPage> {
        let (result, _status) = self
            .bucket
            .list_page(
                prefix.to_string(),
                None,
                continuation_token,
                None,
                Some(max_keys),
            )
            .await
            .map_err(|e| {
                AppError::Storage(format!("Failed to list objects under '{}': {}", prefix, e))
            })?;

        let next_token = if result.is_truncated {
            result.next_continuation_token
        } else {
            None
        };

        Ok(KeyPage {
            keys: result.contents.into_iter().map(|object| object.key).collect(),
            next_token,
        })
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>> {
        let mut buffer: Vec<u8> = Vec::new();
        let status = self
            .bucket
            .get_object_to_writer(key, &mut buffer)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to download file '{}': {}", key, e)))?;

        if status == 404 {
            return Err(AppError::NotFound(format!("object '{}'", key)));
        }
        if !(200..300).contains(&status) {
            return Err(AppError::Storage(format!(
                "Failed to download file '{}': status {}",
                key, status
            )));
        }

        debug!(
            "Downloaded file '{}' ({} bytes) from bucket '{}'",
            key,
            buffer.len(),
            self.bucket.name()
        );
        Ok(buffer)
    }
}
