//! Storage module for staged settlement files
//!
//! Provides the `ObjectStorage` seam used by the batch jobs and its
//! MinIO/S3-compatible implementation.

mod key_stream;
mod minio_client;

use async_trait::async_trait;
use std::path::Path;

use crate::core::error::Result;

pub use key_stream::stream_keys;
pub use minio_client::{content_type_for, MinIOClient};

/// One page of an object listing
#[derive(Debug, Clone, Default)]
pub struct KeyPage {
    pub keys: Vec<String>,
    /// Continuation token for the next page; `None` on the last page
    pub next_token: Option<String>,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload the file at `local_path` under `key`
    async fn upload_file(&self, key: &str, local_path: &Path) -> Result<()>;

    /// List one page of keys under `prefix`
    async fn list_keys_page(
        &self,
        prefix: &str,
        continuation_token: Option<String>,
        max_keys: usize,
    ) -> Result<KeyPage>;

    /// Download the whole object into memory
    async fn download(&self, key: &str) -> Result<Vec<u8>>;
}
