use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::error::Result;
use crate::modules::remote::RemoteFileSource;
use crate::shared::constants::{base_name, extension_of, REMOTE_FILE_EXTENSIONS, STREAM_BUFFER_PAGES};

/// A remote settlement file and where it is staged locally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileInfo {
    pub remote_path: String,
    pub local_path: PathBuf,
}

impl RemoteFileInfo {
    /// Business key of the file
    pub fn file_name(&self) -> &str {
        base_name(&self.remote_path)
    }
}

impl fmt::Display for RemoteFileInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.remote_path)
    }
}

/// Pages through the settlement host and forwards the files of one date
pub struct RemoteLister {
    source: Arc<dyn RemoteFileSource>,
    root_dir: String,
    page_size: usize,
    date_token: String,
    staging_dir: PathBuf,
}

impl RemoteLister {
    pub fn new(
        source: Arc<dyn RemoteFileSource>,
        root_dir: impl Into<String>,
        page_size: usize,
        date_token: impl Into<String>,
        staging_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source,
            root_dir: root_dir.into(),
            page_size: page_size.max(1),
            date_token: date_token.into(),
            staging_dir: staging_dir.into(),
        }
    }

    /// Whether a listed path should be fetched
    pub fn accepts(&self, remote_path: &str) -> bool {
        let name = base_name(remote_path);
        let extension_ok = extension_of(name)
            .map(|ext| REMOTE_FILE_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false);
        extension_ok && name.contains(&self.date_token)
    }

    fn to_info(&self, remote_path: String) -> RemoteFileInfo {
        let local_path = local_path_for(&self.staging_dir, &remote_path);
        RemoteFileInfo {
            remote_path,
            local_path,
        }
    }

    /// Start listing.
    ///
    /// The first page is fetched before returning, so an unreachable host
    /// fails here with nothing produced. Later pages are fetched by a single
    /// producer task; a failure there ends the stream, keeping what was
    /// already sent. The handle resolves to the number of files forwarded.
    pub async fn start(
        self,
        cancel: CancellationToken,
    ) -> Result<(mpsc::Receiver<RemoteFileInfo>, JoinHandle<Result<usize>>)> {
        let first_page = self.source.list_page(&self.root_dir, 0, self.page_size).await?;
        tracing::debug!(
            "First listing page of '{}' returned {} paths",
            self.root_dir,
            first_page.len()
        );

        let (tx, rx) = mpsc::channel(self.page_size * STREAM_BUFFER_PAGES);

        let handle = tokio::spawn(async move {
            let mut page = first_page;
            let mut offset = 0usize;
            let mut listed = 0usize;
            let mut forwarded = 0usize;

            loop {
                let last_page = page.len() < self.page_size;
                offset += page.len();
                listed += page.len();

                for remote_path in page {
                    if !self.accepts(&remote_path) {
                        continue;
                    }
                    if tx.send(self.to_info(remote_path)).await.is_err() {
                        return Ok(forwarded);
                    }
                    forwarded += 1;
                }

                if last_page || cancel.is_cancelled() {
                    break;
                }

                page = match self
                    .source
                    .list_page(&self.root_dir, offset, self.page_size)
                    .await
                {
                    Ok(page) => page,
                    Err(e) => {
                        tracing::error!(
                            "Listing '{}' failed at offset {} after forwarding {} files: {}",
                            self.root_dir,
                            offset,
                            forwarded,
                            e
                        );
                        return Err(e);
                    }
                };
            }

            tracing::info!(
                "Remote listing of '{}' finished: {} listed, {} match date {}",
                self.root_dir,
                listed,
                forwarded,
                self.date_token
            );
            Ok(forwarded)
        });

        Ok((rx, handle))
    }
}

/// Staging path of a remote file, flattened to its base name
fn local_path_for(staging_dir: &Path, remote_path: &str) -> PathBuf {
    staging_dir.join(base_name(remote_path))
}
