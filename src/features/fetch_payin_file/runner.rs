use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::config::{FetchSettings, PaypayConfig, RuntimeConfig};
use crate::core::error::{AppError, Result};
use crate::features::fetch_payin_file::download_task::DownloadUploadTask;
use crate::features::fetch_payin_file::remote_lister::RemoteLister;
use crate::features::payin_files::models::{CreatePayinFileGroup, PayinFileGroup};
use crate::features::payin_files::{PayinFileGroupRepository, PayinFileRepository};
use crate::modules::remote::RemoteFileSource;
use crate::modules::storage::ObjectStorage;
use crate::shared::worker_pool::{PoolReport, WorkerPool};

/// Result of one fetch run
#[derive(Debug, Clone)]
pub struct FetchReport {
    pub group: PayinFileGroup,
    /// Files the lister forwarded; `None` when listing broke off midway
    pub listed: Option<usize>,
    pub pool: PoolReport,
}

/// One fetch run: list the settlement host, then download and stage every
/// file of the target date
pub struct FetchPayinFileJob {
    remote: Arc<dyn RemoteFileSource>,
    storage: Arc<dyn ObjectStorage>,
    files: Arc<dyn PayinFileRepository>,
    groups: Arc<dyn PayinFileGroupRepository>,
    paypay: PaypayConfig,
    remote_root: String,
    tmp_dir: PathBuf,
    item_timeout: Option<Duration>,
}

impl FetchPayinFileJob {
    pub fn new(
        remote: Arc<dyn RemoteFileSource>,
        storage: Arc<dyn ObjectStorage>,
        files: Arc<dyn PayinFileRepository>,
        groups: Arc<dyn PayinFileGroupRepository>,
        paypay: PaypayConfig,
        remote_root: impl Into<String>,
        runtime: &RuntimeConfig,
    ) -> Self {
        Self {
            remote,
            storage,
            files,
            groups,
            paypay,
            remote_root: remote_root.into(),
            tmp_dir: runtime.tmp_dir.clone(),
            item_timeout: runtime.item_timeout,
        }
    }

    pub async fn run(&self, settings: &FetchSettings, cancel: CancellationToken) -> Result<FetchReport> {
        let date_token = settings.date_token();
        let group_name = format!("paypay-payin-{}-{}", date_token, Uuid::new_v4());

        let group = self
            .groups
            .create(&CreatePayinFileGroup {
                group_name: group_name.clone(),
                provider_id: self.paypay.provider_id,
                import_date: settings.target_date,
            })
            .await?;
        tracing::info!("Created file group {} ({})", group.group_name, group.id);

        let staging_dir = self.tmp_dir.join(&group_name);
        tokio::fs::create_dir_all(&staging_dir).await?;

        let outcome = self
            .fetch_into(&staging_dir, &group, settings, &date_token, cancel)
            .await;

        if let Err(e) = tokio::fs::remove_dir_all(&staging_dir).await {
            tracing::warn!(
                "Failed to remove staging dir {}: {}",
                staging_dir.display(),
                e
            );
        }

        let (listed, pool) = outcome?;
        Ok(FetchReport {
            group,
            listed,
            pool,
        })
    }

    async fn fetch_into(
        &self,
        staging_dir: &std::path::Path,
        group: &PayinFileGroup,
        settings: &FetchSettings,
        date_token: &str,
        cancel: CancellationToken,
    ) -> Result<(Option<usize>, PoolReport)> {
        let lister = RemoteLister::new(
            Arc::clone(&self.remote),
            self.remote_root.clone(),
            settings.page_size,
            date_token,
            staging_dir,
        );
        let (items, lister_handle) = lister.start(cancel.clone()).await?;

        let task = Arc::new(DownloadUploadTask::new(
            Arc::clone(&self.remote),
            Arc::clone(&self.storage),
            Arc::clone(&self.files),
            self.paypay.clone(),
        ));
        let group_id = group.id;

        let pool = WorkerPool::new("fetch_payin_file", settings.workers)
            .with_item_timeout(self.item_timeout);
        let report = pool
            .process_items(&cancel, items, move |info, cancel| {
                let task = Arc::clone(&task);
                async move { task.process(info, group_id, &cancel).await }
            })
            .await;

        let listed = match lister_handle.await {
            Ok(Ok(count)) => Some(count),
            Ok(Err(e)) => {
                tracing::error!("Remote listing ended early: {}", e);
                None
            }
            Err(e) => return Err(AppError::Internal(format!("lister task panicked: {}", e))),
        };

        Ok((listed, report))
    }
}
