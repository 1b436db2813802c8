use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::core::config::{ImportSettings, PaypayConfig, RuntimeConfig};
use crate::core::error::{AppError, Result};
use crate::features::import_payin_file::key_filter::KeyFilter;
use crate::features::import_payin_file::zip_import_task::ZipImportTask;
use crate::features::payin_files::{PayinFileRepository, PaypayRecordRepository};
use crate::modules::storage::{stream_keys, ObjectStorage};
use crate::shared::constants::IMPORT_FILE_EXTENSIONS;
use crate::shared::worker_pool::{PoolReport, WorkerPool};

/// Result of one import run
#[derive(Debug, Clone, Copy)]
pub struct ImportReport {
    /// Keys the listing produced; `None` when listing broke off midway
    pub listed: Option<usize>,
    pub pool: PoolReport,
}

/// One import run: stream every staged key, keep the settlement zips and
/// import them
pub struct ImportPayinFileJob {
    storage: Arc<dyn ObjectStorage>,
    files: Arc<dyn PayinFileRepository>,
    records: Arc<dyn PaypayRecordRepository>,
    paypay: PaypayConfig,
    item_timeout: Option<Duration>,
}

impl ImportPayinFileJob {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        files: Arc<dyn PayinFileRepository>,
        records: Arc<dyn PaypayRecordRepository>,
        paypay: PaypayConfig,
        runtime: &RuntimeConfig,
    ) -> Self {
        Self {
            storage,
            files,
            records,
            paypay,
            item_timeout: runtime.item_timeout,
        }
    }

    pub async fn run(&self, settings: &ImportSettings, cancel: CancellationToken) -> Result<ImportReport> {
        let filter = KeyFilter::new(self.paypay.target_folders(), IMPORT_FILE_EXTENSIONS);
        tracing::info!("Importing zips under {:?}", filter.folders());

        let prefix = match self.paypay.storage_root.as_str() {
            "" => String::new(),
            root => format!("{}/", root),
        };
        let (keys, lister_handle) = stream_keys(
            Arc::clone(&self.storage),
            prefix,
            settings.page_size,
            cancel.clone(),
        );

        let task = Arc::new(ZipImportTask::new(
            Arc::clone(&self.storage),
            Arc::clone(&self.files),
            Arc::clone(&self.records),
            self.paypay.clone(),
        ));

        let pool = WorkerPool::new("import_payin_file", settings.readers)
            .with_item_timeout(self.item_timeout);
        let report = pool
            .process_filtered_items(
                &cancel,
                keys,
                move |key: &String| filter.matches(key),
                move |key, cancel| {
                    let task = Arc::clone(&task);
                    async move { task.process(key, &cancel).await }
                },
            )
            .await;

        let listed = match lister_handle.await {
            Ok(Ok(count)) => Some(count),
            Ok(Err(e)) => {
                tracing::error!("Object listing ended early: {}", e);
                None
            }
            Err(e) => return Err(AppError::Internal(format!("key lister panicked: {}", e))),
        };

        Ok(ImportReport {
            listed,
            pool: report,
        })
    }
}
