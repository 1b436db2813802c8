use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::core::config::PaypayConfig;
use crate::core::error::{AppError, Result};
use crate::features::fetch_payin_file::remote_lister::RemoteFileInfo;
use crate::features::payin_files::models::{
    CreatePayinFile, PayinFile, PayinFileStatus, PayinFileType, StatusField,
};
use crate::features::payin_files::PayinFileRepository;
use crate::modules::remote::RemoteFileSource;
use crate::modules::storage::ObjectStorage;

/// Moves one settlement file from the provider host into object storage
pub struct DownloadUploadTask {
    remote: Arc<dyn RemoteFileSource>,
    storage: Arc<dyn ObjectStorage>,
    files: Arc<dyn PayinFileRepository>,
    paypay: PaypayConfig,
}

impl DownloadUploadTask {
    pub fn new(
        remote: Arc<dyn RemoteFileSource>,
        storage: Arc<dyn ObjectStorage>,
        files: Arc<dyn PayinFileRepository>,
        paypay: PaypayConfig,
    ) -> Self {
        Self {
            remote,
            storage,
            files,
            paypay,
        }
    }

    /// Fetch one file. Cancellation is honoured only before the transfer
    /// starts; a started file always runs to its final status.
    pub async fn process(
        &self,
        info: RemoteFileInfo,
        file_group_id: i64,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let file_name = info.file_name();
        if file_name.is_empty() {
            return Err(AppError::Validation(format!(
                "remote path '{}' has no file name",
                info.remote_path
            )));
        }

        if cancel.is_cancelled() {
            return Err(AppError::Cancelled(format!(
                "{} was not started",
                info.remote_path
            )));
        }

        let file = match self.files.find_by_filename(file_name).await? {
            Some(existing) if existing.is_downloaded() => {
                tracing::info!(
                    "Skipping {}: already downloaded as payin file {}",
                    file_name,
                    existing.id
                );
                return Ok(());
            }
            Some(existing) => existing,
            None => self.register(file_name, file_group_id).await?,
        };

        if let Err(e) = self.remote.download(&info.remote_path, &info.local_path).await {
            self.record_failure(&file, StatusField::Download).await;
            remove_local_file(&info.local_path).await;
            return Err(e);
        }

        let outcome = self.store(&file, &info.local_path).await;
        remove_local_file(&info.local_path).await;
        outcome
    }

    async fn register(&self, file_name: &str, file_group_id: i64) -> Result<PayinFile> {
        let data = CreatePayinFile {
            provider_id: self.paypay.provider_id,
            file_group_id: Some(file_group_id),
            file_name: file_name.to_string(),
            content_key: self.paypay.upload_key(file_name),
            file_type: PayinFileType::from_file_name(file_name),
            added_manually: false,
        };

        let file = self.files.create(&data).await?;
        tracing::debug!("Registered payin file {} as {}", file_name, file.id);
        Ok(file)
    }

    async fn store(&self, file: &PayinFile, local_path: &Path) -> Result<()> {
        self.files
            .update_status(file.id, StatusField::Download, PayinFileStatus::Success)
            .await?;

        if let Err(e) = self.storage.upload_file(&file.content_key, local_path).await {
            self.record_failure(file, StatusField::Upload).await;
            return Err(e);
        }

        self.files
            .update_status(file.id, StatusField::Upload, PayinFileStatus::Success)
            .await?;

        tracing::info!(
            "Fetched {} into '{}'",
            file.file_name,
            file.content_key
        );
        Ok(())
    }

    /// Mark `field` failed; the original error is what the caller reports
    async fn record_failure(&self, file: &PayinFile, field: StatusField) {
        if let Err(e) = self
            .files
            .update_status(file.id, field, PayinFileStatus::Failed)
            .await
        {
            tracing::error!(
                "Could not mark {} of {} as failed: {}",
                field.column(),
                file.file_name,
                e
            );
        }
    }
}

async fn remove_local_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove staged file {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::test_helpers::{
        FakeRemoteSource, InMemoryObjectStorage, InMemoryPayinFileRepository,
    };
    use std::sync::atomic::Ordering;

    const REMOTE_PATH: &str = "/out/payin_summary_20240105.zip";
    const FILE_NAME: &str = "payin_summary_20240105.zip";

    struct Fixture {
        remote: Arc<FakeRemoteSource>,
        storage: Arc<InMemoryObjectStorage>,
        files: Arc<InMemoryPayinFileRepository>,
        task: DownloadUploadTask,
        staging: tempfile::TempDir,
    }

    fn paypay() -> PaypayConfig {
        PaypayConfig {
            provider_id: 7,
            storage_root: "paypay".to_string(),
            payin_folders: vec!["payin".to_string()],
            upload_folder: "payin".to_string(),
            summary_detail_dir: "summary_detail".to_string(),
            transaction_dir: "transaction_report".to_string(),
        }
    }

    fn fixture() -> Fixture {
        let remote = Arc::new(FakeRemoteSource::with_files(&[REMOTE_PATH]));
        let storage = Arc::new(InMemoryObjectStorage::default());
        let files = Arc::new(InMemoryPayinFileRepository::default());
        let task = DownloadUploadTask::new(
            remote.clone(),
            storage.clone(),
            files.clone(),
            paypay(),
        );
        Fixture {
            remote,
            storage,
            files,
            task,
            staging: tempfile::tempdir().unwrap(),
        }
    }

    fn info(fx: &Fixture) -> RemoteFileInfo {
        RemoteFileInfo {
            remote_path: REMOTE_PATH.to_string(),
            local_path: fx.staging.path().join(FILE_NAME),
        }
    }

    fn seed(fx: &Fixture, download_status: PayinFileStatus) -> PayinFile {
        fx.files.insert(
            CreatePayinFile {
                provider_id: 7,
                file_group_id: Some(1),
                file_name: FILE_NAME.to_string(),
                content_key: format!("paypay/payin/{}", FILE_NAME),
                file_type: PayinFileType::Summary,
                added_manually: false,
            },
            download_status,
        )
    }

    #[tokio::test]
    async fn test_new_file_is_registered_downloaded_and_uploaded() {
        let fx = fixture();
        let info = info(&fx);

        fx.task.process(info.clone(), 42, &CancellationToken::new()).await.unwrap();

        let file = fx.files.by_name(FILE_NAME).unwrap();
        assert_eq!(file.file_group_id, Some(42));
        assert_eq!(file.provider_id, 7);
        assert_eq!(file.content_key, "paypay/payin/payin_summary_20240105.zip");
        assert_eq!(file.download_status, PayinFileStatus::Success);
        assert_eq!(file.upload_status, PayinFileStatus::Success);
        assert_eq!(file.import_status, PayinFileStatus::Pending);

        assert_eq!(
            fx.storage.get(&file.content_key).unwrap(),
            format!("content of {}", REMOTE_PATH).into_bytes()
        );
        assert!(!info.local_path.exists());
    }

    #[tokio::test]
    async fn test_downloaded_file_is_skipped_on_rerun() {
        let fx = fixture();
        seed(&fx, PayinFileStatus::Success);

        fx.task.process(info(&fx), 99, &CancellationToken::new()).await.unwrap();

        assert!(fx.remote.downloads().is_empty());
        assert!(fx.storage.keys().is_empty());
        assert!(fx.files.status_updates().is_empty());
        assert_eq!(fx.files.all().len(), 1);
    }

    #[tokio::test]
    async fn test_rerun_completes_twice_without_second_download() {
        let fx = fixture();

        fx.task.process(info(&fx), 1, &CancellationToken::new()).await.unwrap();
        fx.task.process(info(&fx), 2, &CancellationToken::new()).await.unwrap();

        assert_eq!(fx.remote.downloads().len(), 1);
        assert_eq!(fx.files.all().len(), 1);
        assert_eq!(fx.files.by_name(FILE_NAME).unwrap().file_group_id, Some(1));
    }

    #[tokio::test]
    async fn test_previously_failed_download_is_retried_on_existing_record() {
        let fx = fixture();
        let seeded = seed(&fx, PayinFileStatus::Failed);

        fx.task.process(info(&fx), 3, &CancellationToken::new()).await.unwrap();

        assert_eq!(fx.files.all().len(), 1);
        let file = fx.files.by_name(FILE_NAME).unwrap();
        assert_eq!(file.id, seeded.id);
        assert_eq!(file.download_status, PayinFileStatus::Success);
        assert_eq!(file.upload_status, PayinFileStatus::Success);
    }

    #[tokio::test]
    async fn test_download_failure_marks_download_failed() {
        let fx = fixture();
        fx.remote
            .fail_downloads
            .lock()
            .unwrap()
            .insert(REMOTE_PATH.to_string());

        let err = fx
            .task
            .process(info(&fx), 1, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RemoteTransfer(_)));

        let file = fx.files.by_name(FILE_NAME).unwrap();
        assert_eq!(file.download_status, PayinFileStatus::Failed);
        assert_eq!(file.upload_status, PayinFileStatus::Pending);
        assert!(fx.storage.keys().is_empty());
    }

    #[tokio::test]
    async fn test_upload_failure_marks_upload_failed_and_cleans_up() {
        let fx = fixture();
        fx.storage.fail_uploads.store(true, Ordering::SeqCst);
        let info = info(&fx);

        let err = fx
            .task
            .process(info.clone(), 1, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));

        let file = fx.files.by_name(FILE_NAME).unwrap();
        assert_eq!(file.download_status, PayinFileStatus::Success);
        assert_eq!(file.upload_status, PayinFileStatus::Failed);
        assert!(!info.local_path.exists());
    }

    #[tokio::test]
    async fn test_cancelled_batch_does_not_start_new_transfers() {
        let fx = fixture();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = fx.task.process(info(&fx), 1, &cancel).await.unwrap_err();
        assert!(matches!(err, AppError::Cancelled(_)));

        assert!(fx.remote.downloads().is_empty());
        assert!(fx.files.all().is_empty());
    }
}
