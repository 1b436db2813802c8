//! In-memory stand-ins for the database, object storage and settlement host

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::core::error::{AppError, Result};
use crate::features::payin_files::models::{
    CreatePayinFile, CreatePayinFileGroup, ImportedCounts, PayinFile, PayinFileGroup,
    PayinFileStatus, PayinImportBatch, PaypayPayinDetail, PaypayPayinSummary,
    PaypayPayinTransaction, StatusField,
};
use crate::features::payin_files::repositories::{
    PayinFileGroupRepository, PayinFileRepository, PaypayRecordRepository,
};
use crate::modules::remote::RemoteFileSource;
use crate::modules::storage::{KeyPage, ObjectStorage};

// =============================================================================
// DATABASE
// =============================================================================

#[derive(Default)]
pub struct InMemoryPayinFileRepository {
    files: Mutex<Vec<PayinFile>>,
    status_updates: Mutex<Vec<(i64, StatusField, PayinFileStatus)>>,
    /// `update_status` fails while set, as a dropped connection would
    pub fail_status_updates: AtomicBool,
}

impl InMemoryPayinFileRepository {
    pub fn all(&self) -> Vec<PayinFile> {
        self.files.lock().unwrap().clone()
    }

    pub fn by_name(&self, file_name: &str) -> Option<PayinFile> {
        self.all().into_iter().find(|f| f.file_name == file_name)
    }

    pub fn status_updates(&self) -> Vec<(i64, StatusField, PayinFileStatus)> {
        self.status_updates.lock().unwrap().clone()
    }

    /// Seed a row directly, bypassing `create`
    pub fn insert(&self, data: CreatePayinFile, download_status: PayinFileStatus) -> PayinFile {
        let mut files = self.files.lock().unwrap();
        let file = PayinFile {
            id: files.len() as i64 + 1,
            provider_id: data.provider_id,
            file_group_id: data.file_group_id,
            file_name: data.file_name,
            content_key: data.content_key,
            file_type: data.file_type,
            has_data_record: false,
            added_manually: data.added_manually,
            download_status,
            upload_status: download_status,
            import_status: PayinFileStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        files.push(file.clone());
        file
    }

    /// The payin_files half of a committed import
    fn mark_imported(&self, id: i64, has_data_record: bool) -> Result<()> {
        let mut files = self.files.lock().unwrap();
        let file = files
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| AppError::NotFound(format!("payin file {}", id)))?;

        file.import_status = PayinFileStatus::Success;
        file.has_data_record |= has_data_record;
        file.updated_at = Utc::now();
        self.status_updates
            .lock()
            .unwrap()
            .push((id, StatusField::Import, PayinFileStatus::Success));
        Ok(())
    }
}

#[async_trait]
impl PayinFileRepository for InMemoryPayinFileRepository {
    async fn create(&self, data: &CreatePayinFile) -> Result<PayinFile> {
        if self.by_name(&data.file_name).is_some() {
            return Err(AppError::Internal(format!(
                "duplicate file_name {}",
                data.file_name
            )));
        }
        Ok(self.insert(data.clone(), PayinFileStatus::Pending))
    }

    async fn update_status(
        &self,
        id: i64,
        field: StatusField,
        status: PayinFileStatus,
    ) -> Result<()> {
        if self.fail_status_updates.load(Ordering::SeqCst) {
            return Err(AppError::Internal(format!(
                "status update of payin file {} lost",
                id
            )));
        }
        let mut files = self.files.lock().unwrap();
        let file = files
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| AppError::NotFound(format!("payin file {}", id)))?;

        match field {
            StatusField::Download => file.download_status = status,
            StatusField::Upload => file.upload_status = status,
            StatusField::Import => file.import_status = status,
        }
        file.updated_at = Utc::now();
        self.status_updates
            .lock()
            .unwrap()
            .push((id, field, status));
        Ok(())
    }

    async fn find_by_filename(&self, file_name: &str) -> Result<Option<PayinFile>> {
        Ok(self.by_name(file_name))
    }

    async fn get_by_id(&self, id: i64) -> Result<PayinFile> {
        self.all()
            .into_iter()
            .find(|f| f.id == id)
            .ok_or_else(|| AppError::NotFound(format!("payin file {}", id)))
    }
}

#[derive(Default)]
pub struct InMemoryPayinFileGroupRepository {
    groups: Mutex<Vec<PayinFileGroup>>,
}

impl InMemoryPayinFileGroupRepository {
    pub fn all(&self) -> Vec<PayinFileGroup> {
        self.groups.lock().unwrap().clone()
    }
}

#[async_trait]
impl PayinFileGroupRepository for InMemoryPayinFileGroupRepository {
    async fn create(&self, data: &CreatePayinFileGroup) -> Result<PayinFileGroup> {
        let mut groups = self.groups.lock().unwrap();
        let group = PayinFileGroup {
            id: groups.len() as i64 + 1,
            group_name: data.group_name.clone(),
            provider_id: data.provider_id,
            import_date: data.import_date,
            imported_at: None,
            created_at: Utc::now(),
        };
        groups.push(group.clone());
        Ok(group)
    }
}

/// Fact tables sharing a "transaction" with the payin_files fake
pub struct InMemoryPaypayRecordRepository {
    files: Arc<InMemoryPayinFileRepository>,
    summaries: Mutex<Vec<PaypayPayinSummary>>,
    details: Mutex<Vec<PaypayPayinDetail>>,
    transactions: Mutex<Vec<PaypayPayinTransaction>>,
    /// Commits touching this payin file id fail, as a rejected INSERT would
    pub fail_for_file: Mutex<Option<i64>>,
}

impl InMemoryPaypayRecordRepository {
    pub fn new(files: Arc<InMemoryPayinFileRepository>) -> Self {
        Self {
            files,
            summaries: Mutex::default(),
            details: Mutex::default(),
            transactions: Mutex::default(),
            fail_for_file: Mutex::default(),
        }
    }

    pub fn summaries(&self) -> Vec<PaypayPayinSummary> {
        self.summaries.lock().unwrap().clone()
    }

    pub fn details(&self) -> Vec<PaypayPayinDetail> {
        self.details.lock().unwrap().clone()
    }

    pub fn transactions(&self) -> Vec<PaypayPayinTransaction> {
        self.transactions.lock().unwrap().clone()
    }

    pub fn rows_for_file(&self, payin_file_id: i64) -> usize {
        self.summaries()
            .iter()
            .filter(|r| r.payin_file_id == payin_file_id)
            .count()
            + self
                .details()
                .iter()
                .filter(|r| r.payin_file_id == payin_file_id)
                .count()
            + self
                .transactions()
                .iter()
                .filter(|r| r.payin_file_id == payin_file_id)
                .count()
    }
}

#[async_trait]
impl PaypayRecordRepository for InMemoryPaypayRecordRepository {
    async fn commit(&self, batch: PayinImportBatch) -> Result<ImportedCounts> {
        if *self.fail_for_file.lock().unwrap() == Some(batch.payin_file_id) {
            return Err(AppError::Internal(format!(
                "insert rejected for payin file {}",
                batch.payin_file_id
            )));
        }

        self.files
            .mark_imported(batch.payin_file_id, batch.row_count() > 0)?;

        let counts = ImportedCounts {
            summaries: batch.summaries.len() as u64,
            details: batch.details.len() as u64,
            transactions: batch.transactions.len() as u64,
        };
        self.summaries.lock().unwrap().extend(batch.summaries);
        self.details.lock().unwrap().extend(batch.details);
        self.transactions.lock().unwrap().extend(batch.transactions);
        Ok(counts)
    }
}

// =============================================================================
// OBJECT STORAGE
// =============================================================================

#[derive(Default)]
pub struct InMemoryObjectStorage {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    list_calls: AtomicUsize,
    download_calls: AtomicUsize,
    pub fail_uploads: AtomicBool,
}

impl InMemoryObjectStorage {
    pub fn put(&self, key: &str, data: Vec<u8>) {
        self.objects.lock().unwrap().insert(key.to_string(), data);
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    async fn upload_file(&self, key: &str, local_path: &Path) -> Result<()> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(AppError::Storage(format!("upload of '{}' refused", key)));
        }
        let data = tokio::fs::read(local_path).await?;
        self.put(key, data);
        Ok(())
    }

    async fn list_keys_page(
        &self,
        prefix: &str,
        continuation_token: Option<String>,
        max_keys: usize,
    ) -> Result<KeyPage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let start: usize = continuation_token
            .map(|t| t.parse().unwrap_or(0))
            .unwrap_or(0);
        let matching: Vec<String> = self
            .keys()
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect();
        let end = (start + max_keys).min(matching.len());

        Ok(KeyPage {
            keys: matching[start.min(end)..end].to_vec(),
            next_token: (end < matching.len()).then(|| end.to_string()),
        })
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        self.get(key)
            .ok_or_else(|| AppError::NotFound(format!("object '{}'", key)))
    }
}

// =============================================================================
// SETTLEMENT HOST
// =============================================================================

/// Remote host whose listing returns every stored path, so callers must do
/// their own extension filtering
#[derive(Default)]
pub struct FakeRemoteSource {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    downloads: Mutex<Vec<String>>,
    pub fail_listing_from_offset: Mutex<Option<usize>>,
    pub fail_downloads: Mutex<HashSet<String>>,
}

impl FakeRemoteSource {
    pub fn with_files(paths: &[&str]) -> Self {
        let source = Self::default();
        for path in paths {
            source.add(path, format!("content of {}", path).into_bytes());
        }
        source
    }

    pub fn add(&self, path: &str, content: Vec<u8>) {
        self.files.lock().unwrap().insert(path.to_string(), content);
    }

    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteFileSource for FakeRemoteSource {
    async fn list_page(&self, root_dir: &str, offset: usize, limit: usize) -> Result<Vec<String>> {
        if let Some(failing) = *self.fail_listing_from_offset.lock().unwrap() {
            if offset >= failing {
                return Err(AppError::RemoteList("connection reset".to_string()));
            }
        }
        Ok(self
            .files
            .lock()
            .unwrap()
            .keys()
            .filter(|p| p.starts_with(root_dir))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        self.downloads
            .lock()
            .unwrap()
            .push(remote_path.to_string());

        if self.fail_downloads.lock().unwrap().contains(remote_path) {
            return Err(AppError::RemoteTransfer(format!(
                "transfer of {} failed",
                remote_path
            )));
        }

        let content = self
            .files
            .lock()
            .unwrap()
            .get(remote_path)
            .cloned()
            .ok_or_else(|| AppError::RemoteTransfer(format!("no such file {}", remote_path)))?;

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local_path, content).await?;
        Ok(())
    }
}
