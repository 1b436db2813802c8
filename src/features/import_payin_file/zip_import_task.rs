use std::io::{Cursor, Read};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use zip::ZipArchive;

use crate::core::config::PaypayConfig;
use crate::core::error::{AppError, Result};
use crate::features::import_payin_file::csv_reader::{read_with_header, CsvRow};
use crate::features::import_payin_file::multi_section::import_combined;
use crate::features::import_payin_file::row_parser::{parse_rows, parse_transaction, Section};
use crate::features::payin_files::models::{
    CreatePayinFile, ImportedCounts, PayinFile, PayinFileStatus, PayinFileType, PayinImportBatch,
    StatusField,
};
use crate::features::payin_files::{PayinFileRepository, PaypayRecordRepository};
use crate::modules::storage::ObjectStorage;
use crate::shared::constants::{base_name, extension_of, CSV_EXTENSION, MAX_ENTRY_BYTES};

/// How an archive entry is imported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Summary rows, a marker, then detail rows
    Combined,
    Transaction,
}

impl EntryKind {
    fn file_type(&self) -> PayinFileType {
        match self {
            EntryKind::Combined => PayinFileType::Summary,
            EntryKind::Transaction => PayinFileType::Transaction,
        }
    }
}

/// A CSV entry read out of a settlement zip
#[derive(Debug, Clone)]
pub struct ZipEntry {
    pub path: String,
    pub kind: EntryKind,
    pub content: Vec<u8>,
}

impl ZipEntry {
    pub fn file_name(&self) -> &str {
        base_name(&self.path)
    }
}

/// Imports every CSV of one staged settlement zip
pub struct ZipImportTask {
    storage: Arc<dyn ObjectStorage>,
    files: Arc<dyn PayinFileRepository>,
    records: Arc<dyn PaypayRecordRepository>,
    paypay: PaypayConfig,
    max_entry_bytes: u64,
}

impl ZipImportTask {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        files: Arc<dyn PayinFileRepository>,
        records: Arc<dyn PaypayRecordRepository>,
        paypay: PaypayConfig,
    ) -> Self {
        Self {
            storage,
            files,
            records,
            paypay,
            max_entry_bytes: MAX_ENTRY_BYTES,
        }
    }

    /// Reject entries that decompress to more than `limit` bytes
    pub fn with_max_entry_bytes(mut self, limit: u64) -> Self {
        self.max_entry_bytes = limit;
        self
    }

    /// Classify an entry path by the folder it sits in
    pub fn classify(&self, entry_path: &str) -> Option<EntryKind> {
        if extension_of(entry_path).as_deref() != Some(CSV_EXTENSION) {
            return None;
        }

        let mut folders = entry_path.split('/').rev().skip(1);
        folders.find_map(|folder| {
            if folder.eq_ignore_ascii_case(&self.paypay.summary_detail_dir) {
                Some(EntryKind::Combined)
            } else if folder.eq_ignore_ascii_case(&self.paypay.transaction_dir) {
                Some(EntryKind::Transaction)
            } else {
                None
            }
        })
    }

    /// Import every entry of the zip at `key`.
    ///
    /// Entries are independent: a bad one is marked failed and the rest are
    /// still imported. The error lists every failed entry. Cancellation is
    /// checked between entries; entries not reached stay pending and the zip
    /// keeps its previous status.
    pub async fn process(&self, key: String, cancel: &CancellationToken) -> Result<()> {
        let data = self.storage.download(&key).await?;
        let zip_file = self.files.find_by_filename(base_name(&key)).await?;

        let entries = match self.read_entries(&data) {
            Ok(entries) => entries,
            Err(e) => {
                if let Some(zip_file) = &zip_file {
                    self.mark_import(zip_file, PayinFileStatus::Failed).await;
                }
                return Err(e);
            }
        };

        if entries.is_empty() {
            tracing::warn!("No settlement CSVs found in {}", key);
        }

        let group_id = zip_file.as_ref().and_then(|f| f.file_group_id);
        let mut failures = Vec::new();
        let mut rows = 0u64;

        for (done, entry) in entries.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled(format!(
                    "{} stopped after {} of {} entries",
                    key,
                    done,
                    entries.len()
                )));
            }
            match self.import_entry(&key, entry, group_id).await {
                Ok(counts) => rows += counts.total(),
                Err(e) => {
                    tracing::error!("Failed to import {} from {}: {}", entry.path, key, e);
                    failures.push(format!("{}: {}", entry.path, e));
                }
            }
        }

        if let Some(zip_file) = &zip_file {
            let status = if failures.is_empty() {
                PayinFileStatus::Success
            } else {
                PayinFileStatus::Failed
            };
            self.mark_import(zip_file, status).await;
        }

        if !failures.is_empty() {
            return Err(AppError::Import(format!(
                "{} of {} entries failed: {}",
                failures.len(),
                entries.len(),
                failures.join("; ")
            )));
        }

        tracing::info!(
            "Imported {}: {} entries, {} rows",
            key,
            entries.len(),
            rows
        );
        Ok(())
    }

    /// Unpack the settlement CSVs of an archive; other entries are ignored
    pub fn read_entries(&self, data: &[u8]) -> Result<Vec<ZipEntry>> {
        let mut archive = ZipArchive::new(Cursor::new(data))?;
        let mut entries = Vec::new();

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }

            let path = file.name().to_string();
            let Some(kind) = self.classify(&path) else {
                tracing::debug!("Skipping zip entry {}", path);
                continue;
            };

            // The size recorded in the archive is not trusted for allocation
            let mut content = Vec::new();
            file.by_ref()
                .take(self.max_entry_bytes + 1)
                .read_to_end(&mut content)?;
            if content.len() as u64 > self.max_entry_bytes {
                return Err(AppError::Validation(format!(
                    "zip entry {} is larger than {} bytes",
                    path, self.max_entry_bytes
                )));
            }
            entries.push(ZipEntry {
                path,
                kind,
                content,
            });
        }

        Ok(entries)
    }

    async fn import_entry(
        &self,
        key: &str,
        entry: &ZipEntry,
        file_group_id: Option<i64>,
    ) -> Result<ImportedCounts> {
        let file = self.owning_file(key, entry, file_group_id).await?;
        if file.import_status == PayinFileStatus::Success {
            tracing::info!(
                "Skipping {}: payin file {} is already imported",
                entry.path,
                file.id
            );
            return Ok(ImportedCounts::default());
        }

        let batch = match stage_entry(entry, file.id) {
            Ok(batch) => batch,
            Err(e) => {
                self.mark_import(&file, PayinFileStatus::Failed).await;
                return Err(e);
            }
        };

        // Rows and the import status land in one transaction
        let counts = match self.records.commit(batch).await {
            Ok(counts) => counts,
            Err(e) => {
                self.mark_import(&file, PayinFileStatus::Failed).await;
                return Err(e);
            }
        };

        tracing::debug!(
            "Imported {} into payin file {}: {} summary, {} detail, {} transaction rows",
            entry.path,
            file.id,
            counts.summaries,
            counts.details,
            counts.transactions
        );
        Ok(counts)
    }

    async fn owning_file(
        &self,
        key: &str,
        entry: &ZipEntry,
        file_group_id: Option<i64>,
    ) -> Result<PayinFile> {
        let file_name = entry.file_name();
        if let Some(existing) = self.files.find_by_filename(file_name).await? {
            return Ok(existing);
        }

        self.files
            .create(&CreatePayinFile {
                provider_id: self.paypay.provider_id,
                file_group_id,
                file_name: file_name.to_string(),
                content_key: key.to_string(),
                file_type: entry.kind.file_type(),
                added_manually: false,
            })
            .await
    }

    async fn mark_import(&self, file: &PayinFile, status: PayinFileStatus) {
        if let Err(e) = self
            .files
            .update_status(file.id, StatusField::Import, status)
            .await
        {
            tracing::error!(
                "Could not set import status of {} to {}: {}",
                file.file_name,
                status,
                e
            );
        }
    }
}

/// Parse one entry into a unit of work; nothing is staged when any row fails
fn stage_entry(entry: &ZipEntry, payin_file_id: i64) -> Result<PayinImportBatch> {
    let reader = read_with_header(&entry.content)?;
    let headers = reader.headers().to_vec();
    let rows = reader.collect::<Result<Vec<CsvRow>>>()?;

    let mut batch = PayinImportBatch::new(payin_file_id);
    match entry.kind {
        EntryKind::Combined => {
            let mut summaries = Vec::new();
            let mut details = Vec::new();
            import_combined(
                &headers,
                rows,
                payin_file_id,
                |parsed| summaries = parsed,
                |parsed| details = parsed,
            )?;
            batch.stage_summaries(summaries);
            batch.stage_details(details);
        }
        EntryKind::Transaction => {
            let transactions = if rows.is_empty() {
                Vec::new()
            } else {
                parse_rows(
                    Section::Transaction,
                    &headers,
                    &rows,
                    payin_file_id,
                    parse_transaction,
                )?
            };
            batch.stage_transactions(transactions);
        }
    }

    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::test_helpers::{
        InMemoryObjectStorage, InMemoryPayinFileRepository, InMemoryPaypayRecordRepository,
    };
    use std::io::Write;
    use std::sync::atomic::Ordering;
    use zip::write::FileOptions;
    use zip::{CompressionMethod, ZipWriter};

    const KEY: &str = "paypay/payin/settlement_20240105.zip";

    const COMBINED_CSV: &str = "\u{feff}加盟店ID,店舗ID,取引金額,手数料,入金額\n\
                                M1,,\"10,000\",300,\"9,700\"\n\
                                明細,,,,\n\
                                M1,S1,\"6,000\",180,\"5,820\"\n\
                                M1,S2,\"4,000\",120,\"3,880\"\n";

    const TRANSACTION_CSV: &str = "決済番号,取引日時,取引金額,取引ステータス\n\
                                   P1,2024-01-05 10:00:00,500,COMPLETED\n\
                                   P2,2024-01-05 11:00:00,700,REFUNDED\n";

    /// Transaction report without the amount column
    const BROKEN_CSV: &str = "決済番号,取引日時\nP9,2024-01-05 12:00:00\n";

    fn paypay() -> PaypayConfig {
        PaypayConfig {
            provider_id: 2,
            storage_root: "paypay".to_string(),
            payin_folders: vec!["payin".to_string()],
            upload_folder: "payin".to_string(),
            summary_detail_dir: "summary_detail".to_string(),
            transaction_dir: "transaction_report".to_string(),
        }
    }

    fn build_zip(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut zip = ZipWriter::new(&mut cursor);
            let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
            for (name, content) in entries {
                zip.start_file(*name, options).unwrap();
                zip.write_all(content.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        cursor.into_inner()
    }

    async fn import(task: &ZipImportTask) -> Result<()> {
        task.process(KEY.to_string(), &CancellationToken::new()).await
    }

    struct Fixture {
        storage: Arc<InMemoryObjectStorage>,
        files: Arc<InMemoryPayinFileRepository>,
        records: Arc<InMemoryPaypayRecordRepository>,
        task: ZipImportTask,
    }

    fn fixture() -> Fixture {
        let storage = Arc::new(InMemoryObjectStorage::default());
        let files = Arc::new(InMemoryPayinFileRepository::default());
        let records = Arc::new(InMemoryPaypayRecordRepository::new(files.clone()));
        let task = ZipImportTask::new(storage.clone(), files.clone(), records.clone(), paypay());
        Fixture {
            storage,
            files,
            records,
            task,
        }
    }

    fn seed_zip_record(fx: &Fixture) -> PayinFile {
        fx.files.insert(
            CreatePayinFile {
                provider_id: 2,
                file_group_id: Some(11),
                file_name: "settlement_20240105.zip".to_string(),
                content_key: KEY.to_string(),
                file_type: PayinFileType::Summary,
                added_manually: false,
            },
            PayinFileStatus::Success,
        )
    }

    #[test]
    fn test_classify_entries_by_folder() {
        let fx = fixture();
        assert_eq!(
            fx.task.classify("20240105/summary_detail/a.csv"),
            Some(EntryKind::Combined)
        );
        assert_eq!(
            fx.task.classify("Transaction_Report/b.CSV"),
            Some(EntryKind::Transaction)
        );
        assert_eq!(fx.task.classify("summary_detail/a.pdf"), None);
        assert_eq!(fx.task.classify("other/a.csv"), None);
        assert_eq!(fx.task.classify("summary_detail.csv"), None);
    }

    #[tokio::test]
    async fn test_zip_with_both_entry_kinds_is_imported() {
        let fx = fixture();
        let zip_record = seed_zip_record(&fx);
        fx.storage.put(
            KEY,
            build_zip(&[
                ("summary_detail/summary_20240105.csv", COMBINED_CSV),
                ("transaction_report/txn_20240105.csv", TRANSACTION_CSV),
                ("readme.txt", "ignored"),
            ]),
        );

        import(&fx.task).await.unwrap();

        assert_eq!(fx.records.summaries().len(), 1);
        assert_eq!(fx.records.details().len(), 2);
        assert_eq!(fx.records.transactions().len(), 2);

        let combined = fx.files.by_name("summary_20240105.csv").unwrap();
        assert_eq!(combined.file_type, PayinFileType::Summary);
        assert_eq!(combined.file_group_id, Some(11));
        assert_eq!(combined.import_status, PayinFileStatus::Success);
        assert!(combined.has_data_record);
        assert!(fx
            .records
            .details()
            .iter()
            .all(|d| d.payin_file_id == combined.id));

        let txn = fx.files.by_name("txn_20240105.csv").unwrap();
        assert_eq!(txn.file_type, PayinFileType::Transaction);
        assert_eq!(fx.records.rows_for_file(txn.id), 2);

        let zip_after = fx.files.by_name(&zip_record.file_name).unwrap();
        assert_eq!(zip_after.import_status, PayinFileStatus::Success);
    }

    #[tokio::test]
    async fn test_entry_missing_required_column_fails_alone() {
        let fx = fixture();
        let zip_record = seed_zip_record(&fx);
        fx.storage.put(
            KEY,
            build_zip(&[
                ("summary_detail/summary_20240105.csv", COMBINED_CSV),
                ("transaction_report/broken_20240105.csv", BROKEN_CSV),
                ("transaction_report/txn_20240105.csv", TRANSACTION_CSV),
            ]),
        );

        let err = import(&fx.task).await.unwrap_err();
        assert!(matches!(err, AppError::Import(ref m) if m.contains("broken_20240105.csv")));

        let broken = fx.files.by_name("broken_20240105.csv").unwrap();
        assert_eq!(broken.import_status, PayinFileStatus::Failed);
        assert!(!broken.has_data_record);
        assert_eq!(fx.records.rows_for_file(broken.id), 0);

        let txn = fx.files.by_name("txn_20240105.csv").unwrap();
        assert_eq!(txn.import_status, PayinFileStatus::Success);
        assert_eq!(fx.records.rows_for_file(txn.id), 2);
        assert_eq!(fx.records.summaries().len(), 1);

        let zip_after = fx.files.by_name(&zip_record.file_name).unwrap();
        assert_eq!(zip_after.import_status, PayinFileStatus::Failed);
    }

    #[tokio::test]
    async fn test_insert_failure_marks_entry_failed() {
        let fx = fixture();
        fx.storage.put(
            KEY,
            build_zip(&[("transaction_report/txn_20240105.csv", TRANSACTION_CSV)]),
        );
        // First created record gets id 1
        *fx.records.fail_for_file.lock().unwrap() = Some(1);

        assert!(import(&fx.task).await.is_err());

        let txn = fx.files.by_name("txn_20240105.csv").unwrap();
        assert_eq!(txn.import_status, PayinFileStatus::Failed);
        assert!(fx.records.transactions().is_empty());
    }

    #[tokio::test]
    async fn test_reimport_does_not_duplicate_rows() {
        let fx = fixture();
        fx.storage.put(
            KEY,
            build_zip(&[("transaction_report/txn_20240105.csv", TRANSACTION_CSV)]),
        );

        import(&fx.task).await.unwrap();
        import(&fx.task).await.unwrap();

        assert_eq!(fx.records.transactions().len(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_archive_fails_zip_record() {
        let fx = fixture();
        let zip_record = seed_zip_record(&fx);
        fx.storage.put(KEY, b"not a zip".to_vec());

        let err = import(&fx.task).await.unwrap_err();
        assert!(matches!(err, AppError::Zip(_)));
        assert_eq!(
            fx.files.by_name(&zip_record.file_name).unwrap().import_status,
            PayinFileStatus::Failed
        );
    }

    /// Stored single-entry archive whose central directory claims, through a
    /// zip64 extra field, that the entry decompresses to 2^62 bytes
    fn zip_claiming_huge_entry(name: &str, content: &[u8], crc32: u32) -> Vec<u8> {
        let size = content.len() as u32;
        let mut out = Vec::new();

        out.extend_from_slice(&0x0403_4b50u32.to_le_bytes());
        for field in [20u16, 0, 0, 0, 0x21] {
            out.extend_from_slice(&field.to_le_bytes());
        }
        out.extend_from_slice(&crc32.to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(content);

        let central_offset = out.len() as u32;
        out.extend_from_slice(&0x0201_4b50u32.to_le_bytes());
        for field in [20u16, 20, 0, 0, 0, 0x21] {
            out.extend_from_slice(&field.to_le_bytes());
        }
        out.extend_from_slice(&crc32.to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&u32::MAX.to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        for field in [12u16, 0, 0, 0] {
            out.extend_from_slice(&field.to_le_bytes());
        }
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&8u16.to_le_bytes());
        out.extend_from_slice(&(1u64 << 62).to_le_bytes());
        let central_size = out.len() as u32 - central_offset;

        out.extend_from_slice(&0x0605_4b50u32.to_le_bytes());
        for field in [0u16, 0, 1, 1] {
            out.extend_from_slice(&field.to_le_bytes());
        }
        out.extend_from_slice(&central_size.to_le_bytes());
        out.extend_from_slice(&central_offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out
    }

    #[tokio::test]
    async fn test_declared_entry_size_is_not_trusted() {
        let fx = fixture();
        fx.storage.put(
            KEY,
            zip_claiming_huge_entry(
                "transaction_report/txn_20240105.csv",
                b"payment_id,transaction_amount\nP1,100\n",
                0x45e7_0e0f,
            ),
        );

        import(&fx.task).await.unwrap();

        assert_eq!(fx.records.transactions().len(), 1);
        assert_eq!(fx.records.transactions()[0].payment_id, "P1");
    }

    #[tokio::test]
    async fn test_oversized_entry_fails_the_zip() {
        let fx = fixture();
        let zip_record = seed_zip_record(&fx);
        fx.storage.put(
            KEY,
            build_zip(&[("transaction_report/txn_20240105.csv", TRANSACTION_CSV)]),
        );
        let task = ZipImportTask::new(
            fx.storage.clone(),
            fx.files.clone(),
            fx.records.clone(),
            paypay(),
        )
        .with_max_entry_bytes(16);

        let err = import(&task).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m.contains("txn_20240105.csv")));
        assert!(fx.records.transactions().is_empty());
        assert_eq!(
            fx.files.by_name(&zip_record.file_name).unwrap().import_status,
            PayinFileStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_lost_status_write_does_not_duplicate_rows_on_rerun() {
        let fx = fixture();
        fx.storage.put(
            KEY,
            build_zip(&[("transaction_report/txn_20240105.csv", TRANSACTION_CSV)]),
        );
        fx.files.fail_status_updates.store(true, Ordering::SeqCst);

        import(&fx.task).await.unwrap();
        fx.files.fail_status_updates.store(false, Ordering::SeqCst);
        import(&fx.task).await.unwrap();

        assert_eq!(fx.records.transactions().len(), 2);
        let txn = fx.files.by_name("txn_20240105.csv").unwrap();
        assert_eq!(txn.import_status, PayinFileStatus::Success);
        assert!(txn.has_data_record);
    }

    #[tokio::test]
    async fn test_cancelled_import_leaves_entries_pending() {
        let fx = fixture();
        let zip_record = seed_zip_record(&fx);
        fx.storage.put(
            KEY,
            build_zip(&[("transaction_report/txn_20240105.csv", TRANSACTION_CSV)]),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = fx.task.process(KEY.to_string(), &cancel).await.unwrap_err();
        assert!(matches!(err, AppError::Cancelled(_)));

        assert!(fx.records.transactions().is_empty());
        assert!(fx.files.by_name("txn_20240105.csv").is_none());
        assert_eq!(
            fx.files.by_name(&zip_record.file_name).unwrap().import_status,
            PayinFileStatus::Pending
        );

        import(&fx.task).await.unwrap();
        assert_eq!(fx.records.transactions().len(), 2);
    }
}
