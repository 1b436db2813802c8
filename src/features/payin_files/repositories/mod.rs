//! Persistence seams for settlement files and their parsed rows
//!
//! Tasks depend on these traits; the Postgres implementations live beside
//! them and in-memory fakes live in `shared::test_helpers`.

mod payin_file_group_repository;
mod payin_file_repository;
mod paypay_record_repository;

use async_trait::async_trait;

use crate::core::error::Result;
use crate::features::payin_files::models::{
    CreatePayinFile, CreatePayinFileGroup, ImportedCounts, PayinFile, PayinFileGroup,
    PayinFileStatus, PayinImportBatch, StatusField,
};

pub use payin_file_group_repository::PgPayinFileGroupRepository;
pub use payin_file_repository::PgPayinFileRepository;
pub use paypay_record_repository::PgPaypayRecordRepository;

#[async_trait]
pub trait PayinFileRepository: Send + Sync {
    async fn create(&self, data: &CreatePayinFile) -> Result<PayinFile>;

    async fn update_status(
        &self,
        id: i64,
        field: StatusField,
        status: PayinFileStatus,
    ) -> Result<()>;

    async fn find_by_filename(&self, file_name: &str) -> Result<Option<PayinFile>>;

    async fn get_by_id(&self, id: i64) -> Result<PayinFile>;
}

#[async_trait]
pub trait PayinFileGroupRepository: Send + Sync {
    async fn create(&self, data: &CreatePayinFileGroup) -> Result<PayinFileGroup>;
}

#[async_trait]
pub trait PaypayRecordRepository: Send + Sync {
    /// Insert every staged row and mark the owning file imported, all in one
    /// transaction; nothing is written on error
    async fn commit(&self, batch: PayinImportBatch) -> Result<ImportedCounts>;
}
