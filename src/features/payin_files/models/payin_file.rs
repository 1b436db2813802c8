use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};

/// Lifecycle status of one pipeline stage, stored as SMALLINT
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Type)]
#[repr(i16)]
#[serde(rename_all = "snake_case")]
pub enum PayinFileStatus {
    #[default]
    Pending = 0,
    Success = 1,
    Failed = 2,
}

impl std::fmt::Display for PayinFileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayinFileStatus::Pending => write!(f, "pending"),
            PayinFileStatus::Success => write!(f, "success"),
            PayinFileStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Settlement file type enum matching database enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "payin_file_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PayinFileType {
    Summary,
    Detail,
    Transaction,
}

impl PayinFileType {
    /// Best guess from a provider file name
    pub fn from_file_name(file_name: &str) -> Self {
        let name = file_name.to_ascii_lowercase();
        if name.contains("transaction") {
            PayinFileType::Transaction
        } else if name.contains("detail") && !name.contains("summary") {
            PayinFileType::Detail
        } else {
            PayinFileType::Summary
        }
    }
}

/// Which of the three independent status columns to update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusField {
    Download,
    Upload,
    Import,
}

impl StatusField {
    pub fn column(&self) -> &'static str {
        match self {
            StatusField::Download => "download_status",
            StatusField::Upload => "upload_status",
            StatusField::Import => "import_status",
        }
    }
}

/// Database model for a settlement file
#[derive(Debug, Clone, FromRow)]
pub struct PayinFile {
    pub id: i64,
    pub provider_id: i64,
    pub file_group_id: Option<i64>,
    pub file_name: String,
    pub content_key: String,
    pub file_type: PayinFileType,
    pub has_data_record: bool,
    pub added_manually: bool,
    pub download_status: PayinFileStatus,
    pub upload_status: PayinFileStatus,
    pub import_status: PayinFileStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PayinFile {
    pub fn is_downloaded(&self) -> bool {
        self.download_status == PayinFileStatus::Success
    }
}

/// Data for creating a new settlement file; all statuses start as pending
#[derive(Debug, Clone)]
pub struct CreatePayinFile {
    pub provider_id: i64,
    pub file_group_id: Option<i64>,
    pub file_name: String,
    pub content_key: String,
    pub file_type: PayinFileType,
    pub added_manually: bool,
}
