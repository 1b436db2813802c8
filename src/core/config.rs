use chrono::{NaiveDate, Utc};
use chrono_tz::Asia::Tokyo;
use clap::Parser;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::error::{AppError, Result};
use crate::shared::validation::DATE_TOKEN_REGEX;

/// Settings shared by both batch jobs, built once at process start
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub minio: MinIOConfig,
    pub paypay: PaypayConfig,
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

/// MinIO/S3 storage configuration for staged settlement files
#[derive(Debug, Clone)]
pub struct MinIOConfig {
    /// MinIO/S3 endpoint URL
    pub endpoint: String,
    /// Access key for authentication
    pub access_key: String,
    /// Secret key for authentication
    pub secret_key: String,
    /// Bucket name for storing files
    pub bucket: String,
    /// AWS region (for S3 compatibility)
    pub region: String,
}

/// SSH host that publishes PayPay settlement files
#[derive(Debug, Clone)]
pub struct RemoteHostConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Private key passed to ssh with `-i`; agent/default keys are used when absent
    pub identity_file: Option<PathBuf>,
    /// Directory the listing starts from
    pub root_dir: String,
    pub connect_timeout_secs: u64,
}

/// Provider-specific layout of the settlement files
#[derive(Debug, Clone)]
pub struct PaypayConfig {
    pub provider_id: i64,
    /// Root directory inside the bucket
    pub storage_root: String,
    /// Sub-paths under `storage_root` the import job reads from
    pub payin_folders: Vec<String>,
    /// Sub-path under `storage_root` the fetch job uploads into
    pub upload_folder: String,
    /// Zip-entry folder holding combined summary+detail CSVs
    pub summary_detail_dir: String,
    /// Zip-entry folder holding transaction-report CSVs
    pub transaction_dir: String,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub tmp_dir: PathBuf,
    /// `None` disables the per-item timeout
    pub item_timeout: Option<Duration>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Load .env file if exists, ignore if not found (optional for production)
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                eprintln!("Warning: Error loading .env file: {}", e);
            }
        }

        Ok(Config {
            database: DatabaseConfig::from_env().map_err(AppError::Config)?,
            minio: MinIOConfig::from_env().map_err(AppError::Config)?,
            paypay: PaypayConfig::from_env().map_err(AppError::Config)?,
            runtime: RuntimeConfig::from_env().map_err(AppError::Config)?,
        })
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> std::result::Result<T, String> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| format!("{} must be a valid number", key)),
        Err(_) => Ok(default),
    }
}

fn required(key: &str) -> std::result::Result<String, String> {
    env::var(key)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| format!("{} environment variable is required", key))
}

impl DatabaseConfig {
    const DEFAULT_MAX_CONNECTIONS: u32 = 10;
    const DEFAULT_MIN_CONNECTIONS: u32 = 1;
    const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 5;
    const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600; // 10 minutes
    const DEFAULT_MAX_LIFETIME_SECS: u64 = 1800; // 30 minutes

    pub fn from_env() -> std::result::Result<Self, String> {
        let url = env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".to_string())?;

        Ok(Self {
            url,
            max_connections: env_or("DB_MAX_CONNECTIONS", Self::DEFAULT_MAX_CONNECTIONS)?,
            min_connections: env_or("DB_MIN_CONNECTIONS", Self::DEFAULT_MIN_CONNECTIONS)?,
            acquire_timeout_secs: env_or(
                "DB_ACQUIRE_TIMEOUT_SECS",
                Self::DEFAULT_ACQUIRE_TIMEOUT_SECS,
            )?,
            idle_timeout_secs: env_or("DB_IDLE_TIMEOUT_SECS", Self::DEFAULT_IDLE_TIMEOUT_SECS)?,
            max_lifetime_secs: env_or("DB_MAX_LIFETIME_SECS", Self::DEFAULT_MAX_LIFETIME_SECS)?,
        })
    }
}

impl MinIOConfig {
    pub fn from_env() -> std::result::Result<Self, String> {
        Ok(Self {
            endpoint: env::var("MINIO_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:9000".to_string()),
            access_key: env::var("MINIO_ACCESS_KEY").unwrap_or_else(|_| "minioadmin".to_string()),
            secret_key: env::var("MINIO_SECRET_KEY").unwrap_or_else(|_| "minioadmin".to_string()),
            bucket: env::var("MINIO_BUCKET").unwrap_or_else(|_| "payin-files".to_string()),
            region: env::var("MINIO_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
        })
    }
}

impl RemoteHostConfig {
    const DEFAULT_PORT: u16 = 22;
    const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

    pub fn from_env() -> std::result::Result<Self, String> {
        let host = required("PAYPAY_SFTP_HOST")?;
        let user = required("PAYPAY_SFTP_USER")?;
        let identity_file = env::var("PAYPAY_SFTP_IDENTITY_FILE")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);
        let root_dir = env::var("PAYPAY_SFTP_ROOT_DIR").unwrap_or_else(|_| ".".to_string());

        Ok(Self {
            host,
            port: env_or("PAYPAY_SFTP_PORT", Self::DEFAULT_PORT)?,
            user,
            identity_file,
            root_dir,
            connect_timeout_secs: env_or(
                "PAYPAY_SFTP_CONNECT_TIMEOUT_SECS",
                Self::DEFAULT_CONNECT_TIMEOUT_SECS,
            )?,
        })
    }

    /// `user@host` destination for ssh
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

impl PaypayConfig {
    pub fn from_env() -> std::result::Result<Self, String> {
        let payin_folders: Vec<String> = env::var("PAYPAY_PAYIN_FOLDERS")
            .unwrap_or_else(|_| "payin".to_string())
            .split(',')
            .map(|s| s.trim().trim_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if payin_folders.is_empty() {
            return Err("PAYPAY_PAYIN_FOLDERS must name at least one folder".to_string());
        }

        Ok(Self {
            provider_id: env_or("PAYPAY_PROVIDER_ID", 1_i64)?,
            storage_root: env::var("PAYPAY_STORAGE_ROOT")
                .unwrap_or_else(|_| "paypay".to_string())
                .trim_matches('/')
                .to_string(),
            payin_folders,
            upload_folder: env::var("PAYPAY_UPLOAD_FOLDER")
                .unwrap_or_else(|_| "payin".to_string())
                .trim_matches('/')
                .to_string(),
            summary_detail_dir: env::var("PAYPAY_SUMMARY_DETAIL_DIR")
                .unwrap_or_else(|_| "summary_detail".to_string()),
            transaction_dir: env::var("PAYPAY_TRANSACTION_DIR")
                .unwrap_or_else(|_| "transaction_report".to_string()),
        })
    }

    /// Full object-storage prefixes the import job accepts keys from
    pub fn target_folders(&self) -> Vec<String> {
        self.payin_folders
            .iter()
            .map(|folder| join_key(&self.storage_root, folder))
            .collect()
    }

    /// Deterministic object key for a fetched file
    pub fn upload_key(&self, file_name: &str) -> String {
        join_key(&join_key(&self.storage_root, &self.upload_folder), file_name)
    }
}

fn join_key(parent: &str, child: &str) -> String {
    match (parent.is_empty(), child.is_empty()) {
        (true, _) => child.to_string(),
        (_, true) => parent.to_string(),
        _ => format!("{}/{}", parent, child),
    }
}

impl RuntimeConfig {
    const DEFAULT_ITEM_TIMEOUT_SECS: u64 = 300;

    pub fn from_env() -> std::result::Result<Self, String> {
        let tmp_dir = env::var("BATCH_TMP_DIR")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(env::temp_dir);

        let timeout_secs = env_or("BATCH_ITEM_TIMEOUT_SECS", Self::DEFAULT_ITEM_TIMEOUT_SECS)?;

        Ok(Self {
            tmp_dir,
            item_timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
        })
    }
}

// =============================================================================
// CLI
// =============================================================================

/// Fetch PayPay settlement files over SSH and stage them in object storage
#[derive(Debug, Clone, Parser)]
#[command(name = "fetch_payin_file")]
pub struct FetchArgs {
    /// Number of concurrent download/upload workers
    #[arg(long, default_value_t = 5)]
    pub workers: usize,

    /// Remote paths listed per page
    #[arg(long = "fileLoadSizePerStream", default_value_t = 100)]
    pub file_load_size_per_stream: usize,

    /// Settlement date token (YYYYMMDD); defaults to today in JST
    #[arg(long = "targetDate")]
    pub target_date: Option<String>,
}

/// Import staged PayPay settlement zips into the reporting tables
#[derive(Debug, Clone, Parser)]
#[command(name = "import_payin_file")]
pub struct ImportArgs {
    /// Number of concurrent zip readers
    #[arg(long, default_value_t = 5)]
    pub readers: usize,

    /// Object keys listed per page
    #[arg(long = "fileLoadPerStream", default_value_t = 100)]
    pub file_load_per_stream: usize,

    /// Rows per bulk INSERT statement
    #[arg(long = "lineOfDataReadPerStream", default_value_t = 1000)]
    pub line_of_data_read_per_stream: usize,
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub workers: usize,
    pub page_size: usize,
    pub target_date: NaiveDate,
}

impl FetchSettings {
    /// The date as it appears inside settlement file names
    pub fn date_token(&self) -> String {
        self.target_date.format("%Y%m%d").to_string()
    }
}

#[derive(Debug, Clone)]
pub struct ImportSettings {
    pub readers: usize,
    pub page_size: usize,
    pub insert_chunk_size: usize,
}

fn positive(name: &str, value: usize) -> Result<usize> {
    if value == 0 {
        return Err(AppError::Config(format!("--{} must be at least 1", name)));
    }
    Ok(value)
}

/// Parse a `YYYYMMDD` token into a calendar date
pub fn parse_date_token(token: &str) -> Result<NaiveDate> {
    let token = token.trim();
    if !DATE_TOKEN_REGEX.is_match(token) {
        return Err(AppError::Config(format!(
            "targetDate must be YYYYMMDD, got '{}'",
            token
        )));
    }
    NaiveDate::parse_from_str(token, "%Y%m%d")
        .map_err(|_| AppError::Config(format!("targetDate '{}' is not a real date", token)))
}

impl TryFrom<FetchArgs> for FetchSettings {
    type Error = AppError;

    fn try_from(args: FetchArgs) -> Result<Self> {
        let target_date = match args.target_date.as_deref() {
            Some(token) => parse_date_token(token)?,
            None => Utc::now().with_timezone(&Tokyo).date_naive(),
        };

        Ok(Self {
            workers: positive("workers", args.workers)?,
            page_size: positive("fileLoadSizePerStream", args.file_load_size_per_stream)?,
            target_date,
        })
    }
}

impl TryFrom<ImportArgs> for ImportSettings {
    type Error = AppError;

    fn try_from(args: ImportArgs) -> Result<Self> {
        Ok(Self {
            readers: positive("readers", args.readers)?,
            page_size: positive("fileLoadPerStream", args.file_load_per_stream)?,
            insert_chunk_size: positive(
                "lineOfDataReadPerStream",
                args.line_of_data_read_per_stream,
            )?,
        })
    }
}
