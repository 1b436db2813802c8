use async_trait::async_trait;
use sqlx::PgPool;

use super::PayinFileRepository;
use crate::core::error::{AppError, Result};
use crate::features::payin_files::models::{
    CreatePayinFile, PayinFile, PayinFileStatus, StatusField,
};

const PAYIN_FILE_COLUMNS: &str = r#"
    id, provider_id, file_group_id, file_name, content_key, file_type,
    has_data_record, added_manually, download_status, upload_status, import_status,
    created_at, updated_at
"#;

/// Postgres-backed settlement file repository
#[derive(Clone)]
pub struct PgPayinFileRepository {
    pool: PgPool,
}

impl PgPayinFileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PayinFileRepository for PgPayinFileRepository {
    async fn create(&self, data: &CreatePayinFile) -> Result<PayinFile> {
        let sql = format!(
            r#"
            INSERT INTO payin_files (
                provider_id, file_group_id, file_name, content_key, file_type, added_manually
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            PAYIN_FILE_COLUMNS
        );

        let file = sqlx::query_as::<_, PayinFile>(&sql)
            .bind(data.provider_id)
            .bind(data.file_group_id)
            .bind(&data.file_name)
            .bind(&data.content_key)
            .bind(data.file_type)
            .bind(data.added_manually)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create payin file {}: {:?}", data.file_name, e);
                AppError::Database(e)
            })?;

        tracing::debug!("Payin file created: {} ({})", file.id, file.file_name);
        Ok(file)
    }

    async fn update_status(
        &self,
        id: i64,
        field: StatusField,
        status: PayinFileStatus,
    ) -> Result<()> {
        let sql = format!(
            "UPDATE payin_files SET {} = $2, updated_at = NOW() WHERE id = $1",
            field.column()
        );

        let result = sqlx::query(&sql)
            .bind(id)
            .bind(status)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(
                    "Failed to set {} = {} on payin file {}: {:?}",
                    field.column(),
                    status,
                    id,
                    e
                );
                AppError::Database(e)
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("payin file {}", id)));
        }
        Ok(())
    }

    async fn find_by_filename(&self, file_name: &str) -> Result<Option<PayinFile>> {
        let sql = format!(
            "SELECT {} FROM payin_files WHERE file_name = $1",
            PAYIN_FILE_COLUMNS
        );

        sqlx::query_as::<_, PayinFile>(&sql)
            .bind(file_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to find payin file {}: {:?}", file_name, e);
                AppError::Database(e)
            })
    }

    async fn get_by_id(&self, id: i64) -> Result<PayinFile> {
        let sql = format!("SELECT {} FROM payin_files WHERE id = $1", PAYIN_FILE_COLUMNS);

        sqlx::query_as::<_, PayinFile>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to get payin file {}: {:?}", id, e);
                AppError::Database(e)
            })?
            .ok_or_else(|| AppError::NotFound(format!("payin file {}", id)))
    }
}
