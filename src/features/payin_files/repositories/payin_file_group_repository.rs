use async_trait::async_trait;
use sqlx::PgPool;

use super::PayinFileGroupRepository;
use crate::core::error::{AppError, Result};
use crate::features::payin_files::models::{CreatePayinFileGroup, PayinFileGroup};

#[derive(Clone)]
pub struct PgPayinFileGroupRepository {
    pool: PgPool,
}

impl PgPayinFileGroupRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PayinFileGroupRepository for PgPayinFileGroupRepository {
    async fn create(&self, data: &CreatePayinFileGroup) -> Result<PayinFileGroup> {
        let group = sqlx::query_as::<_, PayinFileGroup>(
            r#"
            INSERT INTO payin_file_groups (group_name, provider_id, import_date)
            VALUES ($1, $2, $3)
            RETURNING id, group_name, provider_id, import_date, imported_at, created_at
            "#,
        )
        .bind(&data.group_name)
        .bind(data.provider_id)
        .bind(data.import_date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create payin file group: {:?}", e);
            AppError::Database(e)
        })?;

        tracing::info!(
            "Payin file group created: {} ({}) for {}",
            group.id,
            group.group_name,
            group.import_date
        );
        Ok(group)
    }
}
