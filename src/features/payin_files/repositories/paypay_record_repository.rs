use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};

use super::PaypayRecordRepository;
use crate::core::error::{AppError, Result};
use crate::features::payin_files::models::{
    ImportedCounts, PayinFileStatus, PayinImportBatch, PaypayPayinDetail, PaypayPayinSummary,
    PaypayPayinTransaction,
};
use crate::shared::constants::MAX_BIND_PARAMS;

const SUMMARY_COLUMNS: usize = 13;
const DETAIL_COLUMNS: usize = 13;
const TRANSACTION_COLUMNS: usize = 15;

/// Bulk writer for parsed PayPay rows
#[derive(Clone)]
pub struct PgPaypayRecordRepository {
    pool: PgPool,
    /// Upper bound on rows per INSERT statement
    chunk_size: usize,
}

impl PgPaypayRecordRepository {
    pub fn new(pool: PgPool, chunk_size: usize) -> Self {
        Self { pool, chunk_size }
    }

    fn rows_per_statement(&self, columns: usize) -> usize {
        self.chunk_size.clamp(1, MAX_BIND_PARAMS / columns)
    }
}

#[async_trait]
impl PaypayRecordRepository for PgPaypayRecordRepository {
    async fn commit(&self, batch: PayinImportBatch) -> Result<ImportedCounts> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            tracing::error!("Failed to open import transaction: {:?}", e);
            AppError::Database(e)
        })?;

        let counts = ImportedCounts {
            summaries: insert_summaries(
                &mut tx,
                &batch.summaries,
                self.rows_per_statement(SUMMARY_COLUMNS),
            )
            .await?,
            details: insert_details(
                &mut tx,
                &batch.details,
                self.rows_per_statement(DETAIL_COLUMNS),
            )
            .await?,
            transactions: insert_transactions(
                &mut tx,
                &batch.transactions,
                self.rows_per_statement(TRANSACTION_COLUMNS),
            )
            .await?,
        };

        mark_imported(&mut tx, batch.payin_file_id, counts.total() > 0).await?;

        tx.commit().await.map_err(|e| {
            tracing::error!("Failed to commit import transaction: {:?}", e);
            AppError::Database(e)
        })?;

        tracing::debug!(
            "Committed payin file {}: {} summary, {} detail, {} transaction rows",
            batch.payin_file_id,
            counts.summaries,
            counts.details,
            counts.transactions
        );
        Ok(counts)
    }
}

async fn mark_imported(
    tx: &mut Transaction<'_, Postgres>,
    payin_file_id: i64,
    has_data_record: bool,
) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE payin_files
        SET import_status = $2,
            has_data_record = has_data_record OR $3,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(payin_file_id)
    .bind(PayinFileStatus::Success)
    .bind(has_data_record)
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to mark payin file {} imported: {:?}", payin_file_id, e);
        AppError::Database(e)
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("payin file {}", payin_file_id)));
    }
    Ok(())
}

async fn insert_summaries(
    tx: &mut Transaction<'_, Postgres>,
    rows: &[PaypayPayinSummary],
    chunk_size: usize,
) -> Result<u64> {
    let mut inserted = 0;
    for chunk in rows.chunks(chunk_size) {
        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"
            INSERT INTO paypay_payin_summaries (
                payin_file_id, merchant_id, merchant_name, settlement_date, payment_date,
                transaction_count, transaction_amount, refund_amount, fee, tax, cashback,
                adjustment, net_amount
            )
            "#,
        );

        query_builder.push_values(chunk.iter(), |mut b, row| {
            b.push_bind(row.payin_file_id)
                .push_bind(&row.merchant_id)
                .push_bind(&row.merchant_name)
                .push_bind(row.settlement_date)
                .push_bind(row.payment_date)
                .push_bind(row.transaction_count)
                .push_bind(row.transaction_amount)
                .push_bind(row.refund_amount)
                .push_bind(row.fee)
                .push_bind(row.tax)
                .push_bind(row.cashback)
                .push_bind(row.adjustment)
                .push_bind(row.net_amount);
        });

        let result = query_builder
            .build()
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                tracing::error!("Failed to insert paypay_payin_summaries: {:?}", e);
                AppError::Database(e)
            })?;
        inserted += result.rows_affected();
    }
    Ok(inserted)
}

async fn insert_details(
    tx: &mut Transaction<'_, Postgres>,
    rows: &[PaypayPayinDetail],
    chunk_size: usize,
) -> Result<u64> {
    let mut inserted = 0;
    for chunk in rows.chunks(chunk_size) {
        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"
            INSERT INTO paypay_payin_details (
                payin_file_id, merchant_id, store_id, store_name, transaction_date,
                transaction_count, transaction_amount, refund_amount, fee, tax, cashback,
                adjustment, net_amount
            )
            "#,
        );

        query_builder.push_values(chunk.iter(), |mut b, row| {
            b.push_bind(row.payin_file_id)
                .push_bind(&row.merchant_id)
                .push_bind(&row.store_id)
                .push_bind(&row.store_name)
                .push_bind(row.transaction_date)
                .push_bind(row.transaction_count)
                .push_bind(row.transaction_amount)
                .push_bind(row.refund_amount)
                .push_bind(row.fee)
                .push_bind(row.tax)
                .push_bind(row.cashback)
                .push_bind(row.adjustment)
                .push_bind(row.net_amount);
        });

        let result = query_builder
            .build()
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                tracing::error!("Failed to insert paypay_payin_details: {:?}", e);
                AppError::Database(e)
            })?;
        inserted += result.rows_affected();
    }
    Ok(inserted)
}

async fn insert_transactions(
    tx: &mut Transaction<'_, Postgres>,
    rows: &[PaypayPayinTransaction],
    chunk_size: usize,
) -> Result<u64> {
    let mut inserted = 0;
    for chunk in rows.chunks(chunk_size) {
        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"
            INSERT INTO paypay_payin_transactions (
                payin_file_id, payment_id, merchant_payment_id, merchant_id, store_id,
                transaction_status, transacted_at, payment_method, transaction_amount,
                refund_amount, fee, tax, cashback, net_amount, payment_detail
            )
            "#,
        );

        query_builder.push_values(chunk.iter(), |mut b, row| {
            b.push_bind(row.payin_file_id)
                .push_bind(&row.payment_id)
                .push_bind(&row.merchant_payment_id)
                .push_bind(&row.merchant_id)
                .push_bind(&row.store_id)
                .push_bind(&row.transaction_status)
                .push_bind(row.transacted_at)
                .push_bind(&row.payment_method)
                .push_bind(row.transaction_amount)
                .push_bind(row.refund_amount)
                .push_bind(row.fee)
                .push_bind(row.tax)
                .push_bind(row.cashback)
                .push_bind(row.net_amount)
                .push_bind(row.payment_detail.clone());
        });

        let result = query_builder
            .build()
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                tracing::error!("Failed to insert paypay_payin_transactions: {:?}", e);
                AppError::Database(e)
            })?;
        inserted += result.rows_affected();
    }
    Ok(inserted)
}
