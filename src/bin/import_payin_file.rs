use clap::Parser;
use payin_batch::core::config::{Config, ImportArgs, ImportSettings};
use payin_batch::core::{database, logging, shutdown};
use payin_batch::features::import_payin_file::ImportPayinFileJob;
use payin_batch::features::payin_files::{PgPayinFileRepository, PgPaypayRecordRepository};
use payin_batch::modules::storage::MinIOClient;
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    // Load .env file BEFORE initializing logger so RUST_LOG is available
    let _ = dotenvy::dotenv();
    logging::init();

    let settings = ImportSettings::try_from(ImportArgs::parse())?;
    tracing::info!(
        "===== import_payin_file start: readers={}, fileLoadPerStream={}, lineOfDataReadPerStream={} =====",
        settings.readers,
        settings.page_size,
        settings.insert_chunk_size
    );

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    let pool = database::create_pool(&config.database).await?;
    tracing::info!("Database connection pool created");
    database::run_migrations(&pool).await?;

    let minio_client = Arc::new(
        MinIOClient::new(config.minio.clone())
            .map_err(|e| anyhow::anyhow!("Failed to initialize MinIO client: {}", e))?,
    );
    minio_client
        .ensure_bucket_exists()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to ensure MinIO bucket exists: {}", e))?;
    tracing::info!(
        "MinIO storage ready at {} (bucket '{}')",
        minio_client.endpoint(),
        minio_client.bucket_name()
    );

    let job = ImportPayinFileJob::new(
        minio_client,
        Arc::new(PgPayinFileRepository::new(pool.clone())),
        Arc::new(PgPaypayRecordRepository::new(
            pool.clone(),
            settings.insert_chunk_size,
        )),
        config.paypay.clone(),
        &config.runtime,
    );

    let cancel = shutdown::cancel_on_signal();
    let report = job.run(&settings, cancel).await?;

    tracing::info!(
        "===== import_payin_file stop: listed={}, processed={}, failed={}, skipped={} =====",
        report
            .listed
            .map(|n| n.to_string())
            .unwrap_or_else(|| "incomplete".to_string()),
        report.pool.processed,
        report.pool.failed,
        report.pool.skipped
    );

    pool.close().await;
    Ok(())
}
