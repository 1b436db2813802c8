use clap::Parser;
use payin_batch::core::config::{Config, FetchArgs, FetchSettings, RemoteHostConfig};
use payin_batch::core::{database, logging, shutdown};
use payin_batch::features::fetch_payin_file::FetchPayinFileJob;
use payin_batch::features::payin_files::{PgPayinFileGroupRepository, PgPayinFileRepository};
use payin_batch::modules::remote::SshRemoteClient;
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

    let settings = FetchSettings::try_from(FetchArgs::parse())?;
    tracing::info!(
        "===== fetch_payin_file start: targetDate={}, workers={}, fileLoadSizePerStream={} =====",
        settings.date_token(),
        settings.workers,
        settings.page_size
    );

    // Setup failures abort the run before any file is touched
    let config = Config::from_env()?;
    let remote_config = RemoteHostConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
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

    let remote = Arc::new(SshRemoteClient::new(remote_config.clone()));
    remote.check_connection().await?;
    tracing::info!("Connected to settlement host {}", remote_config.destination());

    let job = FetchPayinFileJob::new(
        remote,
        minio_client,
        Arc::new(PgPayinFileRepository::new(pool.clone())),
        Arc::new(PgPayinFileGroupRepository::new(pool.clone())),
        config.paypay.clone(),
        remote_config.root_dir.clone(),
        &config.runtime,
    );

    let cancel = shutdown::cancel_on_signal();
    let report = job.run(&settings, cancel).await?;

    tracing::info!(
        "===== fetch_payin_file stop: group={}, listed={}, processed={}, failed={}, skipped={} =====",
        report.group.group_name,
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
