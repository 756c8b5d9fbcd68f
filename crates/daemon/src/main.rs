//! UniPost daemon - composition root.
//!
//! Wires the SQLite stores, destination adapters, media infrastructure and
//! the publish scheduler together, then runs until Ctrl+C.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use unipost_adapters::{build_adapter_set, build_refresher_set, default_client, AdapterConfig};
use unipost_core::application::{
    shutdown_channel, DispatchQueue, DistributionEngine, JobRunner, PolicyGate, PublishScheduler,
    TokenLifecycleManager,
};
use unipost_core::port::{SystemTimeProvider, UuidProvider};
use unipost_infra_media::{FfmpegTranscoder, FsMediaStore};
use unipost_infra_sqlite::{
    create_pool, run_migrations, SqliteCredentialStore, SqlitePostStore, SqliteSubscriptionStore,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_DB_PATH: &str = "~/.unipost/unipost.db";
const DEFAULT_MEDIA_ROOT: &str = "~/.unipost/media";
const DEFAULT_STAGING_DIR: &str = "~/.unipost/staging";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
const DISPATCH_QUEUE_CAPACITY: usize = 64;

fn env_path(key: &str, default: &str) -> PathBuf {
    let raw = std::env::var(key).unwrap_or_else(|_| default.to_string());
    PathBuf::from(shellexpand::tilde(&raw).into_owned())
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Logging: pretty for development, JSON for production.
    let log_format = std::env::var("UNIPOST_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("unipost=info"))
        .map_err(|e| anyhow::anyhow!("invalid log filter: {}", e))?;

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }

    info!("UniPost daemon v{} starting...", VERSION);

    // 2. Configuration from the environment.
    let db_path = env_path("UNIPOST_DB_PATH", DEFAULT_DB_PATH);
    let media_root = env_path("UNIPOST_MEDIA_ROOT", DEFAULT_MEDIA_ROOT);
    let staging_root = env_path("UNIPOST_STAGING_DIR", DEFAULT_STAGING_DIR);
    let poll_interval = Duration::from_secs(
        std::env::var("UNIPOST_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
    );
    let ffmpeg_bin =
        std::env::var("UNIPOST_FFMPEG_BIN").unwrap_or_else(|_| "ffmpeg".to_string());
    let logo_path = std::env::var("UNIPOST_WATERMARK_LOGO").ok().map(PathBuf::from);

    info!(db_path = %db_path.display(), media_root = %media_root.display(), "Initializing database...");

    // 3. Database.
    let pool = create_pool(&db_path.to_string_lossy())
        .await
        .map_err(|e| anyhow::anyhow!("DB pool creation failed: {}", e))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

    // 4. DI wiring.
    let time = Arc::new(SystemTimeProvider);
    let ids = Arc::new(UuidProvider);

    let post_store = Arc::new(SqlitePostStore::new(pool.clone()));
    let credential_store = Arc::new(SqliteCredentialStore::new(pool.clone()));
    let subscription_store = Arc::new(SqliteSubscriptionStore::new(pool.clone()));

    let client = default_client();
    let oauth_config = AdapterConfig::from_env();
    let adapters = build_adapter_set(&client);
    let refreshers = build_refresher_set(&client, &oauth_config);

    let tokens = Arc::new(TokenLifecycleManager::new(
        credential_store,
        refreshers,
        time.clone(),
    ));
    let policy = PolicyGate::new(subscription_store);
    let media = Arc::new(FsMediaStore::new(media_root));
    let transcoder = Arc::new(FfmpegTranscoder::new(ffmpeg_bin, logo_path));

    let engine = Arc::new(DistributionEngine::new(
        adapters, tokens, policy, media, transcoder,
    ));
    let runner = Arc::new(JobRunner::new(
        post_store.clone(),
        engine,
        time.clone(),
        staging_root,
    ));

    // 5. Scheduler for scheduled posts.
    let (shutdown_tx, shutdown_rx) = shutdown_channel();

    let scheduler = PublishScheduler::new(
        post_store.clone(),
        runner.clone(),
        time.clone(),
        poll_interval,
    );
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx.clone()));

    // 6. Dispatch worker for immediate posts. The queue handle is the
    // ingestion seam an API layer would hold; dropping it closes the channel,
    // so it lives until shutdown.
    let (dispatch_queue, dispatch_worker) =
        DispatchQueue::with_worker(post_store, ids, time, runner, DISPATCH_QUEUE_CAPACITY);
    let worker_handle = tokio::spawn(dispatch_worker.run(shutdown_rx));

    info!("System ready. Waiting for posts...");
    info!("Press Ctrl+C to shutdown");

    // 7. Graceful shutdown.
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    shutdown_tx.shutdown();
    drop(dispatch_queue);
    let _ = tokio::time::timeout(Duration::from_secs(5), scheduler_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), worker_handle).await;

    info!("Shutdown complete.");
    Ok(())
}
