//! journal-api server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use journal_api::config::AppConfig;
use journal_api::services::{
    AudioConcatenator, FfmpegMerger, IngestionDeps, IngestionOrchestrator,
};
use journal_api::{build_router, AppState};
use journal_core::{DefaultUserProvider, VectorIndex};
use journal_db::{
    Database, FilesystemBackend, FixedWindowChunker, PgEntryRepository, PgUserRepository,
    PoolConfig, StorageBackend, UrlSigner,
};
use journal_inference::{LlmAnalyzer, OpenAIBackend, WhisperBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter (default: "journal_api=debug,tower_http=debug")
    let _file_guard = init_tracing();

    let config = AppConfig::from_env();
    info!(
        subsystem = "api",
        host = %config.host,
        port = config.port,
        blob_storage_path = %config.blob_storage_path.display(),
        "Configuration loaded"
    );

    // Database
    let db = Database::connect(&config.database_url, &PoolConfig::from_env())
        .await
        .context("Failed to connect to database")?;
    db.migrate().await.context("Failed to run migrations")?;
    info!(subsystem = "api", "Database migrations applied");

    // Model adapters
    let openai = Arc::new(OpenAIBackend::from_env().context("Failed to build OpenAI backend")?);
    let whisper = Arc::new(WhisperBackend::from_env());
    let analyzer = Arc::new(LlmAnalyzer::new(openai.clone()));

    // Vector index must be initialized before the first request is served
    let index = Arc::new(db.vector_index(openai.clone()));
    index
        .init()
        .await
        .context("Failed to initialize vector index")?;

    // Blob store
    let signer = match &config.blob_signing_secret {
        Some(secret) => UrlSigner::new(
            secret.as_bytes().to_vec(),
            config.blob_url_base.clone(),
            config.blob_url_ttl,
        ),
        None => {
            tracing::warn!(
                subsystem = "storage",
                "BLOB_SIGNING_SECRET not set, signed URLs will not survive a restart"
            );
            UrlSigner::ephemeral(config.blob_url_base.clone(), config.blob_url_ttl)
        }
    };
    let filesystem = FilesystemBackend::new(config.blob_storage_path.clone(), signer);
    filesystem
        .validate()
        .await
        .context("Blob storage is not writable")?;
    let blobs: Arc<dyn StorageBackend> = Arc::new(filesystem);

    // Services
    let users = Arc::new(PgUserRepository::new(db.pool.clone()));
    let orchestrator = IngestionOrchestrator::new(
        IngestionDeps {
            users: Arc::new(DefaultUserProvider::new(users)),
            entries: Arc::new(PgEntryRepository::new(db.pool.clone())),
            index,
            analyzer,
            transcriber: whisper,
            generator: openai,
            blobs: blobs.clone(),
            chunker: Arc::new(FixedWindowChunker::default()),
        },
        config.adapter_timeout,
    );
    let concatenator = AudioConcatenator::new(
        blobs.clone(),
        Arc::new(FfmpegMerger::new(config.ffmpeg_path.clone())),
        config.scratch_dir.clone(),
        config.concat_timeout,
    );

    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        concatenator: Arc::new(concatenator),
        blobs,
    };
    let app = build_router(state, &config);

    // Start server
    let addr: SocketAddr = config.bind_address().parse()?;
    info!(subsystem = "api", "Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(subsystem = "api", "Server stopped");
    Ok(())
}

fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "journal_api=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    // Optionally create a file appender with daily rotation
    if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("journal-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false)); // no ANSI in files by default
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        // Console-only output
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(subsystem = "api", error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!(subsystem = "api", "Shutdown signal received");
}
