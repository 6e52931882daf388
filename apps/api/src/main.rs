mod config;
mod db;
mod errors;
mod llm_client;
mod models;
mod pipeline;
mod providers;
mod routes;
mod state;
mod storage;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, RemoteStorageConfig, StorageConfig};
use crate::db::{create_pool, ensure_schema};
use crate::llm_client::{LlmClient, RetryPolicy};
use crate::models::embedding::EmbeddingSet;
use crate::models::record::StructuredRecord;
use crate::pipeline::embedder::Embedder;
use crate::pipeline::extractor::Extractor;
use crate::pipeline::orchestrator::{Orchestrator, Pipeline};
use crate::pipeline::progress::ProgressTracker;
use crate::pipeline::redactor::Redactor;
use crate::pipeline::standardizer::LlmStandardizer;
use crate::pipeline::writer::StoreWriter;
use crate::providers::embedding::OpenAiEmbeddingBackend;
use crate::routes::build_router;
use crate::state::AppState;
use crate::storage::memory::MemoryCollection;
use crate::storage::postgres::PgRecordStore;
use crate::storage::redis_vectors::RedisVectorStore;
use crate::storage::s3::S3DocumentStore;
use crate::storage::RawDocument;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting CV ingestion service v{}", env!("CARGO_PKG_VERSION"));

    let writer = match &config.storage {
        StorageConfig::Memory => {
            warn!("STORE_BACKEND=memory: stored artifacts are lost on restart");
            StoreWriter::new(
                Arc::new(MemoryCollection::<RawDocument>::new()),
                Arc::new(MemoryCollection::<StructuredRecord>::new()),
                Arc::new(MemoryCollection::<EmbeddingSet>::new()),
            )
        }
        StorageConfig::Remote(remote) => build_remote_writer(remote).await?,
    };

    let pipeline_config = config.pipeline.clone();

    // Initialize LLM client
    let llm = LlmClient::new(
        config.anthropic_api_key.clone(),
        config.llm_model.clone(),
        RetryPolicy {
            timeout: pipeline_config.llm_timeout,
            max_attempts: pipeline_config.llm_max_retries,
            base_delay: pipeline_config.retry_base_delay,
        },
    );
    info!("LLM client initialized (model: {})", llm.model());

    // Initialize embedding backend
    let embedding_backend = OpenAiEmbeddingBackend::new(
        &config.embedding.api_key,
        &config.embedding.api_url,
        config.embedding.model.clone(),
        config.embedding.dimensions,
        pipeline_config.llm_timeout,
    )?;
    info!(
        "Embedding backend initialized ({}, {} dims)",
        config.embedding.model, config.embedding.dimensions
    );

    let pipeline = Pipeline {
        extractor: Extractor::new(
            pipeline_config.max_upload_bytes,
            pipeline_config.extraction_timeout,
        ),
        redactor: Redactor::new(),
        standardizer: Arc::new(LlmStandardizer::new(llm)),
        embedder: Embedder::new(
            Arc::new(embedding_backend),
            pipeline_config.embedding_batch_size,
            pipeline_config.embedding_max_retries,
            pipeline_config.retry_base_delay,
        ),
        writer,
    };

    let tracker = ProgressTracker::new(
        pipeline_config.job_retention,
        pipeline_config.observed_grace,
    );
    let sweeper = tracker.spawn_sweeper(pipeline_config.observed_grace.min(SWEEP_INTERVAL));
    let drain_timeout = pipeline_config.drain_timeout;
    info!(
        "Worker pool: {} slots, queue wait {}s",
        pipeline_config.worker_capacity,
        pipeline_config.queue_wait_timeout.as_secs()
    );
    let orchestrator = Orchestrator::new(pipeline, pipeline_config, tracker);

    // Build app state
    let state = AppState {
        orchestrator: orchestrator.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    // Keep serving health and progress while in-flight jobs drain.
    let shutdown_orchestrator = orchestrator.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let cancelled = shutdown_orchestrator.drain(drain_timeout).await;
            if cancelled > 0 {
                warn!("Shutdown cancelled {cancelled} unfinished jobs");
            }
        })
        .await?;

    sweeper.abort();
    info!("Shutdown complete");

    Ok(())
}

/// Connects S3, PostgreSQL and Redis and wires one store per collection.
async fn build_remote_writer(remote: &RemoteStorageConfig) -> Result<StoreWriter> {
    // Initialize PostgreSQL
    let db = create_pool(&remote.database_url).await?;
    ensure_schema(&db).await?;

    // Initialize Redis
    let redis = redis::Client::open(remote.redis_url.clone())?;
    let vectors = RedisVectorStore::connect(&redis).await?;
    info!("Redis connection established");

    // Initialize S3 / MinIO
    let s3 = build_s3_client(remote).await;
    info!("S3 client initialized (bucket: {})", remote.s3_bucket);

    Ok(StoreWriter::new(
        Arc::new(S3DocumentStore::new(s3, remote.s3_bucket.clone())),
        Arc::new(PgRecordStore::new(db)),
        Arc::new(vectors),
    ))
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(remote: &RemoteStorageConfig) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &remote.aws_access_key_id,
        &remote.aws_secret_access_key,
        None,
        None,
        "cv-ingest-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&remote.s3_endpoint)
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&s3_config)
        .force_path_style(true)
        .build();
    aws_sdk_s3::Client::from_conf(s3_config)
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received, draining");
}
