use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables once at startup.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    pub storage: StorageConfig,
    pub anthropic_api_key: String,
    pub llm_model: String,
    pub embedding: EmbeddingConfig,
    pub pipeline: PipelineConfig,
}

/// Where the three collections live.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    /// In-process collections; contents are lost on restart.
    Memory,
    Remote(RemoteStorageConfig),
}

#[derive(Debug, Clone)]
pub struct RemoteStorageConfig {
    pub database_url: String,
    pub redis_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub dimensions: usize,
}

/// Resource knobs for the ingestion pipeline. Injected into the orchestrator.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Jobs allowed to run stages concurrently.
    pub worker_capacity: usize,
    /// How long a job may wait for a worker slot before failing with `QueueFull`.
    pub queue_wait_timeout: Duration,
    pub max_upload_bytes: usize,
    pub extraction_timeout: Duration,
    pub llm_timeout: Duration,
    pub llm_max_retries: u32,
    pub embedding_batch_size: usize,
    pub embedding_max_retries: u32,
    pub retry_base_delay: Duration,
    /// Extra attempts for a failed store leg before rolling back.
    pub persist_leg_retries: u32,
    pub job_retention: Duration,
    pub observed_grace: Duration,
    pub drain_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_capacity: 4,
            queue_wait_timeout: Duration::from_secs(300),
            max_upload_bytes: 10 * 1024 * 1024,
            extraction_timeout: Duration::from_secs(30),
            llm_timeout: Duration::from_secs(120),
            llm_max_retries: 3,
            embedding_batch_size: 32,
            embedding_max_retries: 3,
            retry_base_delay: Duration::from_millis(1000),
            persist_leg_retries: 2,
            job_retention: Duration::from_secs(3600),
            observed_grace: Duration::from_secs(300),
            drain_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let storage = match optional_env("STORE_BACKEND")
            .unwrap_or_else(|| "remote".to_string())
            .as_str()
        {
            "memory" => StorageConfig::Memory,
            "remote" => StorageConfig::Remote(RemoteStorageConfig {
                database_url: require_env("DATABASE_URL")?,
                redis_url: require_env("REDIS_URL")?,
                s3_bucket: require_env("S3_BUCKET")?,
                s3_endpoint: require_env("S3_ENDPOINT")?,
                aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
                aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            }),
            other => anyhow::bail!("STORE_BACKEND must be 'remote' or 'memory', got '{other}'"),
        };

        let defaults = PipelineConfig::default();
        let pipeline = PipelineConfig {
            worker_capacity: parse_env("WORKER_CAPACITY", defaults.worker_capacity)?,
            queue_wait_timeout: secs_env("QUEUE_WAIT_SECS", defaults.queue_wait_timeout)?,
            max_upload_bytes: parse_env("MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            extraction_timeout: secs_env("EXTRACTION_TIMEOUT_SECS", defaults.extraction_timeout)?,
            llm_timeout: secs_env("LLM_TIMEOUT_SECS", defaults.llm_timeout)?,
            llm_max_retries: parse_env("LLM_MAX_RETRIES", defaults.llm_max_retries)?,
            embedding_batch_size: parse_env("EMBEDDING_BATCH_SIZE", defaults.embedding_batch_size)?,
            embedding_max_retries: parse_env(
                "EMBEDDING_MAX_RETRIES",
                defaults.embedding_max_retries,
            )?,
            retry_base_delay: Duration::from_millis(parse_env(
                "RETRY_BASE_DELAY_MS",
                defaults.retry_base_delay.as_millis() as u64,
            )?),
            persist_leg_retries: parse_env("PERSIST_LEG_RETRIES", defaults.persist_leg_retries)?,
            job_retention: secs_env("JOB_RETENTION_SECS", defaults.job_retention)?,
            observed_grace: secs_env("OBSERVED_GRACE_SECS", defaults.observed_grace)?,
            drain_timeout: secs_env("DRAIN_TIMEOUT_SECS", defaults.drain_timeout)?,
        };
        anyhow::ensure!(pipeline.worker_capacity > 0, "WORKER_CAPACITY must be at least 1");
        anyhow::ensure!(
            pipeline.embedding_batch_size > 0,
            "EMBEDDING_BATCH_SIZE must be at least 1"
        );

        Ok(Config {
            port: parse_env("PORT", 8080u16).context("PORT must be a valid port number")?,
            rust_log: optional_env("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            storage,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            llm_model: optional_env("LLM_MODEL")
                .unwrap_or_else(|| crate::llm_client::DEFAULT_MODEL.to_string()),
            embedding: EmbeddingConfig {
                api_url: optional_env("EMBEDDING_API_URL")
                    .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
                api_key: require_env("EMBEDDING_API_KEY")?,
                model: optional_env("EMBEDDING_MODEL")
                    .unwrap_or_else(|| "text-embedding-3-small".to_string()),
                dimensions: parse_env("EMBEDDING_DIMENSIONS", 1536usize)?,
            },
            pipeline,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has invalid value '{raw}'")),
        None => Ok(default),
    }
}

fn secs_env(key: &str, default: Duration) -> Result<Duration> {
    parse_env(key, default.as_secs()).map(Duration::from_secs)
}
