//! The three collections a completed job writes to, keyed by job id.
//!
//! Implementations:
//! - `MemoryCollection`: in-process, for local runs and tests
//! - `S3DocumentStore`: raw documents in S3 / MinIO
//! - `PgRecordStore`: structured records in PostgreSQL
//! - `RedisVectorStore`: embedding sets in Redis hashes

pub mod memory;
pub mod postgres;
pub mod redis_vectors;
pub mod s3;

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::document::{FileKind, PiiFields};
use crate::models::embedding::EmbeddingSet;
use crate::models::record::StructuredRecord;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Documents,
    Records,
    Embeddings,
}

impl Collection {
    pub const ALL: [Collection; 3] = [
        Collection::Documents,
        Collection::Records,
        Collection::Embeddings,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Documents => "documents",
            Collection::Records => "records",
            Collection::Embeddings => "embeddings",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("{collection} store error: {message}")]
pub struct StoreError {
    pub collection: Collection,
    pub message: String,
}

impl StoreError {
    pub fn new(collection: Collection, message: impl fmt::Display) -> Self {
        Self {
            collection,
            message: message.to_string(),
        }
    }
}

/// Everything stored next to the raw bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentMetadata {
    pub job_id: Uuid,
    pub channel: String,
    pub posting_id: Option<String>,
    pub filename: Option<String>,
    /// Only set for job applications.
    #[serde(default)]
    pub cover_letter: Option<String>,
    pub file_kind: FileKind,
    pub byte_len: usize,
    pub section_count: usize,
    pub pii: PiiFields,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    pub bytes: Bytes,
    pub metadata: DocumentMetadata,
}

/// Deletes are idempotent: deleting a missing key succeeds.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn put(&self, job_id: Uuid, document: &RawDocument) -> Result<(), StoreError>;
    async fn get(&self, job_id: Uuid) -> Result<Option<RawDocument>, StoreError>;
    async fn delete(&self, job_id: Uuid) -> Result<(), StoreError>;
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn put(&self, job_id: Uuid, record: &StructuredRecord) -> Result<(), StoreError>;
    async fn get(&self, job_id: Uuid) -> Result<Option<StructuredRecord>, StoreError>;
    async fn delete(&self, job_id: Uuid) -> Result<(), StoreError>;
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn put(&self, job_id: Uuid, embeddings: &EmbeddingSet) -> Result<(), StoreError>;
    async fn get(&self, job_id: Uuid) -> Result<Option<EmbeddingSet>, StoreError>;
    async fn delete(&self, job_id: Uuid) -> Result<(), StoreError>;
}
