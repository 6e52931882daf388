//! Test doubles shared by pipeline and route tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::models::document::{FileKind, PiiFields, RedactedPayload};
use crate::models::embedding::{EmbeddingSet, EmbeddingSlot};
use crate::models::job::{Applicant, IntakeChannel, Stage};
use crate::models::record::{Experience, StructuredRecord};
use crate::pipeline::embedder::{plan_slots, Embedder};
use crate::pipeline::extractor::Extractor;
use crate::pipeline::orchestrator::{IntakeRequest, Orchestrator, Pipeline};
use crate::pipeline::progress::{ProgressSnapshot, ProgressTracker};
use crate::pipeline::redactor::Redactor;
use crate::pipeline::standardizer::{StandardizeError, Standardizer};
use crate::pipeline::writer::{Artifacts, StoreWriter};
use crate::providers::embedding::{BackendError, EmbeddingBackend};
use crate::storage::memory::MemoryCollection;
use crate::storage::{
    Collection, DocumentMetadata, DocumentStore, RawDocument, RecordStore, StoreError,
    VectorStore,
};

pub const SAMPLE_CV: &str = "Ada Lovelace
ada@example.com | +44 20 7946 0018

Senior Software Engineer

Experience
Acme Corp 2015-2020: built analytical engines in Rust and PostgreSQL.
";

pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        queue_wait_timeout: Duration::from_secs(10),
        retry_base_delay: Duration::from_millis(1),
        ..Default::default()
    }
}

pub fn direct_upload(text: &str) -> IntakeRequest {
    IntakeRequest {
        bytes: Bytes::from(text.to_string()),
        mime_hint: Some("text/plain".to_string()),
        filename: Some("cv.txt".to_string()),
        channel: IntakeChannel::Direct,
    }
}

pub fn application(text: &str, posting_id: &str) -> IntakeRequest {
    IntakeRequest {
        channel: IntakeChannel::JobApplication {
            applicant: Applicant {
                name: "Ada Lovelace".to_string(),
                email: "ada@example.com".to_string(),
                phone: Some("+44 20 7946 0018".to_string()),
                cover_letter: Some("Keen to join.".to_string()),
            },
            posting_id: posting_id.to_string(),
        },
        ..direct_upload(text)
    }
}

pub fn sample_record() -> StructuredRecord {
    StructuredRecord {
        title: "Senior Software Engineer".to_string(),
        skills: vec![
            "Rust".to_string(),
            "PostgreSQL".to_string(),
            "Kafka".to_string(),
        ],
        responsibilities: vec![
            "Built analytical engines".to_string(),
            "Mentored engineers".to_string(),
        ],
        experience: Experience {
            total_years: 5.0,
            summary: "Backend engineering".to_string(),
        },
    }
}

pub fn sample_artifacts(job_id: Uuid) -> Artifacts {
    let record = sample_record();
    let slots = plan_slots(&record)
        .into_iter()
        .map(|plan| EmbeddingSlot {
            tag: plan.tag,
            placeholder: plan.text.is_none(),
            vector: if plan.text.is_some() {
                vec![1.0; 4]
            } else {
                vec![0.0; 4]
            },
            source_text: plan.text,
        })
        .collect();
    Artifacts {
        job_id,
        document: RawDocument {
            bytes: Bytes::from_static(SAMPLE_CV.as_bytes()),
            metadata: DocumentMetadata {
                job_id,
                channel: "direct".to_string(),
                posting_id: None,
                filename: Some("cv.txt".to_string()),
                cover_letter: None,
                file_kind: FileKind::PlainText,
                byte_len: SAMPLE_CV.len(),
                section_count: 3,
                pii: PiiFields::default(),
                created_at: Utc::now(),
            },
        },
        record,
        embeddings: EmbeddingSet {
            model: "fake-embedding".to_string(),
            dimensions: 4,
            slots,
        },
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Embedding backend
// ────────────────────────────────────────────────────────────────────────────

pub struct FakeEmbeddingBackend {
    dimensions: usize,
    returned_dimensions: usize,
    failures_left: AtomicU32,
    block: bool,
    calls: AtomicUsize,
    texts: AtomicUsize,
}

impl FakeEmbeddingBackend {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            returned_dimensions: dimensions,
            failures_left: AtomicU32::new(0),
            block: false,
            calls: AtomicUsize::new(0),
            texts: AtomicUsize::new(0),
        }
    }

    /// Returns vectors of a different size than advertised.
    pub fn returning_dimensions(mut self, dimensions: usize) -> Self {
        self.returned_dimensions = dimensions;
        self
    }

    /// The first `n` calls fail with a transient error.
    pub fn failing_first(self, n: u32) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    /// Never returns; only cancellation ends the call.
    pub fn blocking(mut self) -> Self {
        self.block = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Total texts embedded by successful calls.
    pub fn embedded_texts(&self) -> usize {
        self.texts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingBackend for FakeEmbeddingBackend {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.block {
            std::future::pending::<()>().await;
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(BackendError::transient("injected 503"));
        }
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| vec![(t.len() % 7) as f32 + 1.0; self.returned_dimensions])
            .collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model(&self) -> &str {
        "fake-embedding"
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Standardizer
// ────────────────────────────────────────────────────────────────────────────

pub struct FakeStandardizer {
    record: StructuredRecord,
    delay: Option<Duration>,
    block: bool,
    reject: bool,
    seen: Mutex<Vec<String>>,
    active: Arc<AtomicUsize>,
    max_active: AtomicUsize,
}

struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeStandardizer {
    pub fn new() -> Self {
        Self {
            record: sample_record(),
            delay: None,
            block: false,
            reject: false,
            seen: Mutex::new(Vec::new()),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Never returns; only cancellation ends the call.
    pub fn blocking(mut self) -> Self {
        self.block = true;
        self
    }

    /// Answers with a schema violation.
    pub fn rejecting(mut self) -> Self {
        self.reject = true;
        self
    }

    pub fn seen_texts(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Standardizer for FakeStandardizer {
    async fn standardize(
        &self,
        payload: &RedactedPayload,
    ) -> Result<StructuredRecord, StandardizeError> {
        self.seen.lock().unwrap().push(payload.text.clone());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let _guard = ActiveGuard(self.active.clone());

        if self.block {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.reject {
            return Err(StandardizeError::StandardizationFailed(
                "schema violation: missing or invalid title".to_string(),
            ));
        }
        Ok(self.record.clone())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Stores with fault injection
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct Faults {
    puts: Mutex<HashMap<Collection, u32>>,
    deletes: Mutex<HashMap<Collection, u32>>,
    lost_deletes: Mutex<HashMap<Collection, u32>>,
}

impl Faults {
    pub const ALWAYS: u32 = u32::MAX;

    /// The next `n` puts to `collection` fail.
    pub fn fail_puts(&self, collection: Collection, n: u32) {
        self.puts.lock().unwrap().insert(collection, n);
    }

    pub fn fail_deletes(&self, collection: Collection, n: u32) {
        self.deletes.lock().unwrap().insert(collection, n);
    }

    /// The next `n` deletes report success but leave the item in place.
    pub fn ignore_deletes(&self, collection: Collection, n: u32) {
        self.lost_deletes.lock().unwrap().insert(collection, n);
    }

    fn take(map: &Mutex<HashMap<Collection, u32>>, collection: Collection) -> bool {
        let mut map = map.lock().unwrap();
        match map.get_mut(&collection) {
            Some(n) if *n > 0 => {
                if *n != Self::ALWAYS {
                    *n -= 1;
                }
                true
            }
            _ => false,
        }
    }
}

pub struct FaultyStore<T> {
    inner: Arc<MemoryCollection<T>>,
    faults: Arc<Faults>,
    collection: Collection,
}

macro_rules! faulty_store {
    ($store:ident, $item:ty) => {
        #[async_trait]
        impl $store for FaultyStore<$item> {
            async fn put(&self, job_id: Uuid, item: &$item) -> Result<(), StoreError> {
                if Faults::take(&self.faults.puts, self.collection) {
                    return Err(StoreError::new(self.collection, "injected put failure"));
                }
                $store::put(&*self.inner, job_id, item).await
            }

            async fn get(&self, job_id: Uuid) -> Result<Option<$item>, StoreError> {
                $store::get(&*self.inner, job_id).await
            }

            async fn delete(&self, job_id: Uuid) -> Result<(), StoreError> {
                if Faults::take(&self.faults.deletes, self.collection) {
                    return Err(StoreError::new(self.collection, "injected delete failure"));
                }
                if Faults::take(&self.faults.lost_deletes, self.collection) {
                    return Ok(());
                }
                $store::delete(&*self.inner, job_id).await
            }
        }
    };
}

faulty_store!(DocumentStore, RawDocument);
faulty_store!(RecordStore, StructuredRecord);
faulty_store!(VectorStore, EmbeddingSet);

pub struct TestStores {
    pub documents: Arc<MemoryCollection<RawDocument>>,
    pub records: Arc<MemoryCollection<StructuredRecord>>,
    pub embeddings: Arc<MemoryCollection<EmbeddingSet>>,
    pub faults: Arc<Faults>,
}

impl TestStores {
    pub fn new() -> Self {
        Self {
            documents: Arc::new(MemoryCollection::new()),
            records: Arc::new(MemoryCollection::new()),
            embeddings: Arc::new(MemoryCollection::new()),
            faults: Arc::new(Faults::default()),
        }
    }

    fn faulty<T>(&self, inner: &Arc<MemoryCollection<T>>, collection: Collection) -> FaultyStore<T> {
        FaultyStore {
            inner: inner.clone(),
            faults: self.faults.clone(),
            collection,
        }
    }

    pub fn writer(&self) -> StoreWriter {
        StoreWriter::new(
            Arc::new(self.faulty(&self.documents, Collection::Documents)),
            Arc::new(self.faulty(&self.records, Collection::Records)),
            Arc::new(self.faulty(&self.embeddings, Collection::Embeddings)),
        )
    }

    pub fn all_empty(&self) -> bool {
        self.documents.is_empty() && self.records.is_empty() && self.embeddings.is_empty()
    }

    pub fn document_for(&self, job_id: Uuid) -> Option<RawDocument> {
        self.documents.fetch(&job_id)
    }

    pub fn record_for(&self, job_id: Uuid) -> Option<StructuredRecord> {
        self.records.fetch(&job_id)
    }

    pub fn embeddings_for(&self, job_id: Uuid) -> Option<EmbeddingSet> {
        self.embeddings.fetch(&job_id)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Orchestrator harness
// ────────────────────────────────────────────────────────────────────────────

pub struct Harness {
    pub stores: TestStores,
    pub embeddings: Arc<FakeEmbeddingBackend>,
    pub standardizer: Arc<FakeStandardizer>,
    pub orchestrator: Orchestrator,
}

impl Harness {
    pub fn new(standardizer: FakeStandardizer, config: PipelineConfig) -> Self {
        Self::with_backend(standardizer, FakeEmbeddingBackend::new(8), config)
    }

    pub fn with_backend(
        standardizer: FakeStandardizer,
        backend: FakeEmbeddingBackend,
        config: PipelineConfig,
    ) -> Self {
        let stores = TestStores::new();
        let embeddings = Arc::new(backend);
        let standardizer = Arc::new(standardizer);
        let pipeline = Pipeline {
            extractor: Extractor::new(config.max_upload_bytes, config.extraction_timeout),
            redactor: Redactor::new(),
            standardizer: standardizer.clone(),
            embedder: Embedder::new(
                embeddings.clone(),
                config.embedding_batch_size,
                config.embedding_max_retries,
                config.retry_base_delay,
            ),
            writer: stores.writer(),
        };
        let tracker = ProgressTracker::new(config.job_retention, config.observed_grace);
        let orchestrator = Orchestrator::new(pipeline, config, tracker);
        Self {
            stores,
            embeddings,
            standardizer,
            orchestrator,
        }
    }

    pub async fn wait_terminal(&self, job_id: Uuid) -> ProgressSnapshot {
        for _ in 0..2000 {
            if let Some(snap) = self.orchestrator.tracker().get(job_id) {
                if snap.stage.is_terminal() {
                    return snap;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {job_id} did not finish");
    }

    pub async fn wait_for_stage(&self, job_id: Uuid, stage: Stage) {
        for _ in 0..2000 {
            if self.orchestrator.tracker().stage(job_id) == Some(stage) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {job_id} never reached {stage}");
    }
}
