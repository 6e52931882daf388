//! Job Orchestrator: owns every job's lifecycle from intake to a terminal state.
//!
//! State machine:
//! `Queued → Extracting → Redacting → Standardizing → Embedding → Persisting → Completed`,
//! with `Failed` reachable from any non-terminal stage and `PartiallyPersisted`
//! entered while a failed store leg is being repaired.
//!
//! Both intake channels land in [`Orchestrator::submit`]; the channel only
//! travels as data on the job.

use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::llm_client::backoff_delay;
use crate::models::embedding::EmbeddingSet;
use crate::models::job::{FailureKind, FailureReason, IngestionJob, IntakeChannel, Stage};
use crate::pipeline::cancel::{cancel_pair, CancelHandle, CancelToken, Cancelled};
use crate::pipeline::embedder::{EmbedError, Embedder};
use crate::pipeline::extractor::{ExtractError, Extractor};
use crate::pipeline::progress::{CompletionSummary, ProgressTracker, ProgressWriter};
use crate::pipeline::redactor::{RedactionError, Redactor};
use crate::pipeline::standardizer::{StandardizeError, Standardizer};
use crate::pipeline::writer::{Artifacts, StoreWriter};
use crate::storage::{Collection, DocumentMetadata, RawDocument, StoreError};

/// How long cancelled jobs get to record their failure after a drain timeout.
const CANCEL_GRACE: Duration = Duration::from_secs(5);

/// The five stage components, wired once at startup.
pub struct Pipeline {
    pub extractor: Extractor,
    pub redactor: Redactor,
    pub standardizer: Arc<dyn Standardizer>,
    pub embedder: Embedder,
    pub writer: StoreWriter,
}

/// A document handed over by either intake channel.
#[derive(Debug, Clone)]
pub struct IntakeRequest {
    pub bytes: Bytes,
    pub mime_hint: Option<String>,
    pub filename: Option<String>,
    pub channel: IntakeChannel,
}

/// Rejected before a job exists. Never retried.
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error(transparent)]
    InvalidFile(#[from] ExtractError),

    #[error("invalid application: {0}")]
    InvalidApplication(String),

    #[error("service is draining and not accepting new documents")]
    Draining,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Signalled,
    AlreadyTerminal,
    NotFound,
}

/// Maps a component error onto the failure taxonomy.
trait Classify: Display {
    fn failure_kind(&self) -> FailureKind;
}

impl Classify for ExtractError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            ExtractError::TempStorage(_) => FailureKind::Internal,
            _ => FailureKind::Intake,
        }
    }
}

impl Classify for RedactionError {
    fn failure_kind(&self) -> FailureKind {
        FailureKind::Internal
    }
}

impl Classify for StandardizeError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            StandardizeError::Transient(_) => FailureKind::TransientExternal,
            StandardizeError::Rejected { .. } => FailureKind::Internal,
            StandardizeError::StandardizationFailed(_) => FailureKind::SchemaViolation,
        }
    }
}

impl Classify for EmbedError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            EmbedError::EmbeddingBackendUnavailable(_) => FailureKind::TransientExternal,
            EmbedError::EmbeddingDimensionMismatch { .. } => FailureKind::DimensionMismatch,
            EmbedError::CountMismatch { .. } => FailureKind::Internal,
        }
    }
}

fn failed_at<E: Classify>(stage: Stage) -> impl FnOnce(E) -> FailureReason {
    move |e| FailureReason::new(stage, e.failure_kind(), e.to_string())
}

fn cancelled_at(stage: Stage) -> impl FnOnce(Cancelled) -> FailureReason {
    move |_| FailureReason::new(stage, FailureKind::Cancelled, "job cancelled")
}

struct Inner {
    pipeline: Pipeline,
    config: PipelineConfig,
    tracker: ProgressTracker,
    permits: Arc<Semaphore>,
    running: DashMap<Uuid, CancelHandle>,
    draining: AtomicBool,
    idle: Notify,
}

#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(pipeline: Pipeline, config: PipelineConfig, tracker: ProgressTracker) -> Self {
        let permits = Arc::new(Semaphore::new(config.worker_capacity.max(1)));
        Self {
            inner: Arc::new(Inner {
                pipeline,
                config,
                tracker,
                permits,
                running: DashMap::new(),
                draining: AtomicBool::new(false),
                idle: Notify::new(),
            }),
        }
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.inner.tracker
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.inner.pipeline.extractor.max_bytes()
    }

    /// Validates the upload, creates the job and returns its id without
    /// waiting for any stage to run.
    pub fn submit(&self, request: IntakeRequest) -> Result<Uuid, IntakeError> {
        if self.is_draining() {
            return Err(IntakeError::Draining);
        }
        self.inner.pipeline.extractor.precheck(
            &request.bytes,
            request.mime_hint.as_deref(),
            request.filename.as_deref(),
        )?;
        validate_channel(&request.channel)?;

        let job = IngestionJob::new(request.channel, request.filename, request.mime_hint);
        let job_id = job.id;
        let progress = self.inner.tracker.register(&job);
        let (handle, token) = cancel_pair();
        self.inner.running.insert(job_id, handle);

        info!(
            job_id = %job_id,
            channel = job.channel.as_str(),
            bytes = request.bytes.len(),
            "Job accepted"
        );

        let this = self.clone();
        let bytes = request.bytes;
        tokio::spawn(async move {
            this.run_job(job, bytes, progress, token).await;
            this.inner.running.remove(&job_id);
            this.inner.idle.notify_waiters();
        });

        Ok(job_id)
    }

    /// Signals cancellation. The job records `Failed` with kind `cancelled`
    /// at its next suspension point unless persistence has already begun.
    pub fn cancel(&self, job_id: Uuid) -> CancelOutcome {
        match self.inner.tracker.stage(job_id) {
            None => return CancelOutcome::NotFound,
            Some(stage) if stage.is_terminal() => return CancelOutcome::AlreadyTerminal,
            Some(_) => {}
        }
        match self.inner.running.get(&job_id) {
            Some(handle) => {
                info!(job_id = %job_id, "Cancellation requested");
                handle.cancel();
                CancelOutcome::Signalled
            }
            None => CancelOutcome::AlreadyTerminal,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.inner.running.len()
    }

    pub fn is_draining(&self) -> bool {
        self.inner.draining.load(Ordering::SeqCst)
    }

    /// Stops admission. Jobs already accepted keep running.
    pub fn begin_drain(&self) {
        if !self.inner.draining.swap(true, Ordering::SeqCst) {
            info!("Draining: no longer accepting new documents");
        }
    }

    /// Stops admission, waits up to `timeout` for in-flight jobs, then
    /// cancels whatever is left. Returns the number of jobs cancelled.
    pub async fn drain(&self, timeout: Duration) -> usize {
        self.begin_drain();
        info!("Waiting for {} in-flight jobs", self.in_flight());
        if self.wait_idle(timeout).await {
            return 0;
        }

        let mut cancelled = 0;
        for handle in self.inner.running.iter() {
            handle.value().cancel();
            cancelled += 1;
        }
        warn!("Drain timed out; cancelled {cancelled} jobs");
        if !self.wait_idle(CANCEL_GRACE).await {
            warn!("{} jobs still running after cancellation", self.in_flight());
        }
        cancelled
    }

    async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.running.is_empty() {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.inner.running.is_empty();
            }
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Job task
    // ────────────────────────────────────────────────────────────────────────

    async fn run_job(
        &self,
        job: IngestionJob,
        bytes: Bytes,
        progress: ProgressWriter,
        token: CancelToken,
    ) {
        let wait = self.inner.config.queue_wait_timeout;
        let acquire = tokio::time::timeout(wait, self.inner.permits.clone().acquire_owned());
        let permit = match token.run(acquire).await {
            Ok(Ok(Ok(permit))) => permit,
            Ok(Ok(Err(_closed))) => {
                progress.fail(FailureReason::new(
                    Stage::Queued,
                    FailureKind::Internal,
                    "worker pool closed",
                ));
                return;
            }
            Ok(Err(_elapsed)) => {
                progress.fail(FailureReason::new(
                    Stage::Queued,
                    FailureKind::QueueFull,
                    format!("no worker became free within {}s", wait.as_secs()),
                ));
                return;
            }
            Err(cancelled) => {
                progress.fail(cancelled_at(Stage::Queued)(cancelled));
                return;
            }
        };

        let result = self.execute(&job, bytes, &progress, &token).await;
        drop(permit);

        match result {
            Ok(summary) => progress.complete(summary),
            Err(reason) => progress.fail(reason),
        }
    }

    async fn execute(
        &self,
        job: &IngestionJob,
        bytes: Bytes,
        progress: &ProgressWriter,
        token: &CancelToken,
    ) -> Result<CompletionSummary, FailureReason> {
        let pipeline = &self.inner.pipeline;

        progress.advance(Stage::Extracting);
        let extraction = token
            .run(pipeline.extractor.extract(
                bytes.clone(),
                job.mime_hint.as_deref(),
                job.filename.as_deref(),
            ))
            .await;
        // The blocking parser cannot be interrupted; it finishes and cleans up on its own.
        let extracted = match extraction {
            Ok(Ok(extracted)) => extracted,
            Ok(Err(e)) => {
                if matches!(e, ExtractError::ExtractionTimeout(_)) {
                    warn!(
                        job_id = %job.id,
                        "Extraction timed out, parser left running on the blocking pool"
                    );
                }
                return Err(failed_at(Stage::Extracting)(e));
            }
            Err(cancelled) => {
                warn!(
                    job_id = %job.id,
                    "Cancelled during extraction, parser left running on the blocking pool"
                );
                return Err(cancelled_at(Stage::Extracting)(cancelled));
            }
        };

        if token.is_cancelled() {
            return Err(cancelled_at(Stage::Extracting)(Cancelled));
        }
        progress.advance(Stage::Redacting);
        let payload = pipeline
            .redactor
            .redact(&extracted.text, job.channel.applicant())
            .map_err(failed_at(Stage::Redacting))?;
        debug!(job_id = %job.id, "Redacted {} PII values", payload.pii.total());

        progress.advance(Stage::Standardizing);
        let record = token
            .run(pipeline.standardizer.standardize(&payload))
            .await
            .map_err(cancelled_at(Stage::Standardizing))?
            .map_err(failed_at(Stage::Standardizing))?;

        progress.advance(Stage::Embedding);
        let embeddings = token
            .run(pipeline.embedder.embed(&record))
            .await
            .map_err(cancelled_at(Stage::Embedding))?
            .map_err(failed_at(Stage::Embedding))?;

        // Last chance to honour a cancel; persistence always runs to commit or rollback.
        if token.is_cancelled() {
            return Err(cancelled_at(Stage::Embedding)(Cancelled));
        }
        progress.advance(Stage::Persisting);

        let summary = summarize(&embeddings);
        let artifacts = Artifacts {
            job_id: job.id,
            document: RawDocument {
                bytes,
                metadata: DocumentMetadata {
                    job_id: job.id,
                    channel: job.channel.as_str().to_string(),
                    posting_id: job.channel.posting_id().map(str::to_string),
                    filename: job.filename.clone(),
                    cover_letter: job
                        .channel
                        .applicant()
                        .and_then(|a| a.cover_letter.clone()),
                    file_kind: extracted.file_kind,
                    byte_len: extracted.byte_len,
                    section_count: extracted.section_count,
                    pii: payload.pii,
                    created_at: job.created_at,
                },
            },
            record,
            embeddings,
        };

        let collections = self.persist(&artifacts, progress).await?;
        Ok(CompletionSummary {
            collections,
            ..summary
        })
    }

    /// Writes all legs; repairs failed legs with bounded retries, otherwise
    /// rolls every collection back so nothing of the job remains.
    async fn persist(
        &self,
        artifacts: &Artifacts,
        progress: &ProgressWriter,
    ) -> Result<Vec<Collection>, FailureReason> {
        let writer = &self.inner.pipeline.writer;
        let outcome = writer.write_all(artifacts).await;
        if outcome.is_complete() {
            return Ok(outcome.succeeded);
        }

        progress.advance(Stage::PartiallyPersisted);
        let mut written = outcome.succeeded;
        let mut still_failing = Vec::new();
        for (collection, err) in outcome.failed {
            warn!(job_id = %artifacts.job_id, "Persist leg {collection} failed: {err}");
            match self.retry_leg(collection, artifacts).await {
                Ok(()) => written.push(collection),
                Err(e) => still_failing.push(format!("{collection}: {}", e.message)),
            }
        }
        if still_failing.is_empty() {
            info!(job_id = %artifacts.job_id, "Partial persistence repaired");
            return Ok(written);
        }

        // Delete everywhere; a failed put may still have landed.
        let attempts = self.inner.config.persist_leg_retries + 1;
        let stuck = writer
            .rollback(artifacts.job_id, &Collection::ALL, attempts)
            .await;
        let mut message = format!("persistence failed: {}", still_failing.join("; "));
        if !stuck.is_empty() {
            let legs: Vec<String> = stuck.iter().map(|(c, _)| c.to_string()).collect();
            error!(
                job_id = %artifacts.job_id,
                "Rollback incomplete, orphaned data in: {}",
                legs.join(", ")
            );
            message.push_str(&format!("; rollback incomplete for {}", legs.join(", ")));
        }
        Err(FailureReason::new(
            Stage::PartiallyPersisted,
            FailureKind::PartialPersistence,
            message,
        ))
    }

    async fn retry_leg(
        &self,
        collection: Collection,
        artifacts: &Artifacts,
    ) -> Result<(), StoreError> {
        let base = self.inner.config.retry_base_delay;
        let retries = self.inner.config.persist_leg_retries;
        let mut last = None;
        for attempt in 0..retries {
            tokio::time::sleep(backoff_delay(base, attempt)).await;
            match self
                .inner
                .pipeline
                .writer
                .retry_leg(collection, artifacts)
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) => last = Some(e),
            }
        }
        Err(last.unwrap_or_else(|| StoreError::new(collection, "no retries configured")))
    }
}

fn validate_channel(channel: &IntakeChannel) -> Result<(), IntakeError> {
    let IntakeChannel::JobApplication {
        applicant,
        posting_id,
    } = channel
    else {
        return Ok(());
    };
    if posting_id.trim().is_empty() {
        return Err(IntakeError::InvalidApplication(
            "posting id is required".to_string(),
        ));
    }
    if applicant.name.trim().is_empty() {
        return Err(IntakeError::InvalidApplication("name is required".to_string()));
    }
    let email = applicant.email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(IntakeError::InvalidApplication(format!(
            "'{email}' is not a valid email address"
        ))),
    }
}

fn summarize(embeddings: &EmbeddingSet) -> CompletionSummary {
    CompletionSummary {
        embedding_count: embeddings.len(),
        placeholder_count: embeddings.slots.iter().filter(|s| s.placeholder).count(),
        collections: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::models::embedding::{EmbeddingTag, EMBEDDINGS_PER_DOCUMENT};
    use crate::models::job::Applicant;
    use crate::pipeline::testing::{
        application, direct_upload, test_config, FakeEmbeddingBackend, FakeStandardizer, Faults,
        Harness, SAMPLE_CV,
    };

    #[tokio::test]
    async fn test_intake_returns_before_slow_stages() {
        let harness = Harness::new(
            FakeStandardizer::new().with_delay(Duration::from_secs(2)),
            test_config(),
        );
        let started = Instant::now();
        let id = harness.orchestrator.submit(direct_upload(SAMPLE_CV)).unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));
        let snap = harness.orchestrator.tracker().get(id).unwrap();
        assert!(!snap.stage.is_terminal());
    }

    #[tokio::test]
    async fn test_completed_job_has_fixed_embedding_layout() {
        let harness = Harness::new(FakeStandardizer::new(), test_config());
        let id = harness.orchestrator.submit(direct_upload(SAMPLE_CV)).unwrap();
        let snap = harness.wait_terminal(id).await;

        assert_eq!(snap.stage, Stage::Completed, "{:?}", snap.error);
        assert_eq!(snap.percent_estimate, 100);
        let summary = snap.result.clone().unwrap();
        assert_eq!(summary.embedding_count, EMBEDDINGS_PER_DOCUMENT);
        assert_eq!(summary.collections.len(), 3);

        let set = harness.stores.embeddings_for(id).unwrap();
        assert_eq!(set.count_where(|t| matches!(t, EmbeddingTag::Skill(_))), 20);
        assert_eq!(
            set.count_where(|t| matches!(t, EmbeddingTag::Responsibility(_))),
            10
        );
        assert_eq!(set.count_where(|t| *t == EmbeddingTag::Title), 1);
        assert_eq!(set.count_where(|t| *t == EmbeddingTag::Experience), 1);
        assert!(harness.stores.documents.contains(&id));
        assert!(harness.stores.records.contains(&id));

        assert_eq!(
            snap.stages_visited,
            vec![
                Stage::Queued,
                Stage::Extracting,
                Stage::Redacting,
                Stage::Standardizing,
                Stage::Embedding,
                Stage::Persisting,
                Stage::Completed,
            ]
        );

        // Re-querying a terminal job returns the same result.
        let again = harness.orchestrator.tracker().get(id).unwrap();
        assert_eq!(snap, again);
    }

    #[tokio::test]
    async fn test_pii_never_reaches_standardizer() {
        let harness = Harness::new(FakeStandardizer::new(), test_config());
        let id = harness.orchestrator.submit(direct_upload(SAMPLE_CV)).unwrap();
        harness.wait_terminal(id).await;

        let seen = harness.standardizer.seen_texts();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].contains("ada@example.com"));
        assert!(!seen[0].contains("Ada Lovelace"));

        let doc = harness.stores.document_for(id).unwrap();
        assert!(doc.metadata.pii.emails.contains(&"ada@example.com".to_string()));
    }

    #[tokio::test]
    async fn test_both_channels_produce_same_artifacts() {
        let harness = Harness::new(FakeStandardizer::new(), test_config());
        let direct = harness.orchestrator.submit(direct_upload(SAMPLE_CV)).unwrap();
        let applied = harness
            .orchestrator
            .submit(application(SAMPLE_CV, "posting-42"))
            .unwrap();

        let a = harness.wait_terminal(direct).await;
        let b = harness.wait_terminal(applied).await;
        assert_eq!(a.stage, Stage::Completed);
        assert_eq!(a.stages_visited, b.stages_visited);
        assert_eq!(b.channel, "job_application");
        assert_eq!(b.posting_id.as_deref(), Some("posting-42"));

        let record_a = harness.stores.record_for(direct).unwrap();
        let record_b = harness.stores.record_for(applied).unwrap();
        assert_eq!(record_a, record_b);
        let set_a = harness.stores.embeddings_for(direct).unwrap();
        let set_b = harness.stores.embeddings_for(applied).unwrap();
        assert_eq!(set_a.len(), set_b.len());
        let tags_a: Vec<_> = set_a.slots.iter().map(|s| s.tag).collect();
        let tags_b: Vec<_> = set_b.slots.iter().map(|s| s.tag).collect();
        assert_eq!(tags_a, tags_b);

        let doc = harness.stores.document_for(applied).unwrap();
        assert_eq!(doc.metadata.posting_id.as_deref(), Some("posting-42"));
        assert_eq!(doc.metadata.cover_letter.as_deref(), Some("Keen to join."));
    }

    #[tokio::test]
    async fn test_persistent_write_fault_rolls_back_everything() {
        let harness = Harness::new(FakeStandardizer::new(), test_config());
        harness
            .stores
            .faults
            .fail_puts(Collection::Embeddings, Faults::ALWAYS);

        let id = harness.orchestrator.submit(direct_upload(SAMPLE_CV)).unwrap();
        let snap = harness.wait_terminal(id).await;

        assert_eq!(snap.stage, Stage::Failed);
        let reason = snap.error.unwrap();
        assert_eq!(reason.kind, FailureKind::PartialPersistence);
        assert!(snap.stages_visited.contains(&Stage::PartiallyPersisted));
        assert!(harness.stores.all_empty());
    }

    #[tokio::test]
    async fn test_single_write_fault_is_repaired() {
        let harness = Harness::new(FakeStandardizer::new(), test_config());
        harness.stores.faults.fail_puts(Collection::Records, 1);

        let id = harness.orchestrator.submit(direct_upload(SAMPLE_CV)).unwrap();
        let snap = harness.wait_terminal(id).await;

        assert_eq!(snap.stage, Stage::Completed, "{:?}", snap.error);
        assert!(snap.stages_visited.contains(&Stage::PartiallyPersisted));
        assert!(harness.stores.records.contains(&id));
        assert_eq!(snap.result.unwrap().collections.len(), 3);
    }

    #[tokio::test]
    async fn test_jobs_beyond_capacity_queue_then_complete() {
        let config = PipelineConfig {
            worker_capacity: 2,
            ..test_config()
        };
        let harness = Harness::new(
            FakeStandardizer::new().with_delay(Duration::from_millis(100)),
            config,
        );
        let ids: Vec<Uuid> = (0..6)
            .map(|_| harness.orchestrator.submit(direct_upload(SAMPLE_CV)).unwrap())
            .collect();

        tokio::time::sleep(Duration::from_millis(30)).await;
        let queued = ids
            .iter()
            .filter(|id| harness.orchestrator.tracker().stage(**id) == Some(Stage::Queued))
            .count();
        assert!(queued >= 3, "expected waiting jobs, got {queued}");
        assert!(harness.standardizer.max_concurrent() <= 2);

        for id in ids {
            assert_eq!(harness.wait_terminal(id).await.stage, Stage::Completed);
        }
        assert!(harness.standardizer.max_concurrent() <= 2);
    }

    #[tokio::test]
    async fn test_queue_wait_timeout_fails_with_queue_full() {
        let config = PipelineConfig {
            worker_capacity: 1,
            queue_wait_timeout: Duration::from_millis(50),
            ..test_config()
        };
        let harness = Harness::new(FakeStandardizer::new().blocking(), config);
        let first = harness.orchestrator.submit(direct_upload(SAMPLE_CV)).unwrap();
        let second = harness.orchestrator.submit(direct_upload(SAMPLE_CV)).unwrap();

        let snap = harness.wait_terminal(second).await;
        assert_eq!(snap.stage, Stage::Failed);
        assert_eq!(snap.error.unwrap().kind, FailureKind::QueueFull);
        harness.orchestrator.cancel(first);
    }

    #[tokio::test]
    async fn test_cancel_mid_standardizing_leaves_no_artifacts() {
        let harness = Harness::new(FakeStandardizer::new().blocking(), test_config());
        let id = harness.orchestrator.submit(direct_upload(SAMPLE_CV)).unwrap();
        harness.wait_for_stage(id, Stage::Standardizing).await;

        assert_eq!(harness.orchestrator.cancel(id), CancelOutcome::Signalled);
        let snap = harness.wait_terminal(id).await;

        assert_eq!(snap.stage, Stage::Failed);
        let reason = snap.error.unwrap();
        assert_eq!(reason.kind, FailureKind::Cancelled);
        assert_eq!(reason.stage, Stage::Standardizing);
        assert!(harness.stores.all_empty());
        assert_eq!(harness.embeddings.calls(), 0);
        assert_eq!(
            harness.orchestrator.cancel(id),
            CancelOutcome::AlreadyTerminal
        );
    }

    #[tokio::test]
    async fn test_cancel_mid_embedding_leaves_no_artifacts() {
        let harness = Harness::with_backend(
            FakeStandardizer::new(),
            FakeEmbeddingBackend::new(8).blocking(),
            test_config(),
        );
        let id = harness.orchestrator.submit(direct_upload(SAMPLE_CV)).unwrap();
        harness.wait_for_stage(id, Stage::Embedding).await;

        assert_eq!(harness.orchestrator.cancel(id), CancelOutcome::Signalled);
        let snap = harness.wait_terminal(id).await;

        let reason = snap.error.unwrap();
        assert_eq!(reason.kind, FailureKind::Cancelled);
        assert_eq!(reason.stage, Stage::Embedding);
        assert!(!snap.stages_visited.contains(&Stage::Persisting));
        assert!(harness.stores.all_empty());
    }

    #[tokio::test]
    async fn test_cancel_unknown_job() {
        let harness = Harness::new(FakeStandardizer::new(), test_config());
        assert_eq!(
            harness.orchestrator.cancel(Uuid::new_v4()),
            CancelOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn test_stage_errors_are_classified() {
        let harness = Harness::new(FakeStandardizer::new().rejecting(), test_config());
        let id = harness.orchestrator.submit(direct_upload(SAMPLE_CV)).unwrap();
        let snap = harness.wait_terminal(id).await;
        let reason = snap.error.unwrap();
        assert_eq!(reason.stage, Stage::Standardizing);
        assert_eq!(reason.kind, FailureKind::SchemaViolation);
        assert!(harness.stores.all_empty());
    }

    #[tokio::test]
    async fn test_intake_rejects_bad_uploads() {
        let harness = Harness::new(FakeStandardizer::new(), test_config());
        let legacy = IntakeRequest {
            bytes: Bytes::from_static(b"\xd0\xcf\x11\xe0 legacy word"),
            mime_hint: Some("application/msword".to_string()),
            filename: Some("cv.doc".to_string()),
            channel: IntakeChannel::Direct,
        };
        assert!(matches!(
            harness.orchestrator.submit(legacy),
            Err(IntakeError::InvalidFile(ExtractError::UnsupportedFormat(_)))
        ));

        let mut bad_email = application(SAMPLE_CV, "posting-1");
        bad_email.channel = IntakeChannel::JobApplication {
            applicant: Applicant {
                name: "Ada".to_string(),
                email: "not-an-email".to_string(),
                ..Default::default()
            },
            posting_id: "posting-1".to_string(),
        };
        assert!(matches!(
            harness.orchestrator.submit(bad_email),
            Err(IntakeError::InvalidApplication(_))
        ));
        assert!(harness.orchestrator.tracker().is_empty());
    }

    #[tokio::test]
    async fn test_drain_rejects_new_work_and_waits() {
        let harness = Harness::new(
            FakeStandardizer::new().with_delay(Duration::from_millis(50)),
            test_config(),
        );
        let id = harness.orchestrator.submit(direct_upload(SAMPLE_CV)).unwrap();
        harness.orchestrator.begin_drain();
        assert!(matches!(
            harness.orchestrator.submit(direct_upload(SAMPLE_CV)),
            Err(IntakeError::Draining)
        ));

        let cancelled = harness.orchestrator.drain(Duration::from_secs(5)).await;
        assert_eq!(cancelled, 0);
        assert_eq!(harness.orchestrator.in_flight(), 0);
        assert_eq!(
            harness.orchestrator.tracker().stage(id),
            Some(Stage::Completed)
        );
    }

    #[tokio::test]
    async fn test_drain_timeout_cancels_stragglers() {
        let harness = Harness::new(FakeStandardizer::new().blocking(), test_config());
        let id = harness.orchestrator.submit(direct_upload(SAMPLE_CV)).unwrap();
        harness.wait_for_stage(id, Stage::Standardizing).await;

        let cancelled = harness.orchestrator.drain(Duration::from_millis(50)).await;
        assert_eq!(cancelled, 1);
        let snap = harness.wait_terminal(id).await;
        assert_eq!(snap.error.unwrap().kind, FailureKind::Cancelled);
        assert!(harness.stores.all_empty());
    }
}
