//! Progress Tracker: per-job state read by polling clients.
//!
//! Each job has exactly one [`ProgressWriter`], owned by the task running it.
//! Readers get cloned snapshots and never block the writer for long.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::job::{FailureReason, IngestionJob, Stage};
use crate::storage::Collection;

/// `tokio::time::interval` rejects a zero period.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Percent of the job done once a stage has been entered.
/// Extraction 10, redaction 10, standardization 40, embedding 30, persistence 10.
fn stage_floor(stage: Stage) -> u8 {
    match stage {
        Stage::Queued | Stage::Extracting => 0,
        Stage::Redacting => 10,
        Stage::Standardizing => 20,
        Stage::Embedding => 60,
        Stage::Persisting | Stage::PartiallyPersisted => 90,
        Stage::Completed => 100,
        // Failed keeps whatever was reached before.
        Stage::Failed => 0,
    }
}

/// Written on completion.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CompletionSummary {
    pub embedding_count: usize,
    pub placeholder_count: usize,
    pub collections: Vec<Collection>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProgressSnapshot {
    pub job_id: Uuid,
    pub channel: &'static str,
    pub posting_id: Option<String>,
    pub filename: Option<String>,
    pub stage: Stage,
    pub percent_estimate: u8,
    pub error: Option<FailureReason>,
    pub result: Option<CompletionSummary>,
    pub stages_visited: Vec<Stage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

struct Entry {
    snapshot: ProgressSnapshot,
    finished_at: Option<Instant>,
    observed_at: Option<Instant>,
}

struct TrackerInner {
    jobs: DashMap<Uuid, Entry>,
    retention: Duration,
    observed_grace: Duration,
}

#[derive(Clone)]
pub struct ProgressTracker {
    inner: Arc<TrackerInner>,
}

impl ProgressTracker {
    pub fn new(retention: Duration, observed_grace: Duration) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                jobs: DashMap::new(),
                retention,
                observed_grace,
            }),
        }
    }

    /// Creates the `Queued` entry and hands back its only writer.
    pub fn register(&self, job: &IngestionJob) -> ProgressWriter {
        let snapshot = ProgressSnapshot {
            job_id: job.id,
            channel: job.channel.as_str(),
            posting_id: job.channel.posting_id().map(str::to_string),
            filename: job.filename.clone(),
            stage: Stage::Queued,
            percent_estimate: 0,
            error: None,
            result: None,
            stages_visited: vec![Stage::Queued],
            created_at: job.created_at,
            updated_at: job.created_at,
        };
        self.inner.jobs.insert(
            job.id,
            Entry {
                snapshot,
                finished_at: None,
                observed_at: None,
            },
        );
        ProgressWriter {
            job_id: job.id,
            tracker: self.clone(),
        }
    }

    /// Current snapshot. Reading a terminal job starts its eviction grace period.
    pub fn get(&self, job_id: Uuid) -> Option<ProgressSnapshot> {
        let mut entry = self.inner.jobs.get_mut(&job_id)?;
        if entry.finished_at.is_some() && entry.observed_at.is_none() {
            entry.observed_at = Some(Instant::now());
        }
        Some(entry.snapshot.clone())
    }

    /// Current stage without counting as a client observation.
    pub fn stage(&self, job_id: Uuid) -> Option<Stage> {
        self.inner.jobs.get(&job_id).map(|e| e.snapshot.stage)
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.inner.jobs.is_empty()
    }

    /// Drops terminal entries past their grace or retention window.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let retention = self.inner.retention;
        let grace = self.inner.observed_grace;
        let before = self.inner.jobs.len();
        self.inner.jobs.retain(|_, entry| {
            let Some(finished) = entry.finished_at else {
                return true;
            };
            let observed_expired = entry
                .observed_at
                .is_some_and(|seen| now.duration_since(seen) >= grace);
            let retention_expired = now.duration_since(finished) >= retention;
            !(observed_expired || retention_expired)
        });
        let evicted = before.saturating_sub(self.inner.jobs.len());
        if evicted > 0 {
            debug!("Progress sweep evicted {evicted} entries");
        }
        evicted
    }

    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let tracker = self.clone();
        let every = every.max(MIN_SWEEP_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                tracker.sweep();
            }
        })
    }

    fn update(&self, job_id: Uuid, f: impl FnOnce(&mut Entry)) {
        match self.inner.jobs.get_mut(&job_id) {
            Some(mut entry) => {
                f(entry.value_mut());
                entry.snapshot.updated_at = Utc::now();
            }
            None => warn!(job_id = %job_id, "Progress update for unknown job"),
        }
    }
}

/// The single mutation handle for one job's progress entry.
pub struct ProgressWriter {
    job_id: Uuid,
    tracker: ProgressTracker,
}

impl ProgressWriter {
    /// Moves to a non-terminal stage. Ignored once the job is terminal.
    pub fn advance(&self, stage: Stage) {
        let job_id = self.job_id;
        self.tracker.update(job_id, |entry| {
            let snap = &mut entry.snapshot;
            if snap.stage.is_terminal() || snap.stage == stage {
                return;
            }
            info!(job_id = %job_id, from = %snap.stage, to = %stage, "Job stage transition");
            snap.stage = stage;
            snap.percent_estimate = snap.percent_estimate.max(stage_floor(stage));
            snap.stages_visited.push(stage);
        });
    }

    pub fn fail(&self, reason: FailureReason) {
        let job_id = self.job_id;
        self.tracker.update(job_id, |entry| {
            let snap = &mut entry.snapshot;
            if snap.stage.is_terminal() {
                return;
            }
            warn!(
                job_id = %job_id,
                stage = %reason.stage,
                kind = ?reason.kind,
                "Job failed: {}",
                reason.message
            );
            snap.stage = Stage::Failed;
            snap.error = Some(reason);
            snap.stages_visited.push(Stage::Failed);
            entry.finished_at = Some(Instant::now());
        });
    }

    pub fn complete(&self, summary: CompletionSummary) {
        let job_id = self.job_id;
        self.tracker.update(job_id, |entry| {
            let snap = &mut entry.snapshot;
            if snap.stage.is_terminal() {
                return;
            }
            info!(
                job_id = %job_id,
                embeddings = summary.embedding_count,
                "Job completed"
            );
            snap.stage = Stage::Completed;
            snap.percent_estimate = 100;
            snap.result = Some(summary);
            snap.stages_visited.push(Stage::Completed);
            entry.finished_at = Some(Instant::now());
        });
    }
}
