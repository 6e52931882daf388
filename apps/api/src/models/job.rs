use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Applicant-supplied fields from the public job-application form.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Applicant {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub cover_letter: Option<String>,
}

/// How a document entered the pipeline.
///
/// Channel-specific data lives on the variant, so a direct upload can never
/// carry applicant fields and the pipeline never branches on the channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum IntakeChannel {
    Direct,
    JobApplication {
        applicant: Applicant,
        posting_id: String,
    },
}

impl IntakeChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntakeChannel::Direct => "direct",
            IntakeChannel::JobApplication { .. } => "job_application",
        }
    }

    pub fn applicant(&self) -> Option<&Applicant> {
        match self {
            IntakeChannel::Direct => None,
            IntakeChannel::JobApplication { applicant, .. } => Some(applicant),
        }
    }

    pub fn posting_id(&self) -> Option<&str> {
        match self {
            IntakeChannel::Direct => None,
            IntakeChannel::JobApplication { posting_id, .. } => Some(posting_id),
        }
    }
}

/// Pipeline stage. `PartiallyPersisted` is a recoverable sub-state of `Persisting`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Queued,
    Extracting,
    Redacting,
    Standardizing,
    Embedding,
    Persisting,
    PartiallyPersisted,
    Completed,
    Failed,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Queued => "queued",
            Stage::Extracting => "extracting",
            Stage::Redacting => "redacting",
            Stage::Standardizing => "standardizing",
            Stage::Embedding => "embedding",
            Stage::Persisting => "persisting",
            Stage::PartiallyPersisted => "partially_persisted",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error taxonomy recorded on a failed job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Intake,
    TransientExternal,
    SchemaViolation,
    DimensionMismatch,
    PartialPersistence,
    QueueFull,
    Cancelled,
    Internal,
}

/// Why a job ended in `Failed`, with the stage it was in at the time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureReason {
    pub stage: Stage,
    pub kind: FailureKind,
    pub message: String,
}

impl FailureReason {
    pub fn new(stage: Stage, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
        }
    }
}

/// One document's processing lifecycle. Owned by the orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionJob {
    pub id: Uuid,
    pub channel: IntakeChannel,
    pub filename: Option<String>,
    pub mime_hint: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl IngestionJob {
    pub fn new(channel: IntakeChannel, filename: Option<String>, mime_hint: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel,
            filename,
            mime_hint,
            created_at: Utc::now(),
        }
    }
}
