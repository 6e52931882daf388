//! Standardizer: normalises redacted CV text into a [`StructuredRecord`] via the LLM.
//!
//! Transient failures are retried inside [`LlmClient`]. Anything the model
//! returns is validated here; a record with missing fields is rejected rather
//! than defaulted because it would skew the fixed embedding layout.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::llm_client::prompts::{JSON_ONLY_SYSTEM, REDACTION_INSTRUCTION};
use crate::llm_client::{LlmClient, LlmError};
use crate::models::document::RedactedPayload;
use crate::models::record::{ordered_set, Experience, StructuredRecord};
use crate::pipeline::prompts::{STANDARDIZE_PROMPT, STANDARDIZE_SYSTEM};

#[derive(Debug, Error)]
pub enum StandardizeError {
    #[error("standardization service unavailable: {0}")]
    Transient(String),

    #[error("standardization service rejected the request (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("standardization failed: {0}")]
    StandardizationFailed(String),
}

/// Carried in the pipeline as `Arc<dyn Standardizer>` so tests can swap in a fake.
#[async_trait]
pub trait Standardizer: Send + Sync {
    /// Only `payload.text` is sent out; the PII side-channel stays local.
    async fn standardize(&self, payload: &RedactedPayload)
        -> Result<StructuredRecord, StandardizeError>;
}

pub struct LlmStandardizer {
    llm: LlmClient,
}

impl LlmStandardizer {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Standardizer for LlmStandardizer {
    async fn standardize(
        &self,
        payload: &RedactedPayload,
    ) -> Result<StructuredRecord, StandardizeError> {
        let prompt = STANDARDIZE_PROMPT.replace("{cv_text}", &payload.text);
        let system = format!("{STANDARDIZE_SYSTEM} {JSON_ONLY_SYSTEM} {REDACTION_INSTRUCTION}");

        let raw: RawRecord = self
            .llm
            .call_json(&prompt, &system)
            .await
            .map_err(classify_llm_error)?;

        let record = validate_record(raw)?;
        debug!(
            "Standardized CV via {}: title='{}', {} skills, {} responsibilities",
            self.llm.model(),
            record.title,
            record.skills.len(),
            record.responsibilities.len()
        );
        Ok(record)
    }
}

fn classify_llm_error(err: LlmError) -> StandardizeError {
    if err.is_transient() {
        return StandardizeError::Transient(err.to_string());
    }
    match err {
        LlmError::Api { status, message } => StandardizeError::Rejected { status, message },
        LlmError::Parse(e) => {
            StandardizeError::StandardizationFailed(format!("malformed response: {e}"))
        }
        other => StandardizeError::StandardizationFailed(other.to_string()),
    }
}

/// Model output before validation. Every field is optional so that missing
/// fields can be reported together instead of as a serde error.
#[derive(Debug, Default, Deserialize)]
pub struct RawRecord {
    pub title: Option<String>,
    pub skills: Option<Vec<String>>,
    pub responsibilities: Option<Vec<String>>,
    pub experience: Option<RawExperience>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawExperience {
    pub total_years: Option<f32>,
    pub summary: Option<String>,
}

pub fn validate_record(raw: RawRecord) -> Result<StructuredRecord, StandardizeError> {
    let mut missing = Vec::new();

    let title = raw
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && !is_redaction_token(t));
    if title.is_none() {
        missing.push("title");
    }
    if raw.skills.is_none() {
        missing.push("skills");
    }
    if raw.responsibilities.is_none() {
        missing.push("responsibilities");
    }

    let (years, summary) = match raw.experience {
        Some(exp) => {
            let years = exp.total_years.filter(|y| y.is_finite() && *y >= 0.0);
            let summary = exp
                .summary
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty());
            if years.is_none() {
                missing.push("experience.total_years");
            }
            if summary.is_none() {
                missing.push("experience.summary");
            }
            (years, summary)
        }
        None => {
            missing.push("experience");
            (None, None)
        }
    };

    if !missing.is_empty() {
        return Err(StandardizeError::StandardizationFailed(format!(
            "schema violation: missing or invalid {}",
            missing.join(", ")
        )));
    }

    // `missing` is empty, so every field below is present.
    match (title, raw.skills, raw.responsibilities, years, summary) {
        (Some(title), Some(skills), Some(responsibilities), Some(total_years), Some(summary)) => {
            Ok(StructuredRecord {
                title,
                skills: clean_entries(skills),
                responsibilities: clean_entries(responsibilities),
                experience: Experience {
                    total_years,
                    summary,
                },
            })
        }
        _ => Err(StandardizeError::StandardizationFailed(
            "schema violation".to_string(),
        )),
    }
}

fn clean_entries(items: Vec<String>) -> Vec<String> {
    ordered_set(items.into_iter().filter(|s| !is_redaction_token(s)))
}

fn is_redaction_token(s: &str) -> bool {
    let s = s.trim();
    s.starts_with('[') && s.ends_with(']') && s[1..s.len() - 1].chars().all(|c| c.is_ascii_uppercase() || c == '_')
}
