//! Embedder: turns a [`StructuredRecord`] into a fixed 32-vector [`EmbeddingSet`].
//!
//! Layout: skills are truncated (by rank) or padded to 20 slots, responsibilities
//! to 10, then one title slot and one aggregate-experience slot. Padding slots
//! are zero vectors flagged `placeholder` and never hit the backend.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::models::embedding::{
    EmbeddingSet, EmbeddingSlot, EmbeddingTag, EMBEDDINGS_PER_DOCUMENT, RESPONSIBILITY_SLOTS,
    SKILL_SLOTS,
};
use crate::llm_client::backoff_delay;
use crate::models::record::StructuredRecord;
use crate::providers::embedding::{BackendError, EmbeddingBackend};

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding backend unavailable: {0}")]
    EmbeddingBackendUnavailable(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    EmbeddingDimensionMismatch { expected: usize, actual: usize },

    #[error("embedding backend returned {returned} vectors for {requested} inputs")]
    CountMismatch { requested: usize, returned: usize },
}

/// One planned slot before vectors are attached.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotPlan {
    pub tag: EmbeddingTag,
    pub text: Option<String>,
}

/// Fixed layout for a record. Always [`EMBEDDINGS_PER_DOCUMENT`] entries.
pub fn plan_slots(record: &StructuredRecord) -> Vec<SlotPlan> {
    let mut plan = Vec::with_capacity(EMBEDDINGS_PER_DOCUMENT);
    for i in 0..SKILL_SLOTS {
        plan.push(SlotPlan {
            tag: EmbeddingTag::Skill(i),
            text: record.skills.get(i).cloned(),
        });
    }
    for i in 0..RESPONSIBILITY_SLOTS {
        plan.push(SlotPlan {
            tag: EmbeddingTag::Responsibility(i),
            text: record.responsibilities.get(i).cloned(),
        });
    }
    plan.push(SlotPlan {
        tag: EmbeddingTag::Title,
        text: Some(record.title.clone()),
    });
    plan.push(SlotPlan {
        tag: EmbeddingTag::Experience,
        text: Some(record.experience.embedding_text()),
    });
    plan
}

pub struct Embedder {
    backend: Arc<dyn EmbeddingBackend>,
    batch_size: usize,
    max_attempts: u32,
    base_delay: Duration,
}

impl Embedder {
    pub fn new(
        backend: Arc<dyn EmbeddingBackend>,
        batch_size: usize,
        max_attempts: u32,
        base_delay: Duration,
    ) -> Self {
        Self {
            backend,
            batch_size: batch_size.max(1),
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub async fn embed(&self, record: &StructuredRecord) -> Result<EmbeddingSet, EmbedError> {
        let dims = self.backend.dimensions();
        let plan = plan_slots(record);

        let texts: Vec<String> = plan.iter().filter_map(|s| s.text.clone()).collect();
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let batch_vectors = self.embed_with_retry(batch).await?;
            if batch_vectors.len() != batch.len() {
                return Err(EmbedError::CountMismatch {
                    requested: batch.len(),
                    returned: batch_vectors.len(),
                });
            }
            if let Some(bad) = batch_vectors.iter().find(|v| v.len() != dims) {
                return Err(EmbedError::EmbeddingDimensionMismatch {
                    expected: dims,
                    actual: bad.len(),
                });
            }
            vectors.extend(batch_vectors);
        }

        let mut vectors = vectors.into_iter();
        let slots: Vec<EmbeddingSlot> = plan
            .into_iter()
            .map(|slot| match slot.text {
                Some(text) => EmbeddingSlot {
                    tag: slot.tag,
                    source_text: Some(text),
                    placeholder: false,
                    vector: vectors.next().unwrap_or_default(),
                },
                None => EmbeddingSlot {
                    tag: slot.tag,
                    source_text: None,
                    placeholder: true,
                    vector: vec![0.0; dims],
                },
            })
            .collect();

        debug!(
            "Embedded {} slots ({} placeholders) with {}",
            slots.len(),
            slots.iter().filter(|s| s.placeholder).count(),
            self.backend.model()
        );

        Ok(EmbeddingSet {
            model: self.backend.model().to_string(),
            dimensions: dims,
            slots,
        })
    }

    async fn embed_with_retry(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut last: Option<BackendError> = None;
        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                let delay = backoff_delay(self.base_delay, attempt - 1);
                warn!(
                    "Embedding batch attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
            match self.backend.embed_batch(batch).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) if e.transient => last = Some(e),
                Err(e) => return Err(EmbedError::EmbeddingBackendUnavailable(e.message)),
            }
        }
        Err(EmbedError::EmbeddingBackendUnavailable(
            last.map(|e| e.message)
                .unwrap_or_else(|| "no attempts made".to_string()),
        ))
    }
}
