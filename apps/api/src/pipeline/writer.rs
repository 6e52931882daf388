//! Store Writer: puts one job's artifacts into the three collections.
//!
//! The writer never decides whether to retry or roll back; it reports which
//! legs landed and the orchestrator drives recovery.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::embedding::EmbeddingSet;
use crate::models::record::StructuredRecord;
use crate::storage::{
    Collection, DocumentStore, RawDocument, RecordStore, StoreError, VectorStore,
};

/// Everything a completed job stores, one artifact per collection.
#[derive(Debug, Clone)]
pub struct Artifacts {
    pub job_id: Uuid,
    pub document: RawDocument,
    pub record: StructuredRecord,
    pub embeddings: EmbeddingSet,
}

#[derive(Debug, Default)]
pub struct PersistOutcome {
    pub succeeded: Vec<Collection>,
    pub failed: Vec<(Collection, StoreError)>,
}

impl PersistOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    fn record(&mut self, collection: Collection, result: Result<(), StoreError>) {
        match result {
            Ok(()) => self.succeeded.push(collection),
            Err(e) => self.failed.push((collection, e)),
        }
    }
}

#[derive(Clone)]
pub struct StoreWriter {
    documents: Arc<dyn DocumentStore>,
    records: Arc<dyn RecordStore>,
    vectors: Arc<dyn VectorStore>,
}

impl StoreWriter {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        records: Arc<dyn RecordStore>,
        vectors: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            documents,
            records,
            vectors,
        }
    }

    /// Writes all three legs concurrently and reports each outcome.
    pub async fn write_all(&self, artifacts: &Artifacts) -> PersistOutcome {
        let (documents, records, vectors) = tokio::join!(
            self.write_leg(Collection::Documents, artifacts),
            self.write_leg(Collection::Records, artifacts),
            self.write_leg(Collection::Embeddings, artifacts),
        );

        let mut outcome = PersistOutcome::default();
        outcome.record(Collection::Documents, documents);
        outcome.record(Collection::Records, records);
        outcome.record(Collection::Embeddings, vectors);
        debug!(
            job_id = %artifacts.job_id,
            "Persist: {} succeeded, {} failed",
            outcome.succeeded.len(),
            outcome.failed.len()
        );
        outcome
    }

    /// Re-attempts a single leg. Puts are idempotent per job id.
    pub async fn retry_leg(
        &self,
        collection: Collection,
        artifacts: &Artifacts,
    ) -> Result<(), StoreError> {
        self.write_leg(collection, artifacts).await
    }

    async fn write_leg(
        &self,
        collection: Collection,
        artifacts: &Artifacts,
    ) -> Result<(), StoreError> {
        let id = artifacts.job_id;
        match collection {
            Collection::Documents => self.documents.put(id, &artifacts.document).await,
            Collection::Records => self.records.put(id, &artifacts.record).await,
            Collection::Embeddings => self.vectors.put(id, &artifacts.embeddings).await,
        }
    }

    async fn delete_leg(&self, collection: Collection, job_id: Uuid) -> Result<(), StoreError> {
        match collection {
            Collection::Documents => self.documents.delete(job_id).await,
            Collection::Records => self.records.delete(job_id).await,
            Collection::Embeddings => self.vectors.delete(job_id).await,
        }
    }

    async fn leg_present(&self, collection: Collection, job_id: Uuid) -> Result<bool, StoreError> {
        Ok(match collection {
            Collection::Documents => self.documents.get(job_id).await?.is_some(),
            Collection::Records => self.records.get(job_id).await?.is_some(),
            Collection::Embeddings => self.vectors.get(job_id).await?.is_some(),
        })
    }

    async fn delete_and_confirm(
        &self,
        collection: Collection,
        job_id: Uuid,
    ) -> Result<(), StoreError> {
        self.delete_leg(collection, job_id).await?;
        if self.leg_present(collection, job_id).await? {
            return Err(StoreError::new(collection, "artifact still present after delete"));
        }
        Ok(())
    }

    /// Deletes the given legs and reads each back to confirm it is gone,
    /// trying up to `attempts` times. Returns the legs that could not be removed.
    pub async fn rollback(
        &self,
        job_id: Uuid,
        collections: &[Collection],
        attempts: u32,
    ) -> Vec<(Collection, StoreError)> {
        let mut stuck = Vec::new();
        for &collection in collections {
            let mut last = None;
            for _ in 0..attempts.max(1) {
                match self.delete_and_confirm(collection, job_id).await {
                    Ok(()) => {
                        last = None;
                        break;
                    }
                    Err(e) => last = Some(e),
                }
            }
            if let Some(e) = last {
                warn!(job_id = %job_id, "Rollback of {collection} failed: {e}");
                stuck.push((collection, e));
            }
        }
        stuck
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{sample_artifacts, Faults, TestStores};

    #[tokio::test]
    async fn test_write_all_reports_each_leg() {
        let stores = TestStores::new();
        stores.faults.fail_puts(Collection::Records, 1);
        let writer = stores.writer();
        let artifacts = sample_artifacts(Uuid::new_v4());

        let outcome = writer.write_all(&artifacts).await;
        assert!(!outcome.is_complete());
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].0, Collection::Records);
        assert!(outcome.succeeded.contains(&Collection::Documents));
        assert!(outcome.succeeded.contains(&Collection::Embeddings));

        writer
            .retry_leg(Collection::Records, &artifacts)
            .await
            .unwrap();
        assert!(stores.records.contains(&artifacts.job_id));
    }

    #[tokio::test]
    async fn test_rollback_removes_written_legs() {
        let stores = TestStores::new();
        let writer = stores.writer();
        let artifacts = sample_artifacts(Uuid::new_v4());
        assert!(writer.write_all(&artifacts).await.is_complete());

        let stuck = writer
            .rollback(artifacts.job_id, &Collection::ALL, 2)
            .await;
        assert!(stuck.is_empty());
        assert!(stores.all_empty());
    }

    #[tokio::test]
    async fn test_rollback_reports_stuck_legs() {
        let stores = TestStores::new();
        stores.faults.fail_deletes(Collection::Embeddings, Faults::ALWAYS);
        let writer = stores.writer();
        let artifacts = sample_artifacts(Uuid::new_v4());
        writer.write_all(&artifacts).await;

        let stuck = writer
            .rollback(artifacts.job_id, &Collection::ALL, 2)
            .await;
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].0, Collection::Embeddings);
    }

    #[tokio::test]
    async fn test_rollback_confirms_each_leg_is_gone() {
        let stores = TestStores::new();
        stores.faults.ignore_deletes(Collection::Records, Faults::ALWAYS);
        let writer = stores.writer();
        let artifacts = sample_artifacts(Uuid::new_v4());
        writer.write_all(&artifacts).await;

        let stuck = writer
            .rollback(artifacts.job_id, &Collection::ALL, 2)
            .await;
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].0, Collection::Records);
        assert!(stuck[0].1.message.contains("still present"));
        assert!(stores.document_for(artifacts.job_id).is_none());
        assert!(stores.embeddings_for(artifacts.job_id).is_none());
    }

    #[tokio::test]
    async fn test_rollback_retries_a_delete_that_did_not_land() {
        let stores = TestStores::new();
        stores.faults.ignore_deletes(Collection::Documents, 1);
        let writer = stores.writer();
        let artifacts = sample_artifacts(Uuid::new_v4());
        writer.write_all(&artifacts).await;

        let stuck = writer
            .rollback(artifacts.job_id, &Collection::ALL, 2)
            .await;
        assert!(stuck.is_empty());
        assert!(stores.all_empty());
    }
}
