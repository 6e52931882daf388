use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use super::{Collection, DocumentStore, RawDocument, RecordStore, StoreError, VectorStore};
use crate::models::embedding::EmbeddingSet;
use crate::models::record::StructuredRecord;

/// In-process collection keyed by job id. Contents are lost on restart.
#[derive(Debug)]
pub struct MemoryCollection<T> {
    items: DashMap<Uuid, T>,
}

impl<T: Clone> MemoryCollection<T> {
    pub fn new() -> Self {
        Self {
            items: DashMap::new(),
        }
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[cfg(test)]
    pub fn contains(&self, job_id: &Uuid) -> bool {
        self.items.contains_key(job_id)
    }

    fn insert(&self, job_id: Uuid, item: &T) {
        self.items.insert(job_id, item.clone());
    }

    pub fn fetch(&self, job_id: &Uuid) -> Option<T> {
        self.items.get(job_id).map(|e| e.value().clone())
    }

    fn remove(&self, job_id: &Uuid) {
        self.items.remove(job_id);
    }
}

#[async_trait]
impl DocumentStore for MemoryCollection<RawDocument> {
    async fn put(&self, job_id: Uuid, document: &RawDocument) -> Result<(), StoreError> {
        self.insert(job_id, document);
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<RawDocument>, StoreError> {
        Ok(self.fetch(&job_id))
    }

    async fn delete(&self, job_id: Uuid) -> Result<(), StoreError> {
        self.remove(&job_id);
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryCollection<StructuredRecord> {
    async fn put(&self, job_id: Uuid, record: &StructuredRecord) -> Result<(), StoreError> {
        self.insert(job_id, record);
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<StructuredRecord>, StoreError> {
        Ok(self.fetch(&job_id))
    }

    async fn delete(&self, job_id: Uuid) -> Result<(), StoreError> {
        self.remove(&job_id);
        Ok(())
    }
}

#[async_trait]
impl VectorStore for MemoryCollection<EmbeddingSet> {
    async fn put(&self, job_id: Uuid, embeddings: &EmbeddingSet) -> Result<(), StoreError> {
        if embeddings.is_empty() {
            return Err(StoreError::new(
                Collection::Embeddings,
                "refusing to store an empty embedding set",
            ));
        }
        self.insert(job_id, embeddings);
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<EmbeddingSet>, StoreError> {
        Ok(self.fetch(&job_id))
    }

    async fn delete(&self, job_id: Uuid) -> Result<(), StoreError> {
        self.remove(&job_id);
        Ok(())
    }
}
