use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use tracing::info;
use uuid::Uuid;

use super::{Collection, DocumentMetadata, DocumentStore, RawDocument, StoreError};

/// Raw CV bytes at `raw/{job_id}` with metadata JSON at `raw/{job_id}.meta.json`.
pub struct S3DocumentStore {
    client: S3Client,
    bucket: String,
}

impl S3DocumentStore {
    pub fn new(client: S3Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    fn body_key(job_id: Uuid) -> String {
        format!("raw/{job_id}")
    }

    fn meta_key(job_id: Uuid) -> String {
        format!("raw/{job_id}.meta.json")
    }

    async fn fetch(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    return Ok(None);
                }
                return Err(StoreError::new(
                    Collection::Documents,
                    format!("S3 get {key} failed: {e}"),
                ));
            }
        };
        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StoreError::new(Collection::Documents, format!("S3 read {key}: {e}")))?;
        Ok(Some(data.into_bytes()))
    }
}

#[async_trait]
impl DocumentStore for S3DocumentStore {
    async fn put(&self, job_id: Uuid, document: &RawDocument) -> Result<(), StoreError> {
        let meta = serde_json::to_vec(&document.metadata)
            .map_err(|e| StoreError::new(Collection::Documents, e))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(Self::meta_key(job_id))
            .body(ByteStream::from(meta))
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| StoreError::new(Collection::Documents, format!("S3 upload failed: {e}")))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(Self::body_key(job_id))
            .body(ByteStream::from(document.bytes.clone()))
            .content_type(document.metadata.file_kind.mime())
            .send()
            .await
            .map_err(|e| StoreError::new(Collection::Documents, format!("S3 upload failed: {e}")))?;

        info!(
            "Uploaded raw document to s3://{}/{}",
            self.bucket,
            Self::body_key(job_id)
        );
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<RawDocument>, StoreError> {
        let Some(meta) = self.fetch(&Self::meta_key(job_id)).await? else {
            return Ok(None);
        };
        let Some(bytes) = self.fetch(&Self::body_key(job_id)).await? else {
            return Ok(None);
        };
        let metadata: DocumentMetadata = serde_json::from_slice(&meta)
            .map_err(|e| StoreError::new(Collection::Documents, e))?;
        Ok(Some(RawDocument { bytes, metadata }))
    }

    async fn delete(&self, job_id: Uuid) -> Result<(), StoreError> {
        for key in [Self::body_key(job_id), Self::meta_key(job_id)] {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(&key)
                .send()
                .await
                .map_err(|e| {
                    StoreError::new(Collection::Documents, format!("S3 delete {key} failed: {e}"))
                })?;
        }
        Ok(())
    }
}
