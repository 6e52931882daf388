use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Collection, StoreError, VectorStore};
use crate::models::embedding::{
    EmbeddingSet, EmbeddingSlot, EmbeddingTag, RESPONSIBILITY_SLOTS, SKILL_SLOTS,
};

const META_FIELD: &str = "_meta";

#[derive(Serialize, Deserialize)]
struct SetMeta {
    model: String,
    dimensions: usize,
}

/// Embedding sets as Redis hashes: `cv:embeddings:{job_id}` → `{tag key → slot JSON}`.
pub struct RedisVectorStore {
    conn: MultiplexedConnection,
}

impl RedisVectorStore {
    pub async fn connect(client: &redis::Client) -> anyhow::Result<Self> {
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn })
    }

    fn key(job_id: Uuid) -> String {
        format!("cv:embeddings:{job_id}")
    }
}

fn redis_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::new(Collection::Embeddings, e)
}

/// Canonical slot position: skills, responsibilities, title, experience.
fn slot_order(tag: &EmbeddingTag) -> usize {
    match tag {
        EmbeddingTag::Skill(i) => *i,
        EmbeddingTag::Responsibility(i) => SKILL_SLOTS + i,
        EmbeddingTag::Title => SKILL_SLOTS + RESPONSIBILITY_SLOTS,
        EmbeddingTag::Experience => SKILL_SLOTS + RESPONSIBILITY_SLOTS + 1,
    }
}

#[async_trait]
impl VectorStore for RedisVectorStore {
    async fn put(&self, job_id: Uuid, embeddings: &EmbeddingSet) -> Result<(), StoreError> {
        let meta = SetMeta {
            model: embeddings.model.clone(),
            dimensions: embeddings.dimensions,
        };
        let mut fields: Vec<(String, String)> = Vec::with_capacity(embeddings.len() + 1);
        fields.push((
            META_FIELD.to_string(),
            serde_json::to_string(&meta).map_err(redis_err)?,
        ));
        for slot in &embeddings.slots {
            fields.push((slot.tag.key(), serde_json::to_string(slot).map_err(redis_err)?));
        }

        let key = Self::key(job_id);
        let mut conn = self.conn.clone();
        // Replace the whole hash atomically so readers never see a mix of sets.
        redis::pipe()
            .atomic()
            .del(&key)
            .ignore()
            .hset_multiple(&key, &fields[..])
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(redis_err)?;
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<EmbeddingSet>, StoreError> {
        let mut conn = self.conn.clone();
        let mut hash: HashMap<String, String> =
            conn.hgetall(Self::key(job_id)).await.map_err(redis_err)?;
        let Some(meta) = hash.remove(META_FIELD) else {
            return Ok(None);
        };
        let meta: SetMeta = serde_json::from_str(&meta).map_err(redis_err)?;
        let mut slots = hash
            .into_values()
            .map(|v| serde_json::from_str::<EmbeddingSlot>(&v))
            .collect::<Result<Vec<_>, _>>()
            .map_err(redis_err)?;
        slots.sort_by_key(|s| slot_order(&s.tag));
        Ok(Some(EmbeddingSet {
            model: meta.model,
            dimensions: meta.dimensions,
            slots,
        }))
    }

    async fn delete(&self, job_id: Uuid) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(Self::key(job_id))
            .await
            .map_err(redis_err)?;
        Ok(())
    }
}
