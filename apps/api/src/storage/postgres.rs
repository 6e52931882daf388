use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{Collection, RecordStore, StoreError};
use crate::models::record::{Experience, StructuredRecord};

#[derive(Debug, Clone, FromRow)]
pub struct StructuredRecordRow {
    pub title: String,
    pub skills: Json<Vec<String>>,
    pub responsibilities: Json<Vec<String>>,
    pub experience: Json<Experience>,
}

impl From<StructuredRecordRow> for StructuredRecord {
    fn from(row: StructuredRecordRow) -> Self {
        StructuredRecord {
            title: row.title,
            skills: row.skills.0,
            responsibilities: row.responsibilities.0,
            experience: row.experience.0,
        }
    }
}

/// Structured records in the `structured_records` table.
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::new(Collection::Records, e)
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn put(&self, job_id: Uuid, record: &StructuredRecord) -> Result<(), StoreError> {
        // Upsert so a retried leg does not trip the primary key.
        sqlx::query(
            r#"
            INSERT INTO structured_records
                (job_id, title, skills, responsibilities, experience)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (job_id) DO UPDATE SET
                title = EXCLUDED.title,
                skills = EXCLUDED.skills,
                responsibilities = EXCLUDED.responsibilities,
                experience = EXCLUDED.experience
            "#,
        )
        .bind(job_id)
        .bind(&record.title)
        .bind(Json(&record.skills))
        .bind(Json(&record.responsibilities))
        .bind(Json(&record.experience))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<StructuredRecord>, StoreError> {
        let row: Option<StructuredRecordRow> = sqlx::query_as(
            "SELECT title, skills, responsibilities, experience \
             FROM structured_records WHERE job_id = $1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(StructuredRecord::from))
    }

    async fn delete(&self, job_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM structured_records WHERE job_id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}
