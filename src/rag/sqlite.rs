//! SQLite-backed vector store.
//!
//! In-process index using SQLite for rows and brute-force cosine similarity
//! for search. Collections are rows sharing a `collection` column and come
//! into existence with their first record. Data survives process restarts.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::store::{IndexedRecord, ScoredRecord, VectorStore};
use crate::core::errors::ApiError;

pub struct SqliteVectorStore {
    pool: SqlitePool,
    #[allow(dead_code)]
    db_path: PathBuf,
}

impl SqliteVectorStore {
    pub async fn new(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self { pool, db_path };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS records (
                collection TEXT NOT NULL,
                record_id TEXT NOT NULL,
                content TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (collection, record_id)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_collection ON records(collection)")
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        let denom = norm_a * norm_b;

        if denom <= f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }

    fn row_metadata(row: &sqlx::sqlite::SqliteRow) -> Value {
        let raw: String = row.get("metadata");
        serde_json::from_str(&raw).unwrap_or(Value::Null)
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert(&self, collection: &str, records: &[IndexedRecord]) -> Result<(), ApiError> {
        if records.is_empty() {
            return Ok(());
        }

        // Delete-then-insert, deliberately without a wrapping transaction:
        // a crash between the two statements can transiently lose a record.
        // The window is accepted rather than hidden behind locking the
        // design never promised.
        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        let existing = self.delete(collection, &ids).await?;
        if existing > 0 {
            tracing::debug!(
                "removed {} old records from '{}' before re-insert",
                existing,
                collection
            );
        }

        for record in records {
            let blob = Self::serialize_embedding(&record.embedding);
            let metadata = serde_json::to_string(&record.metadata).unwrap_or_else(|_| "{}".into());

            sqlx::query(
                "INSERT INTO records (collection, record_id, content, metadata, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(collection)
            .bind(&record.id)
            .bind(&record.content)
            .bind(&metadata)
            .bind(&blob)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        }

        tracing::debug!("upserted {} records into '{}'", records.len(), collection);
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredRecord>, ApiError> {
        let rows = sqlx::query(
            "SELECT record_id, content, metadata, embedding FROM records WHERE collection = ?1",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut scored: Vec<ScoredRecord> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let stored = Self::deserialize_embedding(&blob);

                ScoredRecord {
                    id: row.get("record_id"),
                    content: row.get("content"),
                    metadata: Self::row_metadata(row),
                    score: Self::cosine_similarity(embedding, &stored),
                }
            })
            .collect();

        // Ties keep the scan order; a stable sort preserves that.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);

        Ok(scored)
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<usize, ApiError> {
        let mut deleted = 0usize;
        for id in ids {
            let result = sqlx::query(
                "DELETE FROM records WHERE collection = ?1 AND record_id = ?2",
            )
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;
            deleted += result.rows_affected() as usize;
        }
        Ok(deleted)
    }

    async fn list_metadata(&self, collection: &str) -> Result<Vec<(String, Value)>, ApiError> {
        let rows = sqlx::query(
            "SELECT record_id, metadata FROM records WHERE collection = ?1 ORDER BY record_id",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(rows
            .iter()
            .map(|row| (row.get("record_id"), Self::row_metadata(row)))
            .collect())
    }

    async fn clear(&self, collection: &str) -> Result<usize, ApiError> {
        let result = sqlx::query("DELETE FROM records WHERE collection = ?1")
            .bind(collection)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(result.rows_affected() as usize)
    }
}
