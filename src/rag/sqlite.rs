//! SQLite-backed RAG store implementation.
//!
//! The knowledge base lives in `vectorstore.db/index.sqlite`: one row per
//! chunk with its embedding as a little-endian f32 blob, plus a meta table
//! naming the embedding model.

use std::path::{Path, PathBuf};

use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::store::{IndexInfo, StoredChunk};
use crate::core::config::defaults::INDEX_FILE_NAME;
use crate::core::errors::ApiError;

pub struct SqliteRagStore {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl SqliteRagStore {
    /// Opens the index under `index_dir`, creating directory and file as needed.
    pub async fn create(index_dir: &Path) -> Result<Self, ApiError> {
        tokio::fs::create_dir_all(index_dir).await.map_err(|e| {
            ApiError::Internal(format!("failed to create {}: {}", index_dir.display(), e))
        })?;
        Self::connect(index_dir.join(INDEX_FILE_NAME), true).await
    }

    /// Opens a previously built index for reading. Absence is a
    /// configuration problem: the knowledge base has to be built first.
    ///
    /// Nothing is written; a file without the index tables counts as absent.
    pub async fn open_existing(index_dir: &Path) -> Result<Self, ApiError> {
        let db_path = index_dir.join(INDEX_FILE_NAME);
        if !index_dir.is_dir() || !db_path.is_file() {
            return Err(ApiError::Configuration(format!(
                "no knowledge base found at {}; run build_kb first",
                index_dir.display()
            )));
        }
        let store = Self::connect(db_path, false).await?;

        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type = 'table' AND name IN ('rag_chunks', 'rag_meta')",
        )
        .fetch_one(&store.pool)
        .await
        .map_err(ApiError::internal)?;
        if tables < 2 {
            return Err(ApiError::Configuration(format!(
                "{} holds no knowledge base; run build_kb first",
                store.db_path.display()
            )));
        }
        Ok(store)
    }

    async fn connect(db_path: PathBuf, create: bool) -> Result<Self, ApiError> {
        let mut options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(create);
        if create {
            options = options
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);
        }

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| {
                ApiError::Configuration(format!("cannot open {}: {}", db_path.display(), e))
            })?;

        let store = Self { pool, db_path };
        if create {
            store.init_schema().await?;
        }
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rag_chunks (
                chunk_id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                source TEXT NOT NULL DEFAULT '',
                category TEXT NOT NULL DEFAULT '',
                metadata TEXT DEFAULT '{}',
                embedding BLOB,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rag_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    /// Model and dimension recorded by the last rebuild, if any.
    pub async fn index_info(&self) -> Result<Option<IndexInfo>, ApiError> {
        let rows = sqlx::query(
            "SELECT key, value FROM rag_meta WHERE key IN ('embedding_model', 'dimension')",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut model = None;
        let mut dimension = None;
        for row in &rows {
            let key: String = row.get("key");
            let value: String = row.get("value");
            match key.as_str() {
                "embedding_model" => model = Some(value),
                "dimension" => dimension = value.parse::<usize>().ok(),
                _ => {}
            }
        }

        Ok(match (model, dimension) {
            (Some(embedding_model), Some(dimension)) => Some(IndexInfo {
                embedding_model,
                dimension,
            }),
            _ => None,
        })
    }

    /// Every chunk with its embedding, ordered by chunk id.
    pub async fn load_all(&self) -> Result<Vec<(StoredChunk, Vec<f32>)>, ApiError> {
        let rows = sqlx::query(
            "SELECT chunk_id, content, source, category, metadata, embedding
             FROM rag_chunks
             ORDER BY chunk_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let embedding_bytes: Vec<u8> = row.get("embedding");
                if embedding_bytes.is_empty() {
                    return None;
                }
                Some((
                    Self::row_to_chunk(row),
                    Self::deserialize_embedding(&embedding_bytes),
                ))
            })
            .collect())
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

    fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> StoredChunk {
        let metadata_str: String = row.get("metadata");
        let metadata = serde_json::from_str::<Value>(&metadata_str).ok();

        StoredChunk {
            chunk_id: row.get("chunk_id"),
            content: row.get("content"),
            source: row.get("source"),
            category: row.get("category"),
            metadata,
        }
    }

    /// Swaps the whole index for `items`, embedded with `embedding_model`.
    ///
    /// Delete, meta update and inserts share one transaction; on any failure
    /// the previous contents stay in place.
    pub async fn replace_all(
        &self,
        embedding_model: &str,
        dimension: usize,
        items: Vec<(StoredChunk, Vec<f32>)>,
    ) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        sqlx::query("DELETE FROM rag_chunks")
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        for (key, value) in [
            ("embedding_model", embedding_model.to_string()),
            ("dimension", dimension.to_string()),
        ] {
            sqlx::query(
                "INSERT OR REPLACE INTO rag_meta (key, value, updated_at)
                 VALUES (?1, ?2, STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))",
            )
            .bind(key)
            .bind(&value)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }

        for (chunk, embedding) in &items {
            let blob = Self::serialize_embedding(embedding);
            let metadata_str = match &chunk.metadata {
                Some(m) => serde_json::to_string(m).map_err(ApiError::internal)?,
                None => "{}".to_string(),
            };

            // Plain INSERT: a repeated chunk id aborts the rebuild.
            sqlx::query(
                "INSERT INTO rag_chunks (chunk_id, content, source, category, metadata, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.content)
            .bind(&chunk.source)
            .bind(&chunk.category)
            .bind(&metadata_str)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    pub async fn count(&self) -> Result<usize, ApiError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rag_chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_chunk(id: &str, content: &str, start_offset: usize) -> StoredChunk {
        StoredChunk {
            chunk_id: id.to_string(),
            content: content.to_string(),
            source: "ipad_air_wikipedia_content.txt".to_string(),
            category: "ipad_air".to_string(),
            metadata: Some(serde_json::json!({ "start_offset": start_offset })),
        }
    }

    #[tokio::test]
    async fn replace_all_stores_rows_and_model() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SqliteRagStore::create(&tmp.path().join("vectorstore.db"))
            .await
            .unwrap();
        assert_eq!(store.index_info().await.unwrap(), None);

        store
            .replace_all(
                "embed-v1",
                3,
                vec![
                    (make_chunk("a#1", "Touch ID", 700), vec![0.0, 1.0, 0.0]),
                    (make_chunk("a#0", "M1 chip", 0), vec![1.0, 0.0, 0.0]),
                ],
            )
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 2);

        let all = store.load_all().await.unwrap();
        assert_eq!(all[0].0.chunk_id, "a#0");
        assert_eq!(all[0].0.category, "ipad_air");
        assert_eq!(all[1].1, vec![0.0, 1.0, 0.0]);
        assert_eq!(
            store.index_info().await.unwrap(),
            Some(IndexInfo {
                embedding_model: "embed-v1".to_string(),
                dimension: 3,
            })
        );
    }

    #[tokio::test]
    async fn replace_all_drops_previous_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SqliteRagStore::create(&tmp.path().join("vectorstore.db"))
            .await
            .unwrap();

        store
            .replace_all("embed-v1", 1, vec![(make_chunk("a#0", "data", 0), vec![1.0])])
            .await
            .unwrap();
        store
            .replace_all("embed-v2", 2, vec![(make_chunk("b#0", "new", 0), vec![0.5, 0.5])])
            .await
            .unwrap();

        let all = store.load_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].0.chunk_id, "b#0");
        assert_eq!(
            store.index_info().await.unwrap().map(|i| i.embedding_model),
            Some("embed-v2".to_string())
        );
    }

    #[tokio::test]
    async fn failed_replace_keeps_previous_index() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SqliteRagStore::create(&tmp.path().join("vectorstore.db"))
            .await
            .unwrap();
        store
            .replace_all("embed-v1", 1, vec![(make_chunk("a#0", "old", 0), vec![1.0])])
            .await
            .unwrap();

        let duplicate = vec![
            (make_chunk("b#0", "new", 0), vec![0.5, 0.5]),
            (make_chunk("b#0", "new again", 0), vec![0.5, 0.5]),
        ];
        assert!(store.replace_all("embed-v2", 2, duplicate).await.is_err());

        let all = store.load_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].0.content, "old");
        assert_eq!(
            store.index_info().await.unwrap(),
            Some(IndexInfo {
                embedding_model: "embed-v1".to_string(),
                dimension: 1,
            })
        );
    }

    #[tokio::test]
    async fn open_existing_requires_built_index() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("vectorstore.db");

        let err = SqliteRagStore::open_existing(&dir).await.err().unwrap();
        assert!(matches!(err, ApiError::Configuration(_)));

        {
            let store = SqliteRagStore::create(&dir).await.unwrap();
            store
                .replace_all("embed-v1", 2, vec![(make_chunk("a#0", "data", 0), vec![0.5, 0.5])])
                .await
                .unwrap();
        }

        let reopened = SqliteRagStore::open_existing(&dir).await.unwrap();
        let all = reopened.load_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].1, vec![0.5, 0.5]);
        assert_eq!(all[0].0.metadata, Some(serde_json::json!({ "start_offset": 0 })));
    }

    #[tokio::test]
    async fn open_existing_leaves_foreign_file_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("vectorstore.db");
        std::fs::create_dir_all(&dir).unwrap();
        let db_path = dir.join(INDEX_FILE_NAME);
        std::fs::write(&db_path, b"").unwrap();

        let err = SqliteRagStore::open_existing(&dir).await.err().unwrap();
        assert!(matches!(err, ApiError::Configuration(_)));
        assert_eq!(std::fs::metadata(&db_path).unwrap().len(), 0);
        assert!(!dir.join(format!("{}-wal", INDEX_FILE_NAME)).exists());
    }
}
