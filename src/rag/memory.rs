use super::store::{rank_entries, ChunkSearchResult, IndexInfo, StoredChunk};
use crate::core::errors::ApiError;

/// In-memory copy of a knowledge base, searched by brute-force cosine.
///
/// Read-only once loaded; rebuilding goes through `SqliteRagStore`.
pub struct MemoryIndex {
    entries: Vec<(StoredChunk, Vec<f32>)>,
    info: IndexInfo,
}

impl MemoryIndex {
    pub fn from_entries(info: IndexInfo, entries: Vec<(StoredChunk, Vec<f32>)>) -> Self {
        Self { entries, info }
    }

    pub fn info(&self) -> &IndexInfo {
        &self.info
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// The `limit` chunks closest to `query_embedding`, best first.
    pub fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<ChunkSearchResult>, ApiError> {
        rank_entries(query_embedding, &self.entries, limit.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str) -> StoredChunk {
        StoredChunk {
            chunk_id: id.to_string(),
            content: format!("content of {}", id),
            source: "ipad_mini_wikipedia_content.txt".to_string(),
            category: "ipad_mini".to_string(),
            metadata: None,
        }
    }

    fn index() -> MemoryIndex {
        MemoryIndex::from_entries(
            IndexInfo {
                embedding_model: "embed-v1".to_string(),
                dimension: 2,
            },
            vec![
                (chunk("m#0"), vec![1.0, 0.0]),
                (chunk("m#1"), vec![0.0, 1.0]),
                (chunk("m#2"), vec![0.6, 0.8]),
            ],
        )
    }

    #[test]
    fn search_orders_by_similarity() {
        let index = index();
        assert_eq!(index.len(), 3);

        let top = index.search(&[0.0, 1.0], 2).unwrap();
        let ids: Vec<&str> = top.iter().map(|r| r.chunk.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["m#1", "m#2"]);
    }

    #[test]
    fn search_rejects_wrong_dimension() {
        let index = index();
        let err = index.search(&[1.0, 0.0, 0.0], 3).unwrap_err();
        assert!(matches!(err, ApiError::Retrieval(_)));
        assert_eq!(index.info().dimension, 2);
    }
}
