//! Chunk records shared by the storage backends.
//!
//! `SqliteRagStore` persists the knowledge base on disk; `MemoryIndex` holds
//! a loaded copy for query time.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;
use crate::vector_math::rank_top_k;

/// A stored RAG chunk with metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    /// Unique chunk identifier, `{source}#{index}`.
    pub chunk_id: String,
    /// The text content of the chunk.
    pub content: String,
    /// Source file the chunk was cut from.
    pub source: String,
    /// Product category of the source file.
    pub category: String,
    /// Optional metadata (JSON).
    pub metadata: Option<serde_json::Value>,
}

/// Result of a similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkSearchResult {
    pub chunk: StoredChunk,
    /// Similarity score (higher = better).
    pub score: f32,
}

/// Embedding model and vector width the index was built with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    pub embedding_model: String,
    pub dimension: usize,
}

/// Brute-force top-k over `(chunk, embedding)` pairs.
pub(crate) fn rank_entries(
    query_embedding: &[f32],
    entries: &[(StoredChunk, Vec<f32>)],
    limit: usize,
) -> Result<Vec<ChunkSearchResult>, ApiError> {
    let by_id: HashMap<&str, &StoredChunk> = entries
        .iter()
        .map(|(chunk, _)| (chunk.chunk_id.as_str(), chunk))
        .collect();

    let ranked = rank_top_k(
        query_embedding,
        entries
            .iter()
            .map(|(chunk, embedding)| (chunk.chunk_id.as_str(), embedding.as_slice())),
        limit,
    )?;

    Ok(ranked
        .into_iter()
        .filter_map(|(id, score)| {
            by_id.get(id).map(|chunk| ChunkSearchResult {
                chunk: (*chunk).clone(),
                score,
            })
        })
        .collect())
}
