//! Query-time access to the knowledge base.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::OnceCell;

use super::memory::MemoryIndex;
use super::sqlite::SqliteRagStore;
use super::store::ChunkSearchResult;
use crate::core::errors::ApiError;
use crate::llm::LlmProvider;

pub struct Retriever {
    index: MemoryIndex,
    embedder: Arc<dyn LlmProvider>,
    embedding_model: String,
    top_k: usize,
}

impl Retriever {
    /// Reads the persisted index into memory.
    ///
    /// No remote call is made here; [`Retriever::verify_embedder`] exercises
    /// the credential.
    pub async fn load(
        index_dir: &Path,
        embedder: Arc<dyn LlmProvider>,
        embedding_model: &str,
        top_k: usize,
    ) -> Result<Self, ApiError> {
        let store = SqliteRagStore::open_existing(index_dir).await?;

        let Some(info) = store.index_info().await? else {
            return Err(ApiError::Configuration(format!(
                "knowledge base at {} was never built; run build_kb first",
                index_dir.display()
            )));
        };
        if info.embedding_model != embedding_model {
            return Err(ApiError::Configuration(format!(
                "knowledge base was built with embedding model {} but {} is configured; rebuild it",
                info.embedding_model, embedding_model
            )));
        }

        let entries = store.load_all().await?;
        if entries.is_empty() {
            return Err(ApiError::Configuration(format!(
                "knowledge base at {} is empty; run build_kb first",
                index_dir.display()
            )));
        }

        tracing::info!(
            "Loaded {} chunks (model {}, dimension {})",
            entries.len(),
            info.embedding_model,
            info.dimension
        );
        Ok(Self::from_index(
            MemoryIndex::from_entries(info, entries),
            embedder,
            embedding_model,
            top_k,
        ))
    }

    pub fn from_index(
        index: MemoryIndex,
        embedder: Arc<dyn LlmProvider>,
        embedding_model: impl Into<String>,
        top_k: usize,
    ) -> Self {
        Self {
            index,
            embedder,
            embedding_model: embedding_model.into(),
            top_k: top_k.max(1),
        }
    }

    /// Embeds a fixed probe text and checks the vector width against the
    /// index, so a rejected credential or a changed model shows up before
    /// the first question.
    pub async fn verify_embedder(&self) -> Result<(), ApiError> {
        let query_embedding = self.embed_query("iPad").await?;
        let expected = self.index.info().dimension;
        if query_embedding.len() != expected {
            return Err(ApiError::Configuration(format!(
                "embedding model {} returns {}-dimensional vectors but the index holds {}; rebuild it",
                self.embedding_model,
                query_embedding.len(),
                expected
            )));
        }
        tracing::info!(
            "Embedding service reachable ({} chunks searchable)",
            self.index.len()
        );
        Ok(())
    }

    /// The `top_k` chunks most similar to `query`, best first.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<ChunkSearchResult>, ApiError> {
        let query_embedding = self.embed_query(query).await?;
        self.index
            .search(&query_embedding, self.top_k)
            .map_err(into_retrieval_error)
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, ApiError> {
        let embeddings = self
            .embedder
            .embed(&[query.to_string()], &self.embedding_model)
            .await
            .map_err(into_retrieval_error)?;
        embeddings.into_iter().next().ok_or_else(|| {
            ApiError::Retrieval("embedding service returned no vector for the query".to_string())
        })
    }
}

fn into_retrieval_error(err: ApiError) -> ApiError {
    match err {
        ApiError::Authentication(_) | ApiError::Retrieval(_) => err,
        other => ApiError::Retrieval(other.to_string()),
    }
}

/// Process-wide retriever, loaded at most once.
///
/// Concurrent first callers wait on the same load; a failed load leaves the
/// cell empty so a later call can try again.
#[derive(Default)]
pub struct RetrieverCell {
    cell: OnceCell<Arc<Retriever>>,
}

impl RetrieverCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Arc<Retriever>> {
        self.cell.get().cloned()
    }

    pub async fn get_or_load<F, Fut>(&self, load: F) -> Result<Arc<Retriever>, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Retriever, ApiError>>,
    {
        self.cell
            .get_or_try_init(|| async { load().await.map(Arc::new) })
            .await
            .cloned()
    }
}
