//! Offline knowledge-base build: category files -> chunks -> embeddings -> index.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;

use super::chunker::{RecursiveChunker, TextChunk};
use super::sqlite::SqliteRagStore;
use super::store::StoredChunk;
use crate::core::config::AppPaths;
use crate::core::errors::ApiError;
use crate::corpus::Category;
use crate::llm::LlmProvider;

/// One category file read from the data directory.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub category: String,
    pub path: PathBuf,
    pub text: String,
}

impl SourceDocument {
    /// Name used as the chunk source, e.g. `ipad_pro_wikipedia_content.txt`.
    pub fn source_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.category.clone())
    }
}

/// Reads every category file that exists. Missing files are skipped; finding
/// none at all is a configuration error.
pub async fn load_documents(
    paths: &AppPaths,
    categories: &[Category],
) -> Result<Vec<SourceDocument>, ApiError> {
    let mut documents = Vec::new();

    for category in categories {
        let path = paths.corpus_file(category.name);
        if !path.is_file() {
            tracing::warn!("File not found: {}", path.display());
            continue;
        }
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => {
                tracing::info!("Loaded {}", path.display());
                documents.push(SourceDocument {
                    category: category.name.to_string(),
                    path,
                    text,
                });
            }
            Err(e) => tracing::warn!("Error loading {}: {}", path.display(), e),
        }
    }

    if documents.is_empty() {
        return Err(ApiError::Configuration(format!(
            "no source documents found in {}; run extract first",
            paths.data_dir.display()
        )));
    }

    tracing::info!("Total documents loaded: {}", documents.len());
    Ok(documents)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    pub documents: usize,
    pub chunks: usize,
    pub dimension: usize,
    pub index_path: PathBuf,
}

pub struct KnowledgeBaseBuilder {
    llm: Arc<dyn LlmProvider>,
    chunker: RecursiveChunker,
    embedding_model: String,
    index_dir: PathBuf,
}

impl KnowledgeBaseBuilder {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        chunker: RecursiveChunker,
        embedding_model: impl Into<String>,
        index_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            llm,
            chunker,
            embedding_model: embedding_model.into(),
            index_dir: index_dir.into(),
        }
    }

    /// Rebuilds the index from scratch.
    ///
    /// All embeddings are computed before the existing index is touched, and
    /// the swap itself is one transaction, so a failed build leaves the
    /// previous knowledge base in place.
    pub async fn build(&self, documents: &[SourceDocument]) -> Result<BuildSummary, ApiError> {
        let chunks: Vec<StoredChunk> = documents
            .iter()
            .flat_map(|doc| self.chunk_document(doc))
            .collect();
        if chunks.is_empty() {
            return Err(ApiError::Configuration(
                "source documents contain no text to index".to_string(),
            ));
        }
        tracing::info!(
            "Split {} documents into {} chunks",
            documents.len(),
            chunks.len()
        );

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.llm.embed(&texts, &self.embedding_model).await?;
        if embeddings.len() != chunks.len() {
            return Err(ApiError::Internal(format!(
                "received {} embeddings for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }
        let dimension = embeddings.first().map(Vec::len).unwrap_or_default();
        if dimension == 0 || embeddings.iter().any(|e| e.len() != dimension) {
            return Err(ApiError::Internal(
                "embedding service returned vectors of inconsistent width".to_string(),
            ));
        }

        let count = chunks.len();
        let store = SqliteRagStore::create(&self.index_dir).await?;
        store
            .replace_all(
                &self.embedding_model,
                dimension,
                chunks.into_iter().zip(embeddings).collect(),
            )
            .await?;

        tracing::info!(
            "Knowledge base saved to {} ({} chunks, dimension {})",
            self.index_dir.display(),
            store.count().await?,
            dimension
        );
        Ok(BuildSummary {
            documents: documents.len(),
            chunks: count,
            dimension,
            index_path: store.db_path().to_path_buf(),
        })
    }

    fn chunk_document(&self, doc: &SourceDocument) -> Vec<StoredChunk> {
        let source = doc.source_name();
        let headers = ArticleHeaders::scan(&doc.text);

        self.chunker
            .split(&doc.text, &source)
            .into_iter()
            .map(|chunk| {
                let metadata = headers.metadata_for(&chunk);
                StoredChunk {
                    chunk_id: chunk.chunk_id(),
                    content: chunk.text,
                    source: chunk.source,
                    category: doc.category.clone(),
                    metadata: Some(metadata),
                }
            })
            .collect()
    }
}

/// Char offsets of the `# title` and `URL:` lines written by the extractor.
struct ArticleHeaders {
    titles: Vec<(usize, String)>,
    urls: Vec<(usize, String)>,
}

impl ArticleHeaders {
    fn scan(text: &str) -> Self {
        let mut titles = Vec::new();
        let mut urls = Vec::new();
        let mut offset = 0;

        for line in text.split('\n') {
            if let Some(title) = line.strip_prefix("# ") {
                titles.push((offset, title.trim().to_string()));
            } else if let Some(url) = line.strip_prefix("URL: ") {
                urls.push((offset, url.trim().to_string()));
            }
            offset += line.chars().count() + 1;
        }

        Self { titles, urls }
    }

    fn metadata_for(&self, chunk: &TextChunk) -> serde_json::Value {
        let mut metadata = json!({
            "start_offset": chunk.start_offset,
            "chunk_index": chunk.chunk_index,
        });
        if let Some(obj) = metadata.as_object_mut() {
            if let Some(title) = Self::nearest(&self.titles, chunk.start_offset) {
                obj.insert("title".to_string(), json!(title));
            }
            if let Some(url) = Self::nearest(&self.urls, chunk.start_offset) {
                obj.insert("url".to_string(), json!(url));
            }
        }
        metadata
    }

    /// Last header at or before `offset`, else the first one in the file.
    fn nearest(headers: &[(usize, String)], offset: usize) -> Option<&str> {
        headers
            .iter()
            .take_while(|(at, _)| *at <= offset)
            .last()
            .or_else(|| headers.first())
            .map(|(_, value)| value.as_str())
    }
}
