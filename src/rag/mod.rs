//! RAG (Retrieval-Augmented Generation) module.
//!
//! - `RecursiveChunker`: splits category files into overlapping chunks
//! - `KnowledgeBaseBuilder`: embeds chunks and persists them to `SqliteRagStore`
//! - `Retriever`: loads the persisted index and answers top-k queries

mod chunker;
mod knowledge_base;
mod memory;
mod retriever;
mod sqlite;
mod store;

pub use chunker::{RecursiveChunker, TextChunk};
pub use knowledge_base::{load_documents, BuildSummary, KnowledgeBaseBuilder, SourceDocument};
pub use memory::MemoryIndex;
pub use retriever::{Retriever, RetrieverCell};
pub use sqlite::SqliteRagStore;
pub use store::{ChunkSearchResult, IndexInfo, StoredChunk};
