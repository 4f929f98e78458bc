use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::chat::QueryAnswerer;
use crate::core::config::{AppConfig, AppPaths, ConfigService};
use crate::core::errors::ApiError;
use crate::llm::{LlmProvider, OpenAiCompatibleProvider};
use crate::rag::{Retriever, RetrieverCell};

pub mod error;

use error::InitializationError;

/// Application state shared by every route and WebSocket session.
///
/// Chat history is not kept here: each connection owns its own
/// `ChatSession`.
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: ConfigService,
    pub settings: AppConfig,
    pub llm: Arc<dyn LlmProvider>,
    pub answerer: QueryAnswerer,
    pub retriever: RetrieverCell,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Loads configuration and builds the remote client.
    ///
    /// A missing credential stops initialization here, before anything
    /// touches the network.
    pub async fn initialize(paths: Arc<AppPaths>) -> Result<Arc<Self>, InitializationError> {
        let config = ConfigService::new(paths.clone());
        let settings = config
            .load_settings()
            .map_err(|e| InitializationError::Config(e.into()))?;
        settings
            .llm
            .require_api_key()
            .map_err(|e| InitializationError::Config(e.into()))?;

        let llm: Arc<dyn LlmProvider> = Arc::new(
            OpenAiCompatibleProvider::new(&settings.llm)
                .map_err(|e| InitializationError::Llm(e.into()))?,
        );

        Ok(Arc::new(Self::from_parts(paths, settings, llm)))
    }

    pub fn from_parts(paths: Arc<AppPaths>, settings: AppConfig, llm: Arc<dyn LlmProvider>) -> Self {
        let config = ConfigService::new(paths.clone());
        let answerer = QueryAnswerer::new(llm.clone(), &settings);
        Self {
            paths,
            config,
            settings,
            llm,
            answerer,
            retriever: RetrieverCell::new(),
            started_at: Utc::now(),
        }
    }

    /// The shared retriever, loading it from disk on first use.
    pub async fn retriever(&self) -> Result<Arc<Retriever>, ApiError> {
        self.retriever
            .get_or_load(|| {
                Retriever::load(
                    &self.paths.index_dir,
                    self.llm.clone(),
                    &self.settings.llm.embedding_model,
                    self.settings.retrieval.top_k,
                )
            })
            .await
    }

    /// Eager load used at startup so a missing index or a rejected
    /// credential is reported before the server accepts connections.
    ///
    /// Only the embedding service is contacted. A transient failure there is
    /// logged and left for the first question to surface.
    pub async fn preload_retriever(&self) -> Result<(), InitializationError> {
        let retriever = self
            .retriever()
            .await
            .map_err(|e| InitializationError::Retriever(e.into()))?;

        match retriever.verify_embedder().await {
            Ok(()) => Ok(()),
            Err(err) if err.is_fatal() => Err(InitializationError::Retriever(err.into())),
            Err(err) => {
                tracing::warn!("Embedding service check failed: {}", err);
                Ok(())
            }
        }
    }
}
