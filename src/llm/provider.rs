use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::errors::ApiError;
use super::types::ChatRequest;

/// Ordered text fragments of one streamed answer.
///
/// The channel closes after the last fragment; a transport failure arrives as
/// a final `Err` item.
pub type FragmentReceiver = mpsc::Receiver<Result<String, ApiError>>;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// return the provider name (e.g. "gemini")
    fn name(&self) -> &str;

    /// chat completion (streaming)
    async fn stream_chat(
        &self,
        request: ChatRequest,
        model_id: &str,
    ) -> Result<FragmentReceiver, ApiError>;

    /// generate embeddings, one vector per input in input order
    async fn embed(&self, inputs: &[String], model_id: &str) -> Result<Vec<Vec<f32>>, ApiError>;
}
