use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::core::config::LlmSettings;
use crate::core::errors::ApiError;
use super::provider::{FragmentReceiver, LlmProvider};
use super::sse::{SseDecoder, SseEvent};
use super::types::ChatRequest;

/// Client for OpenAI-compatible chat and embedding endpoints.
///
/// The default base URL targets the Gemini compatibility layer, so the same
/// credential serves both embedding and generation.
#[derive(Clone)]
pub struct OpenAiCompatibleProvider {
    base_url: String,
    client: Client,
    batch_size: usize,
    request_timeout: Duration,
}

impl OpenAiCompatibleProvider {
    pub fn new(settings: &LlmSettings) -> Result<Self, ApiError> {
        let api_key = settings.require_api_key()?;

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| ApiError::Configuration("API key contains invalid characters".into()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let request_timeout = Duration::from_secs(settings.timeout_secs.max(1));
        // No overall timeout on the client: it would cut long answer streams.
        let client = Client::builder()
            .connect_timeout(request_timeout)
            .default_headers(headers)
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            client,
            batch_size: settings.embedding_batch_size.max(1),
            request_timeout,
        })
    }

    async fn embed_batch(&self, inputs: &[String], model_id: &str) -> Result<Vec<Vec<f32>>, ApiError> {
        let url = format!("{}/embeddings", self.base_url);
        let body = EmbeddingRequest {
            model: model_id,
            input: inputs,
        };

        let res = self
            .client
            .post(&url)
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::Internal(format!("embedding request failed: {}", e)))?;

        if !res.status().is_success() {
            return Err(error_from_response(res, Endpoint::Embeddings).await);
        }

        let mut parsed: EmbeddingResponse = res
            .json()
            .await
            .map_err(|e| ApiError::Internal(format!("failed to parse embedding response: {}", e)))?;
        parsed.data.sort_by_key(|entry| entry.index);

        if parsed.data.len() != inputs.len() {
            return Err(ApiError::Internal(format!(
                "embedding service returned {} vectors for {} inputs",
                parsed.data.len(),
                inputs.len()
            )));
        }

        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
        model_id: &str,
    ) -> Result<FragmentReceiver, ApiError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = json!({
            "model": model_id,
            "messages": request.messages,
            "stream": true,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = request.temperature { obj.insert("temperature".to_string(), json!(t)); }
            if let Some(t) = request.max_tokens { obj.insert("max_tokens".to_string(), json!(t)); }
        }

        let res = self.client.post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::Generation(format!("failed to reach chat endpoint: {}", e)))?;

        if !res.status().is_success() {
            return Err(error_from_response(res, Endpoint::Chat).await);
        }

        let (tx, rx) = mpsc::channel(32);
        let mut stream = res.bytes_stream();

        tokio::spawn(async move {
            let mut decoder = SseDecoder::new();
            while let Some(item) = stream.next().await {
                match item {
                    Ok(bytes) => {
                        for event in decoder.push(&bytes) {
                            if forward_event(&tx, event).await != FrameOutcome::Continue {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Answer stream interrupted: {}", e);
                        let _ = tx
                            .send(Err(ApiError::Generation(format!("stream interrupted: {}", e))))
                            .await;
                        return;
                    }
                }
            }
            if let Some(event) = decoder.finish() {
                if forward_event(&tx, event).await != FrameOutcome::Continue {
                    return;
                }
            }
            // Body closed without [DONE] or a finish_reason.
            tracing::warn!("Answer stream ended before completion");
            let _ = tx
                .send(Err(ApiError::Generation(
                    "stream ended before completion".to_string(),
                )))
                .await;
        });

        Ok(rx)
    }

    async fn embed(&self, inputs: &[String], model_id: &str) -> Result<Vec<Vec<f32>>, ApiError> {
        let mut embeddings = Vec::with_capacity(inputs.len());
        for batch in inputs.chunks(self.batch_size) {
            embeddings.extend(self.embed_batch(batch, model_id).await?);
        }
        Ok(embeddings)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameOutcome {
    Continue,
    /// The model finished the answer.
    Completed,
    /// An error was forwarded or the receiver is gone.
    Aborted,
}

/// Sends the fragment carried by `event`.
async fn forward_event(tx: &mpsc::Sender<Result<String, ApiError>>, event: SseEvent) -> FrameOutcome {
    let data = match event {
        SseEvent::Done => return FrameOutcome::Completed,
        SseEvent::Data(data) => data,
    };

    let Ok(payload) = serde_json::from_str::<Value>(&data) else {
        tracing::debug!("Skipping non-JSON stream frame: {}", data);
        return FrameOutcome::Continue;
    };

    if let Some(err) = payload.get("error") {
        let _ = tx
            .send(Err(ApiError::Generation(format!("model reported an error: {}", err))))
            .await;
        return FrameOutcome::Aborted;
    }

    let choice = &payload["choices"][0];
    if let Some(content) = choice["delta"]["content"].as_str() {
        if !content.is_empty() && tx.send(Ok(content.to_string())).await.is_err() {
            return FrameOutcome::Aborted;
        }
    }

    if choice["finish_reason"].as_str().is_some() {
        FrameOutcome::Completed
    } else {
        FrameOutcome::Continue
    }
}

#[derive(Clone, Copy)]
enum Endpoint {
    Chat,
    Embeddings,
}

async fn error_from_response(res: Response, endpoint: Endpoint) -> ApiError {
    let status = res.status();
    let text = res
        .text()
        .await
        .unwrap_or_else(|_| "<body unavailable>".to_string());

    // Google answers 400 rather than 401 for a malformed key.
    let bad_key = status == StatusCode::BAD_REQUEST && text.contains("API key not valid");
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN || bad_key {
        return ApiError::Authentication(format!("API key rejected ({}): {}", status, text));
    }

    match endpoint {
        Endpoint::Chat => ApiError::Generation(format!("chat endpoint returned {}: {}", status, text)),
        Endpoint::Embeddings => {
            ApiError::Internal(format!("embedding endpoint returned {}: {}", status, text))
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ChatMessage;
    use axum::http::{header, StatusCode as AxumStatus};
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::{Json, Router};
    use tokio::net::TcpListener;

    async fn serve(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn provider(base_url: String, batch: usize) -> OpenAiCompatibleProvider {
        let settings = LlmSettings {
            api_key: Some("test-key".to_string()),
            base_url,
            embedding_batch_size: batch,
            ..LlmSettings::default()
        };
        OpenAiCompatibleProvider::new(&settings).unwrap()
    }

    fn request() -> ChatRequest {
        ChatRequest::new(vec![ChatMessage::user("hi")]).with_temperature(0.3)
    }

    async fn collect(mut rx: FragmentReceiver) -> (String, Option<ApiError>) {
        let mut text = String::new();
        while let Some(item) = rx.recv().await {
            match item {
                Ok(fragment) => text.push_str(&fragment),
                Err(err) => return (text, Some(err)),
            }
        }
        (text, None)
    }

    #[test]
    fn missing_key_fails_before_any_request() {
        let settings = LlmSettings::default();
        assert!(matches!(
            OpenAiCompatibleProvider::new(&settings),
            Err(ApiError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn streams_fragments_in_order() {
        let app = Router::new().route(
            "/chat/completions",
            post(|| async {
                let body = concat!(
                    "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
                    "data: {\"choices\":[{\"delta\":{\"content\":\"The iPad \"}}]}\n\n",
                    "data: {\"choices\":[{\"delta\":{\"content\":\"Pro has \"}}]}\n\n",
                    "data: {\"choices\":[{\"delta\":{\"content\":\"an M4 chip.\"}}]}\n\n",
                    "data: [DONE]\n\n",
                );
                ([(header::CONTENT_TYPE, "text/event-stream")], body)
            }),
        );
        let base = serve(app).await;

        let rx = provider(base, 8).stream_chat(request(), "m").await.unwrap();
        let (text, err) = collect(rx).await;
        assert!(err.is_none());
        assert_eq!(text, "The iPad Pro has an M4 chip.");
    }

    #[tokio::test]
    async fn error_frame_ends_stream_with_generation_error() {
        let app = Router::new().route(
            "/chat/completions",
            post(|| async {
                let body = concat!(
                    "data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n\n",
                    "data: {\"error\":{\"message\":\"overloaded\"}}\n\n",
                    "data: {\"choices\":[{\"delta\":{\"content\":\"never\"}}]}\n\n",
                );
                ([(header::CONTENT_TYPE, "text/event-stream")], body)
            }),
        );
        let base = serve(app).await;

        let rx = provider(base, 8).stream_chat(request(), "m").await.unwrap();
        let (text, err) = collect(rx).await;
        assert_eq!(text, "partial");
        assert!(matches!(err, Some(ApiError::Generation(_))));
    }

    #[tokio::test]
    async fn truncated_body_ends_with_generation_error() {
        let app = Router::new().route(
            "/chat/completions",
            post(|| async {
                let body = "data: {\"choices\":[{\"delta\":{\"content\":\"The iPad Pro has\"}}]}\n\n";
                ([(header::CONTENT_TYPE, "text/event-stream")], body)
            }),
        );
        let base = serve(app).await;

        let rx = provider(base, 8).stream_chat(request(), "m").await.unwrap();
        let (text, err) = collect(rx).await;
        assert_eq!(text, "The iPad Pro has");
        assert!(matches!(err, Some(ApiError::Generation(_))));
    }

    #[tokio::test]
    async fn finish_reason_without_done_completes_cleanly() {
        let app = Router::new().route(
            "/chat/completions",
            post(|| async {
                let body = concat!(
                    "data: {\"choices\":[{\"delta\":{\"content\":\"M4.\"}}]}\n\n",
                    "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
                );
                ([(header::CONTENT_TYPE, "text/event-stream")], body)
            }),
        );
        let base = serve(app).await;

        let rx = provider(base, 8).stream_chat(request(), "m").await.unwrap();
        let (text, err) = collect(rx).await;
        assert!(err.is_none());
        assert_eq!(text, "M4.");
    }

    #[tokio::test]
    async fn unauthorized_maps_to_authentication_error() {
        let app = Router::new().route(
            "/chat/completions",
            post(|| async { (AxumStatus::UNAUTHORIZED, "bad key").into_response() }),
        );
        let base = serve(app).await;

        let result = provider(base, 8).stream_chat(request(), "m").await;
        assert!(matches!(result, Err(ApiError::Authentication(_))));
    }

    #[tokio::test]
    async fn embeds_in_batches_and_restores_input_order() {
        let app = Router::new().route(
            "/embeddings",
            post(|Json(body): Json<Value>| async move {
                let inputs = body["input"].as_array().cloned().unwrap_or_default();
                // Reply in reverse to exercise the index sort.
                let data: Vec<Value> = inputs
                    .iter()
                    .enumerate()
                    .rev()
                    .map(|(index, text)| {
                        let len = text.as_str().unwrap_or_default().len() as f32;
                        json!({ "index": index, "embedding": [len, 1.0] })
                    })
                    .collect();
                Json(json!({ "data": data }))
            }),
        );
        let base = serve(app).await;

        let inputs: Vec<String> = ["a", "bb", "ccc", "dddd", "eeeee"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let vectors = provider(base, 2).embed(&inputs, "e").await.unwrap();
        let lengths: Vec<f32> = vectors.iter().map(|v| v[0]).collect();
        assert_eq!(lengths, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[tokio::test]
    async fn invalid_google_key_on_embeddings_is_authentication() {
        let app = Router::new().route(
            "/embeddings",
            post(|| async {
                (
                    AxumStatus::BAD_REQUEST,
                    "API key not valid. Please pass a valid API key.",
                )
                    .into_response()
            }),
        );
        let base = serve(app).await;

        let result = provider(base, 8).embed(&["x".to_string()], "e").await;
        assert!(matches!(result, Err(ApiError::Authentication(_))));
    }
}
