use std::sync::Arc;

use tokio::sync::mpsc;

use super::prompt::{build_messages, select_source_link};
use crate::core::config::AppConfig;
use crate::core::errors::ApiError;
use crate::history::ChatSession;
use crate::llm::{ChatRequest, FragmentReceiver, LlmProvider};
use crate::rag::Retriever;

/// Retrieval-augmented answering over a streaming chat model.
pub struct QueryAnswerer {
    llm: Arc<dyn LlmProvider>,
    chat_model: String,
    temperature: f64,
    max_tokens: u32,
    history_turns: usize,
}

impl QueryAnswerer {
    pub fn new(llm: Arc<dyn LlmProvider>, config: &AppConfig) -> Self {
        Self {
            llm,
            chat_model: config.llm.chat_model.clone(),
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
            history_turns: config.chat.history_turns,
        }
    }

    /// Streams the answer to `query` as ordered text fragments.
    ///
    /// Retrieval and connection failures are returned directly. Once the
    /// stream is open, a failure arrives as the last item after whatever
    /// fragments were already produced.
    pub async fn answer(
        &self,
        retriever: &Retriever,
        query: &str,
        session: &ChatSession,
    ) -> Result<FragmentReceiver, ApiError> {
        let results = retriever.retrieve(query).await?;
        tracing::debug!("Retrieved {} chunks for query", results.len());

        let source_link = select_source_link(query);
        let messages = build_messages(
            query,
            &results,
            session.recent(self.history_turns),
            source_link,
        );
        let request = ChatRequest::new(messages)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        let upstream = self.llm.stream_chat(request, &self.chat_model).await?;
        Ok(forward_with_source(upstream, source_link))
    }
}

/// Relays `upstream` and, after a clean finish, appends the source link if
/// the model did not already include it.
fn forward_with_source(mut upstream: FragmentReceiver, source_link: Option<&'static str>) -> FragmentReceiver {
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        let mut answer = String::new();
        while let Some(item) = upstream.recv().await {
            match item {
                Ok(fragment) => {
                    answer.push_str(&fragment);
                    if tx.send(Ok(fragment)).await.is_err() {
                        return;
                    }
                }
                Err(err) => {
                    let _ = tx.send(Err(err)).await;
                    return;
                }
            }
        }

        if let Some(url) = source_link {
            if !answer.contains(url) {
                let _ = tx.send(Ok(format!("\n\nSource: {}", url))).await;
            }
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::chat::prompt::{IPAD_MINI_URL, IPAD_PRO_URL, NO_HISTORY_PLACEHOLDER};
    use crate::history::ChatTurn;
    use crate::rag::{IndexInfo, MemoryIndex, StoredChunk};

    /// Replays canned fragments and records the last chat request.
    struct FakeLlm {
        fragments: Vec<Result<String, ApiError>>,
        fail_embedding: bool,
        chat_calls: AtomicUsize,
        last_request: Mutex<Option<ChatRequest>>,
    }

    impl FakeLlm {
        fn new(fragments: Vec<Result<String, ApiError>>) -> Arc<Self> {
            Arc::new(Self {
                fragments,
                fail_embedding: false,
                chat_calls: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            })
        }

        fn user_message(&self) -> String {
            let guard = self.last_request.lock().unwrap();
            guard.as_ref().unwrap().messages[1].content.clone()
        }
    }

    #[async_trait]
    impl LlmProvider for FakeLlm {
        fn name(&self) -> &str {
            "fake"
        }

        async fn stream_chat(
            &self,
            request: ChatRequest,
            _model_id: &str,
        ) -> Result<FragmentReceiver, ApiError> {
            self.chat_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request);

            let (tx, rx) = mpsc::channel(16);
            let fragments: Vec<Result<String, ApiError>> = self
                .fragments
                .iter()
                .map(|f| match f {
                    Ok(text) => Ok(text.clone()),
                    Err(e) => Err(ApiError::Generation(e.to_string())),
                })
                .collect();
            tokio::spawn(async move {
                for fragment in fragments {
                    if tx.send(fragment).await.is_err() {
                        break;
                    }
                }
            });
            Ok(rx)
        }

        async fn embed(&self, inputs: &[String], _model_id: &str) -> Result<Vec<Vec<f32>>, ApiError> {
            if self.fail_embedding {
                return Err(ApiError::Internal("connection refused".to_string()));
            }
            Ok(inputs.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn retriever(llm: Arc<FakeLlm>) -> Retriever {
        let chunk = |id: &str, content: &str| StoredChunk {
            chunk_id: id.to_string(),
            content: content.to_string(),
            source: "ipad_pro_wikipedia_content.txt".to_string(),
            category: "ipad_pro".to_string(),
            metadata: None,
        };
        let index = MemoryIndex::from_entries(
            IndexInfo {
                embedding_model: "embed-test".to_string(),
                dimension: 2,
            },
            vec![
                (chunk("p#0", "The iPad Pro uses the M4 chip."), vec![1.0, 0.0]),
                (chunk("p#1", "The iPad mini has an 8.3-inch display."), vec![0.0, 1.0]),
            ],
        );
        Retriever::from_index(index, llm, "embed-test", 3)
    }

    fn answerer(llm: Arc<FakeLlm>) -> QueryAnswerer {
        QueryAnswerer::new(llm, &AppConfig::default())
    }

    async fn collect(mut rx: FragmentReceiver) -> (Vec<String>, Option<ApiError>) {
        let mut fragments = Vec::new();
        while let Some(item) = rx.recv().await {
            match item {
                Ok(text) => fragments.push(text),
                Err(err) => return (fragments, Some(err)),
            }
        }
        (fragments, None)
    }

    #[tokio::test]
    async fn streams_fragments_in_order_and_appends_source() {
        let llm = FakeLlm::new(vec![Ok("The iPad Pro ".into()), Ok("uses the M4 chip.".into())]);
        let rx = answerer(llm.clone())
            .answer(
                &retriever(llm.clone()),
                "Which chip does the iPad Pro use?",
                &ChatSession::new(),
            )
            .await
            .unwrap();

        let (fragments, err) = collect(rx).await;
        assert!(err.is_none());
        assert_eq!(
            fragments,
            vec![
                "The iPad Pro ".to_string(),
                "uses the M4 chip.".to_string(),
                format!("\n\nSource: {}", IPAD_PRO_URL),
            ]
        );

        let user = llm.user_message();
        assert!(user.starts_with("Context: The iPad Pro uses the M4 chip.\n\nThe iPad mini"));
        assert!(user.ends_with("Question: Which chip does the iPad Pro use?"));

        let guard = llm.last_request.lock().unwrap();
        let request = guard.as_ref().unwrap();
        assert_eq!(request.temperature, Some(0.3));
        assert_eq!(request.max_tokens, Some(1000));
    }

    #[tokio::test]
    async fn does_not_repeat_link_already_in_answer() {
        let llm = FakeLlm::new(vec![Ok(format!("8.3 inches. See {}", IPAD_MINI_URL))]);
        let rx = answerer(llm.clone())
            .answer(
                &retriever(llm.clone()),
                "how big is the mini",
                &ChatSession::new(),
            )
            .await
            .unwrap();

        let (fragments, _) = collect(rx).await;
        assert_eq!(fragments.len(), 1);
    }

    #[tokio::test]
    async fn no_link_for_other_queries() {
        let llm = FakeLlm::new(vec![Ok("It weighs 460 g.".into())]);
        let rx = answerer(llm.clone())
            .answer(
                &retriever(llm.clone()),
                "How heavy is the Air?",
                &ChatSession::new(),
            )
            .await
            .unwrap();

        let (fragments, _) = collect(rx).await;
        assert_eq!(fragments, vec!["It weighs 460 g.".to_string()]);
    }

    #[tokio::test]
    async fn mid_stream_failure_keeps_partial_output() {
        let llm = FakeLlm::new(vec![
            Ok("The iPad Pro".into()),
            Err(ApiError::Generation("connection reset".into())),
        ]);
        let rx = answerer(llm.clone())
            .answer(
                &retriever(llm.clone()),
                "Tell me about the iPad Pro",
                &ChatSession::new(),
            )
            .await
            .unwrap();

        let (fragments, err) = collect(rx).await;
        assert_eq!(fragments, vec!["The iPad Pro".to_string()]);
        assert!(matches!(err, Some(ApiError::Generation(_))));
    }

    #[tokio::test]
    async fn cleared_history_renders_placeholder() {
        let llm = FakeLlm::new(vec![Ok("ok".into())]);
        let answerer = answerer(llm.clone());
        let retriever = retriever(llm.clone());

        let mut session = ChatSession::new();
        session.append(ChatTurn::new("What is the Air?", "A thin tablet."));
        let rx = answerer.answer(&retriever, "And its weight?", &session).await.unwrap();
        collect(rx).await;
        assert!(llm.user_message().contains("User: What is the Air?\nAssistant: A thin tablet."));

        session.clear();
        let rx = answerer.answer(&retriever, "Hello", &session).await.unwrap();
        collect(rx).await;
        let user = llm.user_message();
        assert!(user.contains(&format!("Chat History: {}\n", NO_HISTORY_PLACEHOLDER)));
        assert!(!user.contains("What is the Air?"));
    }

    #[tokio::test]
    async fn retrieval_failure_skips_generation() {
        let llm = Arc::new(FakeLlm {
            fragments: Vec::new(),
            fail_embedding: true,
            chat_calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        });
        let err = answerer(llm.clone())
            .answer(
                &retriever(llm.clone()),
                "anything",
                &ChatSession::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Retrieval(_)));
        assert_eq!(llm.chat_calls.load(Ordering::SeqCst), 0);
    }
}
