use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;

use super::protocol::{
    chunk_message, done_message, error_message, history_cleared_message, session_message,
    WsIncomingMessage,
};
use crate::core::errors::ApiError;
use crate::history::{ChatSession, ChatTurn};
use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Value>(64);

    tokio::spawn(async move {
        while let Some(payload) = out_rx.recv().await {
            let Ok(text) = serde_json::to_string(&payload) else {
                continue;
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let (tx, mut rx) = mpsc::unbounded_channel::<Result<WsIncomingMessage, String>>();
    tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    let parsed = serde_json::from_str::<WsIncomingMessage>(&text)
                        .map_err(|e| format!("invalid message: {}", e));
                    if tx.send(parsed).is_err() {
                        break;
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    let mut session = ChatSession::new();
    tracing::info!("Chat session {} opened", session.id());
    if send_json(&out_tx, session_message(session.id())).await.is_err() {
        return;
    }

    // Messages queue while an answer streams; one session handles one at a time.
    while let Some(incoming) = rx.recv().await {
        let result = match incoming {
            Ok(incoming) => handle_message(&out_tx, &state, &mut session, incoming).await,
            Err(reason) => Err(ApiError::BadRequest(reason)),
        };
        if let Err(err) = result {
            tracing::warn!("Session {}: {}", session.id(), err);
            let _ = send_json(&out_tx, error_message(&err.to_string(), "")).await;
        }
    }

    let open_for = Utc::now() - session.created_at();
    tracing::info!(
        "Chat session {} closed after {} turns ({}s)",
        session.id(),
        session.turns().len(),
        open_for.num_seconds()
    );
}

async fn handle_message(
    out: &mpsc::Sender<Value>,
    state: &AppState,
    session: &mut ChatSession,
    data: WsIncomingMessage,
) -> Result<(), ApiError> {
    match data.msg_type.as_deref().unwrap_or("ask") {
        "clear" => {
            let removed = session.clear();
            send_json(out, history_cleared_message(removed)).await
        }
        "ask" => {
            let question = data.message.unwrap_or_default().trim().to_string();
            if question.is_empty() {
                return Err(ApiError::BadRequest("question must not be empty".to_string()));
            }
            answer_question(out, state, session, question).await
        }
        other => Err(ApiError::BadRequest(format!("unknown message type: {}", other))),
    }
}

/// Streams one answer. The turn is recorded only when the stream completes.
async fn answer_question(
    out: &mpsc::Sender<Value>,
    state: &AppState,
    session: &mut ChatSession,
    question: String,
) -> Result<(), ApiError> {
    let retriever = state.retriever().await?;
    let mut stream = state
        .answerer
        .answer(&retriever, &question, session)
        .await?;

    let mut answer = String::new();
    while let Some(item) = stream.recv().await {
        match item {
            Ok(fragment) => {
                answer.push_str(&fragment);
                send_json(out, chunk_message(&fragment)).await?;
            }
            Err(err) => {
                tracing::warn!("Answer stream failed after {} chars: {}", answer.len(), err);
                return send_json(out, error_message(&err.to_string(), &answer)).await;
            }
        }
    }

    send_json(out, done_message(&answer)).await?;
    session.append(ChatTurn::new(question, answer));
    Ok(())
}

pub async fn send_json(out: &mpsc::Sender<Value>, payload: Value) -> Result<(), ApiError> {
    out.send(payload).await.map_err(ApiError::internal)
}
