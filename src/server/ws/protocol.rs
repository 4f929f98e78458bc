use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize, Default)]
pub struct WsIncomingMessage {
    #[serde(rename = "type")]
    pub msg_type: Option<String>,
    pub message: Option<String>,
}

pub fn session_message(session_id: &str) -> Value {
    json!({"type": "session", "sessionId": session_id})
}

pub fn chunk_message(fragment: &str) -> Value {
    json!({"type": "chunk", "message": fragment})
}

pub fn done_message(answer: &str) -> Value {
    json!({"type": "done", "message": answer})
}

/// Inline failure; `partial` is whatever part of the answer was already sent.
pub fn error_message(message: &str, partial: &str) -> Value {
    json!({"type": "error", "message": message, "partial": partial})
}

pub fn history_cleared_message(removed: usize) -> Value {
    json!({"type": "history_cleared", "removed": removed})
}
