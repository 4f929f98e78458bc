//! Per-connection chat history. Never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One completed question/answer exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
}

impl ChatTurn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatSession {
    id: String,
    created_at: DateTime<Utc>,
    turns: Vec<ChatTurn>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            turns: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    /// The last `n` turns, oldest first.
    pub fn recent(&self, n: usize) -> &[ChatTurn] {
        &self.turns[self.turns.len().saturating_sub(n)..]
    }

    pub fn append(&mut self, turn: ChatTurn) {
        self.turns.push(turn);
    }

    /// Drops every turn; returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.turns.len();
        self.turns.clear();
        removed
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}
