use serde_json::{json, Value};

pub const INDEX_DIR_NAME: &str = "vectorstore.db";
pub const INDEX_FILE_NAME: &str = "index.sqlite";

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";
pub const DEFAULT_TEMPERATURE: f64 = 0.3;
pub const DEFAULT_MAX_TOKENS: u32 = 1000;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_EMBEDDING_BATCH: usize = 32;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 300;
pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_HISTORY_TURNS: usize = 3;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8501;

pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";

/// Built-in configuration that `config.yml` and `secrets.yaml` are merged onto.
pub fn default_config() -> Value {
    json!({
        "llm": {
            "base_url": DEFAULT_API_BASE,
            "chat_model": DEFAULT_CHAT_MODEL,
            "embedding_model": DEFAULT_EMBEDDING_MODEL,
            "temperature": DEFAULT_TEMPERATURE,
            "max_tokens": DEFAULT_MAX_TOKENS,
            "timeout_secs": DEFAULT_TIMEOUT_SECS,
            "embedding_batch_size": DEFAULT_EMBEDDING_BATCH,
        },
        "chunking": {
            "chunk_size": DEFAULT_CHUNK_SIZE,
            "chunk_overlap": DEFAULT_CHUNK_OVERLAP,
        },
        "retrieval": {
            "top_k": DEFAULT_TOP_K,
        },
        "chat": {
            "history_turns": DEFAULT_HISTORY_TURNS,
        },
        "server": {
            "host": DEFAULT_HOST,
            "port": DEFAULT_PORT,
        },
    })
}
