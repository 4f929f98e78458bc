pub mod openai_compatible;
pub mod provider;
pub mod sse;
pub mod types;

pub use openai_compatible::OpenAiCompatibleProvider;
pub use provider::{FragmentReceiver, LlmProvider};
pub use types::{ChatMessage, ChatRequest};
