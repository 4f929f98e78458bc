pub mod chat;
pub mod core;
pub mod corpus;
pub mod history;
pub mod llm;
pub mod rag;
pub mod server;
pub mod state;
pub mod vector_math;
