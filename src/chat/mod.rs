//! Query answering: prompt assembly and the streamed answer.

pub mod answerer;
pub mod prompt;

pub use answerer::QueryAnswerer;
pub use prompt::{select_source_link, NO_HISTORY_PLACEHOLDER};
