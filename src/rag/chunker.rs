//! Boundary-preferring text splitter.
//!
//! Lengths and offsets are counted in `char`s, not bytes.

use crate::core::config::ChunkingSettings;
use crate::core::errors::ApiError;

/// Split points in priority order: paragraph, line, sentence, word.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// A contiguous slice of one source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub text: String,
    pub source: String,
    /// Offset of the first char within the source document.
    pub start_offset: usize,
    pub chunk_index: usize,
}

impl TextChunk {
    pub fn chunk_id(&self) -> String {
        format!("{}#{}", self.source, self.chunk_index)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveChunker {
    pub fn new(settings: ChunkingSettings) -> Result<Self, ApiError> {
        if settings.chunk_size == 0 {
            return Err(ApiError::Configuration(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if settings.chunk_overlap >= settings.chunk_size {
            return Err(ApiError::Configuration(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                settings.chunk_overlap, settings.chunk_size
            )));
        }
        Ok(Self {
            chunk_size: settings.chunk_size,
            chunk_overlap: settings.chunk_overlap,
        })
    }

    /// Splits `text` into chunks of at most `chunk_size` chars.
    ///
    /// Every chunk after the first starts exactly `chunk_overlap` chars before
    /// the end of its predecessor.
    pub fn split(&self, text: &str, source: &str) -> Vec<TextChunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            let window_end = start + self.chunk_size;
            let end = if window_end >= total {
                total
            } else {
                self.find_split(&chars, start, window_end)
                    .unwrap_or(window_end)
            };

            chunks.push(TextChunk {
                text: chars[start..end].iter().collect(),
                source: source.to_string(),
                start_offset: start,
                chunk_index: chunks.len(),
            });

            if end >= total {
                break;
            }
            start = end - self.chunk_overlap;
        }

        chunks
    }

    /// End position just past the last highest-priority separator in the
    /// window that still leaves the chunk longer than the overlap.
    fn find_split(&self, chars: &[char], start: usize, window_end: usize) -> Option<usize> {
        let min_end = start + self.chunk_overlap;
        SEPARATORS.iter().find_map(|sep| {
            let sep: Vec<char> = sep.chars().collect();
            last_occurrence(&chars[start..window_end], &sep)
                .map(|pos| start + pos + sep.len())
                .filter(|end| *end > min_end)
        })
    }
}

fn last_occurrence(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .rev()
        .find(|&pos| haystack[pos..pos + needle.len()] == *needle)
}
