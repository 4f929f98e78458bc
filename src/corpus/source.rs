use async_trait::async_trait;

use crate::core::errors::ApiError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiPage {
    pub title: String,
    pub url: String,
    pub content: String,
}

/// Outcome of looking up one title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageLookup {
    Found(WikiPage),
    /// The title names a disambiguation page; holds the suggested titles.
    Disambiguation(Vec<String>),
    NotFound,
}

/// A service that resolves page titles to article text.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn lookup(&self, title: &str) -> Result<PageLookup, ApiError>;
}
