use std::path::PathBuf;

use chrono::{DateTime, Local};

use super::source::{ContentSource, PageLookup, WikiPage};
use super::topics::{Category, ExtractionMode};
use crate::core::config::AppPaths;
use crate::core::errors::ApiError;

/// Separator written between documents of one category file.
pub fn document_separator() -> String {
    format!("\n\n{}\n\n", "=".repeat(80))
}

/// One fetched page plus the metadata written above its text.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub title: String,
    pub url: String,
    pub fetched_at: DateTime<Local>,
    pub content: String,
    pub via_disambiguation: bool,
}

impl RawDocument {
    fn from_page(page: WikiPage, via_disambiguation: bool) -> Self {
        Self {
            title: page.title,
            url: page.url,
            fetched_at: Local::now(),
            content: page.content,
            via_disambiguation,
        }
    }

    pub fn render(&self) -> String {
        let suffix = if self.via_disambiguation {
            " (from disambiguation)"
        } else {
            ""
        };
        format!(
            "# {}{}\n\nURL: {}\nLast Updated: {}\n\n{}",
            self.title,
            suffix,
            self.url,
            self.fetched_at.format("%Y-%m-%d %H:%M:%S"),
            self.content
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPage {
    pub title: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct CategoryReport {
    pub category: String,
    pub extracted: usize,
    pub skipped: Vec<SkippedPage>,
    /// Set when at least one page succeeded and the file was written.
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionReport {
    pub categories: Vec<CategoryReport>,
}

impl ExtractionReport {
    pub fn files(&self) -> Vec<PathBuf> {
        self.categories
            .iter()
            .filter_map(|c| c.file.clone())
            .collect()
    }
}

pub struct Extractor<S> {
    source: S,
    paths: AppPaths,
    mode: ExtractionMode,
}

impl<S: ContentSource> Extractor<S> {
    pub fn new(source: S, paths: AppPaths, mode: ExtractionMode) -> Self {
        Self {
            source,
            paths,
            mode,
        }
    }

    /// Extracts every category in turn. Page failures are logged and skipped;
    /// only a failed file write aborts the run.
    pub async fn run(&self, categories: &[Category]) -> Result<ExtractionReport, ApiError> {
        let mut report = ExtractionReport::default();
        for category in categories {
            report.categories.push(self.extract_category(category).await?);
        }
        Ok(report)
    }

    async fn extract_category(&self, category: &Category) -> Result<CategoryReport, ApiError> {
        tracing::info!("Processing category: {}", category.name);

        let mut report = CategoryReport {
            category: category.name.to_string(),
            ..Default::default()
        };
        let mut documents = Vec::new();

        for title in category.titles(self.mode) {
            match self.fetch_document(title).await {
                Ok(doc) => {
                    tracing::info!("Extracted {} ({} chars)", doc.title, doc.content.len());
                    documents.push(doc);
                }
                Err(err) => {
                    tracing::warn!("Skipping {}: {}", title, err);
                    report.skipped.push(SkippedPage {
                        title: title.to_string(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        report.extracted = documents.len();
        if documents.is_empty() {
            tracing::warn!("No pages extracted for {}; no file written", category.name);
            return Ok(report);
        }

        let combined = documents
            .iter()
            .map(RawDocument::render)
            .collect::<Vec<_>>()
            .join(&document_separator());
        let path = self.paths.corpus_file(category.name);
        tokio::fs::write(&path, &combined).await.map_err(|e| {
            ApiError::Internal(format!("failed to write {}: {}", path.display(), e))
        })?;

        tracing::info!(
            "Saved {} pages for {} to {} ({} chars)",
            documents.len(),
            category.name,
            path.display(),
            combined.chars().count()
        );
        report.file = Some(path);
        Ok(report)
    }

    /// Fetches one title, following a disambiguation page to its first option.
    async fn fetch_document(&self, title: &str) -> Result<RawDocument, ApiError> {
        match self.source.lookup(title).await? {
            PageLookup::Found(page) => Ok(RawDocument::from_page(page, false)),
            PageLookup::NotFound => Err(ApiError::Fetch(format!("page not found: {}", title))),
            PageLookup::Disambiguation(options) => {
                let Some(first) = options.first() else {
                    return Err(ApiError::Fetch(format!(
                        "{} is a disambiguation page without options",
                        title
                    )));
                };
                tracing::info!("{} is ambiguous; trying first option {}", title, first);
                match self.source.lookup(first).await? {
                    PageLookup::Found(page) => Ok(RawDocument::from_page(page, true)),
                    _ => Err(ApiError::Fetch(format!(
                        "disambiguation option {} for {} could not be resolved",
                        first, title
                    ))),
                }
            }
        }
    }
}
