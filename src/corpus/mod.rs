//! Content extraction: fetches the configured encyclopedia pages and writes
//! one text file per product category.

pub mod extractor;
pub mod source;
pub mod topics;
pub mod wikipedia;

pub use extractor::{ExtractionReport, Extractor, RawDocument};
pub use source::{ContentSource, PageLookup, WikiPage};
pub use topics::{Category, ExtractionMode, CATEGORIES};
pub use wikipedia::WikipediaClient;
