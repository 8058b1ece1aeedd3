//! Article provenance records
//!
//! Articles and their chunks are owned by the extraction pipeline; the
//! intelligence layer only reads them (publication dates for scoring, chunks
//! for vector retrieval).

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// A source news article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub url: String,
    pub title: String,
    /// Publication date as delivered by the scraper; parsed on demand
    pub published_date: Option<String>,
}

impl Article {
    /// Create a new article record
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: String::new(),
            title: title.into(),
            published_date: None,
        }
    }

    /// Set the URL
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the publication date
    pub fn with_published_date(mut self, date: impl Into<String>) -> Self {
        self.published_date = Some(date.into());
        self
    }

    /// Parsed publication date, if present and in a recognized format
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.published_date.as_deref().and_then(parse_published_date)
    }
}

/// Parse the date formats scrapers produce
///
/// Accepts RFC 3339, RFC 2822, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS`
/// and bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_published_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// A chunk of article text used by vector retrieval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleChunk {
    pub id: String,
    pub article_id: String,
    /// Position of the chunk within the article, starting at 0
    pub chunk_index: u32,
    pub content: String,
    pub embedding: Option<Vec<f32>>,
    /// Identifier of the backend that produced `embedding`
    pub backend: Option<String>,
}

impl ArticleChunk {
    /// Create a chunk without an embedding
    pub fn new(article_id: impl Into<String>, chunk_index: u32, content: impl Into<String>) -> Self {
        let article_id = article_id.into();
        Self {
            id: format!("{}#{}", article_id, chunk_index),
            article_id,
            chunk_index,
            content: content.into(),
            embedding: None,
            backend: None,
        }
    }

    /// Attach an embedding tagged with its backend
    pub fn with_embedding(mut self, embedding: Vec<f32>, backend: impl Into<String>) -> Self {
        self.embedding = Some(embedding);
        self.backend = Some(backend.into());
        self
    }
}
