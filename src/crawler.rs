//! # Subsidy Crawler Module
//!
//! This module holds the relevance-scoring, bounded-depth crawl engine. Each
//! entity (a municipality with a seed URL) is crawled breadth-first inside its
//! own domain; every page is scored against configured keywords, relevant
//! pages are reduced to excerpts around the keyword hits, and results are
//! written to a per-entity JSON file as soon as they are found.
//!
//! ## Key Components
//!
//! - `CrawlerConfig`: Depth, concurrency, retention and keyword configuration
//! - `PageFetcher` / `HttpFetcher`: Source of pages for the engine
//! - `score_page`: Keyword scorer (weighted or all-categories-required)
//! - `extract_relevant_text`: Non-overlapping excerpt extraction
//! - `ResultStore`: Incremental per-entity JSON persistence
//! - `crawl`: The frontier controller driving the whole run
//! - `finalize_run`: Final rewrite of result files and the not-found report
//!
//! ## Usage
//!
//! Load entities with `load_entities`, build an `HttpFetcher`, and call
//! `crawl`; the returned `RunSummary` describes what was found.

mod config;
mod content_extraction;
mod domain;
mod entities;
mod error;
mod excerpt;
mod fetcher;
mod finalizer;
mod frontier;
mod scoring;
pub mod storage;
mod visited;

// Re-export important types and functions
pub use config::{
    CategoryKeywords, CrawlerConfig, CrawlerConfigBuilder, ExcerptOptions, KeywordConfig,
    TruncationPolicy, WeightedKeywords,
};
pub use content_extraction::{extract_links, extract_text};
pub use domain::{AllowedDomains, same_domain_links};
pub use entities::{Entity, EntityError, load_entities, parse_entities};
pub use error::CrawlError;
pub use excerpt::extract_relevant_text;
pub use fetcher::{HttpFetcher, PageFetcher};
pub use finalizer::finalize_run;
pub use frontier::{CrawlProgress, RunSummary, crawl};
pub use scoring::{Relevance, ScoringInput, is_textual, score_page};
pub use storage::{ResultStore, StorageError};
pub use visited::VisitedSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// A unit of work in the frontier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTask {
    /// Name of the entity the page is crawled for
    pub entity: String,

    /// URL to fetch
    pub url: Url,

    /// Link distance from the seed URL
    pub depth: u32,
}

/// A page as returned by a [`PageFetcher`]
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub url: Url,

    /// HTTP status code
    pub status: u16,

    /// Content-Type header, if present
    pub content_type: Option<String>,

    /// Raw page text, empty for non-textual content
    pub text: String,

    /// Raw `href` values found on the page
    pub links: Vec<String>,
}

impl FetchedPage {
    /// Whether the page carries textual content
    pub fn is_textual(&self) -> bool {
        is_textual(self.content_type.as_deref())
    }
}

/// Plain text extracted from a page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageText {
    /// Heading text joined by spaces
    pub headings: String,

    /// All visible text joined by spaces
    pub body: String,

    /// Paragraph-like text, one line per node
    pub display: String,
}

/// A relevant page kept for an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPage {
    /// URL of the page
    pub url: String,

    /// Relevance score, absent in category mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    /// Matched keywords tagged by location
    pub keywords_found: Vec<String>,

    /// Excerpt of the page around the keyword hits
    pub content: String,

    /// Name of the municipality the page belongs to
    pub municipality: String,

    /// Postal code carried from the entity list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,

    /// Region carried from the entity list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Link distance from the seed URL
    pub depth: u32,

    /// When the page was scored
    pub crawled_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scored_page_json_shape() {
        let page = ScoredPage {
            url: "https://lutry.ch/energie".to_string(),
            score: None,
            keywords_found: vec!["CONTENT:subvention".to_string()],
            content: "subvention photovoltaïque".to_string(),
            municipality: "Lutry".to_string(),
            postal_code: Some("1095".to_string()),
            region: None,
            depth: 1,
            crawled_at: Utc::now(),
        };

        let json = serde_json::to_value(&page).unwrap();
        assert!(json.get("score").is_none());
        assert!(json.get("region").is_none());
        assert_eq!(json["postal_code"], "1095");
        assert_eq!(json["keywords_found"][0], "CONTENT:subvention");

        let back: ScoredPage = serde_json::from_value(json).unwrap();
        assert_eq!(back, page);
    }

    #[test]
    fn test_fetched_page_textual() {
        let page = FetchedPage {
            url: Url::parse("https://lutry.ch/doc.pdf").unwrap(),
            status: 200,
            content_type: Some("application/pdf".to_string()),
            text: String::new(),
            links: Vec::new(),
        };
        assert!(!page.is_textual());
    }
}
