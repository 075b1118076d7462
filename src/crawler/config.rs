//! # Crawler Configuration Module
//!
//! This module provides configuration options for the subsidy crawler, including
//! controls for crawl depth, concurrency, result retention and the keyword tables
//! used for scoring. It uses a builder pattern for flexible configuration.
//!
//! ## Key Components
//!
//! - `CrawlerConfig`: The main configuration struct with crawler parameters
//! - `CrawlerConfigBuilder`: Builder pattern implementation for easier configuration
//! - `KeywordConfig`: Keyword tables for the weighted and all-categories scoring modes
//! - `ExcerptOptions`: Window sizes used when cutting excerpts around keyword hits
//!
//! ## Features
//!
//! - Defaults matching a polite crawl of municipal websites (depth 2, top 3 pages)
//! - Keyword tables loadable from a JSON file
//! - Explicit choice of when top-K truncation happens

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// When the top-K cutoff is applied to an entity's results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TruncationPolicy {
    /// Truncate after every append, so memory and file never exceed K entries
    #[default]
    DuringRun,
    /// Keep everything during the run and truncate when the run is finalized
    AtClose,
}

impl std::str::FromStr for TruncationPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "during-run" => Ok(Self::DuringRun),
            "at-close" => Ok(Self::AtClose),
            other => Err(Error::Config(format!("unknown truncation policy '{}'", other))),
        }
    }
}

/// Keyword tables for weighted scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightedKeywords {
    /// Keywords looked up in the page URL
    pub url_keywords: Vec<String>,

    /// Weight added for each URL keyword hit
    pub url_weight: f64,

    /// Keywords looked up in heading text, with their weight
    pub title_keywords: BTreeMap<String, f64>,

    /// Keywords looked up in the page body
    pub content_keywords: Vec<String>,

    /// Weight added for each content keyword hit
    pub content_weight: f64,
}

impl Default for WeightedKeywords {
    fn default() -> Self {
        Self {
            url_keywords: strings(&["energie", "developpement-durable", "subventions"]),
            url_weight: 5.0,
            title_keywords: BTreeMap::from([
                ("subventions".to_string(), 5.0),
                ("photovoltaïque".to_string(), 5.0),
            ]),
            content_keywords: strings(&[
                "installation",
                "photovoltaïque",
                "consommation",
                "subvention",
                "chf",
                "pronovo",
            ]),
            content_weight: 0.5,
        }
    }
}

impl WeightedKeywords {
    /// Every weight must be positive so that any match yields a positive score
    fn validate(&self) -> Result<()> {
        let positive = |w: f64| w.is_finite() && w > 0.0;
        if !positive(self.url_weight) {
            return Err(Error::Config(format!("url weight must be positive, got {}", self.url_weight)));
        }
        if !positive(self.content_weight) {
            return Err(Error::Config(format!(
                "content weight must be positive, got {}",
                self.content_weight
            )));
        }
        if let Some((keyword, weight)) = self.title_keywords.iter().find(|(_, w)| !positive(**w)) {
            return Err(Error::Config(format!(
                "title keyword '{}' must have a positive weight, got {}",
                keyword, weight
            )));
        }
        Ok(())
    }
}

/// Keyword categories that must all match for a page to be relevant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryKeywords {
    /// Category name mapped to the keywords that satisfy it
    pub categories: BTreeMap<String, Vec<String>>,
}

impl Default for CategoryKeywords {
    fn default() -> Self {
        Self {
            categories: BTreeMap::from([
                (
                    "incentive".to_string(),
                    strings(&["subvention", "subventions", "aide financière"]),
                ),
                (
                    "scope".to_string(),
                    strings(&["commune", "communal", "communale"]),
                ),
                (
                    "subject".to_string(),
                    strings(&["photovoltaïque", "photovoltaïques", "solaire"]),
                ),
            ]),
        }
    }
}

/// Keyword configuration, one variant per scoring mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum KeywordConfig {
    /// Sum weights over every hit; relevant when the sum is positive
    Weighted(WeightedKeywords),
    /// Relevant only when every category has at least one hit
    Categories(CategoryKeywords),
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self::Weighted(WeightedKeywords::default())
    }
}

impl KeywordConfig {
    /// Default tables for the mode named `weighted` or `categories`
    pub fn for_mode(mode: &str) -> Result<Self> {
        match mode {
            "weighted" => Ok(Self::Weighted(WeightedKeywords::default())),
            "categories" => Ok(Self::Categories(CategoryKeywords::default())),
            other => Err(Error::Config(format!("unknown scoring mode '{}'", other))),
        }
    }

    /// Load keyword tables from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Whether results are ordered by score
    pub fn is_scored(&self) -> bool {
        matches!(self, Self::Weighted(_))
    }

    /// Keywords used to anchor excerpts, in a stable order
    pub fn anchor_keywords(&self) -> Vec<String> {
        match self {
            Self::Weighted(weighted) => weighted.content_keywords.clone(),
            Self::Categories(categories) => categories
                .categories
                .values()
                .flatten()
                .cloned()
                .collect(),
        }
    }
}

/// Window sizes for relevant-text extraction, in characters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcerptOptions {
    /// Characters kept before a keyword hit
    pub leading_window: usize,

    /// Characters kept from the keyword hit onwards
    pub trailing_window: usize,

    /// Maximum length of the final excerpt
    pub max_length: usize,
}

impl Default for ExcerptOptions {
    fn default() -> Self {
        Self {
            leading_window: 3000,
            trailing_window: 12000,
            max_length: 15000,
        }
    }
}

/// Configuration for the crawler
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// Maximum depth to crawl; the seed is depth 0
    pub max_depth: u32,

    /// Maximum number of fetches in flight
    pub concurrency: usize,

    /// Maximum number of pages fetched per entity
    pub max_pages_per_entity: Option<usize>,

    /// Directory receiving result files and the not-found report
    pub output_dir: PathBuf,

    /// Number of results kept per entity, `None` for unbounded
    pub top_k: Option<usize>,

    /// When the top-K cutoff applies
    pub truncation: TruncationPolicy,

    /// File name of the not-found report inside `output_dir`
    pub not_found_file: String,

    /// Keyword tables and scoring mode
    pub keywords: KeywordConfig,

    /// Excerpt window sizes
    pub excerpt: ExcerptOptions,

    /// User agent to use for requests
    pub user_agent: String,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// Requests per second across the whole run, `None` for no limit
    pub requests_per_second: Option<u32>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: 2,
            concurrency: 16,
            max_pages_per_entity: None,
            output_dir: PathBuf::from("output_subsidies"),
            top_k: Some(3),
            truncation: TruncationPolicy::DuringRun,
            not_found_file: "communes_not_found.txt".to_string(),
            keywords: KeywordConfig::default(),
            excerpt: ExcerptOptions::default(),
            user_agent: format!("subsidy-crawler/{}", env!("CARGO_PKG_VERSION")),
            request_timeout_secs: 30,
            requests_per_second: Some(8),
        }
    }
}

/// Builder for CrawlerConfig
#[derive(Debug, Default)]
pub struct CrawlerConfigBuilder {
    config: CrawlerConfig,
}

impl CrawlerConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: CrawlerConfig::default(),
        }
    }

    /// Set the maximum depth to crawl
    pub fn max_depth(mut self, max_depth: u32) -> Self {
        self.config.max_depth = max_depth;
        self
    }

    /// Set the number of concurrent fetches
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    /// Set the per-entity page budget
    pub fn max_pages_per_entity(mut self, max_pages: Option<usize>) -> Self {
        self.config.max_pages_per_entity = max_pages;
        self
    }

    /// Set the output directory
    pub fn output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = output_dir.into();
        self
    }

    /// Set the number of results kept per entity
    pub fn top_k(mut self, top_k: Option<usize>) -> Self {
        self.config.top_k = top_k;
        self
    }

    /// Set when the top-K cutoff applies
    pub fn truncation(mut self, truncation: TruncationPolicy) -> Self {
        self.config.truncation = truncation;
        self
    }

    /// Set the not-found report file name
    pub fn not_found_file(mut self, name: impl Into<String>) -> Self {
        self.config.not_found_file = name.into();
        self
    }

    /// Set the keyword tables
    pub fn keywords(mut self, keywords: KeywordConfig) -> Self {
        self.config.keywords = keywords;
        self
    }

    /// Set the excerpt window sizes
    pub fn excerpt(mut self, excerpt: ExcerptOptions) -> Self {
        self.config.excerpt = excerpt;
        self
    }

    /// Set the user agent to use for requests
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Set the per-request timeout in seconds
    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    /// Set the run-wide request rate
    pub fn requests_per_second(mut self, rate: Option<u32>) -> Self {
        self.config.requests_per_second = rate;
        self
    }

    /// Build the configuration
    pub fn build(self) -> CrawlerConfig {
        self.config
    }
}

impl CrawlerConfig {
    /// Create a new builder
    pub fn builder() -> CrawlerConfigBuilder {
        CrawlerConfigBuilder::new()
    }

    /// Get the request timeout as a Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Path of the not-found report
    pub fn not_found_path(&self) -> PathBuf {
        self.output_dir.join(&self.not_found_file)
    }

    /// Reject settings the crawler cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::Config("concurrency must be at least 1".to_string()));
        }
        if self.top_k == Some(0) {
            return Err(Error::Config(
                "top-k must be at least 1, leave it unset for unbounded".to_string(),
            ));
        }
        if self.excerpt.max_length == 0 {
            return Err(Error::Config("excerpt max length must be positive".to_string()));
        }
        if self.not_found_file.trim().is_empty() {
            return Err(Error::Config("not-found file name is empty".to_string()));
        }
        if let KeywordConfig::Weighted(weighted) = &self.keywords {
            weighted.validate()?;
        }
        if let KeywordConfig::Categories(categories) = &self.keywords {
            if categories.categories.is_empty() {
                return Err(Error::Config("category mode needs at least one category".to_string()));
            }
            if let Some((name, _)) = categories.categories.iter().find(|(_, kws)| kws.is_empty()) {
                return Err(Error::Config(format!("category '{}' has no keywords", name)));
            }
        }
        Ok(())
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
