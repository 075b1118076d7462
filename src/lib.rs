//! # Subsidy Crawler
//!
//! This crate crawls the websites of a list of municipalities and collects the
//! pages that describe photovoltaic subsidies. Each municipality is crawled
//! breadth-first within its own domain up to a fixed depth; pages are scored
//! against keyword tables and the most relevant ones are kept, with excerpts,
//! in one JSON file per municipality.
//!
//! ## Features
//!
//! - Two scoring modes: weighted keyword sums, or all-categories-required
//! - Non-overlapping excerpts around keyword hits
//! - Bounded concurrency with a shared request rate limit
//! - Incremental, crash-tolerant result files and a report of municipalities
//!   without results
//! - Cooperative cancellation that still finalizes partial results
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use subsidy_crawler::crawler::{CrawlerConfig, HttpFetcher, crawl, load_entities};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let entities = load_entities(Path::new("communes.json"))?;
//!     let config = CrawlerConfig::builder().max_depth(2).build();
//!     let fetcher = Arc::new(HttpFetcher::new(&config)?);
//!
//!     let summary = crawl(&entities, fetcher, &config, CancellationToken::new(), None).await?;
//!     println!("{} municipalities without results", summary.not_found.len());
//!     Ok(())
//! }
//! ```

mod error;

pub mod crawler;

pub use error::{Error, Result};

/// Re-export of types module for public use
pub mod prelude {
    pub use crate::error::Error;
    pub use crate::error::Result;
}
