//! Error types for the crawler module

use crate::error::Error as CrateError;
use thiserror::Error;

/// Error type for fetch and parse operations
#[derive(Debug, Error)]
pub enum CrawlError {
    /// HTTP client error (network, DNS, timeout)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with an error status
    #[error("HTTP status {status} for {url}")]
    Status {
        /// Status code returned by the server
        status: u16,
        /// URL that was requested
        url: String,
    },

    /// HTML parsing error
    #[error("HTML parsing error: {0}")]
    HtmlParse(String),

    /// URL parsing error
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl From<CrawlError> for CrateError {
    fn from(err: CrawlError) -> Self {
        match err {
            CrawlError::Http(e) => CrateError::Http(e),
            CrawlError::UrlParse(e) => CrateError::Other(format!("URL parse error: {}", e)),
            _ => CrateError::Crawl(err.to_string()),
        }
    }
}
