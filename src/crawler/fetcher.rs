//! Page fetching
//!
//! The crawl engine only depends on the [`PageFetcher`] trait. [`HttpFetcher`]
//! is the reqwest implementation used by the binary: it applies a run-wide
//! rate limit, follows redirects, and only downloads bodies of textual
//! responses.

use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Client as ReqwestClient;
use reqwest::header::CONTENT_TYPE;
use tracing::{Instrument, debug, debug_span, instrument};
use url::Url;

use crate::crawler::content_extraction::extract_links;
use crate::crawler::error::CrawlError;
use crate::crawler::scoring::is_textual;
use crate::crawler::{CrawlerConfig, FetchedPage};

/// Source of pages for the crawl engine
pub trait PageFetcher: Send + Sync {
    /// Fetch `url`, following redirects
    ///
    /// Network failures and error statuses are reported as `Err`. Non-textual
    /// responses succeed with an empty body and no links.
    fn fetch(&self, url: &Url) -> impl Future<Output = Result<FetchedPage, CrawlError>> + Send;
}

/// reqwest-backed fetcher
#[derive(Clone)]
pub struct HttpFetcher {
    client: ReqwestClient,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl HttpFetcher {
    /// Create a fetcher from the crawler configuration
    pub fn new(config: &CrawlerConfig) -> Result<Self, CrawlError> {
        let client = ReqwestClient::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.clone())
            .build()?;

        let limiter = config
            .requests_per_second
            .and_then(NonZeroU32::new)
            .map(|rate| Arc::new(RateLimiter::direct(Quota::per_second(rate))));

        Ok(Self { client, limiter })
    }
}

impl PageFetcher for HttpFetcher {
    #[instrument(skip(self), fields(url = %url))]
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, CrawlError> {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().instrument(debug_span!("limiter")).await;
        }

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        let final_url = response.url().clone();

        if !status.is_success() {
            return Err(CrawlError::Status {
                status: status.as_u16(),
                url: final_url.to_string(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        if !is_textual(content_type.as_deref()) {
            debug!("Not downloading non-textual body ({:?})", content_type);
            return Ok(FetchedPage {
                url: final_url,
                status: status.as_u16(),
                content_type,
                text: String::new(),
                links: Vec::new(),
            });
        }

        let text = response.text().await?;
        let links = extract_links(&text)?;

        Ok(FetchedPage {
            url: final_url,
            status: status.as_u16(),
            content_type,
            text,
            links,
        })
    }
}
