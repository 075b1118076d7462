//! Crawl frontier controller
//!
//! A single controller owns every entity's crawl state (visited set, allowed
//! domains, outstanding work) and the result store. Fetches run concurrently
//! up to the configured limit, but each completed fetch is scored, extracted
//! and persisted by the controller itself, so all writes to an entity's state
//! happen from one place.
//!
//! Per entity the crawl moves from SEEDED (seed queued at depth 0) through
//! repeated fetch/score/enqueue rounds to CLOSED, which is reached when the
//! entity has no queued or in-flight task left.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use serde::Serialize;
use tokio::fs;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::crawler::config::CrawlerConfig;
use crate::crawler::content_extraction::extract_text;
use crate::crawler::domain::{AllowedDomains, same_domain_links};
use crate::crawler::entities::Entity;
use crate::crawler::error::CrawlError;
use crate::crawler::excerpt::{extract_relevant_text, truncate_chars};
use crate::crawler::fetcher::PageFetcher;
use crate::crawler::finalizer::finalize_run;
use crate::crawler::scoring::{ScoringInput, score_page};
use crate::crawler::storage::{ResultStore, StorageConfig};
use crate::crawler::visited::{VisitedSet, normalize};
use crate::crawler::{CrawlTask, FetchedPage, ScoredPage};
use crate::error::Result;

/// Progress notifications emitted while crawling
#[derive(Debug, Clone)]
pub enum CrawlProgress {
    /// A page was fetched and evaluated
    Page {
        entity: String,
        url: String,
        relevant: bool,
    },
    /// An entity has no work left
    EntityClosed { entity: String, results: usize },
}

/// Totals for a finished run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    /// Entities crawled
    pub entities: usize,

    /// Entities with at least one relevant page
    pub entities_with_results: usize,

    /// Entities without relevant pages
    pub not_found: Vec<String>,

    /// Successful fetches
    pub pages_fetched: usize,

    /// Pages appended to a result set
    pub relevant_pages: usize,

    /// Fetched pages dropped as duplicate, offsite or non-textual
    pub skipped_pages: usize,

    /// Failed fetches
    pub fetch_errors: usize,

    /// Failed result file writes
    pub persistence_errors: usize,

    /// Whether the run was stopped before the frontier drained
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Phase {
    /// Seed queued, nothing dispatched yet
    Seeded,
    /// At least one fetch dispatched
    Crawling,
    Closed,
}

struct EntityCrawl {
    entity: Entity,
    allowed: AllowedDomains,
    visited: VisitedSet,
    phase: Phase,
    // queued + in flight
    outstanding: usize,
    dispatched: usize,
}

type FetchOutcome = (CrawlTask, std::result::Result<FetchedPage, CrawlError>);

struct Frontier<'a> {
    config: &'a CrawlerConfig,
    anchors: Vec<String>,
    crawls: HashMap<String, EntityCrawl>,
    queue: VecDeque<CrawlTask>,
    store: ResultStore,
    summary: RunSummary,
    progress: Option<mpsc::Sender<CrawlProgress>>,
}

impl<'a> Frontier<'a> {
    fn new(
        config: &'a CrawlerConfig,
        entities: &[Entity],
        progress: Option<mpsc::Sender<CrawlProgress>>,
    ) -> Self {
        let mut frontier = Self {
            config,
            anchors: config.keywords.anchor_keywords(),
            crawls: HashMap::new(),
            queue: VecDeque::new(),
            store: ResultStore::with_config(StorageConfig::from(config)),
            summary: RunSummary {
                entities: entities.len(),
                ..RunSummary::default()
            },
            progress,
        };

        for entity in entities {
            frontier.seed(entity);
        }
        frontier
    }

    fn seed(&mut self, entity: &Entity) {
        let allowed = match AllowedDomains::from_seed(&entity.url) {
            Ok(allowed) => allowed,
            Err(e) => {
                warn!("[{}] Not crawling: {}", entity.name, e);
                return;
            }
        };
        if self.crawls.contains_key(&entity.name) {
            warn!("[{}] Duplicate entity ignored", entity.name);
            return;
        }

        let mut visited = VisitedSet::new();
        visited.insert(&entity.url);
        debug!("[{}] Seeded with {} ({:?})", entity.name, entity.url, allowed.variants());

        self.crawls.insert(
            entity.name.clone(),
            EntityCrawl {
                entity: entity.clone(),
                allowed,
                visited,
                phase: Phase::Seeded,
                outstanding: 1,
                dispatched: 0,
            },
        );
        self.queue.push_back(CrawlTask {
            entity: entity.name.clone(),
            url: entity.url.clone(),
            depth: 0,
        });
    }

    /// Next task allowed to be fetched, dropping tasks over the page budget
    async fn next_task(&mut self) -> Option<CrawlTask> {
        while let Some(task) = self.queue.pop_front() {
            let Some(crawl) = self.crawls.get_mut(&task.entity) else {
                continue;
            };
            if let Some(budget) = self.config.max_pages_per_entity {
                if crawl.dispatched >= budget {
                    debug!("[{}] Page budget exhausted, dropping {}", task.entity, task.url);
                    self.task_done(&task.entity).await;
                    continue;
                }
            }
            crawl.dispatched += 1;
            crawl.phase = Phase::Crawling;
            return Some(task);
        }
        None
    }

    async fn handle(&mut self, task: CrawlTask, result: std::result::Result<FetchedPage, CrawlError>) {
        match result {
            Ok(page) => {
                self.summary.pages_fetched += 1;
                self.handle_page(&task, page).await;
            }
            Err(e) => {
                error!("[{}] Error fetching {}: {}", task.entity, task.url, e);
                self.summary.fetch_errors += 1;
            }
        }
        self.task_done(&task.entity).await;
    }

    async fn handle_page(&mut self, task: &CrawlTask, page: FetchedPage) {
        let Some(crawl) = self.crawls.get_mut(&task.entity) else {
            return;
        };
        let name = crawl.entity.name.clone();

        if normalize(&page.url) != normalize(&task.url) && !crawl.visited.insert(&page.url) {
            debug!("[{}] {} redirected to already visited {}", name, task.url, page.url);
            self.summary.skipped_pages += 1;
            return;
        }
        if !crawl.allowed.allows(&page.url) {
            debug!("[{}] Offsite page ignored: {} (from {})", name, page.url, task.url);
            self.summary.skipped_pages += 1;
            return;
        }
        if !page.is_textual() {
            debug!(
                "[{}] Non-textual content ignored: {} (Content-Type: {:?})",
                name, page.url, page.content_type
            );
            self.summary.skipped_pages += 1;
            return;
        }

        let text = match extract_text(&page.text) {
            Ok(text) => text,
            Err(e) => {
                warn!("[{}] Could not extract text from {}: {}", name, page.url, e);
                self.summary.skipped_pages += 1;
                return;
            }
        };

        let relevance = score_page(
            &ScoringInput {
                url: page.url.as_str(),
                content_type: page.content_type.as_deref(),
                headings: &text.headings,
                body: &text.body,
            },
            &self.config.keywords,
        );

        if relevance.relevant {
            match relevance.score {
                Some(score) => info!("[{}] Relevant page (score {}): {}", name, score, page.url),
                None => info!("[{}] Relevant page: {}", name, page.url),
            }

            let content = extract_relevant_text(
                &text.body.to_lowercase(),
                &self.anchors,
                &self.config.excerpt,
            )
            .unwrap_or_else(|| truncate_chars(&text.display, self.config.excerpt.max_length));

            let scored = ScoredPage {
                url: page.url.to_string(),
                score: relevance.score,
                keywords_found: relevance.tags,
                content,
                municipality: name.clone(),
                postal_code: crawl.entity.postal_code.clone(),
                region: crawl.entity.region.clone(),
                depth: task.depth,
                crawled_at: Utc::now(),
            };

            match self.store.append(&name, scored).await {
                Ok(count) => {
                    self.summary.relevant_pages += 1;
                    info!(
                        "[{}] => {} updated ({} relevant pages)",
                        name,
                        self.store.path_for(&name).display(),
                        count
                    );
                }
                Err(e) => {
                    self.summary.persistence_errors += 1;
                    error!("[{}] Failed to save results after retry: {}", name, e);
                }
            }
        } else {
            debug!("[{}] Page not relevant: {}", name, page.url);
        }

        if let Some(sender) = &self.progress {
            let _ = sender
                .send(CrawlProgress::Page {
                    entity: name.clone(),
                    url: page.url.to_string(),
                    relevant: relevance.relevant,
                })
                .await;
        }

        if task.depth < self.config.max_depth {
            self.enqueue_links(task, &page);
        }
    }

    fn enqueue_links(&mut self, task: &CrawlTask, page: &FetchedPage) {
        let Some(crawl) = self.crawls.get_mut(&task.entity) else {
            return;
        };

        let mut queued = 0;
        for link in same_domain_links(&page.url, &page.links) {
            if crawl.visited.insert(&link) {
                self.queue.push_back(CrawlTask {
                    entity: task.entity.clone(),
                    url: link,
                    depth: task.depth + 1,
                });
                crawl.outstanding += 1;
                queued += 1;
            }
        }
        debug!("[{}] Queued {} links from {} at depth {}", task.entity, queued, page.url, task.depth + 1);
    }

    async fn task_done(&mut self, entity: &str) {
        let Some(crawl) = self.crawls.get_mut(entity) else {
            return;
        };
        crawl.outstanding = crawl.outstanding.saturating_sub(1);
        if crawl.outstanding > 0 || crawl.phase == Phase::Closed {
            return;
        }

        let started = crawl.phase == Phase::Crawling;
        crawl.phase = Phase::Closed;
        let results = self.store.results(entity).len();
        if started {
            info!(
                "[{}] Crawl finished: {} pages visited, {} relevant kept",
                entity,
                crawl.visited.len(),
                results
            );
        } else {
            warn!("[{}] Crawl closed before any page was fetched", entity);
        }
        if let Some(sender) = &self.progress {
            let _ = sender
                .send(CrawlProgress::EntityClosed {
                    entity: entity.to_string(),
                    results,
                })
                .await;
        }
    }

    /// Entities not yet closed, with their phase
    fn open_entities(&self) -> Vec<(&str, Phase)> {
        self.crawls
            .values()
            .filter(|crawl| crawl.phase != Phase::Closed)
            .map(|crawl| (crawl.entity.name.as_str(), crawl.phase))
            .collect()
    }
}

fn dispatch<F>(fetcher: Arc<F>, task: CrawlTask) -> BoxFuture<'static, FetchOutcome>
where
    F: PageFetcher + 'static,
{
    Box::pin(async move {
        let result = fetcher.fetch(&task.url).await;
        (task, result)
    })
}

/// Crawl every entity and finalize the run
///
/// Fetches run concurrently up to `config.concurrency`. Cancelling `cancel`
/// stops dispatching, abandons fetches in flight, and still finalizes over
/// the results gathered so far. Progress is reported on `progress` when given.
#[instrument(skip_all, fields(entities = entities.len()))]
pub async fn crawl<F>(
    entities: &[Entity],
    fetcher: Arc<F>,
    config: &CrawlerConfig,
    cancel: CancellationToken,
    progress: Option<mpsc::Sender<CrawlProgress>>,
) -> Result<RunSummary>
where
    F: PageFetcher + 'static,
{
    config.validate()?;
    fs::create_dir_all(&config.output_dir).await?;
    info!(
        "Crawling {} entities (max depth {}, concurrency {})",
        entities.len(),
        config.max_depth,
        config.concurrency
    );

    let mut frontier = Frontier::new(config, entities, progress);
    let mut in_flight: FuturesUnordered<BoxFuture<'static, FetchOutcome>> = FuturesUnordered::new();

    loop {
        while in_flight.len() < config.concurrency && !cancel.is_cancelled() {
            let Some(task) = frontier.next_task().await else {
                break;
            };
            debug!("[{}] Fetching {} (depth {})", task.entity, task.url, task.depth);
            in_flight.push(dispatch(Arc::clone(&fetcher), task));
        }

        if in_flight.is_empty() {
            break;
        }

        let (task, result) = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            Some(done) = in_flight.next() => done,
        };
        frontier.handle(task, result).await;
    }

    if cancel.is_cancelled() {
        frontier.summary.cancelled = true;
        warn!(
            "Crawl cancelled with {} fetches in flight and {} queued",
            in_flight.len(),
            frontier.queue.len()
        );
        for (name, phase) in frontier.open_entities() {
            match phase {
                Phase::Seeded => warn!("[{}] Crawl cancelled before it started", name),
                _ => warn!("[{}] Crawl interrupted", name),
            }
        }
    }
    drop(in_flight);

    let outcome = finalize_run(entities, &mut frontier.store, &config.not_found_path()).await?;

    let mut summary = frontier.summary;
    summary.entities_with_results = outcome.with_results;
    summary.not_found = outcome.not_found;
    summary.persistence_errors += outcome.write_errors;

    info!(
        "Crawl done: {} pages fetched, {} relevant, {} fetch errors, {} entities without results",
        summary.pages_fetched,
        summary.relevant_pages,
        summary.fetch_errors,
        summary.not_found.len()
    );
    Ok(summary)
}
