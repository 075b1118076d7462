//! # Subsidy Crawler CLI
//!
//! Command-line entry point of the subsidy crawler.
//!
//! ## Key Components
//!
//! - CLI argument parsing with clap
//! - `crawl`: crawl every municipality of an entity list and write one result
//!   file per municipality plus the not-found report
//!
//! Progress is shown with a spinner on stderr; logs follow `RUST_LOG`.
//! Ctrl-C stops dispatching new fetches and still finalizes the run.

mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use subsidy_crawler::crawler::{
    CrawlProgress, CrawlerConfig, HttpFetcher, KeywordConfig, TruncationPolicy, crawl,
    load_entities,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

#[derive(Parser)]
#[command(author, version, about = "Crawl municipal websites for photovoltaic subsidy pages", long_about = None)]
struct Cli {
    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Export traces over OTLP/HTTP
    #[arg(long, global = true)]
    otlp: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Crawl every entity of a JSON entity list
    Crawl(CrawlArgs),
}

#[derive(Args, Debug)]
struct CrawlArgs {
    /// JSON array of entities with a name and a website URL
    #[arg(required = true)]
    entities: PathBuf,

    /// Directory receiving result files and the not-found report
    #[arg(short, long, default_value = "output_subsidies")]
    output_dir: PathBuf,

    /// Crawl depth; the seed page is depth 0
    #[arg(short, long, default_value = "2")]
    depth: u32,

    /// Maximum number of fetches in flight
    #[arg(short, long, default_value = "16")]
    concurrency: usize,

    /// Relevant pages kept per entity
    #[arg(short = 'k', long, default_value = "3")]
    top_k: usize,

    /// Keep every relevant page
    #[arg(long, conflicts_with = "top_k")]
    unbounded: bool,

    /// When the top-k cutoff applies (during-run or at-close)
    #[arg(long, default_value = "during-run")]
    truncate: TruncationPolicy,

    /// Scoring mode (weighted or categories)
    #[arg(short, long, default_value = "weighted")]
    mode: String,

    /// JSON keyword file, overrides --mode
    #[arg(long)]
    keywords: Option<PathBuf>,

    /// Maximum number of pages fetched per entity
    #[arg(short = 'p', long)]
    max_pages: Option<usize>,

    /// Requests per second across the run, 0 to disable
    #[arg(short, long, default_value = "8")]
    rate: u32,

    /// Request timeout in seconds
    #[arg(short, long, default_value = "30")]
    timeout: u64,

    /// User agent sent with every request
    #[arg(long)]
    user_agent: Option<String>,

    /// File name of the not-found report inside the output directory
    #[arg(long, default_value = "communes_not_found.txt")]
    not_found_file: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _otel = telemetry::init_tracing_subscriber(cli.log_file.as_deref(), cli.otlp)?;

    match cli.command {
        Commands::Crawl(args) => crawl_command(args).await?,
    }

    Ok(())
}

fn build_config(args: &CrawlArgs) -> anyhow::Result<CrawlerConfig> {
    let keywords = match &args.keywords {
        Some(path) => KeywordConfig::from_file(path)
            .with_context(|| format!("Failed to load keywords from {}", path.display()))?,
        None => KeywordConfig::for_mode(&args.mode)?,
    };

    let mut builder = CrawlerConfig::builder()
        .output_dir(&args.output_dir)
        .max_depth(args.depth)
        .concurrency(args.concurrency)
        .top_k((!args.unbounded).then_some(args.top_k))
        .truncation(args.truncate)
        .keywords(keywords)
        .max_pages_per_entity(args.max_pages)
        .requests_per_second((args.rate > 0).then_some(args.rate))
        .request_timeout_secs(args.timeout)
        .not_found_file(&args.not_found_file);
    if let Some(user_agent) = &args.user_agent {
        builder = builder.user_agent(user_agent);
    }

    let config = builder.build();
    config.validate()?;
    Ok(config)
}

#[instrument]
async fn crawl_command(args: CrawlArgs) -> anyhow::Result<()> {
    let config = build_config(&args)?;
    let entities = load_entities(&args.entities)
        .with_context(|| format!("Failed to load entities from {}", args.entities.display()))?;
    if entities.is_empty() {
        warn!("No valid entity in {}", args.entities.display());
    }
    let fetcher = Arc::new(HttpFetcher::new(&config)?);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, finishing with the results found so far");
                cancel.cancel();
            }
        }
    });

    // Create a channel for progress updates
    let (progress_sender, mut progress_receiver) = mpsc::channel(100);

    let progress_bar = ProgressBar::new_spinner();
    progress_bar.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner} [{elapsed_precise}] {pos} pages, {msg}")?,
    );
    progress_bar.enable_steady_tick(std::time::Duration::from_millis(120));

    // Ends when the crawl drops its sender
    let progress_handle = tokio::spawn({
        let progress_bar = progress_bar.clone();
        let total = entities.len();
        async move {
            let mut relevant = 0;
            let mut closed = 0;
            while let Some(event) = progress_receiver.recv().await {
                match event {
                    CrawlProgress::Page { relevant: hit, .. } => {
                        progress_bar.inc(1);
                        if hit {
                            relevant += 1;
                        }
                    }
                    CrawlProgress::EntityClosed { .. } => closed += 1,
                }
                progress_bar.set_message(format!(
                    "{} relevant, {}/{} entities done",
                    relevant, closed, total
                ));
            }
            progress_bar.finish_with_message(format!("{} relevant pages", relevant));
        }
    });

    let start_time = std::time::Instant::now();
    let summary = crawl(&entities, fetcher, &config, cancel, Some(progress_sender)).await?;
    let _ = progress_handle.await;

    println!(
        "Crawled {} entities in {:.2?}: {} pages fetched, {} relevant, {} fetch errors",
        summary.entities,
        start_time.elapsed(),
        summary.pages_fetched,
        summary.relevant_pages,
        summary.fetch_errors
    );
    println!(
        "{} entities with results in {}",
        summary.entities_with_results,
        config.output_dir.display()
    );
    if !summary.not_found.is_empty() {
        println!(
            "{} entities without results, listed in {}",
            summary.not_found.len(),
            config.not_found_path().display()
        );
    }
    if summary.persistence_errors > 0 {
        println!("{} result files could not be written", summary.persistence_errors);
    }
    if summary.cancelled {
        println!("Crawl was interrupted; results are partial");
    }

    Ok(())
}
