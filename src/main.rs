//! # Awful News Digest
//!
//! A news intelligence pipeline that searches an article API for a query over
//! a date window, ranks the results by how unusual their vocabulary is,
//! summarizes the most relevant descriptions and picks the articles that best
//! back each summary sentence.
//!
//! ## Features
//!
//! - Paces every external call through a per-API-key query scheduler
//! - Samples extra result pages within a time budget
//! - Caches every intermediate result with a TTL that depends on how recent
//!   the date window is
//! - Outputs a JSON results file and a Markdown report
//!
//! ## Usage
//!
//! ```sh
//! NEWS_API_KEY=... RAPID_API_KEY=... \
//!     awful_news_digest -q "interest rates" --from 2023-04-03 --to 2023-04-09 -j ./json
//! ```
//!
//! ## Architecture
//!
//! 1. **Fetching**: First page, then randomly sampled pages that fit the time budget
//! 2. **Ranking**: Articles ordered by the weight of their important words
//! 3. **Summary input**: Deduplicated, cleaned descriptions under a character budget
//! 4. **Summarizing**: One request to the summarization API
//! 5. **Matching**: Each summary sentence claims its most similar article (TF-IDF)
//! 6. **Output**: JSON results file and Markdown report

use chrono::Utc;
use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cache;
mod cli;
mod config;
mod error;
mod fetcher;
mod models;
mod news_api;
mod outputs;
mod pipeline;
mod ranker;
mod scheduler;
mod summarizer;
mod summary_input;
mod tf_idf;
mod top_news;
mod utils;
mod words;

use api::ReqwestTransport;
use cache::{FileStore, MemoryStore, ResultCache, Store};
use cli::Cli;
use config::Config;
use fetcher::Fetcher;
use models::DigestReport;
use news_api::NewsApiSource;
use outputs::{json, markdown};
use pipeline::NewsPipeline;
use scheduler::QueryScheduler;
use summarizer::Summarizer;
use utils::parse_date;
use words::Baseline;

fn scheduler(config: &Config) -> Arc<QueryScheduler<ReqwestTransport>> {
    Arc::new(
        QueryScheduler::new(ReqwestTransport::new())
            .with_policy(config.scheduler.policy)
            .with_max_retry_delay(config.scheduler.max_retry_delay),
    )
}

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();

    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("news_digest starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(query = %args.query, from = %args.from, to = %args.to, "Parsed CLI arguments");

    let date_from = parse_date(&args.from)?;
    let date_to = parse_date(&args.to)?;

    // ---- Load config ----
    let mut config = Config::load(args.config.as_deref())?
        .with_api_keys(args.news_api_key.clone(), args.rapid_api_key.clone());
    if let Some(top) = args.top {
        config.top_news_count = top;
    }
    if config.news_api.api_key.is_empty() {
        error!("No article-search API key; set NEWS_API_KEY or pass --news-api-key");
        return Err("missing NEWS_API_KEY".into());
    }

    // Early check: output dirs must be writable before any API quota is spent
    for dir in [&args.json_output_dir, &args.markdown_output_dir].into_iter().flatten() {
        if let Err(e) = utils::ensure_writable_dir(dir).await {
            error!(path = %dir, error = %e, "Output directory is not writable");
            return Err(e.into());
        }
    }

    // ---- Cache ----
    let cache_dir = if args.no_persist {
        None
    } else {
        args.cache_dir.clone().or_else(|| config.cache.dir.clone())
    };
    let store = match cache_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "Using file cache");
            Store::File(FileStore::open(&dir).await?)
        }
        None => {
            info!("Using in-memory cache");
            Store::Memory(MemoryStore::new())
        }
    };
    let cache = ResultCache::new(store, config.cache.ttl.clone());

    // ---- Word frequencies ----
    let baseline = Baseline::load(config.word_frequencies.as_deref())?;

    // ---- Pipeline ----
    let source = NewsApiSource::new(scheduler(&config), config.news_api.clone());
    let fetcher = Fetcher::new(source, config.fetcher.clone());
    let summarizer = Summarizer::new(scheduler(&config), config.summarizer.clone());
    let mut pipeline = NewsPipeline::new(
        fetcher,
        cache,
        summarizer,
        baseline,
        config.ranker.clone(),
        config.summary_input.clone(),
    );

    let semi = match pipeline
        .get_news_semimanufactures(&args.query, date_from, date_to)
        .await
    {
        Ok(semi) => semi,
        Err(e) if e.is_validation() => {
            error!(error = %e, "Invalid request");
            return Err(e.into());
        }
        Err(e) => {
            error!(error = %e, "Failed to get news");
            return Err(e.into());
        }
    };
    let top_news = pipeline
        .top_news(&args.query, date_from, date_to, config.top_news_count)
        .await?;
    info!(
        count = semi.count,
        sentences = top_news.sentences.len(),
        articles = top_news.articles.len(),
        "Top news ready"
    );

    let report = DigestReport {
        query: args.query.clone(),
        date_from,
        date_to,
        count: semi.count,
        generated_at: Utc::now(),
        top_news,
    };

    // ---- Outputs ----
    if let Some(dir) = &args.json_output_dir {
        if let Err(e) = json::write_report(&report, dir).await {
            error!(error = %e, "Failed to write JSON");
        }
    }
    if let Some(dir) = &args.markdown_output_dir {
        if let Err(e) = markdown::write_report(&report, dir).await {
            error!(error = %e, "Failed to write Markdown");
        }
    }
    if args.json_output_dir.is_none() && args.markdown_output_dir.is_none() {
        println!("{}", markdown::report_to_markdown(&report));
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}
