//! Command-line interface definitions for Awful News Digest.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! API keys can be provided via command-line flags or environment variables.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the Awful News Digest application.
///
/// # Examples
///
/// ```sh
/// # Top five stories about a query over one week
/// awful_news_digest -q "interest rates" --from 2023-04-03 --to 2023-04-09
///
/// # Persist the cache and write reports
/// awful_news_digest -q wildfire --from 2023-04-03 --to 2023-04-09 \
///     --cache-dir ./cache -j ./json -m ./markdown
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Search query, at least three characters
    #[arg(short, long)]
    pub query: String,

    /// First day of the window (YYYY-MM-DD)
    #[arg(long)]
    pub from: String,

    /// Last day of the window, inclusive (YYYY-MM-DD)
    #[arg(long)]
    pub to: String,

    /// Number of top articles to report (overrides the config)
    #[arg(short = 'n', long)]
    pub top: Option<usize>,

    /// Optional path to config.yaml file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory for the persistent cache (overrides the config)
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Keep the cache in memory only
    #[arg(long, conflicts_with = "cache_dir")]
    pub no_persist: bool,

    /// Output directory for the JSON results file
    #[arg(short, long)]
    pub json_output_dir: Option<String>,

    /// Output directory for the Markdown report
    #[arg(short, long)]
    pub markdown_output_dir: Option<String>,

    /// Article-search API key
    #[arg(long, env = "NEWS_API_KEY", hide_env_values = true)]
    pub news_api_key: Option<String>,

    /// Summarization API key
    #[arg(long, env = "RAPID_API_KEY", hide_env_values = true)]
    pub rapid_api_key: Option<String>,
}
