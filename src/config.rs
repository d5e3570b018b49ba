//! YAML configuration.
//!
//! Every section has defaults, so an empty file (or none at all) yields a
//! working setup once the API keys are supplied from the environment.
//!
//! ```yaml
//! fetcher:
//!   page_size: 100
//!   max_total_queries_time: 6.0
//! cache:
//!   dir: ./cache
//!   ttl:
//!     fresh_ttl: 10800
//! ranker:
//!   words_percent: 25
//!   unknown_word_policy: { kind: derived, factor: 0.9 }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument};

use crate::cache::TtlPolicy;
use crate::error::{NewsError, Result};
use crate::fetcher::{FetcherConfig, MAX_PAGE_SIZE, MIN_PAGE_SIZE, secs_f64};
use crate::news_api::NewsApiConfig;
use crate::ranker::RankerConfig;
use crate::scheduler::IntervalPolicy;
use crate::summarizer::SummarizerConfig;
use crate::summary_input::SummaryInputConfig;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub policy: IntervalPolicy,
    /// Upper bound on a single `Retry-After` wait.
    #[serde(with = "secs_f64")]
    pub max_retry_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            policy: IntervalPolicy::default(),
            max_retry_delay: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory for the file store; the in-memory store is used when unset.
    pub dir: Option<PathBuf>,
    pub ttl: TtlPolicy,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub news_api: NewsApiConfig,
    pub fetcher: FetcherConfig,
    pub scheduler: SchedulerConfig,
    pub cache: CacheConfig,
    pub ranker: RankerConfig,
    pub summary_input: SummaryInputConfig,
    pub summarizer: SummarizerConfig,
    /// `word<TAB>frequency` list replacing the embedded English baseline.
    pub word_frequencies: Option<PathBuf>,
    /// Number of top articles reported.
    pub top_news_count: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            news_api: NewsApiConfig::default(),
            fetcher: FetcherConfig::default(),
            scheduler: SchedulerConfig::default(),
            cache: CacheConfig::default(),
            ranker: RankerConfig::default(),
            summary_input: SummaryInputConfig::default(),
            summarizer: SummarizerConfig::default(),
            word_frequencies: None,
            top_news_count: 5,
        }
    }
}

impl Config {
    /// Load the config from `path`, or the defaults when no path is given.
    #[instrument(level = "info", skip_all, fields(path = ?path))]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    NewsError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
                })?;
                Self::from_yaml(&raw)?
            }
            None => Self::default(),
        };
        config.validate()?;
        info!("Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Fill in API keys given outside the config file.
    pub fn with_api_keys(mut self, news_api_key: Option<String>, rapid_api_key: Option<String>) -> Self {
        if let Some(key) = news_api_key {
            self.news_api.api_key = key;
        }
        if let Some(key) = rapid_api_key {
            self.summarizer.api_key = key;
        }
        self
    }

    /// Reject settings that can never produce a result.
    pub fn validate(&self) -> Result<()> {
        let page_size = self.fetcher.page_size;
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(NewsError::InvalidConfig(format!(
                "fetcher.page_size must be between {MIN_PAGE_SIZE} and {MAX_PAGE_SIZE}, got {page_size}"
            )));
        }
        if self.fetcher.max_queries_count == 0 {
            return Err(NewsError::InvalidConfig(
                "fetcher.max_queries_count must be at least 1".to_string(),
            ));
        }
        if self.ranker.words_percent == 0 || self.ranker.words_percent > 100 {
            return Err(NewsError::InvalidConfig(format!(
                "ranker.words_percent must be between 1 and 100, got {}",
                self.ranker.words_percent
            )));
        }
        if self.summary_input.max_chars == 0 {
            return Err(NewsError::InvalidConfig(
                "summary_input.max_chars must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
