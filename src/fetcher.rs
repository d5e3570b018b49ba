//! Latency-aware assembly of an article set for a query and date window.
//!
//! The first page is always fetched. Its latency decides how many more pages
//! fit into the time budget, and those pages are drawn by stratified random
//! sampling over the full result range so that the fetched subset covers the
//! whole window instead of only its most relevant prefix.

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::error::{NewsError, Result};
use crate::models::{Article, NewsPage};

pub const MIN_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;
pub const MIN_QUERY_LEN: usize = 3;

/// Parameters of one page request against an [`ArticleSource`].
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest<'a> {
    pub query: &'a str,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    /// 1-based page number.
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest<'_> {
    /// Reject requests that no upstream could ever answer.
    pub fn validate(&self) -> Result<()> {
        if self.query.trim().chars().count() < MIN_QUERY_LEN {
            return Err(NewsError::Validation(format!(
                "search query must be at least {MIN_QUERY_LEN} characters long"
            )));
        }
        if self.page == 0 {
            return Err(NewsError::Validation(
                "page number must be greater than 0".to_string(),
            ));
        }
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(NewsError::Validation(format!(
                "page size must be between {MIN_PAGE_SIZE} and {MAX_PAGE_SIZE}"
            )));
        }
        if self.date_from > self.date_to {
            return Err(NewsError::Validation(format!(
                "date_from {} is after date_to {}",
                self.date_from, self.date_to
            )));
        }
        Ok(())
    }
}

/// Trait for the article-search boundary.
///
/// Implementors return one parsed page. Failures are reported as errors; the
/// [`Fetcher`] decides which of them are fatal.
pub trait ArticleSource {
    async fn fetch_page(&self, request: &PageRequest<'_>) -> Result<NewsPage>;
}

/// Paging and time-budget settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FetcherConfig {
    pub page_size: u32,
    /// Floor for the measured first-page latency.
    #[serde(with = "secs_f64")]
    pub min_request_interval: Duration,
    /// Wall-clock budget for all page requests together.
    #[serde(with = "secs_f64")]
    pub max_total_queries_time: Duration,
    /// Upper bound on page requests, first page included.
    pub max_queries_count: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            min_request_interval: Duration::from_secs(1),
            max_total_queries_time: Duration::from_secs(6),
            max_queries_count: 1,
        }
    }
}

/// Drives an [`ArticleSource`] to collect articles for a query.
#[derive(Debug)]
pub struct Fetcher<S> {
    source: S,
    config: FetcherConfig,
}

impl<S> Fetcher<S>
where
    S: ArticleSource,
{
    pub fn new(source: S, config: FetcherConfig) -> Self {
        Self { source, config }
    }

    #[cfg(test)]
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetch articles for `query` between `date_from` and `date_to` inclusive.
    ///
    /// Returns the collected articles and the provider's total match count.
    ///
    /// # Errors
    ///
    /// Fails on invalid input or when the first page cannot be fetched, since
    /// without it there is no total count to plan around. Later pages that
    /// fail are skipped.
    #[instrument(level = "info", skip(self, rng))]
    pub async fn get_news<R: Rng>(
        &self,
        query: &str,
        date_from: NaiveDate,
        date_to: NaiveDate,
        rng: &mut R,
    ) -> Result<(Vec<Article>, u64)> {
        let page_size = self.config.page_size;
        let request = |page| PageRequest {
            query,
            date_from,
            date_to,
            page,
            page_size,
        };
        request(1).validate()?;

        let t0 = Instant::now();
        let first = self.source.fetch_page(&request(1)).await?;
        let query_time = t0.elapsed().max(self.config.min_request_interval);

        let total_count = first.total_count;
        if total_count == 0 {
            info!("No news found");
            return Ok((Vec::new(), 0));
        }

        let total_pages = total_count.div_ceil(u64::from(page_size));
        let mut articles = first.articles;
        info!(
            count = articles.len(),
            total = total_count,
            total_pages,
            query_ms = query_time.as_millis(),
            "Got first page of news"
        );

        let n_queries = planned_queries_count(
            query_time,
            total_pages,
            self.config.max_total_queries_time,
            self.config.max_queries_count,
        );
        debug!(more = n_queries.saturating_sub(1), "Planned more queries");
        if n_queries <= 1 {
            return Ok((articles, total_count));
        }

        let pages = random_page_numbers(1, total_pages, n_queries, rng);
        let pages_requested = pages.len();
        let rest: Vec<Vec<Article>> = stream::iter(pages)
            .then(|page| {
                let request = request(page);
                async move {
                    match self.source.fetch_page(&request).await {
                        Ok(p) => {
                            debug!(page, count = p.articles.len(), "Fetched page");
                            p.articles
                        }
                        Err(e) => {
                            warn!(page, error = %e, "Page fetch failed; skipping");
                            Vec::new()
                        }
                    }
                }
            })
            .collect()
            .await;
        articles.extend(rest.into_iter().flatten());

        info!(
            count = articles.len(),
            pages = pages_requested,
            "Got rest of pages"
        );
        Ok((articles, total_count))
    }
}

/// Number of page requests (first page included) that fit the time budget.
///
/// At least one query is planned whenever there is a page to fetch.
pub fn planned_queries_count(
    query_time: Duration,
    total_pages: u64,
    max_total_time: Duration,
    max_queries: usize,
) -> usize {
    if total_pages == 0 || max_total_time.is_zero() || max_queries == 0 {
        return 0;
    }
    let by_time = if query_time.is_zero() {
        max_queries
    } else {
        (max_total_time.as_secs_f64() / query_time.as_secs_f64()).floor() as usize
    };
    let pages = usize::try_from(total_pages).unwrap_or(usize::MAX);
    by_time.min(max_queries).min(pages).max(1)
}

/// Split `1..=total_pages` into `n_chunks` contiguous chunks and draw one
/// page uniformly from each chunk, starting at chunk `start_chunk`.
pub fn random_page_numbers<R: Rng>(
    start_chunk: usize,
    total_pages: u64,
    n_chunks: usize,
    rng: &mut R,
) -> Vec<u32> {
    if total_pages == 0 || n_chunks == 0 {
        return Vec::new();
    }
    let chunk_size = total_pages as f64 / n_chunks as f64;
    (start_chunk..n_chunks)
        .map(|i| {
            let beg = (chunk_size * i as f64).round() as u64 + 1;
            let end = ((chunk_size * (i + 1) as f64).round() as u64).max(beg);
            u32::try_from(rng.random_range(beg..=end)).unwrap_or(u32::MAX)
        })
        .collect()
}

/// Serde adapter for durations written as fractional seconds.
pub(crate) mod secs_f64 {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use crate::models::fixtures::article;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Article source serving a fixed set of pages, optionally slowly.
    #[derive(Default)]
    pub struct FakeSource {
        pub pages: HashMap<u32, NewsPage>,
        pub failing: Vec<u32>,
        pub latency: Duration,
        pub requested: Mutex<Vec<u32>>,
    }

    impl FakeSource {
        /// `n_pages` pages of `page_size` articles each, `total` reported.
        pub fn paged(n_pages: u32, page_size: u32, total: u64) -> Self {
            let pages = (1..=n_pages)
                .map(|p| {
                    let articles = (0..page_size)
                        .map(|i| {
                            let id = format!("p{p}-{i}");
                            article(&id, &format!("Title {id}"), &format!("Description {id}"), "Body")
                        })
                        .collect();
                    (p, NewsPage { articles, total_count: total })
                })
                .collect();
            Self {
                pages,
                ..Default::default()
            }
        }

        pub fn requested(&self) -> Vec<u32> {
            self.requested.lock().unwrap().clone()
        }
    }

    impl ArticleSource for FakeSource {
        async fn fetch_page(&self, request: &PageRequest<'_>) -> Result<NewsPage> {
            request.validate()?;
            self.requested.lock().unwrap().push(request.page);
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            if self.failing.contains(&request.page) {
                return Err(NewsError::RequestFailed(format!("page {} down", request.page)));
            }
            Ok(self.pages.get(&request.page).cloned().unwrap_or_default())
        }
    }
}
