//! Pipeline orchestrator: from a query and date window to the count, the
//! ranked article index and the summary input, all behind the result cache.
//!
//! # Cache layout
//!
//! | prefix           | value                      |
//! |------------------|----------------------------|
//! | `news_count`     | provider's total match count |
//! | `important_news` | ranked article index       |
//! | `summary_input`  | text for the summarizer    |
//! | `summary`        | summary sentences          |
//! | `top_news_item`  | one top article, by id     |
//!
//! All entries of one query share the TTL derived from its `date_to`.

use chrono::NaiveDate;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::time::Duration;
use tracing::{info, instrument};

use crate::api::HttpTransport;
use crate::cache::{CacheStore, ResultCache, key_query};
use crate::error::Result;
use crate::fetcher::{ArticleSource, Fetcher};
use crate::models::{Article, RankedArticleIndex, Semimanufactures, TextField, TopNews};
use crate::ranker::{RankerConfig, rank};
use crate::summarizer::Summarizer;
use crate::summary_input::{self, SummaryInputConfig};
use crate::top_news::{cache_top_news_items, cached_top_news_item, top_news};
use crate::words::WordFrequency;

pub const NEWS_COUNT: &str = "news_count";
pub const IMPORTANT_NEWS: &str = "important_news";
pub const SUMMARY_INPUT: &str = "summary_input";
pub const SUMMARY: &str = "summary";

/// Fields the importance ranking is computed over.
pub const IMPORTANT_NEWS_FIELDS: &[TextField] =
    &[TextField::Title, TextField::Description, TextField::Body];
/// Field the summary input is assembled from.
pub const SUMMARY_INPUT_FIELD: TextField = TextField::Description;

/// Composes fetching, ranking, summary-input building and matching behind
/// one [`ResultCache`].
pub struct NewsPipeline<S, C, T, B> {
    fetcher: Fetcher<S>,
    cache: ResultCache<C>,
    summarizer: Summarizer<T>,
    baseline: B,
    ranker: RankerConfig,
    summary_input: SummaryInputConfig,
    rng: StdRng,
}

impl<S, C, T, B> NewsPipeline<S, C, T, B>
where
    S: ArticleSource,
    C: CacheStore,
    T: HttpTransport,
    B: WordFrequency,
{
    pub fn new(
        fetcher: Fetcher<S>,
        cache: ResultCache<C>,
        summarizer: Summarizer<T>,
        baseline: B,
        ranker: RankerConfig,
        summary_input: SummaryInputConfig,
    ) -> Self {
        Self {
            fetcher,
            cache,
            summarizer,
            baseline,
            ranker,
            summary_input,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Replace the random source used for page and article sampling.
    #[cfg(test)]
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    #[cfg(test)]
    pub fn cache(&self) -> &ResultCache<C> {
        &self.cache
    }

    /// Count, summary input and ranked index for a query over a date window.
    ///
    /// The count and the ranked index are fetched and cached together; the
    /// summary input is cached on its own. A zero count short-circuits to an
    /// empty result.
    ///
    /// # Errors
    ///
    /// Validation errors and a failed first page are returned. Cache problems
    /// are not: they only cost a re-fetch.
    #[instrument(level = "info", skip(self))]
    pub async fn get_news_semimanufactures(
        &mut self,
        query: &str,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> Result<Semimanufactures> {
        let ttl = self.cache.calc_ttl(date_to);
        let (count, ranked) = self.count_and_ranked(query, date_from, date_to, ttl).await?;
        if count == 0 {
            info!("No news for query");
            return Ok(Semimanufactures::default());
        }

        let summary_key = key_query(SUMMARY_INPUT, query, date_from, date_to);
        let field = SUMMARY_INPUT_FIELD;
        let config = &self.summary_input;
        let rng = &mut self.rng;
        let summary_input: String = self
            .cache
            .get_or_compute(&summary_key, ttl, || {
                let articles: Vec<Article> = ranked.articles().cloned().collect();
                let text = summary_input::build(&articles, field, config, rng);
                async move { Ok(text) }
            })
            .await?;

        info!(
            count,
            ranked = ranked.len(),
            summary_chars = summary_input.chars().count(),
            "Semimanufactures ready"
        );
        Ok(Semimanufactures {
            count,
            summary_input,
            ranked,
        })
    }

    async fn count_and_ranked(
        &mut self,
        query: &str,
        date_from: NaiveDate,
        date_to: NaiveDate,
        ttl: Duration,
    ) -> Result<(u64, RankedArticleIndex)> {
        let count_key = key_query(NEWS_COUNT, query, date_from, date_to);
        let news_key = key_query(IMPORTANT_NEWS, query, date_from, date_to);

        if self
            .cache
            .all_exist(&[NEWS_COUNT, IMPORTANT_NEWS], query, date_from, date_to)
            .await
        {
            let count = self.cache.get(&count_key).await.and_then(|v| v.as_u64());
            let ranked = self.cache.get_as::<RankedArticleIndex>(&news_key).await;
            if let (Some(count), Some(ranked)) = (count, ranked) {
                info!(count, ranked = ranked.len(), "Using cached news");
                return Ok((count, ranked));
            }
        }

        let (articles, count) = self
            .fetcher
            .get_news(query, date_from, date_to, &mut self.rng)
            .await?;
        let ranked = rank(&articles, IMPORTANT_NEWS_FIELDS, &self.baseline, &self.ranker);
        self.cache.set(&count_key, &count, ttl).await;
        self.cache.set(&news_key, &ranked, ttl).await;
        Ok((count, ranked))
    }

    /// Summary sentences for a query and up to `n_max` articles behind them.
    ///
    /// The summary is cached only when the summarizer answered. Without one,
    /// the top ranked articles are returned with no sentences.
    #[instrument(level = "info", skip(self))]
    pub async fn top_news(
        &mut self,
        query: &str,
        date_from: NaiveDate,
        date_to: NaiveDate,
        n_max: usize,
    ) -> Result<TopNews> {
        let semi = self
            .get_news_semimanufactures(query, date_from, date_to)
            .await?;
        if semi.count == 0 {
            return Ok(TopNews::default());
        }

        let sentences = self
            .summary(query, date_from, date_to, &semi.summary_input)
            .await;
        let articles = top_news(&sentences, &semi.ranked, n_max);
        cache_top_news_items(&self.cache, &articles, date_to).await;
        Ok(TopNews {
            sentences,
            articles,
        })
    }

    async fn summary(
        &self,
        query: &str,
        date_from: NaiveDate,
        date_to: NaiveDate,
        summary_input: &str,
    ) -> Vec<String> {
        if summary_input.is_empty() {
            return Vec::new();
        }
        let key = key_query(SUMMARY, query, date_from, date_to);
        if let Some(sentences) = self.cache.get_as::<Vec<String>>(&key).await {
            return sentences;
        }
        let n_characters = self.summarizer.config().n_characters;
        match self.summarizer.summarize(summary_input, n_characters).await {
            Some(sentences) => {
                self.cache
                    .set(&key, &sentences, self.cache.calc_ttl(date_to))
                    .await;
                sentences
            }
            None => Vec::new(),
        }
    }

    /// A top article cached by an earlier [`top_news`](Self::top_news) call,
    /// with its remaining lifetime.
    pub async fn top_news_item(&self, id: &str) -> Option<(Article, Duration)> {
        cached_top_news_item(&self.cache, id).await
    }
}
