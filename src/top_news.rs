//! Picking the articles behind a summary, and caching them for later lookup.

use chrono::NaiveDate;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::cache::{CacheStore, ResultCache, key};
use crate::models::{Article, RankedArticleIndex, TextField};
use crate::tf_idf::most_similar_articles;

/// Fields compared against summary sentences.
pub const TOP_NEWS_FIELDS: &[TextField] = &[TextField::Title, TextField::Body];

const TOP_NEWS_ITEM_PREFIX: &str = "top_news_item";

/// Up to `n_max` articles best matching `sentences`, in sentence order.
///
/// Falls back to the head of the ranked index when there are no sentences
/// or none of them matches an article.
#[instrument(level = "info", skip_all, fields(sentences = sentences.len(), ranked = ranked.len(), n_max = n_max))]
pub fn top_news(sentences: &[String], ranked: &RankedArticleIndex, n_max: usize) -> Vec<Article> {
    if sentences.is_empty() {
        info!("No summary sentences; using top ranked articles");
        return ranked.top(n_max);
    }

    let texts: Vec<(&str, String)> = ranked
        .articles()
        .map(|a| (a.id.as_str(), a.joined_text(TOP_NEWS_FIELDS)))
        .collect();
    let matches = most_similar_articles(sentences, texts.iter().map(|(id, t)| (*id, t.as_str())));
    if matches.is_empty() {
        info!("No sentence matched an article; using top ranked articles");
        return ranked.top(n_max);
    }

    let articles: Vec<Article> = matches
        .iter()
        .filter_map(|m| ranked.get(&m.article_id))
        .map(|e| e.article.clone())
        .take(n_max)
        .collect();
    debug!(matched = articles.len(), "Matched summary sentences to articles");
    articles
}

fn item_key(id: &str) -> String {
    key(&[TOP_NEWS_ITEM_PREFIX, id])
}

/// Cache each article under `top_news_item:{id}` unless already present.
///
/// Items live as long as the query window ending on `date_to` warrants.
pub async fn cache_top_news_items<S: CacheStore>(
    cache: &ResultCache<S>,
    items: &[Article],
    date_to: NaiveDate,
) {
    let ttl = cache.calc_ttl(date_to);
    for item in items {
        let key = item_key(&item.id);
        if !cache.exists(&key).await {
            cache.set(&key, item, ttl).await;
        }
    }
}

/// A cached top-news article and its remaining lifetime.
pub async fn cached_top_news_item<S: CacheStore>(
    cache: &ResultCache<S>,
    id: &str,
) -> Option<(Article, Duration)> {
    let key = item_key(id);
    let item = cache.get_as::<Article>(&key).await?;
    let ttl = cache.get_ttl(&key).await.unwrap_or(Duration::ZERO);
    Some((item, ttl))
}
