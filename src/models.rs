//! Data models for fetched articles and the artifacts derived from them.
//!
//! This module defines the core data structures used throughout the pipeline:
//! - [`Article`]: A single news item as returned by the article-search API
//! - [`TextField`]: Addresses one text field of an article
//! - [`RankedArticleIndex`]: Articles ordered by descending importance
//! - [`NewsPage`]: One page of search results
//! - [`Semimanufactures`]: The count, summary input and ranked index produced per query
//! - [`TopNews`]: Summary sentences and their best-matching articles
//! - [`DigestReport`]: What a run writes out for one query

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A news article as fetched from the article-search API.
///
/// Articles are immutable once fetched. Identity is carried by `id`, which is
/// assigned at fetch time and stays stable for as long as the cached ranked
/// index containing the article lives.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Article {
    /// Unique article identifier.
    pub id: String,
    /// The headline.
    pub title: String,
    /// Short description or lede.
    pub description: String,
    /// The (possibly truncated) article body.
    pub body: String,
    /// Link to the full article.
    pub url: String,
    /// Publication timestamp, when the provider supplied a parseable one.
    pub published_at: Option<DateTime<Utc>>,
}

impl Article {
    /// Return the text of the requested field.
    pub fn field(&self, field: TextField) -> &str {
        match field {
            TextField::Title => &self.title,
            TextField::Description => &self.description,
            TextField::Body => &self.body,
        }
    }

    /// Join the requested fields with single spaces, skipping empty ones.
    pub fn joined_text(&self, fields: &[TextField]) -> String {
        fields
            .iter()
            .map(|f| self.field(*f).trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A text-bearing field of an [`Article`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextField {
    Title,
    Description,
    Body,
}

/// An article together with its normalized importance score.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RankedArticle {
    pub importance: f64,
    pub article: Article,
}

/// Articles ordered by descending importance.
///
/// Each article id appears exactly once. The index serializes as a JSON array
/// so that its order survives a trip through the cache, and reading one back
/// drops repeated ids like [`RankedArticleIndex::from_ordered`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(from = "Vec<RankedArticle>", into = "Vec<RankedArticle>")]
pub struct RankedArticleIndex {
    entries: Vec<RankedArticle>,
}

impl From<Vec<RankedArticle>> for RankedArticleIndex {
    fn from(entries: Vec<RankedArticle>) -> Self {
        Self::from_ordered(entries)
    }
}

impl From<RankedArticleIndex> for Vec<RankedArticle> {
    fn from(index: RankedArticleIndex) -> Self {
        index.entries
    }
}

impl RankedArticleIndex {
    /// Build an index from entries that are already in rank order.
    ///
    /// Later entries whose id was already seen are dropped.
    pub fn from_ordered(entries: Vec<RankedArticle>) -> Self {
        let mut seen = HashSet::new();
        let entries = entries
            .into_iter()
            .filter(|e| seen.insert(e.article.id.clone()))
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RankedArticle> {
        self.entries.iter()
    }

    /// Articles in rank order.
    pub fn articles(&self) -> impl Iterator<Item = &Article> {
        self.entries.iter().map(|e| &e.article)
    }

    /// Look an entry up by article id.
    pub fn get(&self, id: &str) -> Option<&RankedArticle> {
        self.entries.iter().find(|e| e.article.id == id)
    }

    /// The first `n` articles in rank order.
    pub fn top(&self, n: usize) -> Vec<Article> {
        self.articles().take(n).cloned().collect()
    }
}

/// One page of article-search results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewsPage {
    pub articles: Vec<Article>,
    /// Total number of matches reported by the provider for the whole query.
    pub total_count: u64,
}

/// The three artifacts derived once per query and date window.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Semimanufactures {
    /// Total number of matching articles reported by the provider.
    pub count: u64,
    /// Length-capped text for the summarizer.
    pub summary_input: String,
    /// Fetched articles ordered by importance.
    pub ranked: RankedArticleIndex,
}

/// Summary sentences with the articles they were drawn from.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct TopNews {
    /// Summary sentences, empty when the summarizer gave nothing back.
    pub sentences: Vec<String>,
    pub articles: Vec<Article>,
}

/// The result of one run, as written to the JSON and Markdown outputs.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DigestReport {
    pub query: String,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    /// Total number of matching articles reported by the provider.
    pub count: u64,
    pub generated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub top_news: TopNews,
}


#[cfg(test)]
mod tests {
    use super::fixtures::article;
    use super::*;

    #[test]
    fn test_field_access() {
        let a = article("1", "Title", "Desc", "Body");
        assert_eq!(a.field(TextField::Title), "Title");
        assert_eq!(a.field(TextField::Description), "Desc");
        assert_eq!(a.field(TextField::Body), "Body");
    }

    #[test]
    fn test_joined_text_skips_empty_fields() {
        let a = article("1", "Title ", "", " Body");
        assert_eq!(
            a.joined_text(&[TextField::Title, TextField::Description, TextField::Body]),
            "Title Body"
        );
    }

    #[test]
    fn test_index_drops_duplicate_ids() {
        let index = RankedArticleIndex::from_ordered(vec![
            RankedArticle { importance: 2.0, article: article("a", "first", "", "") },
            RankedArticle { importance: 1.0, article: article("b", "second", "", "") },
            RankedArticle { importance: 0.5, article: article("a", "again", "", "") },
        ]);
        assert_eq!(index.len(), 2);
        assert_eq!(index.get("a").map(|e| e.article.title.as_str()), Some("first"));
    }

    #[test]
    fn test_index_serializes_in_order() {
        let index = RankedArticleIndex::from_ordered(vec![
            RankedArticle { importance: 3.0, article: article("z", "", "", "") },
            RankedArticle { importance: 1.0, article: article("a", "", "", "") },
        ]);
        let json = serde_json::to_string(&index).unwrap();
        assert!(json.starts_with('['));
        let back: RankedArticleIndex = serde_json::from_str(&json).unwrap();
        let ids: Vec<_> = back.articles().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "a"]);
    }

    #[test]
    fn test_index_deserialize_drops_duplicate_ids() {
        let json = serde_json::to_string(&vec![
            RankedArticle { importance: 2.0, article: article("a", "first", "", "") },
            RankedArticle { importance: 1.0, article: article("b", "second", "", "") },
            RankedArticle { importance: 0.5, article: article("a", "again", "", "") },
        ])
        .unwrap();
        let index: RankedArticleIndex = serde_json::from_str(&json).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.get("a").map(|e| e.article.title.as_str()), Some("first"));
        let ids: Vec<_> = index.articles().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_top_takes_prefix() {
        let index = RankedArticleIndex::from_ordered(
            (0..5)
                .map(|i| RankedArticle {
                    importance: 5.0 - i as f64,
                    article: article(&i.to_string(), "", "", ""),
                })
                .collect(),
        );
        let top: Vec<_> = index.top(3).into_iter().map(|a| a.id).collect();
        assert_eq!(top, vec!["0", "1", "2"]);
        assert_eq!(index.top(10).len(), 5);
    }
}
