//! Statistical importance ranking of articles.
//!
//! A word is important when it is much more frequent in the fetched corpus
//! than in general language. Each article is scored by the average weight of
//! its tokens over the most important words, so long articles gain nothing
//! from length alone.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, instrument};

use crate::models::{Article, RankedArticle, RankedArticleIndex, TextField};
use crate::words::{WordFrequency, words};

/// Weight given to corpus words missing from the baseline list.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnknownWordPolicy {
    /// `max(highest known importance, 1) * factor`.
    Derived { factor: f64 },
    /// The same non-negative weight for every unknown word.
    Fixed { weight: f64 },
    /// Unknown words carry no weight.
    Ignore,
}

impl Default for UnknownWordPolicy {
    fn default() -> Self {
        UnknownWordPolicy::Derived { factor: 0.9 }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RankerConfig {
    /// Share of distinct corpus words kept as important, in percent.
    pub words_percent: u32,
    pub unknown_word_policy: UnknownWordPolicy,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            words_percent: 25,
            unknown_word_policy: UnknownWordPolicy::default(),
        }
    }
}

/// The most important words of one corpus snapshot and their weights.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportantWordTable {
    weights: HashMap<String, f64>,
}

impl ImportantWordTable {
    /// Build the table from all tokens of a corpus.
    pub fn build<B: WordFrequency>(tokens: &[String], baseline: &B, config: &RankerConfig) -> Self {
        if tokens.is_empty() {
            return Self::default();
        }

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for token in tokens {
            *counts.entry(token.as_str()).or_default() += 1;
        }
        let n_tokens = tokens.len() as f64;

        let mut known = Vec::new();
        let mut unknown = Vec::new();
        for (word, count) in counts {
            let local = count as f64 / n_tokens;
            match baseline.frequency(word) {
                Some(usual) if usual > 0.0 => known.push((word, local / usual)),
                _ => unknown.push(word),
            }
        }

        let unknown_weight = match config.unknown_word_policy {
            UnknownWordPolicy::Derived { factor } => {
                let max_known = known.iter().map(|(_, w)| *w).fold(0.0, f64::max);
                Some(max_known.max(1.0) * factor.max(0.0))
            }
            UnknownWordPolicy::Fixed { weight } => Some(weight.max(0.0)),
            UnknownWordPolicy::Ignore => None,
        };
        let mut weighted = known;
        if let Some(w) = unknown_weight {
            weighted.extend(unknown.into_iter().map(|word| (word, w)));
        }

        weighted.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        let keep = (weighted.len() * config.words_percent.min(100) as usize / 100).max(1);
        let weights = weighted
            .into_iter()
            .take(keep)
            .map(|(word, w)| (word.to_string(), w))
            .collect();
        Self { weights }
    }

    pub fn weight(&self, word: &str) -> Option<f64> {
        self.weights.get(word).copied()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn max_weight(&self) -> f64 {
        self.weights.values().copied().fold(0.0, f64::max)
    }

    /// Average weight over `tokens`; 0 for an empty token list.
    pub fn score(&self, tokens: &[String]) -> f64 {
        if tokens.is_empty() {
            return 0.0;
        }
        let total: f64 = tokens.iter().filter_map(|t| self.weight(t)).sum();
        total / tokens.len() as f64
    }
}

/// Rank `articles` by the importance of their `fields`.
///
/// Equal scores keep their input order.
#[instrument(level = "info", skip_all, fields(articles = articles.len(), fields = ?fields))]
pub fn rank<B: WordFrequency>(
    articles: &[Article],
    fields: &[TextField],
    baseline: &B,
    config: &RankerConfig,
) -> RankedArticleIndex {
    let tokens: Vec<Vec<String>> = articles
        .iter()
        .map(|a| words(&a.joined_text(fields)))
        .collect();
    let corpus: Vec<String> = tokens.iter().flatten().cloned().collect();
    let table = ImportantWordTable::build(&corpus, baseline, config);
    debug!(
        corpus_words = corpus.len(),
        important_words = table.len(),
        max_weight = table.max_weight(),
        "Built important word table"
    );

    let mut ranked: Vec<RankedArticle> = articles
        .iter()
        .zip(&tokens)
        .map(|(article, tokens)| RankedArticle {
            importance: table.score(tokens),
            article: article.clone(),
        })
        .collect();
    ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));

    let index = RankedArticleIndex::from_ordered(ranked);
    info!(ranked = index.len(), "Ranked articles");
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::article;

    const ALL: &[TextField] = &[TextField::Title, TextField::Description, TextField::Body];

    fn baseline() -> HashMap<String, f64> {
        [("the", 0.05), ("a", 0.02), ("is", 0.01), ("river", 0.0001), ("news", 0.001)]
            .into_iter()
            .map(|(w, f)| (w.to_string(), f))
            .collect()
    }

    fn toks(text: &str) -> Vec<String> {
        words(text)
    }

    #[test]
    fn test_table_keeps_top_share() {
        let corpus = toks("the river the river salmon is a news");
        let config = RankerConfig { words_percent: 50, ..RankerConfig::default() };
        let table = ImportantWordTable::build(&corpus, &baseline(), &config);
        // 6 distinct words, half kept
        assert_eq!(table.len(), 3);
        assert!(table.weight("river").is_some());
        assert!(table.weight("salmon").is_some());
        assert!(table.weight("the").is_none());
    }

    #[test]
    fn test_table_keeps_at_least_one_word() {
        let table = ImportantWordTable::build(&toks("river"), &baseline(), &RankerConfig::default());
        assert_eq!(table.len(), 1);
        assert!(ImportantWordTable::build(&[], &baseline(), &RankerConfig::default()).is_empty());
    }

    #[test]
    fn test_unknown_word_policies() {
        let corpus = toks("river salmon");
        let build = |policy| {
            let config = RankerConfig { words_percent: 100, unknown_word_policy: policy };
            ImportantWordTable::build(&corpus, &baseline(), &config)
        };
        // river: 0.5 / 0.0001 = 5000
        let derived = build(UnknownWordPolicy::Derived { factor: 0.9 });
        assert!((derived.weight("salmon").unwrap() - 4500.0).abs() < 1e-6);
        let fixed = build(UnknownWordPolicy::Fixed { weight: 2.0 });
        assert_eq!(fixed.weight("salmon"), Some(2.0));
        let ignore = build(UnknownWordPolicy::Ignore);
        assert_eq!(ignore.weight("salmon"), None);
        assert_eq!(ignore.len(), 1);
    }

    #[test]
    fn test_derived_weight_floor_is_one() {
        // "the" is far rarer here than in general language
        let corpus = toks(&format!("the {}", "salmon ".repeat(24)));
        let config = RankerConfig { words_percent: 100, ..RankerConfig::default() };
        let table = ImportantWordTable::build(&corpus, &baseline(), &config);
        assert!((table.weight("salmon").unwrap() - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_ties_broken_alphabetically() {
        let corpus = toks("delta alpha charlie bravo");
        let config = RankerConfig {
            words_percent: 50,
            unknown_word_policy: UnknownWordPolicy::Fixed { weight: 1.0 },
        };
        let table = ImportantWordTable::build(&corpus, &baseline(), &config);
        assert!(table.weight("alpha").is_some());
        assert!(table.weight("bravo").is_some());
        assert!(table.weight("charlie").is_none());
    }

    #[test]
    fn test_score_is_normalized_by_length() {
        let corpus = toks("river salmon news");
        let config = RankerConfig { words_percent: 100, ..RankerConfig::default() };
        let table = ImportantWordTable::build(&corpus, &baseline(), &config);

        let once = toks("the river and the salmon");
        let twice = toks("the river and the salmon the river and the salmon");
        assert!((table.score(&once) - table.score(&twice)).abs() < 1e-9);
        assert!(table.score(&once) <= table.max_weight());
        assert_eq!(table.score(&[]), 0.0);
    }

    #[test]
    fn test_rank_orders_by_importance() {
        let articles = vec![
            article("plain", "The news", "is the news", ""),
            article("rivers", "River salmon", "River salmon return", "The river is full"),
            article("empty", "", "", ""),
        ];
        let index = rank(&articles, ALL, &baseline(), &RankerConfig::default());
        let ids: Vec<_> = index.articles().map(|a| a.id.as_str()).collect();
        assert_eq!(ids[0], "rivers");
        assert_eq!(index.len(), 3);
        assert!(index.iter().all(|e| e.importance >= 0.0));
        assert_eq!(index.get("empty").unwrap().importance, 0.0);
    }

    #[test]
    fn test_rank_is_stable_and_deterministic() {
        let articles: Vec<_> = (0..6)
            .map(|i| article(&i.to_string(), "River salmon", "", ""))
            .collect();
        let first = rank(&articles, ALL, &baseline(), &RankerConfig::default());
        let second = rank(&articles, ALL, &baseline(), &RankerConfig::default());
        assert_eq!(first, second);
        let ids: Vec<_> = first.articles().map(|a| a.id.clone()).collect();
        assert_eq!(ids, vec!["0", "1", "2", "3", "4", "5"]);
    }

    #[test]
    fn test_rank_respects_fields() {
        let articles = vec![
            article("a", "the", "river salmon", ""),
            article("b", "river salmon", "the", ""),
        ];
        let index = rank(&articles, &[TextField::Title], &baseline(), &RankerConfig::default());
        assert_eq!(index.top(1)[0].id, "b");
    }

    #[test]
    fn test_english_baseline_prefers_topical_words() {
        let articles = vec![
            article(
                "filler",
                "Around the area",
                "Almost anyone across the area already knew",
                "Among other things, anything along the way, although away",
            ),
            article(
                "rates",
                "Central bank raises interest rates",
                "The central bank raised interest rates again to fight inflation",
                "Inflation stayed high, so the central bank lifted interest rates and warned that inflation could persist",
            ),
            article(
                "mortgage",
                "Inflation pressures mortgage rates",
                "Rising interest rates and stubborn inflation squeeze mortgage borrowers",
                "Mortgage rates follow central bank rates higher as inflation lingers",
            ),
        ];
        let english = crate::words::english().unwrap();
        let index = rank(&articles, ALL, &english, &RankerConfig::default());

        let ids: Vec<_> = index.articles().map(|a| a.id.as_str()).collect();
        assert_eq!(ids.last(), Some(&"filler"));
        let importance = |id: &str| index.get(id).unwrap().importance;
        assert!(importance("rates") > importance("filler"));
        assert!(importance("mortgage") > importance("filler"));

        let corpus: Vec<String> = articles.iter().flat_map(|a| words(&a.joined_text(ALL))).collect();
        let table = ImportantWordTable::build(&corpus, &english, &RankerConfig::default());
        assert!(table.weight("inflation").is_some());
        assert!(table.weight("across").is_none());
        assert!(table.weight("the").is_none());
    }
}
