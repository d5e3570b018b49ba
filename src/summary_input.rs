//! Length-bounded text assembled from many articles for the summarizer.
//!
//! Near-identical articles are dropped first. The number of articles used is
//! derived from their average length so that the joined text stays close to
//! the summarizer's input limit, and the selection is spread over the whole
//! ranked list rather than its head.

use itertools::Itertools;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::models::{Article, TextField};

const ITEM_SEP: &str = "\n\n";
const TRIM_CHARS: &[char] = &[
    ' ', '\n', '\r', '\t', '[', ']', '(', ')', ':', ';', ',', '{', '}', '|', '"', '\'', '“', '”',
];
const SENTENCE_ENDS: &[char] = &['.', '!', '?', '…'];

static NON_WORD_OR_DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\W\d]+").unwrap());
static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").unwrap());

/// How articles are picked once the target count is known.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Selection {
    /// One random article from each of `target` equal contiguous chunks.
    #[default]
    Stratified,
    /// Articles in order, skipping any whose text exceeds `per_item_cap` chars.
    Prefix { per_item_cap: usize },
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SummaryInputConfig {
    /// Hard upper bound on the output length in characters.
    pub max_chars: usize,
    /// Below this many articles all of them are used.
    pub min_count: usize,
    pub selection: Selection,
}

impl Default for SummaryInputConfig {
    fn default() -> Self {
        Self {
            max_chars: 50_000,
            min_count: 50,
            selection: Selection::default(),
        }
    }
}

/// Dedup key: letters only, lowercased.
pub fn normalize(text: &str) -> String {
    NON_WORD_OR_DIGIT.replace_all(text, "").to_lowercase()
}

/// Drop articles whose normalized `field` text was already seen.
pub fn unique_articles(articles: &[Article], field: TextField) -> Vec<&Article> {
    articles
        .iter()
        .unique_by(|a| normalize(a.field(field)))
        .collect()
}

/// Trim bracket and punctuation debris, collapse spaces and end every line
/// with sentence punctuation.
pub fn clean_text(text: &str) -> String {
    text.trim_matches(TRIM_CHARS)
        .lines()
        .map(|line| {
            let line = SPACES.replace_all(line, " ");
            let line = line.trim_end();
            if line.is_empty() || line.ends_with(SENTENCE_ENDS) {
                line.to_string()
            } else {
                format!("{line}.")
            }
        })
        .join("\n")
}

/// Number of articles to draw so that their text roughly fills `max_chars`.
pub fn target_count(n_articles: usize, average_len: usize, config: &SummaryInputConfig) -> usize {
    if n_articles < config.min_count || average_len == 0 {
        return n_articles;
    }
    let target = (config.max_chars as f64 / average_len as f64).round() as usize;
    target.max(config.min_count).min(n_articles)
}

/// Pick one index uniformly from each of `n_chunks` contiguous chunks of `0..len`.
pub fn stratified_indices<R: Rng>(len: usize, n_chunks: usize, rng: &mut R) -> Vec<usize> {
    if len == 0 || n_chunks == 0 {
        return Vec::new();
    }
    let chunk_size = len as f64 / n_chunks as f64;
    (0..n_chunks)
        .map(|i| {
            let start = (i as f64 * chunk_size).round() as usize;
            let end = (((i + 1) as f64 * chunk_size).round() as usize).saturating_sub(1);
            rng.random_range(start..=end.max(start))
        })
        .collect()
}

/// Build the summarizer input from `articles` (in rank order) over `field`.
///
/// The result never exceeds `config.max_chars` characters.
#[instrument(level = "info", skip(articles, config, rng), fields(articles = articles.len()))]
pub fn build<R: Rng>(
    articles: &[Article],
    field: TextField,
    config: &SummaryInputConfig,
    rng: &mut R,
) -> String {
    let unique = unique_articles(articles, field);
    if unique.is_empty() {
        return String::new();
    }

    let total_len: usize = unique.iter().map(|a| a.field(field).chars().count()).sum();
    let average_len = (total_len as f64 / unique.len() as f64).round() as usize;
    if average_len == 0 {
        info!("Articles carry no text for the summary");
        return String::new();
    }

    let texts: Vec<String> = match config.selection {
        Selection::Stratified => {
            let target = target_count(unique.len(), average_len, config);
            debug!(unique = unique.len(), average_len, target, "Drawing articles");
            stratified_indices(unique.len(), target, rng)
                .into_iter()
                .map(|i| clean_text(unique[i].field(field)))
                .collect()
        }
        Selection::Prefix { per_item_cap } => unique
            .iter()
            .map(|a| clean_text(a.field(field)))
            .filter(|t| t.chars().count() <= per_item_cap)
            .collect(),
    };

    let stop_at_overflow = matches!(config.selection, Selection::Prefix { .. });
    let text = join_within(texts, config.max_chars, stop_at_overflow);
    info!(chars = text.chars().count(), "Built summary input");
    text
}

/// Join non-empty texts with [`ITEM_SEP`] without exceeding `max_chars`.
///
/// A text that does not fit is skipped, or ends the walk when `stop_at_overflow`.
fn join_within(texts: Vec<String>, max_chars: usize, stop_at_overflow: bool) -> String {
    let sep_len = ITEM_SEP.chars().count();
    let mut out = String::new();
    let mut len = 0usize;
    for text in texts.into_iter().filter(|t| !t.is_empty()) {
        let text_len = text.chars().count();
        let extra = if out.is_empty() { text_len } else { text_len + sep_len };
        if len + extra > max_chars {
            if stop_at_overflow {
                break;
            }
            continue;
        }
        if !out.is_empty() {
            out.push_str(ITEM_SEP);
        }
        out.push_str(&text);
        len += extra;
    }
    out
}
