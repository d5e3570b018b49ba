//! TF-IDF alignment of summary sentences with source articles.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::words::words;

/// Per-article TF-IDF weights, built for one matching call.
#[derive(Debug, Clone, Default)]
pub struct SimilarityIndex {
    ids: Vec<String>,
    weights: Vec<HashMap<String, f64>>,
}

impl SimilarityIndex {
    /// Build the index over `(article_id, text)` pairs.
    ///
    /// `tf = count / article_words`, `idf = ln(N / articles_containing_term)`.
    pub fn build<'a, I>(texts: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut ids = Vec::new();
        let mut counts: Vec<HashMap<String, usize>> = Vec::new();
        let mut lengths = Vec::new();
        let mut doc_freq: HashMap<String, usize> = HashMap::new();

        for (id, text) in texts {
            let tokens = words(text);
            let mut c: HashMap<String, usize> = HashMap::new();
            for token in &tokens {
                *c.entry(token.clone()).or_default() += 1;
            }
            for term in c.keys() {
                *doc_freq.entry(term.clone()).or_default() += 1;
            }
            ids.push(id.to_string());
            lengths.push(tokens.len());
            counts.push(c);
        }

        let n_docs = ids.len() as f64;
        let weights = counts
            .into_iter()
            .zip(lengths)
            .map(|(c, len)| {
                c.into_iter()
                    .map(|(term, count)| {
                        let tf = count as f64 / len as f64;
                        let idf = (n_docs / doc_freq[&term] as f64).ln();
                        (term, tf * idf)
                    })
                    .collect()
            })
            .collect();

        Self { ids, weights }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn id(&self, doc: usize) -> &str {
        &self.ids[doc]
    }

    /// Sum of the article's weights over terms it shares with the sentence.
    pub fn similarity(&self, doc: usize, sentence_terms: &HashSet<String>) -> f64 {
        let weights = &self.weights[doc];
        sentence_terms
            .iter()
            .filter_map(|t| weights.get(t))
            .sum()
    }
}

/// One summary sentence and the article it was attributed to.
#[derive(Debug, Clone, PartialEq)]
pub struct SentenceMatch {
    pub sentence: String,
    pub article_id: String,
    pub similarity: f64,
}

/// Attribute each sentence, in order, to the most similar article that no
/// earlier sentence has claimed.
///
/// Ties go to the earlier article. A sentence sharing no weighted term with
/// any unclaimed article stays unmatched, so every article is used at most
/// once.
pub fn most_similar_articles<'a, I>(sentences: &[String], texts: I) -> Vec<SentenceMatch>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let index = SimilarityIndex::build(texts);
    if index.is_empty() {
        return Vec::new();
    }
    let mut claimed = vec![false; index.len()];
    let mut matches = Vec::new();

    for sentence in sentences {
        let terms: HashSet<String> = words(sentence).into_iter().collect();
        let mut best: Option<(usize, f64)> = None;
        for doc in (0..index.len()).filter(|d| !claimed[*d]) {
            let sim = index.similarity(doc, &terms);
            if sim > best.map_or(0.0, |(_, s)| s) {
                best = Some((doc, sim));
            }
        }
        match best {
            Some((doc, similarity)) => {
                claimed[doc] = true;
                matches.push(SentenceMatch {
                    sentence: sentence.clone(),
                    article_id: index.id(doc).to_string(),
                    similarity,
                });
            }
            None => debug!(sentence = %sentence, "No article matches sentence"),
        }
    }
    matches
}
