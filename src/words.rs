//! Tokenization and general-language word frequencies.
//!
//! The default English baseline is the `wordfreq` large English model. A
//! `word<TAB>frequency` list can replace it.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, instrument};
use wordfreq::WordFreq;
use wordfreq_model::{ModelKind, load_wordfreq};

use crate::error::{NewsError, Result};

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").unwrap());

/// Lowercase `\w+` tokens of `text`.
pub fn words(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    let lower = text.to_lowercase();
    WORD.find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Baseline usage frequency of words in general language.
pub trait WordFrequency {
    /// Share of running text taken by `word`, or `None` if the word is unknown.
    fn frequency(&self, word: &str) -> Option<f64>;
}

/// Word frequencies read from a `word<TAB>frequency` list.
#[derive(Debug, Clone, Default)]
pub struct FrequencyTable {
    frequencies: HashMap<String, f64>,
}

impl FrequencyTable {
    /// Load a list from disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&raw)
    }

    /// Parse a list. Blank lines and `#` comments are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`NewsError::InvalidConfig`] on a malformed line or a
    /// non-positive frequency.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut frequencies = HashMap::new();
        for (n, line) in content_lines(raw) {
            let (word, freq) = parse_line(line)
                .ok_or_else(|| NewsError::InvalidConfig(format!("bad frequency line {n}: {line:?}")))?;
            frequencies.insert(word, freq);
        }
        Ok(Self { frequencies })
    }

}

fn content_lines(raw: &str) -> impl Iterator<Item = (usize, &str)> {
    raw.lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty() && !l.starts_with('#'))
}

fn parse_line(line: &str) -> Option<(String, f64)> {
    let (word, freq) = line.split_once('\t')?;
    let freq: f64 = freq.trim().parse().ok()?;
    (freq.is_finite() && freq > 0.0).then(|| (word.trim().to_lowercase(), freq))
}

impl WordFrequency for FrequencyTable {
    fn frequency(&self, word: &str) -> Option<f64> {
        self.frequencies.get(word).copied()
    }
}

/// The `wordfreq` large English model.
///
/// # Errors
///
/// Returns [`NewsError::InvalidConfig`] if the bundled model cannot be decoded.
#[instrument(level = "info")]
pub fn english() -> Result<WordFreq> {
    let model = load_wordfreq(ModelKind::LargeEn)
        .map_err(|e| NewsError::InvalidConfig(format!("cannot load English word frequencies: {e}")))?;
    info!("Loaded English word frequencies");
    Ok(model)
}

impl WordFrequency for WordFreq {
    fn frequency(&self, word: &str) -> Option<f64> {
        let freq = f64::from(self.word_frequency(word));
        (freq > 0.0).then_some(freq)
    }
}

/// Baseline chosen at startup: the English model or a list from disk.
pub enum Baseline {
    English(WordFreq),
    Table(FrequencyTable),
}

impl Baseline {
    /// The list at `path` when given, the English model otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Ok(Baseline::Table(FrequencyTable::from_path(path)?)),
            None => Ok(Baseline::English(english()?)),
        }
    }
}

impl WordFrequency for Baseline {
    fn frequency(&self, word: &str) -> Option<f64> {
        match self {
            Baseline::English(model) => model.frequency(word),
            Baseline::Table(table) => table.frequency(word),
        }
    }
}

impl WordFrequency for HashMap<String, f64> {
    fn frequency(&self, word: &str) -> Option<f64> {
        self.get(word).copied().filter(|f| *f > 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_words() {
        assert_eq!(words("Hello, World! It's 2024."), vec!["hello", "world", "it", "s", "2024"]);
        assert!(words("   ").is_empty());
        assert!(words("...").is_empty());
        assert_eq!(words("Über café"), vec!["über", "café"]);
    }

    #[test]
    fn test_english_model() {
        let english = english().unwrap();
        let the = english.frequency("the").unwrap();
        let climate = english.frequency("climate").unwrap();
        let aardvark = english.frequency("aardvark").unwrap();
        assert!(the > climate);
        assert!(climate > aardvark);
        assert_eq!(english.frequency("qzxqzxqzx"), None);
    }

    #[test]
    fn test_baseline_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("freq.tsv");
        std::fs::write(&path, "river\t0.0001\n").unwrap();
        let table = Baseline::load(Some(path.as_path())).unwrap();
        assert_eq!(table.frequency("river"), Some(0.0001));
        assert_eq!(table.frequency("the"), None);

        let english = Baseline::load(None).unwrap();
        assert!(english.frequency("the").is_some());
    }

    #[test]
    fn test_parse_rejects_bad_lines() {
        let table = FrequencyTable::parse("# comment\n\nfoo\t0.5\nBar\t1e-3\n").unwrap();
        assert_eq!(table.frequency("foo"), Some(0.5));
        assert_eq!(table.frequency("bar"), Some(0.001));

        assert!(FrequencyTable::parse("foo 0.5").is_err());
        assert!(FrequencyTable::parse("foo\t0").is_err());
        assert!(FrequencyTable::parse("foo\tabc").is_err());
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("freq.tsv");
        std::fs::write(&path, "river\t0.0001\n").unwrap();
        let table = FrequencyTable::from_path(&path).unwrap();
        assert_eq!(table.frequency("river"), Some(0.0001));
        assert!(FrequencyTable::from_path(dir.path().join("missing.tsv")).is_err());
    }
}
