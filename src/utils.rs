//! Utility functions for dates, JSON lookup, string manipulation, and file system operations.
//!
//! This module provides helper functions used throughout the application:
//! - ISO datetime formatting for the start and end of a query window
//! - Tolerant deep lookup into upstream JSON responses
//! - String truncation and slugification for logging and file names
//! - Sentence splitting and excerpting for report output
//! - File system validation for output directories

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};

use crate::error::{NewsError, Result};

/// Format used for datetimes in cache keys and API requests.
pub const ISO_DATETIME: &str = "%Y-%m-%dT%H:%M:%S";

static SENTENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s).+?[.!?…]+\s*").unwrap());

/// Midnight at the start of `date`.
pub fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// The last second of `date`.
pub fn end_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_hms_opt(23, 59, 59)
        .unwrap_or_else(|| start_of_day(date))
}

/// `YYYY-MM-DDT00:00:00` for the first day of a query window.
pub fn date_from_to_str(date: NaiveDate) -> String {
    start_of_day(date).format(ISO_DATETIME).to_string()
}

/// `YYYY-MM-DDT23:59:59` for the last day of a query window.
pub fn date_to_to_str(date: NaiveDate) -> String {
    end_of_day(date).format(ISO_DATETIME).to_string()
}

/// Parse a `YYYY-MM-DD` date, reporting failures as validation errors.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| NewsError::Validation(format!("invalid date {s:?}: {e}")))
}

/// One step of a [`json_value`] path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonKey<'a> {
    Key(&'a str),
    Index(usize),
}

impl<'a> From<&'a str> for JsonKey<'a> {
    fn from(key: &'a str) -> Self {
        JsonKey::Key(key)
    }
}

impl From<usize> for JsonKey<'_> {
    fn from(index: usize) -> Self {
        JsonKey::Index(index)
    }
}

/// Follow `path` into `value`.
///
/// Returns `None` when any key or index along the way is missing, or when the
/// path is empty. Never panics on unexpected shapes, because field layouts
/// differ between providers.
pub fn json_value<'v>(value: &'v Value, path: &[JsonKey<'_>]) -> Option<&'v Value> {
    if path.is_empty() {
        return None;
    }
    path.iter().try_fold(value, |current, key| match key {
        JsonKey::Key(k) => current.as_object()?.get(*k),
        JsonKey::Index(i) => current.as_array()?.get(*i),
    })
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes (backing off to a character
/// boundary) with an ellipsis and byte count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Convert a title to a file-name friendly slug.
///
/// Lowercases the text, removes special characters, and replaces spaces
/// with hyphens.
pub fn slugify_title(title: &str) -> String {
    title
        .to_lowercase()
        .replace(|c: char| !c.is_alphanumeric() && c != ' ' && c != '-', "")
        .replace(' ', "-")
}

/// Split text into sentences ending in `.`, `!`, `?` or `…`.
///
/// A trailing fragment without terminal punctuation is kept as the last
/// sentence.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut consumed = 0;
    for m in SENTENCE.find_iter(text) {
        let s = m.as_str().trim();
        if !s.is_empty() {
            sentences.push(s.to_string());
        }
        consumed = m.end();
    }
    let rest = text[consumed..].trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }
    sentences
}

/// Build an excerpt of at most `max_length` characters from `n_parts` evenly
/// spaced runs of whole sentences, joined with `parts_sep`.
///
/// Short texts (fewer than four sentences) are returned unchanged.
pub fn text_excerpts(text: &str, max_length: usize, n_parts: usize, parts_sep: &str) -> String {
    if text.is_empty() || max_length == 0 {
        return String::new();
    }

    let max_length = max_length.min(text.chars().count());
    let sentences: Vec<&str> = SENTENCE.find_iter(text).map(|m| m.as_str()).collect();
    let n_sentences = sentences.len();
    if n_sentences == 0 {
        return text.to_string();
    }

    let n_parts = n_parts.min(n_sentences / 2);
    if n_parts <= 1 {
        return text.to_string();
    }

    let sep_len = parts_sep.chars().count();
    let budget = max_length.saturating_sub(sep_len * (n_parts - 1));
    let bounds: Vec<usize> = (0..=n_parts)
        .map(|i| (i as f64 * n_sentences as f64 / n_parts as f64).round() as usize)
        .collect();

    let mut result = String::new();
    let mut written = 0usize;
    for part in 0..n_parts {
        let left = budget.saturating_sub(written);
        let part_budget = left / (n_parts - part);
        let mut part_len = 0usize;
        for sentence in &sentences[bounds[part]..bounds[part + 1]] {
            let len = sentence.chars().count();
            if part_len + len > part_budget {
                break;
            }
            result.push_str(sentence);
            part_len += len;
        }
        written += part_len;
        if part < n_parts - 1 {
            result.push_str(parts_sep);
        }
    }
    result
}

/// Ensure a directory exists and is writable.
///
/// This function creates the directory if it doesn't exist, then performs
/// a write test by creating and immediately deleting a marker file.
///
/// # Errors
///
/// Returns an error if:
/// - The directory cannot be created
/// - The directory is not writable (permission denied, read-only filesystem, etc.)
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<()> {
    fs::create_dir_all(path).await?;
    // Try a small sync write using std fs (simpler error surface)
    let marker_path = format!("{}/..__write_check__", path.trim_end_matches('/'));
    stdfs::File::create(&marker_path)?;
    let _ = stdfs::remove_file(&marker_path);
    info!("Output directory is writable");
    Ok(())
}
