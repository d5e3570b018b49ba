//! Client for the text-analysis summarization API.
//!
//! Requests go through the shared [`QueryScheduler`]. The service is asked for
//! a share of the input length, so the requested character count is turned
//! into a percentage first.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::api::{ApiQuery, HttpTransport};
use crate::error::Result;
use crate::fetcher::secs_f64;
use crate::scheduler::QueryScheduler;
use crate::utils::{JsonKey, json_value, split_sentences};

const JSON_SENTENCES_PATH: &[JsonKey<'static>] = &[JsonKey::Key("sentences")];
const JSON_SUMMARY_PATH: &[JsonKey<'static>] = &[JsonKey::Key("summary")];

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SummarizerConfig {
    pub url: String,
    pub host: String,
    /// Usually supplied through `RAPID_API_KEY` rather than the config file.
    #[serde(skip_serializing)]
    pub api_key: String,
    pub language: String,
    /// Target summary length in characters.
    pub n_characters: usize,
    #[serde(with = "secs_f64")]
    pub min_request_interval: Duration,
    #[serde(with = "secs_f64")]
    pub timeout: Duration,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            url: "https://text-analysis12.p.rapidapi.com/summarize-text/api/v1.1".to_string(),
            host: "text-analysis12.p.rapidapi.com".to_string(),
            api_key: String::new(),
            language: "english".to_string(),
            n_characters: 500,
            min_request_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Share of `text_len` that `n_characters` represents, in percent.
///
/// Rounded to three decimals and clamped to `[0, 100]`.
pub fn summary_percent(n_characters: usize, text_len: usize) -> f64 {
    if text_len == 0 {
        return 100.0;
    }
    let percent = n_characters as f64 / text_len as f64 * 100.0;
    ((percent * 1000.0).round() / 1000.0).clamp(0.0, 100.0)
}

/// Read summary sentences from a response: a `sentences` array, or a
/// `summary` string split into sentences.
pub fn parse_sentences(response: &Value) -> Option<Vec<String>> {
    if let Some(items) = json_value(response, JSON_SENTENCES_PATH).and_then(Value::as_array) {
        let sentences: Vec<String> = items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        return Some(sentences);
    }
    json_value(response, JSON_SUMMARY_PATH)
        .and_then(Value::as_str)
        .map(split_sentences)
}

/// Summarization client sharing a scheduler with other callers of the same key.
pub struct Summarizer<T> {
    scheduler: Arc<QueryScheduler<T>>,
    config: SummarizerConfig,
}

impl<T> Summarizer<T>
where
    T: HttpTransport,
{
    pub fn new(scheduler: Arc<QueryScheduler<T>>, config: SummarizerConfig) -> Self {
        Self { scheduler, config }
    }

    pub fn config(&self) -> &SummarizerConfig {
        &self.config
    }

    fn build_query(&self, text: &str, percent: f64) -> Result<ApiQuery> {
        let headers = vec![
            ("content-type".to_string(), "application/json".to_string()),
            ("X-RapidAPI-Key".to_string(), self.config.api_key.clone()),
            ("X-RapidAPI-Host".to_string(), self.config.host.clone()),
        ];
        let body = json!({
            "language": self.config.language,
            "summary_percent": percent,
            "text": text,
        });
        ApiQuery::new(
            "POST",
            &self.config.url,
            headers,
            body,
            self.config.min_request_interval,
            self.config.timeout,
        )
    }

    /// Summarize `text` to about `n_characters` characters.
    ///
    /// Text that is already short enough comes back unchanged as a single
    /// sentence, without a request. Failures are logged and yield `None`.
    #[instrument(level = "info", skip(self, text), fields(text_len = text.chars().count()))]
    pub async fn summarize(&self, text: &str, n_characters: usize) -> Option<Vec<String>> {
        let text_len = text.chars().count();
        if text_len <= n_characters {
            return Some(vec![text.to_string()]);
        }

        let percent = summary_percent(n_characters, text_len);
        let query = match self.build_query(text, percent) {
            Ok(q) => q,
            Err(e) => {
                warn!(error = %e, "Cannot build summary request");
                return None;
            }
        };
        let response = self.scheduler.try_execute(&query).await?;
        let sentences = parse_sentences(&response);
        match &sentences {
            Some(s) => info!(sentences = s.len(), percent, "Got summary"),
            None => warn!("Summary response has no sentences"),
        }
        sentences
    }
}
