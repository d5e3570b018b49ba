//! newsapi.org article source.
//!
//! Pages are requested through the shared [`QueryScheduler`] so that the
//! per-key rate limit holds across all concurrent users. Responses are read
//! with tolerant lookups: a missing field yields an empty string rather than
//! a failed page.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::api::{ApiQuery, HttpTransport};
use crate::error::{NewsError, Result};
use crate::fetcher::{ArticleSource, PageRequest, secs_f64};
use crate::models::{Article, NewsPage};
use crate::scheduler::QueryScheduler;
use crate::utils::{JsonKey, date_from_to_str, date_to_to_str, json_value};

const JSON_NEWS_PATH: &[JsonKey<'static>] = &[JsonKey::Key("articles")];
const JSON_TOTAL_COUNT_PATH: &[JsonKey<'static>] = &[JsonKey::Key("totalResults")];

static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").unwrap());
static TRUNCATION_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\[\+\d+ chars\]\s*$").unwrap());

/// Connection settings for the newsapi.org `everything` endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NewsApiConfig {
    pub base_url: String,
    /// Usually supplied through `NEWS_API_KEY` rather than the config file.
    #[serde(skip_serializing)]
    pub api_key: String,
    pub language: String,
    pub sort_by: String,
    #[serde(with = "secs_f64")]
    pub min_request_interval: Duration,
    #[serde(with = "secs_f64")]
    pub timeout: Duration,
}

impl Default for NewsApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://newsapi.org/v2/everything".to_string(),
            api_key: String::new(),
            language: "en".to_string(),
            sort_by: "relevancy".to_string(),
            min_request_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(60),
        }
    }
}

/// [`ArticleSource`] backed by newsapi.org.
#[derive(Debug)]
pub struct NewsApiSource<T> {
    scheduler: Arc<QueryScheduler<T>>,
    config: NewsApiConfig,
}

impl<T> NewsApiSource<T>
where
    T: HttpTransport,
{
    pub fn new(scheduler: Arc<QueryScheduler<T>>, config: NewsApiConfig) -> Self {
        Self { scheduler, config }
    }

    fn build_query(&self, request: &PageRequest<'_>) -> Result<ApiQuery> {
        let params = json!({
            "apiKey": self.config.api_key,
            "q": request.query,
            "language": self.config.language,
            "from": date_from_to_str(request.date_from),
            "to": date_to_to_str(request.date_to),
            "sortBy": self.config.sort_by,
            "page": request.page,
            "pageSize": request.page_size,
        });
        ApiQuery::new(
            "GET",
            &self.config.base_url,
            Vec::new(),
            params,
            self.config.min_request_interval,
            self.config.timeout,
        )
    }
}

impl<T> ArticleSource for NewsApiSource<T>
where
    T: HttpTransport,
{
    #[instrument(level = "info", skip_all, fields(query = %request.query, page = request.page))]
    async fn fetch_page(&self, request: &PageRequest<'_>) -> Result<NewsPage> {
        request.validate()?;
        let query = self.build_query(request)?;
        let response = self.scheduler.execute(&query).await?;

        let status = json_value(&response, &["status".into()]).and_then(Value::as_str);
        if status != Some("ok") {
            let message = json_value(&response, &["message".into()])
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(NewsError::RequestFailed(format!(
                "request {} from {} to {} failed: {}, {}",
                request.query,
                date_from_to_str(request.date_from),
                date_to_to_str(request.date_to),
                status.unwrap_or("no status"),
                message
            )));
        }

        let page = parse_page(&response)?;
        debug!(count = page.articles.len(), total = page.total_count, "Parsed page");
        Ok(page)
    }
}

/// Read the articles and total count out of a newsapi.org response.
///
/// # Errors
///
/// Returns [`NewsError::ParseError`] when the total count is missing, since a
/// page without it cannot be planned around.
pub fn parse_page(response: &Value) -> Result<NewsPage> {
    let total_count = json_value(response, JSON_TOTAL_COUNT_PATH)
        .and_then(Value::as_u64)
        .ok_or_else(|| NewsError::ParseError("missing totalResults".to_string()))?;

    let articles = json_value(response, JSON_NEWS_PATH)
        .and_then(Value::as_array)
        .map(|items| items.iter().map(parse_article).collect())
        .unwrap_or_default();

    Ok(NewsPage {
        articles,
        total_count,
    })
}

fn parse_article(item: &Value) -> Article {
    let text = |key: &str| {
        json_value(item, &[key.into()])
            .and_then(Value::as_str)
            .map(clean_text)
            .unwrap_or_default()
    };
    let published_at = json_value(item, &["publishedAt".into()])
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Article {
        id: Uuid::new_v4().simple().to_string(),
        title: text("title"),
        description: text("description"),
        body: TRUNCATION_MARKER.replace(&text("content"), "").into_owned(),
        url: json_value(item, &["url".into()])
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        published_at,
    }
}

/// Strip HTML tags, decode entities and collapse runs of spaces and tabs.
pub fn clean_text(raw: &str) -> String {
    let fragment = Html::parse_fragment(raw);
    let text = fragment.root_element().text().collect::<Vec<_>>().join(" ");
    SPACES.replace_all(&text, " ").trim().to_string()
}
