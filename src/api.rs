//! HTTP query descriptors and the transport that executes them.
//!
//! This module provides the lowest layer of communication with external
//! services. It is deliberately thin: pacing, rate-limit recovery and
//! response decoding live in [`crate::scheduler`].
//!
//! # Architecture
//!
//! The module uses a trait-based design for flexibility:
//! - [`ApiQuery`]: A validated request descriptor (method, URL, headers, body, pacing)
//! - [`HttpTransport`]: Core trait defining how a query is sent
//! - [`ReqwestTransport`]: Production implementation backed by `reqwest`

use reqwest::Client;
use reqwest::header::RETRY_AFTER;
use serde_json::Value;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::{NewsError, Result};

/// HTTP method of an [`ApiQuery`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    /// Parse a method name case-insensitively. Only `GET` and `POST` are accepted.
    pub fn parse(method: &str) -> Result<Self> {
        match method.trim().to_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            other => Err(NewsError::Validation(format!(
                "method must be GET or POST, got {other:?}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single request against a rate-limited external API.
///
/// For `GET` the body object is sent as query parameters, for `POST` as a
/// JSON document.
#[derive(Debug, Clone)]
pub struct ApiQuery {
    method: Method,
    url: Url,
    headers: Vec<(String, String)>,
    body: Value,
    min_interval: Duration,
    timeout: Duration,
}

impl ApiQuery {
    /// Create a validated query.
    ///
    /// # Errors
    ///
    /// Returns [`NewsError::Validation`] for a method other than GET/POST or an
    /// unparseable URL.
    pub fn new(
        method: &str,
        url: &str,
        headers: Vec<(String, String)>,
        body: Value,
        min_interval: Duration,
        timeout: Duration,
    ) -> Result<Self> {
        let method = Method::parse(method)?;
        let url = Url::parse(url)
            .map_err(|e| NewsError::Validation(format!("invalid url {url:?}: {e}")))?;
        Ok(Self {
            method,
            url,
            headers,
            body,
            min_interval,
            timeout,
        })
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Minimum time between the previous request and this one.
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Flatten the body object into query parameters.
    ///
    /// Strings are sent as-is, nulls are skipped, everything else is sent in
    /// its JSON form.
    pub fn query_params(&self) -> Vec<(String, String)> {
        let Some(obj) = self.body.as_object() else {
            return Vec::new();
        };
        obj.iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| {
                let v = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), v)
            })
            .collect()
    }
}

/// The parts of an HTTP response the scheduler cares about.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    /// Parsed `Retry-After` header, when given in seconds.
    pub retry_after: Option<Duration>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for sending a single [`ApiQuery`].
///
/// Implementors only move bytes; they do not interpret status codes. This
/// abstraction lets the scheduler run against a fake transport in tests.
pub trait HttpTransport {
    /// Send the query and return the raw response.
    ///
    /// # Errors
    ///
    /// Returns [`NewsError::RequestFailed`] on transport-level failures
    /// (timeouts, connection errors).
    async fn send(&self, query: &ApiQuery) -> Result<HttpResponse>;
}

/// [`HttpTransport`] backed by a shared `reqwest` client.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl HttpTransport for ReqwestTransport {
    #[instrument(level = "info", skip_all, fields(method = %query.method, url = %query.url))]
    async fn send(&self, query: &ApiQuery) -> Result<HttpResponse> {
        let t0 = Instant::now();
        let mut request = match query.method {
            Method::Get => self
                .client
                .get(query.url.clone())
                .query(&query.query_params()),
            Method::Post => self.client.post(query.url.clone()).json(query.body()),
        };
        for (name, value) in query.headers() {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.timeout(query.timeout()).send().await.map_err(|e| {
            warn!(elapsed_ms = t0.elapsed().as_millis(), error = %e, "HTTP request failed");
            NewsError::RequestFailed(e.to_string())
        })?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = response
            .text()
            .await
            .map_err(|e| NewsError::RequestFailed(e.to_string()))?;

        debug!(
            status,
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis(),
            "HTTP response received"
        );
        Ok(HttpResponse {
            status,
            retry_after,
            body,
        })
    }
}

/// Parse a `Retry-After` value given in (possibly fractional) seconds.
///
/// HTTP-date values are not supported and yield `None`, as do negative
/// values and values too large for a [`Duration`].
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn query(method: &str) -> Result<ApiQuery> {
        ApiQuery::new(
            method,
            "https://api.example.com/v2/everything",
            vec![("a".into(), "b".into())],
            json!({"c": "d"}),
            Duration::from_secs(1),
            Duration::from_secs(2),
        )
    }

    #[test]
    fn test_api_query_rejects_unknown_method() {
        let err = query("test").unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_api_query_normalizes_method() {
        let q = query("GET").unwrap();
        assert_eq!(q.method(), Method::Get);
        assert_eq!(q.method().to_string(), "GET");
        assert_eq!(q.min_interval(), Duration::from_secs(1));
        assert_eq!(q.timeout(), Duration::from_secs(2));
        assert_eq!(q.headers(), &[("a".to_string(), "b".to_string())]);

        let q = query("post").unwrap();
        assert_eq!(q.method(), Method::Post);
        assert_eq!(q.method().as_str(), "POST");
    }

    #[test]
    fn test_api_query_rejects_bad_url() {
        let err = ApiQuery::new(
            "GET",
            "not a url",
            vec![],
            Value::Null,
            Duration::ZERO,
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_query_params_flatten() {
        let q = ApiQuery::new(
            "GET",
            "https://api.example.com",
            vec![],
            json!({"q": "climate", "page": 2, "skip": null}),
            Duration::ZERO,
            Duration::from_secs(1),
        )
        .unwrap();
        let mut params = q.query_params();
        params.sort();
        assert_eq!(
            params,
            vec![
                ("page".to_string(), "2".to_string()),
                ("q".to_string(), "climate".to_string())
            ]
        );
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("3"), Some(Duration::from_secs(3)));
        assert_eq!(parse_retry_after(" 0.5 "), Some(Duration::from_millis(500)));
        assert_eq!(parse_retry_after("-1"), None);
        assert_eq!(parse_retry_after("1e30"), None);
        assert_eq!(parse_retry_after("inf"), None);
        assert_eq!(parse_retry_after("NaN"), None);
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn test_http_response_success_range() {
        let ok = HttpResponse { status: 201, retry_after: None, body: String::new() };
        let bad = HttpResponse { status: 302, ..ok.clone() };
        assert!(ok.is_success());
        assert!(!bad.is_success());
    }
}
