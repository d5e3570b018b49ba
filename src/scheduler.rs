//! Paced execution of external API queries.
//!
//! Upstream APIs impose a hard rate limit per API key, not per user, so every
//! request against them goes through one [`QueryScheduler`]. The scheduler
//! remembers when the previous request started and ended and sleeps just
//! long enough to honour the minimum interval before sending the next one.
//!
//! # Retry Strategy
//!
//! - HTTP 429 is retried exactly once
//! - The delay is the server's `Retry-After` (1 second if absent), capped at
//!   `max_retry_delay`, plus random jitter (0-250ms)
//! - Every other failure is reported to the caller, who decides whether it
//!   is fatal

use rand::{Rng, rng};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, instrument, warn};

use crate::api::{ApiQuery, HttpResponse, HttpTransport};
use crate::error::{NewsError, Result};
use crate::utils::truncate_for_log;

const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
const TOO_MANY_REQUESTS: u16 = 429;

/// Which end of the previous request the minimum interval is measured from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalPolicy {
    #[default]
    FromStart,
    FromEnd,
}

/// Timing of the most recently executed query.
#[derive(Debug, Clone, Copy)]
struct LastQuery {
    start: Instant,
    end: Instant,
    interval: Duration,
}

/// Sequencer for requests against one rate-limited upstream.
///
/// The internal lock is held for the whole wait-send-record sequence, so at
/// most one query is in flight per scheduler. Share one instance (by
/// reference or `Arc`) between all callers of the same API key.
pub struct QueryScheduler<T> {
    transport: T,
    policy: IntervalPolicy,
    max_retry_delay: Duration,
    last: Mutex<Option<LastQuery>>,
}

impl<T> std::fmt::Debug for QueryScheduler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryScheduler")
            .field("policy", &self.policy)
            .field("max_retry_delay", &self.max_retry_delay)
            .finish()
    }
}

impl<T> QueryScheduler<T>
where
    T: HttpTransport,
{
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            policy: IntervalPolicy::default(),
            max_retry_delay: Duration::from_secs(30),
            last: Mutex::new(None),
        }
    }

    pub fn with_policy(mut self, policy: IntervalPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_retry_delay(mut self, max_retry_delay: Duration) -> Self {
        self.max_retry_delay = max_retry_delay;
        self
    }

    #[cfg(test)]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Wait for the pacing interval, send the query and decode its JSON body.
    ///
    /// # Errors
    ///
    /// - [`NewsError::RequestFailed`] on transport failures
    /// - [`NewsError::RateLimited`] if still throttled after one retry
    /// - [`NewsError::ApiError`] on any other non-2xx status
    /// - [`NewsError::ParseError`] if the body is not JSON
    #[instrument(level = "info", skip_all, fields(method = %query.method(), url = %query.url()))]
    pub async fn execute(&self, query: &ApiQuery) -> Result<Value> {
        let mut last = self.last.lock().await;

        let wait = sleep_time(last.as_ref(), query.min_interval(), self.policy, Instant::now());
        if !wait.is_zero() {
            debug!(wait_ms = wait.as_millis(), "Pacing request");
            sleep(wait).await;
        }

        let start = Instant::now();
        let response = self.send_with_retry(query).await;
        let end = Instant::now();
        *last = Some(LastQuery {
            start,
            end,
            interval: query.min_interval(),
        });
        drop(last);

        let response = response?;
        if !response.is_success() {
            return Err(NewsError::ApiError {
                status: response.status,
                message: truncate_for_log(&response.body, 200),
            });
        }

        let value: Value = serde_json::from_str(&response.body)
            .map_err(|e| NewsError::ParseError(e.to_string()))?;
        info!(
            bytes = response.body.len(),
            elapsed_ms = (end - start).as_millis(),
            answer = %truncate_for_log(&response.body, 100),
            "Got answer"
        );
        Ok(value)
    }

    /// Like [`execute`](Self::execute), but logs failures and returns `None`.
    pub async fn try_execute(&self, query: &ApiQuery) -> Option<Value> {
        match self.execute(query).await {
            Ok(value) => Some(value),
            Err(e) => {
                error!(url = %query.url(), error = %e, "Query failed");
                None
            }
        }
    }

    async fn send_with_retry(&self, query: &ApiQuery) -> Result<HttpResponse> {
        let response = self.transport.send(query).await?;
        if response.status != TOO_MANY_REQUESTS {
            return Ok(response);
        }

        let delay = response
            .retry_after
            .unwrap_or(DEFAULT_RETRY_DELAY)
            .min(self.max_retry_delay);
        let jitter_ms: u64 = rng().random_range(0..=250);
        let delay = delay + Duration::from_millis(jitter_ms);
        warn!(?delay, "Rate limited; retrying once");
        sleep(delay).await;

        let response = self.transport.send(query).await?;
        if response.status == TOO_MANY_REQUESTS {
            return Err(NewsError::RateLimited);
        }
        Ok(response)
    }
}

/// Time left to wait before a query with `interval` may start.
///
/// The interval honoured is the larger of the previous query's and the
/// current one's.
fn sleep_time(
    last: Option<&LastQuery>,
    interval: Duration,
    policy: IntervalPolicy,
    now: Instant,
) -> Duration {
    let Some(last) = last else {
        return Duration::ZERO;
    };
    let reference = match policy {
        IntervalPolicy::FromStart => last.start,
        IntervalPolicy::FromEnd => last.end,
    };
    let interval = interval.max(last.interval);
    interval.saturating_sub(now.saturating_duration_since(reference))
}
