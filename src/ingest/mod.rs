//! Source ingester.
//!
//! Paginated fetch against a REST surface with bearer-token auth, a
//! token-bucket rate limit, and retry/backoff on 429/5xx. Returns raw JSON
//! bodies for the staging store to persist; this module never interprets
//! the payload shape beyond pagination metadata.

pub mod limiter;
mod retry;

pub use limiter::TokenBucket;
pub use retry::{with_backoff, AttemptOutcome};

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{instrument, warn};

use crate::config::Config;
use crate::errors::CoreError;

/// A single page of raw JSON items plus the cursor for the next page, if any.
pub struct Page {
    pub items: Vec<Value>,
    pub next_url: Option<String>,
}

/// Paged REST client for one upstream host. Owns the host's rate limiter,
/// a single token bucket shared by every page fetch against that host.
pub struct Ingester {
    client: Client,
    bearer_token: String,
    limiter: Arc<TokenBucket>,
    config: Config,
}

impl Ingester {
    pub fn new(bearer_token: impl Into<String>, config: Config) -> Self {
        let limiter = Arc::new(TokenBucket::new(
            config.upstream_rate_limit_per_sec,
            config.upstream_rate_limit_burst,
        ));
        Self {
            client: Client::new(),
            bearer_token: bearer_token.into(),
            limiter,
            config,
        }
    }

    /// Fetches a single page of 100 items. `url` is the full URL including
    /// any query parameters; pagination is driven by the response's `Link`
    /// header rather than an offset the caller tracks.
    #[instrument(skip(self))]
    pub async fn fetch_page(&self, url: &str) -> Result<Page, CoreError> {
        let url = url.to_string();
        with_backoff(&self.config, &url, || {
            let url = url.clone();
            async move {
                self.limiter.acquire().await;

                let response = match self
                    .client
                    .get(&url)
                    .bearer_auth(&self.bearer_token)
                    .header("Accept", "application/json")
                    .send()
                    .await
                {
                    Ok(r) => r,
                    Err(e) => {
                        return AttemptOutcome::Retryable {
                            error: e.to_string(),
                            retry_after: None,
                        };
                    }
                };

                let status = response.status();
                if status == StatusCode::NOT_FOUND {
                    return AttemptOutcome::NotFound;
                }
                if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                    let retry_after = retry_after_from_headers(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    return AttemptOutcome::Retryable {
                        error: format!("{status}: {body}"),
                        retry_after,
                    };
                }
                if !status.is_success() {
                    return AttemptOutcome::Retryable {
                        error: format!("unexpected status {status}"),
                        retry_after: None,
                    };
                }

                let next_url = next_link(response.headers());
                let remaining = remaining_quota(response.headers());
                if let Some(remaining) = remaining {
                    if remaining == 0 {
                        warn!(url, "upstream quota exhausted per X-RateLimit-Remaining");
                    }
                }

                let body: Value = match response.json().await {
                    Ok(v) => v,
                    Err(e) => {
                        return AttemptOutcome::Retryable {
                            error: e.to_string(),
                            retry_after: None,
                        };
                    }
                };

                let items = match body {
                    Value::Array(items) => items,
                    single => vec![single],
                };

                AttemptOutcome::Success(Page { items, next_url })
            }
        })
        .await
    }

    /// Walks every page starting at `first_url`, returning the flattened
    /// list of raw JSON entities.
    #[instrument(skip(self))]
    pub async fn fetch_all(&self, first_url: &str) -> Result<Vec<Value>, CoreError> {
        let mut all = Vec::new();
        let mut next = Some(first_url.to_string());
        while let Some(url) = next {
            let page = self.fetch_page(&url).await?;
            all.extend(page.items);
            next = page.next_url;
        }
        Ok(all)
    }
}

fn retry_after_from_headers(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get("Retry-After")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn remaining_quota(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get("X-RateLimit-Remaining")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
}

/// Parses the `Link: <url>; rel="next"` header GitHub-style pagination uses.
fn next_link(headers: &reqwest::header::HeaderMap) -> Option<String> {
    let link = headers.get("Link")?.to_str().ok()?;
    for part in link.split(',') {
        let mut segments = part.split(';');
        let url_part = segments.next()?.trim();
        let is_next = segments.any(|s| s.trim() == "rel=\"next\"");
        if is_next {
            return Some(url_part.trim_start_matches('<').trim_end_matches('>').to_string());
        }
    }
    None
}
