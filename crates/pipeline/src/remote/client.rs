//! HTTP client for the remote item API
//!
//! Collections are exposed as `{base}/items/{collection}`. Reads filter with
//! `filter[<field>][_eq]=<value>` and every response wraps its payload in
//! `{"data": ...}`.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{Quota, RateLimiter, clock::DefaultClock, state::InMemoryState};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use super::{NaturalKey, RemoteError, RemoteId, RemoteStore};
use crate::config::Config;

/// Outbound request limiter shared by clones of the client
pub type SharedRateLimiter =
    Arc<RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock>>;

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct ItemRef {
    #[serde(default)]
    id: JsonValue,
}

impl ItemRef {
    fn remote_id(&self) -> Result<RemoteId, RemoteError> {
        RemoteId::from_json(&self.id)
            .ok_or_else(|| RemoteError::Decode(format!("item without usable id: {}", self.id)))
    }
}

/// Remote store reached over HTTP
#[derive(Clone)]
pub struct HttpRemoteStore {
    http: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
    retry: RetryPolicy,
    limiter: Option<SharedRateLimiter>,
}

impl HttpRemoteStore {
    /// Build a client from the resolved configuration
    pub fn new(config: &Config) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .timeout(config.remote_timeout)
            .build()
            .map_err(|e| RemoteError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        let limiter = NonZeroU32::new(config.rate_limit_rps)
            .map(|rps| Arc::new(RateLimiter::direct(Quota::per_second(rps))));

        Ok(Self {
            http,
            base_url: config.remote_base_url.trim_end_matches('/').to_string(),
            api_token: config.remote_api_token.clone(),
            retry: RetryPolicy {
                max_attempts: config.remote_max_attempts.max(1),
                ..RetryPolicy::default()
            },
            limiter,
        })
    }

    /// Override the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn items_url(&self, collection: &str) -> String {
        format!("{}/items/{}", self.base_url, collection)
    }

    /// Send a request, retrying failures with exponential backoff
    ///
    /// Reads retry every transient error. Writes only retry failures the
    /// remote certainly did not act on, so a retry cannot create a duplicate.
    async fn send<T, F>(&self, kind: RequestKind, build: F) -> Result<T, RemoteError>
    where
        T: DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 1;
        loop {
            match self.send_once(&build).await {
                Ok(value) => return Ok(value),
                Err(e) if kind.should_retry(&e) && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        error = %e,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Transient remote error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once<T, F>(&self, build: &F) -> Result<T, RemoteError>
    where
        T: DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder,
    {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let mut request = build();
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(classify)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Status { status, body });
        }

        let envelope = response
            .json::<Envelope<T>>()
            .await
            .map_err(|e| RemoteError::Decode(format!("Failed to parse response: {}", e)))?;
        Ok(envelope.data)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    Read,
    Write,
}

impl RequestKind {
    fn should_retry(self, err: &RemoteError) -> bool {
        match self {
            RequestKind::Read => err.is_transient(),
            RequestKind::Write => err.is_unprocessed(),
        }
    }
}

fn classify(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout(err.to_string())
    } else if err.is_connect() {
        RemoteError::Connect(err.to_string())
    } else {
        RemoteError::Transport(err.to_string())
    }
}

impl RemoteStore for HttpRemoteStore {
    async fn lookup(
        &self,
        collection: &str,
        key: &NaturalKey,
    ) -> Result<Option<RemoteId>, RemoteError> {
        let url = self.items_url(collection);
        let mut query: Vec<(String, String)> = key
            .fields()
            .iter()
            .map(|(field, value)| (format!("filter[{}][_eq]", field), value.clone()))
            .collect();
        query.push(("limit".to_string(), "1".to_string()));

        let items: Vec<ItemRef> = self
            .send(RequestKind::Read, || self.http.get(&url).query(&query))
            .await?;
        items.first().map(ItemRef::remote_id).transpose()
    }

    async fn create(&self, collection: &str, payload: &JsonValue) -> Result<RemoteId, RemoteError> {
        let url = self.items_url(collection);
        let item: ItemRef = self
            .send(RequestKind::Write, || self.http.post(&url).json(payload))
            .await?;
        item.remote_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let retry = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(retry.delay_for(1), Duration::from_millis(100));
        assert_eq!(retry.delay_for(2), Duration::from_millis(200));
        assert_eq!(retry.delay_for(3), Duration::from_millis(400));
    }
}
