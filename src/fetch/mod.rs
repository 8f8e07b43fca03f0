//! # Rate-Limited Fetch Layer
//!
//! Retry, backoff, and header-randomization wrapper around outbound REST
//! calls to the source platform.
//!
//! ## Overview
//!
//! Retries are limited to a fixed whitelist of transient signatures: HTTP 429
//! and 503, connection reset, timeout, and DNS failure. A 429 waits longer
//! (3s) than other retryable errors (1.5s); the delays are fixed per call
//! site, not exponential. Non-retryable statuses (403/404) propagate
//! immediately with their numeric code so callers can classify the failure,
//! and are negatively cached per entity for 30 minutes to short-circuit
//! repeated doomed calls.
//!
//! Every attempt carries a rotated realistic header set and a jittered
//! pre-request delay to stay under the source platform's traffic heuristics.

pub mod headers;

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, warn};

use crate::constants::system;
use crate::utils::BoundedCache;

/// Failures surfaced by [`RateLimitedFetcher::fetch_json`]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("HTTP {code} for entity {entity_id}")]
    Status { code: u16, entity_id: String },
    #[error("Request timed out: {0}")]
    Timeout(String),
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("DNS lookup failed: {0}")]
    Dns(String),
    #[error("Response decode failed: {0}")]
    Decode(String),
}

impl FetchError {
    /// Whether this failure is on the transient whitelist
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Status { code, .. } => matches!(code, 429 | 503),
            FetchError::Timeout(_) | FetchError::Connection(_) | FetchError::Dns(_) => true,
            FetchError::Decode(_) => false,
        }
    }

    /// Fixed delay before the next attempt; rate limits wait longer than
    /// other transient failures
    pub fn retry_delay(&self, config: &FetchConfig) -> Duration {
        match self {
            FetchError::Status { code: 429, .. } => config.rate_limit_delay,
            _ => config.transient_delay,
        }
    }

    /// Numeric status for caller-side classification, when one exists
    pub fn status_code(&self) -> Option<u16> {
        match self {
            FetchError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Tuning for the fetch layer
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Delay before retrying after HTTP 429
    pub rate_limit_delay: Duration,
    /// Delay before retrying other transient failures
    pub transient_delay: Duration,
    /// Upper bound of the jittered pre-request delay in milliseconds
    pub pre_request_jitter_ms: u64,
    /// Default retry budget when the caller does not pass one
    pub default_max_retries: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(system::REQUEST_TIMEOUT_SECS),
            rate_limit_delay: Duration::from_millis(system::RATE_LIMIT_RETRY_DELAY_MS),
            transient_delay: Duration::from_millis(system::TRANSIENT_RETRY_DELAY_MS),
            pre_request_jitter_ms: system::PRE_REQUEST_JITTER_MS,
            default_max_retries: system::DEFAULT_MAX_FETCH_RETRIES,
        }
    }
}

/// Negative per-entity cache of recent 403/404 results (30 minute TTL)
#[derive(Debug)]
pub struct FailedEntityCache {
    cache: BoundedCache<String, u16>,
}

impl FailedEntityCache {
    pub fn new() -> Self {
        Self {
            cache: BoundedCache::with_ttl(
                system::FAILED_ENTITY_CACHE_MAX_ENTRIES,
                Duration::from_secs(system::FAILED_ENTITY_TTL_SECS),
            ),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_ttl(capacity: usize, ttl: Duration) -> Self {
        Self {
            cache: BoundedCache::with_ttl(capacity, ttl),
        }
    }

    /// Record a terminal access failure for an entity
    pub fn record(&self, entity_id: &str, code: u16) {
        self.cache.insert(entity_id.to_string(), code);
    }

    /// Last recorded access error for an entity, if still fresh
    pub fn recent_code(&self, entity_id: &str) -> Option<u16> {
        self.cache.get(&entity_id.to_string())
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Drop expired entries and re-trim to capacity
    pub fn sweep(&self) {
        self.cache.sweep();
    }
}

impl Default for FailedEntityCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Retrying JSON fetcher for source-platform REST reads
#[derive(Debug, Clone)]
pub struct RateLimitedFetcher {
    client: Client,
    config: FetchConfig,
    failed: Arc<FailedEntityCache>,
}

impl RateLimitedFetcher {
    /// Build a fetcher sharing the given negative cache with the resolver
    pub fn new(config: FetchConfig, failed: Arc<FailedEntityCache>) -> Self {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            config,
            failed,
        }
    }

    /// Fetch and parse a JSON body, retrying only whitelisted transient
    /// failures.
    ///
    /// `entity_id` keys the negative cache: a fresh 403/404 for the entity
    /// short-circuits without touching the network, and a new 403/404 is
    /// recorded before propagating.
    pub async fn fetch_json(
        &self,
        entity_id: &str,
        url: &str,
        credential: &str,
        max_retries: u32,
    ) -> Result<serde_json::Value, FetchError> {
        if let Some(code) = self.failed.recent_code(entity_id) {
            debug!(
                entity_id,
                code, "Skipping fetch, entity recently returned an access error"
            );
            return Err(FetchError::Status {
                code,
                entity_id: entity_id.to_string(),
            });
        }

        let mut attempt: u32 = 0;
        loop {
            self.pre_request_delay().await;

            let result = self.attempt(entity_id, url, credential).await;
            let err = match result {
                Ok(body) => return Ok(body),
                Err(err) => err,
            };

            if let Some(code @ (403 | 404)) = err.status_code() {
                self.failed.record(entity_id, code);
                return Err(err);
            }

            if !err.is_retryable() || attempt >= max_retries {
                return Err(err);
            }

            let delay = err.retry_delay(&self.config);
            warn!(
                entity_id,
                url,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "🔁 Transient fetch failure, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn attempt(
        &self,
        entity_id: &str,
        url: &str,
        credential: &str,
    ) -> Result<serde_json::Value, FetchError> {
        let mut request = self.client.get(url).timeout(self.config.request_timeout);
        for (name, value) in headers::rotated_header_set() {
            request = request.header(name, value);
        }
        request = request.header("Authorization", credential);

        let response = request.send().await.map_err(classify_transport_error)?;
        let status = response.status();

        if status.is_success() {
            return response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| FetchError::Decode(e.to_string()));
        }

        Err(status_error(status, entity_id))
    }

    async fn pre_request_delay(&self) {
        if self.config.pre_request_jitter_ms == 0 {
            return;
        }
        let jitter = fastrand::u64(0..=self.config.pre_request_jitter_ms);
        tokio::time::sleep(Duration::from_millis(jitter)).await;
    }
}

fn status_error(status: StatusCode, entity_id: &str) -> FetchError {
    FetchError::Status {
        code: status.as_u16(),
        entity_id: entity_id.to_string(),
    }
}

fn classify_transport_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::Timeout(err.to_string());
    }
    if err.is_connect() {
        let text = err.to_string();
        if text.contains("dns") {
            return FetchError::Dns(text);
        }
        return FetchError::Connection(text);
    }
    if err.is_decode() {
        return FetchError::Decode(err.to_string());
    }
    FetchError::Connection(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_whitelist() {
        let status = |code| FetchError::Status {
            code,
            entity_id: "e".to_string(),
        };
        assert!(status(429).is_retryable());
        assert!(status(503).is_retryable());
        assert!(!status(403).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(!status(500).is_retryable());
        assert!(FetchError::Timeout("t".into()).is_retryable());
        assert!(FetchError::Connection("c".into()).is_retryable());
        assert!(FetchError::Dns("d".into()).is_retryable());
        assert!(!FetchError::Decode("b".into()).is_retryable());
    }

    #[test]
    fn test_rate_limit_waits_longer_than_transient() {
        let config = FetchConfig::default();
        let rate_limited = FetchError::Status {
            code: 429,
            entity_id: "e".to_string(),
        };
        let unavailable = FetchError::Status {
            code: 503,
            entity_id: "e".to_string(),
        };
        assert_eq!(rate_limited.retry_delay(&config), config.rate_limit_delay);
        assert_eq!(unavailable.retry_delay(&config), config.transient_delay);
        assert!(rate_limited.retry_delay(&config) > unavailable.retry_delay(&config));
    }

    #[tokio::test]
    async fn test_negative_cache_short_circuits() {
        let failed = Arc::new(FailedEntityCache::new());
        failed.record("doomed", 404);

        let fetcher = RateLimitedFetcher::new(
            FetchConfig {
                pre_request_jitter_ms: 0,
                ..FetchConfig::default()
            },
            failed,
        );

        // No server is listening anywhere; a cached 404 must return before
        // any network attempt.
        let result = fetcher
            .fetch_json("doomed", "http://127.0.0.1:9/never", "Bot token", 0)
            .await;
        assert_eq!(
            result,
            Err(FetchError::Status {
                code: 404,
                entity_id: "doomed".to_string()
            })
        );
    }

    #[test]
    fn test_negative_cache_expires() {
        let failed = FailedEntityCache::with_ttl(10, Duration::from_millis(0));
        failed.record("e", 403);
        assert_eq!(failed.recent_code("e"), None);
    }
}
