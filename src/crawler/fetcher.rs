//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with the configured user agent and timeouts
//! - Authenticated GET requests against the REST API
//! - Plain GET requests for HTML pages
//! - Rate-limit classification and retry with backoff

use crate::config::ApiConfig;
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Media type requested from the REST API
pub const API_ACCEPT: &str = "application/vnd.github.v3+json";

const HTML_ACCEPT: &str = "text/html,application/xhtml+xml";

/// Terminal outcome of a failed fetch
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, TLS or timeout failure; not retried
    #[error("request to {url} failed: {source}")]
    Transport { url: String, source: reqwest::Error },

    /// Any non-success status other than a rate limit
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// Every allowed attempt was rate limited
    #[error("rate limit retries exhausted for {url}")]
    MaxRetries { url: String },

    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        source: serde_json::Error,
    },
}

/// How rate-limited requests are retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed per fetch, the first one included
    pub max_retries: u32,
    /// Sleep after the first abuse-detection response; doubled each time
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ApiConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
        }
    }
}

/// Classification of a 403/429 response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimit {
    /// The hourly quota is used up; wait until it resets
    QuotaExhausted { wait: Duration },
    /// Secondary limit without a reset time; back off exponentially
    AbuseDetected,
}

/// Decides how to wait after a rate-limited response
///
/// The quota branch applies only when `remaining` is exactly `0` and `reset`
/// holds a Unix timestamp; the wait then ends one second after the reset.
/// Anything else is treated as abuse detection.
///
/// # Arguments
///
/// * `remaining` - Value of `X-RateLimit-Remaining`, if present
/// * `reset` - Value of `X-RateLimit-Reset` (Unix seconds), if present
/// * `now` - Current wall-clock time
///
/// # Example
///
/// ```
/// use forge_ripple::crawler::{classify_rate_limit, RateLimit};
/// use std::time::{Duration, UNIX_EPOCH};
///
/// let now = UNIX_EPOCH + Duration::from_secs(1_000);
/// assert_eq!(
///     classify_rate_limit(Some("0"), Some("1010"), now),
///     RateLimit::QuotaExhausted { wait: Duration::from_secs(11) }
/// );
/// assert_eq!(classify_rate_limit(None, None, now), RateLimit::AbuseDetected);
/// ```
pub fn classify_rate_limit(remaining: Option<&str>, reset: Option<&str>, now: SystemTime) -> RateLimit {
    let exhausted = remaining.map(str::trim) == Some("0");
    let reset_at = reset
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(|secs| UNIX_EPOCH + Duration::from_secs(secs));

    match (exhausted, reset_at) {
        (true, Some(reset_at)) => {
            let until_reset = reset_at.duration_since(now).unwrap_or(Duration::ZERO);
            RateLimit::QuotaExhausted {
                wait: until_reset + Duration::from_secs(1),
            }
        }
        _ => RateLimit::AbuseDetected,
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The API configuration (user agent and timeout)
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &ApiConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Rate-limit aware HTTP client
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct FetchClient {
    client: Client,
    token: Option<String>,
    policy: RetryPolicy,
}

impl FetchClient {
    pub fn new(client: Client, token: Option<String>, policy: RetryPolicy) -> Self {
        Self {
            client,
            token: token.filter(|t| !t.trim().is_empty()),
            policy,
        }
    }

    /// Builds a client from configuration; `token` overrides the configured one
    pub fn from_config(config: &ApiConfig, token: Option<String>) -> Result<Self, reqwest::Error> {
        let client = build_http_client(config)?;
        let token = token.or_else(|| config.token.clone());
        Ok(Self::new(client, token, RetryPolicy::from_config(config)))
    }

    /// Fetches an API resource and returns the raw body
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | HTTP 200 | Return body |
    /// | HTTP 403/429, quota exhausted | Sleep until reset + 1s, retry |
    /// | HTTP 403/429, otherwise | Sleep backoff (doubling), retry |
    /// | Any other status | Immediate → `Status` |
    /// | Transport failure | Immediate → `Transport` |
    /// | Attempts used up | `MaxRetries` |
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.fetch_with(url, API_ACCEPT, true).await
    }

    /// Fetches and decodes a JSON API resource
    pub async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let body = self.fetch(url).await?;
        serde_json::from_slice(&body).map_err(|source| FetchError::Decode {
            url: url.to_string(),
            source,
        })
    }

    /// Fetches an HTML page; the API token is never sent to page URLs
    pub async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        let body = self.fetch_with(url, HTML_ACCEPT, false).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    async fn fetch_with(&self, url: &str, accept: &str, authorize: bool) -> Result<Vec<u8>, FetchError> {
        let mut backoff = self.policy.initial_backoff;

        for attempt in 1..=self.policy.max_retries {
            let mut request = self.client.get(url).header(ACCEPT, accept);
            if authorize {
                if let Some(token) = &self.token {
                    request = request.header(AUTHORIZATION, format!("token {}", token));
                }
            }

            let response = request.send().await.map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;
            let status = response.status();

            if status == StatusCode::OK {
                let body = response.bytes().await.map_err(|source| FetchError::Transport {
                    url: url.to_string(),
                    source,
                })?;
                return Ok(body.to_vec());
            }

            if status != StatusCode::FORBIDDEN && status != StatusCode::TOO_MANY_REQUESTS {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            if attempt == self.policy.max_retries {
                break;
            }

            let limit = classify_rate_limit(
                header_str(response.headers(), "x-ratelimit-remaining"),
                header_str(response.headers(), "x-ratelimit-reset"),
                SystemTime::now(),
            );
            // Release the connection before a wait that can last up to an hour
            drop(response);

            let wait = match limit {
                RateLimit::QuotaExhausted { wait } => {
                    tracing::warn!(
                        "Rate limit exhausted for {}, waiting {}s (attempt {}/{})",
                        url,
                        wait.as_secs(),
                        attempt,
                        self.policy.max_retries
                    );
                    wait
                }
                RateLimit::AbuseDetected => {
                    let wait = backoff;
                    backoff = backoff.saturating_mul(2);
                    tracing::warn!(
                        "Abuse detection triggered for {}, backing off {}ms (attempt {}/{})",
                        url,
                        wait.as_millis(),
                        attempt,
                        self.policy.max_retries
                    );
                    wait
                }
            };

            tokio::time::sleep(wait).await;
        }

        Err(FetchError::MaxRetries {
            url: url.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use std::time::Instant;

    fn client(max_retries: u32, token: Option<&str>) -> FetchClient {
        FetchClient::new(
            build_http_client(&ApiConfig::default()).unwrap(),
            token.map(str::to_string),
            RetryPolicy {
                max_retries,
                initial_backoff: Duration::from_millis(10),
            },
        )
    }

    async fn request_count(server: &MockServer) -> usize {
        server.received_requests().await.unwrap_or_default().len()
    }

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(&ApiConfig::default()).is_ok());
    }

    #[test]
    fn test_classify_quota_exhausted() {
        let now = UNIX_EPOCH + Duration::from_secs(1_000);
        assert_eq!(
            classify_rate_limit(Some("0"), Some("1030"), now),
            RateLimit::QuotaExhausted {
                wait: Duration::from_secs(31)
            }
        );
    }

    #[test]
    fn test_classify_reset_in_the_past_still_waits_one_second() {
        let now = UNIX_EPOCH + Duration::from_secs(1_000);
        assert_eq!(
            classify_rate_limit(Some("0"), Some("900"), now),
            RateLimit::QuotaExhausted {
                wait: Duration::from_secs(1)
            }
        );
    }

    #[test]
    fn test_classify_abuse_detection() {
        let now = UNIX_EPOCH + Duration::from_secs(1_000);
        // Quota left, missing reset, or garbage reset all mean abuse detection
        assert_eq!(classify_rate_limit(Some("12"), Some("1030"), now), RateLimit::AbuseDetected);
        assert_eq!(classify_rate_limit(Some("0"), None, now), RateLimit::AbuseDetected);
        assert_eq!(classify_rate_limit(Some("0"), Some("soon"), now), RateLimit::AbuseDetected);
        assert_eq!(classify_rate_limit(None, None, now), RateLimit::AbuseDetected);
    }

    #[tokio::test]
    async fn test_blank_token_is_not_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&server)
            .await;

        let body = client(1, Some("  ")).fetch(&server.uri()).await.unwrap();
        assert_eq!(body, b"{}");
    }

    #[tokio::test]
    async fn test_fetch_success_sends_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/octo"))
            .and(header("accept", API_ACCEPT))
            .and(header("authorization", "token abc"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"login\":\"octo\"}"))
            .expect(1)
            .mount(&server)
            .await;

        let body = client(5, Some("abc"))
            .fetch(&format!("{}/users/octo", server.uri()))
            .await
            .unwrap();
        assert_eq!(body, b"{\"login\":\"octo\"}");
    }

    #[tokio::test]
    async fn test_abuse_detection_retries_with_backoff() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let body = client(5, None).fetch(&server.uri()).await.unwrap();
        assert_eq!(body, b"ok");
        assert_eq!(request_count(&server).await, 3);
    }

    #[tokio::test]
    async fn test_max_retries_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let result = client(3, None).fetch(&server.uri()).await;
        assert!(matches!(result, Err(FetchError::MaxRetries { .. })));
        assert_eq!(request_count(&server).await, 3);
    }

    #[tokio::test]
    async fn test_other_status_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = client(5, None).fetch(&server.uri()).await;
        assert!(matches!(result, Err(FetchError::Status { status: 404, .. })));
        assert_eq!(request_count(&server).await, 1);
    }

    #[tokio::test]
    async fn test_retry_waits_for_quota_reset() {
        let server = MockServer::start().await;
        // At least one full second away, so the wait cannot round down to nothing
        let reset = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            + 2;
        let reset_header = reset.to_string();

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header("x-ratelimit-remaining", "0")
                    .insert_header("x-ratelimit-reset", reset_header.as_str()),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&server)
            .await;

        let started = Instant::now();
        let body = client(5, None).fetch(&server.uri()).await.unwrap();
        let elapsed = started.elapsed();
        assert_eq!(body, b"[]");
        assert_eq!(request_count(&server).await, 2);

        // reset is more than 1s ahead, plus the 1s margin
        assert!(elapsed >= Duration::from_secs(2), "retried after {:?}", elapsed);
        let earliest_retry = UNIX_EPOCH + Duration::from_secs(reset + 1);
        assert!(SystemTime::now() >= earliest_retry);
    }

    #[tokio::test]
    async fn test_fetch_json_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let result: Result<Vec<u32>, _> = client(1, None).fetch_json(&server.uri()).await;
        assert!(matches!(result, Err(FetchError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_fetch_page_omits_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/octo"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let page = client(1, Some("secret"))
            .fetch_page(&format!("{}/octo", server.uri()))
            .await
            .unwrap();
        assert_eq!(page, "<html></html>");
    }
}
