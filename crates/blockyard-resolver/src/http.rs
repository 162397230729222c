//! HTTP client with rate-limit aware retries
//!
//! Only rate-limit responses are retried: `429 Too Many Requests`, or a `403`
//! carrying `x-ratelimit-remaining: 0` (GitHub's signal). The delay comes from
//! `Retry-After` when present, otherwise the fixed backoff. Every other HTTP
//! failure is returned immediately.

use crate::error::{ResolveError, ResolveResult};
use bytes::Bytes;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_USER_AGENT: &str = concat!("blockyard/", env!("CARGO_PKG_VERSION"));

/// Retry policy for rate-limited requests
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Delay used when the server gives no `Retry-After`
    pub fixed_backoff: Duration,
    /// Upper bound on any server-specified delay
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            fixed_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, headers: &HeaderMap) -> Duration {
        headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(self.fixed_backoff)
            .min(self.max_backoff)
    }
}

/// Shared HTTP client used by every provider
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    retry: RetryPolicy,
    github_token: Option<String>,
}

impl HttpClient {
    pub fn new(
        user_agent: Option<&str>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> ResolveResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent.unwrap_or(DEFAULT_USER_AGENT))
            .build()
            .map_err(|e| ResolveError::Request {
                url: String::new(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            retry,
            github_token: None,
        })
    }

    /// Attach a bearer token sent to GitHub API hosts
    pub fn with_github_token(mut self, token: Option<String>) -> Self {
        self.github_token = token;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// GET `url` and return the body bytes
    pub async fn get_bytes(&self, url: &str) -> ResolveResult<Bytes> {
        let response = self.send(url).await?;
        response.bytes().await.map_err(|e| ResolveError::Request {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    /// GET `url` and decode a JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> ResolveResult<T> {
        let body = self.get_bytes(url).await?;
        serde_json::from_slice(&body).map_err(|e| ResolveError::InvalidResponse {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    async fn send(&self, url: &str) -> ResolveResult<Response> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let mut request = self.client.get(url);
            if let Some(token) = &self.github_token {
                if url.contains("api.github.com") {
                    request = request.bearer_auth(token);
                }
            }

            let response = request.send().await.map_err(|e| ResolveError::Request {
                url: url.to_string(),
                message: e.to_string(),
            })?;

            let status = response.status();
            if status.is_success() {
                debug!(url, attempt, "HTTP request succeeded");
                return Ok(response);
            }

            if !is_rate_limited(status, response.headers()) {
                return Err(ResolveError::Http {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            if attempt >= max_attempts {
                return Err(ResolveError::RateLimited {
                    url: url.to_string(),
                    attempts: attempt,
                });
            }

            let delay = self.retry.delay_for(response.headers());
            warn!(
                url,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Rate limited, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn is_rate_limited(status: StatusCode, headers: &HeaderMap) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    status == StatusCode::FORBIDDEN
        && headers
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim() == "0")
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap as AxumHeaders, StatusCode as AxumStatus};
    use axum::{routing::get, Router};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            fixed_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn test_retries_rate_limit_then_succeeds() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/jar",
            get(move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    let mut headers = AxumHeaders::new();
                    if n == 0 {
                        headers.insert("retry-after", "0".parse().unwrap());
                        (AxumStatus::TOO_MANY_REQUESTS, headers, Vec::new())
                    } else {
                        (AxumStatus::OK, headers, b"jar-bytes".to_vec())
                    }
                }
            }),
        );
        let base = serve(app).await;

        let client = HttpClient::new(None, Duration::from_secs(5), fast_policy(3)).unwrap();
        let body = client.get_bytes(&format!("{}/jar", base)).await.unwrap();
        assert_eq!(&body[..], b"jar-bytes");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rate_limit_attempts_are_bounded() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/jar",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    AxumStatus::TOO_MANY_REQUESTS
                }
            }),
        );
        let base = serve(app).await;

        let client = HttpClient::new(None, Duration::from_secs(5), fast_policy(2)).unwrap();
        let err = client.get_bytes(&format!("{}/jar", base)).await.unwrap_err();
        assert!(matches!(err, ResolveError::RateLimited { attempts: 2, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_other_failures_are_not_retried() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/jar",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    AxumStatus::NOT_FOUND
                }
            }),
        );
        let base = serve(app).await;

        let client = HttpClient::new(None, Duration::from_secs(5), fast_policy(3)).unwrap();
        let err = client.get_bytes(&format!("{}/jar", base)).await.unwrap_err();
        assert!(matches!(err, ResolveError::Http { status: 404, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_retry_after_is_capped() {
        let policy = fast_policy(3);
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "120".parse().unwrap());
        assert_eq!(policy.delay_for(&headers), Duration::from_millis(50));
        assert_eq!(policy.delay_for(&HeaderMap::new()), Duration::from_millis(10));
    }
}
