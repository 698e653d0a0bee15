//! Blocking HTTP client for the GCPathogen endpoint. Enforces a pacing delay
//! between requests and applies an explicit, configurable retry policy.

use std::time::{Duration, Instant};

use serde_json::Value;

use crate::harvest::error::TransportError;
use crate::harvest::request::{referer_for, PageRequest};
use crate::harvest::PageSource;

const DEFAULT_ENDPOINT: &str = "https://nmdc.cn/gcpathogenapi/species/getallmetatable";
const DEFAULT_ORIGIN: &str = "https://nmdc.cn";
const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DELAY_MS: u64 = 500;
const MAX_REDIRECTS: usize = 10;

/// Retry policy for transient page failures. The endpoint is harvested
/// skip-not-retry by default, so `attempts` defaults to 1 (no retry); raising
/// it opts in to backoff retries for timeouts, connection errors, 5xx, and 429.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff_secs: Vec<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 1,
            backoff_secs: Vec::new(),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (0-based). The last configured
    /// value is reused when attempts outnumber configured delays.
    fn backoff_for(&self, attempt: u32) -> Duration {
        let secs = self
            .backoff_secs
            .get(attempt as usize)
            .or_else(|| self.backoff_secs.last())
            .copied()
            .unwrap_or(1);
        Duration::from_secs(secs)
    }
}

/// Blocking client that POSTs page queries and paces successive requests.
#[derive(Debug)]
pub struct ApiClient {
    inner: reqwest::blocking::Client,
    endpoint: String,
    delay: Duration,
    last_request: Option<Instant>,
    retry: RetryPolicy,
}

impl ApiClient {
    /// Build a client with default endpoint, User-Agent, timeout, and pacing.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::builder().build()
    }

    /// Builder for custom endpoint, User-Agent, pacing, timeout, or retries.
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// POST one page query. Sleeps until the pacing delay has passed since the
    /// last request; retries transient failures per the retry policy.
    pub fn post_page(&mut self, request: &PageRequest) -> Result<Value, TransportError> {
        let policy = self.retry.clone();
        run_with_retry(&policy, || {
            self.wait_delay();
            let result = self.send_once(request);
            self.last_request = Some(Instant::now());
            result
        })
    }

    fn send_once(&self, request: &PageRequest) -> Result<Value, TransportError> {
        let response = self
            .inner
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "application/json, text/plain, */*")
            .header(reqwest::header::ORIGIN, DEFAULT_ORIGIN)
            .header(reqwest::header::REFERER, referer_for(request.category))
            .json(&request.payload())
            .send()
            .map_err(|e| TransportError::Network {
                url: self.endpoint.clone(),
                source: e,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::HttpStatus {
                status: status.as_u16(),
                url: self.endpoint.clone(),
                page: request.page,
            });
        }
        response.json().map_err(|e| TransportError::BodyDecode {
            page: request.page,
            source: e,
        })
    }

    fn wait_delay(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.delay {
                std::thread::sleep(self.delay - elapsed);
            }
        }
    }
}

/// Drive one send attempt under the retry policy: transient failures are
/// retried with backoff until the attempt budget runs out; anything else is
/// returned immediately.
fn run_with_retry<F>(policy: &RetryPolicy, mut send: F) -> Result<Value, TransportError>
where
    F: FnMut() -> Result<Value, TransportError>,
{
    let max_attempts = policy.attempts.max(1);
    let mut attempt = 0;
    loop {
        match send() {
            Ok(envelope) => return Ok(envelope),
            Err(e) if e.is_transient() && attempt + 1 < max_attempts => {
                std::thread::sleep(policy.backoff_for(attempt));
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

impl PageSource for ApiClient {
    fn fetch_page(&mut self, request: &PageRequest) -> Result<Value, TransportError> {
        self.post_page(request)
    }
}

/// Builder for [ApiClient].
#[derive(Debug)]
pub struct ApiClientBuilder {
    endpoint: String,
    user_agent: Option<String>,
    delay_ms: u64,
    timeout_secs: u64,
    retry: RetryPolicy,
}

impl Default for ApiClientBuilder {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            user_agent: None,
            delay_ms: DEFAULT_DELAY_MS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retry: RetryPolicy::default(),
        }
    }
}

impl ApiClientBuilder {
    /// Override the endpoint URL (useful for testing against a local server).
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = url.into();
        self
    }

    /// Set a custom User-Agent. If not set, a browser-like default is used.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Pacing delay between requests in milliseconds. Default 500.
    pub fn delay_ms(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    /// Request timeout in seconds. Default 30.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Total attempts per page (1 = no retry, the default).
    pub fn attempts(mut self, n: u32) -> Self {
        self.retry.attempts = n.max(1);
        self
    }

    /// Backoff delays in seconds before each retry. If shorter than the number
    /// of retries, the last value is reused.
    pub fn retry_backoff_secs(mut self, secs: Vec<u64>) -> Self {
        self.retry.backoff_secs = secs;
        self
    }

    /// Build the blocking client and pacing wrapper.
    pub fn build(self) -> Result<ApiClient, reqwest::Error> {
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let inner = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(self.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(ApiClient {
            inner,
            endpoint: self.endpoint,
            delay: Duration::from_millis(self.delay_ms),
            last_request: None,
            retry: self.retry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_single_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts, 1);
        assert!(policy.backoff_secs.is_empty());
    }

    #[test]
    fn backoff_reuses_last_value_when_exhausted() {
        let policy = RetryPolicy {
            attempts: 5,
            backoff_secs: vec![1, 2],
        };
        assert_eq!(policy.backoff_for(0), Duration::from_secs(1));
        assert_eq!(policy.backoff_for(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_for(3), Duration::from_secs(2));
    }

    #[test]
    fn backoff_defaults_to_one_second_when_unconfigured() {
        let policy = RetryPolicy {
            attempts: 3,
            backoff_secs: Vec::new(),
        };
        assert_eq!(policy.backoff_for(0), Duration::from_secs(1));
    }

    #[test]
    fn builder_clamps_attempts_to_at_least_one() {
        let builder = ApiClient::builder().attempts(0);
        assert_eq!(builder.retry.attempts, 1);
    }

    fn http_err(status: u16) -> TransportError {
        TransportError::HttpStatus {
            status,
            url: "http://test".into(),
            page: 1,
        }
    }

    #[test]
    fn retry_recovers_from_transient_failure() {
        let policy = RetryPolicy {
            attempts: 3,
            backoff_secs: vec![0],
        };
        let mut calls = 0;
        let result = run_with_retry(&policy, || {
            calls += 1;
            if calls == 1 {
                Err(http_err(503))
            } else {
                Ok(serde_json::json!({"ok": true}))
            }
        });
        assert_eq!(calls, 2);
        assert_eq!(result.unwrap()["ok"], true);
    }

    #[test]
    fn non_transient_failure_returns_immediately() {
        let policy = RetryPolicy {
            attempts: 3,
            backoff_secs: vec![0],
        };
        let mut calls = 0;
        let result = run_with_retry(&policy, || {
            calls += 1;
            Err(http_err(404))
        });
        assert_eq!(calls, 1);
        assert!(result.is_err());
    }

    #[test]
    fn retry_stops_after_attempt_budget() {
        let policy = RetryPolicy {
            attempts: 2,
            backoff_secs: vec![0],
        };
        let mut calls = 0;
        let result = run_with_retry(&policy, || {
            calls += 1;
            Err(http_err(503))
        });
        assert_eq!(calls, 2);
        assert!(result.is_err());
    }

    #[test]
    fn default_policy_never_retries() {
        let policy = RetryPolicy::default();
        let mut calls = 0;
        let result = run_with_retry(&policy, || {
            calls += 1;
            Err(http_err(503))
        });
        assert_eq!(calls, 1);
        assert!(result.is_err());
    }
}
