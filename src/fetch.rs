// src/fetch.rs
//! Resilient HTTP fetch: per-attempt timeout, capped retries, linear backoff.
//!
//! Every source adapter and the Telegram notifier go through [`FetchClient`],
//! so retry policy lives in exactly one place.

use std::time::Duration;

use metrics::counter;
use reqwest::{header, Client, Method};
use serde::de::DeserializeOwned;
use thiserror::Error;

pub const DEFAULT_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 800;
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; econ-calendar-digest/0.1)";

/// Max chars of a non-2xx body kept in the error.
const STATUS_EXCERPT_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
        }
    }
}

impl FetchPolicy {
    pub fn from_millis(timeout_ms: u64, max_retries: u32, backoff_base_ms: u64) -> Self {
        Self {
            timeout: Duration::from_millis(timeout_ms),
            max_retries,
            backoff_base: Duration::from_millis(backoff_base_ms),
        }
    }

    /// Delay slept after the `attempt`-th failure (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(attempt)
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} timed out after {timeout_ms} ms")]
    Timeout { url: String, timeout_ms: u64 },
    #[error("{url} returned HTTP {status}: {excerpt}")]
    Status {
        url: String,
        status: u16,
        excerpt: String,
    },
    #[error("transport error for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    pub fn url(&self) -> &str {
        match self {
            FetchError::Timeout { url, .. }
            | FetchError::Status { url, .. }
            | FetchError::Transport { url, .. }
            | FetchError::Decode { url, .. } => url,
        }
    }
}

/// Description of one request. Rebuilt into a fresh `reqwest` request per attempt.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    method: Method,
    url: String,
    headers: Vec<(header::HeaderName, String)>,
    form: Option<Vec<(String, String)>>,
    /// Shown in logs and errors instead of `url` when the URL carries a secret.
    label: Option<String>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: Vec::new(),
            form: None,
            label: None,
        }
    }

    pub fn post_form<K, V>(url: impl Into<String>, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            method: Method::POST,
            url: url.into(),
            headers: Vec::new(),
            form: Some(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
            label: None,
        }
    }

    pub fn header(mut self, name: header::HeaderName, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// Never log or report the real URL of this request; use `label` instead.
    pub fn redacted(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// The URL as it may appear in logs and errors.
    pub fn display_url(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.url)
    }
}

/// Fully read response of a successful attempt.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Clone)]
pub struct FetchClient {
    client: Client,
    policy: FetchPolicy,
    user_agent: String,
}

impl FetchClient {
    pub fn new(policy: FetchPolicy) -> Self {
        Self {
            client: Client::new(),
            policy,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    pub fn with_user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = ua.into();
        self
    }

    pub fn policy(&self) -> FetchPolicy {
        self.policy
    }

    /// Run `req` with the configured timeout/retry policy. The error of the
    /// final attempt is returned once all attempts are used up.
    pub async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let attempts = self.policy.total_attempts();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            counter!("fetch_attempts_total").increment(1);

            match self.attempt_once(req).await {
                Ok(rsp) => {
                    tracing::debug!(target: "fetch", url = req.display_url(), attempt, status = rsp.status, "fetch ok");
                    return Ok(rsp);
                }
                Err(e) => {
                    counter!("fetch_failures_total").increment(1);
                    if attempt >= attempts {
                        tracing::warn!(target: "fetch", url = req.display_url(), attempt, error = %e, "fetch failed, no retries left");
                        return Err(e);
                    }
                    let delay = self.policy.backoff_for(attempt);
                    tracing::warn!(
                        target: "fetch",
                        url = req.display_url(),
                        attempt,
                        of = attempts,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "fetch attempt failed"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    pub async fn fetch_text(&self, req: &FetchRequest) -> Result<String, FetchError> {
        Ok(self.fetch(req).await?.body)
    }

    /// Fetch and decode JSON. A decode failure is not retried.
    pub async fn fetch_json<T: DeserializeOwned>(&self, req: &FetchRequest) -> Result<T, FetchError> {
        let body = self.fetch_text(req).await?;
        serde_json::from_str(&body).map_err(|source| FetchError::Decode {
            url: req.display_url().to_string(),
            source,
        })
    }

    async fn attempt_once(&self, req: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let mut builder = self
            .client
            .request(req.method.clone(), &req.url)
            .header(header::USER_AGENT, &self.user_agent);
        for (name, value) in &req.headers {
            builder = builder.header(name.clone(), value.as_str());
        }
        if let Some(form) = &req.form {
            builder = builder.form(form);
        }

        let url = req.display_url().to_string();
        let redacted = req.label.is_some();
        let transport = move |source: reqwest::Error, url: &str| FetchError::Transport {
            url: url.to_string(),
            source: if redacted { source.without_url() } else { source },
        };
        let work = async move {
            let rsp = builder.send().await.map_err(|e| transport(e, &url))?;
            let status = rsp.status();
            let body = rsp.text().await.map_err(|e| transport(e, &url))?;
            if !status.is_success() {
                return Err(FetchError::Status {
                    url,
                    status: status.as_u16(),
                    excerpt: body.chars().take(STATUS_EXCERPT_CHARS).collect(),
                });
            }
            Ok(FetchResponse {
                status: status.as_u16(),
                body,
            })
        };

        // Dropping `work` on elapse aborts the in-flight request.
        match tokio::time::timeout(self.policy.timeout, work).await {
            Ok(res) => res,
            Err(_) => Err(FetchError::Timeout {
                url: req.display_url().to_string(),
                timeout_ms: self.policy.timeout.as_millis() as u64,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_linear_in_attempt_number() {
        let p = FetchPolicy::from_millis(1_000, 3, 250);
        assert_eq!(p.backoff_for(1), Duration::from_millis(250));
        assert_eq!(p.backoff_for(2), Duration::from_millis(500));
        assert_eq!(p.backoff_for(3), Duration::from_millis(750));
        assert_eq!(p.total_attempts(), 4);
    }

    #[test]
    fn post_form_keeps_pairs_in_order() {
        let req = FetchRequest::post_form("http://x/send", [("chat_id", "1"), ("text", "hi")]);
        assert_eq!(req.method, Method::POST);
        assert_eq!(req.display_url(), "http://x/send");
        assert_eq!(
            req.form.as_deref(),
            Some(&[("chat_id".to_string(), "1".to_string()), ("text".to_string(), "hi".to_string())][..])
        );
    }

    #[test]
    fn redacted_request_hides_its_url() {
        let req = FetchRequest::get("http://api/bot1:SECRET/sendMessage").redacted("telegram sendMessage");
        assert_eq!(req.display_url(), "telegram sendMessage");
        assert_eq!(req.url, "http://api/bot1:SECRET/sendMessage");
    }
}
