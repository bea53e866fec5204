//! HTTP retry helpers for transient errors.
//!
//! Feed adapters send every request through [`send_json`], which retries
//! timeouts, connection resets, HTTP 429 and HTTP 5xx with exponential
//! backoff. HTTP 4xx other than 429 is permanent and returned at once.
//!
//! Reads use [`RetryPolicy::READ`]. Writes use [`RetryPolicy::WRITE`],
//! which gives up quickly so the caller can fall back to a local entity
//! instead of leaving the user waiting.

use std::time::Duration;

use crate::FeedError;

/// Maximum length of the response body preview included in error logs.
const BODY_PREVIEW_LEN: usize = 500;

/// How many times, and how patiently, to retry a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Snapshot polling: 1s, 2s, 4s.
    pub const READ: Self = Self {
        max_retries: 3,
        base_delay: Duration::from_secs(1),
    };

    /// Submissions: one quick retry, then fall back.
    pub const WRITE: Self = Self {
        max_retries: 1,
        base_delay: Duration::from_millis(500),
    };

    /// Delay before retry number `attempt` (1-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
    }
}

/// Sends an HTTP request and parses the response body as JSON.
///
/// The `build_request` closure is called on each attempt to construct a
/// fresh [`reqwest::RequestBuilder`], since builders are consumed by
/// `.send()`.
///
/// # Errors
///
/// Returns [`FeedError`] if the request fails after all retries, the
/// server returns a non-retryable status code, or the body is not JSON.
pub async fn send_json<F>(policy: RetryPolicy, build_request: F) -> Result<serde_json::Value, FeedError>
where
    F: Fn() -> reqwest::RequestBuilder + Send + Sync,
{
    let response = send_inner(policy, &build_request).await?;
    let url = response.url().to_string();
    let status = response.status();
    let text = response.text().await?;

    serde_json::from_str(&text).map_err(|e| {
        let preview = if text.len() > BODY_PREVIEW_LEN {
            let end = (0..=BODY_PREVIEW_LEN)
                .rev()
                .find(|i| text.is_char_boundary(*i))
                .unwrap_or(0);
            format!("{}...", &text[..end])
        } else {
            text.clone()
        };
        log::warn!(
            "JSON parse failed\n  \
             url: {url}\n  \
             status: {status}\n  \
             received: {} bytes\n  \
             parse error: {e}\n  \
             body preview: {preview}",
            text.len(),
        );
        FeedError::Json(e)
    })
}

/// Core retry loop. Returns the first response with a 2xx or 3xx status.
async fn send_inner<F>(policy: RetryPolicy, build_request: &F) -> Result<reqwest::Response, FeedError>
where
    F: Fn() -> reqwest::RequestBuilder + Send + Sync,
{
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let delay = policy.delay(attempt);
            log::debug!("  retry {attempt}/{} in {delay:?}...", policy.max_retries);
            tokio::time::sleep(delay).await;
        }
        let can_retry = attempt < policy.max_retries;
        attempt += 1;

        match build_request().send().await {
            Err(e) => {
                if is_transient(&e) && can_retry {
                    log::debug!("  transient error: {e}");
                    continue;
                }
                return Err(FeedError::Http(e));
            }
            Ok(response) => {
                let status = response.status();

                if (status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error())
                    && can_retry
                {
                    log::debug!("  HTTP {status} (retryable)");
                    continue;
                }

                if status.is_client_error() || status.is_server_error() {
                    return Err(FeedError::Status {
                        status: status.as_u16(),
                        message: status
                            .canonical_reason()
                            .unwrap_or("request failed")
                            .to_string(),
                    });
                }

                return Ok(response);
            }
        }
    }
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::READ;
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(policy.delay(3), Duration::from_secs(4));
    }

    #[test]
    fn write_policy_is_short() {
        let total: Duration = (1..=RetryPolicy::WRITE.max_retries)
            .map(|attempt| RetryPolicy::WRITE.delay(attempt))
            .sum();
        assert!(total <= Duration::from_secs(1));
    }
}
