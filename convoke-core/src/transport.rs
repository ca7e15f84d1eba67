//! Transport & Retry
//!
//! Issues the HTTP call for a built wire request, classifies non-2xx
//! failures into the typed taxonomy, and retries only the rate-limited class
//! with exponential backoff.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{Provider, RetryConfig};
use crate::error::{Error, Result};

const TIMEOUT_SECONDS: u64 = 60;

// ---------------------------------------------------------------------------
// Error classification
// ---------------------------------------------------------------------------

/// Map an HTTP status and body to a typed error.
pub fn classify_status(status: u16, body: &str) -> Error {
    match status {
        401 => Error::Auth {
            status,
            message: "check that the API key is correct".into(),
        },
        403 => Error::Auth {
            status,
            message: "the API key lacks access to this resource".into(),
        },
        404 => Error::UnknownModel {
            message: "check that the model name is correct".into(),
        },
        429 => Error::RateLimited {
            message: Error::body_snippet(body),
        },
        500..=599 => Error::Upstream {
            status,
            message: Error::body_snippet(body),
        },
        _ => Error::Upstream {
            status,
            message: extract_error_message(body)
                .unwrap_or_else(|| Error::body_snippet(body)),
        },
    }
}

/// Pull `error.message` out of a JSON error body when present.
fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("error")?
        .get("message")?
        .as_str()
        .map(|s| s.to_string())
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Backoff schedule for rate-limited calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.backoff_multiplier,
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the given attempt (1-indexed).
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        let millis =
            self.base_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32 - 1);
        let clamped = millis.min(self.max_delay.as_millis() as f64) as u64;
        Duration::from_millis(clamped)
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// HTTP transport for provider calls.
pub struct Transport {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl Transport {
    pub fn new(policy: RetryPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(TIMEOUT_SECONDS))
            .timeout(Duration::from_secs(TIMEOUT_SECONDS))
            .build()?;
        Ok(Self { client, policy })
    }

    /// POST a wire request and return the raw response body.
    ///
    /// Rate-limited attempts are retried with exponential backoff up to the
    /// policy's attempt budget; every other failure class surfaces
    /// immediately.
    pub async fn send(
        &self,
        url: &str,
        provider: Provider,
        api_key: &str,
        body: &Value,
    ) -> Result<String> {
        let mut attempt = 1;
        loop {
            match self.send_once(url, provider, api_key, body).await {
                Ok(response) => return Ok(response),
                Err(Error::RateLimited { message }) => {
                    if attempt >= self.policy.max_attempts {
                        warn!(url, attempts = attempt, "rate-limit retry budget exhausted");
                        return Err(Error::RetriesExhausted { attempts: attempt });
                    }
                    let delay = self.policy.delay_after_attempt(attempt);
                    warn!(
                        url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %message,
                        "rate limited, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(other) => return Err(other),
            }
        }
    }

    async fn send_once(
        &self,
        url: &str,
        provider: Provider,
        api_key: &str,
        body: &Value,
    ) -> Result<String> {
        let (header_name, header_value) = provider.auth_header(api_key);
        debug!(url, "sending model request");

        let response = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .header(header_name, header_value)
            .json(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await?;
        if !(200..300).contains(&status) {
            return Err(classify_status(status, &text));
        }
        Ok(text)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
