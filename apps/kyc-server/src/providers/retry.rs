// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Timeout, rate-limit and exponential-backoff policy for vendor calls.
//!
//! | Response | Behaviour |
//! |----------|-----------|
//! | 2xx / 3xx | returned |
//! | 429 | wait `Retry-After` (or the default delay), one extra retry allowed |
//! | 5xx, timeout, transport error | wait `base_delay * 2^attempt`, retry up to `max_retries` |
//! | other 4xx | returned immediately as [`ProviderError::Rejected`] |

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use tracing::warn;

use super::{redact_body, ProviderError, ProviderKind};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_secs(5);
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    /// Retries after the first attempt. A 429 grants one more.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub rate_limit_delay: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            rate_limit_delay: DEFAULT_RATE_LIMIT_DELAY,
            max_backoff: MAX_BACKOFF,
        }
    }
}

/// Buffered vendor response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl RetryPolicy {
    /// Exponential backoff for the given zero-based retry, capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Run `send` until it succeeds, fails permanently or the budget runs out.
    ///
    /// `send` is invoked once per attempt so request bodies and signatures
    /// are rebuilt each time.
    pub async fn execute<F, Fut, E>(
        &self,
        provider: ProviderKind,
        operation: &'static str,
        mut send: F,
    ) -> Result<RawResponse, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<RawResponse, E>>,
        E: Display,
    {
        let mut retries: u32 = 0;
        loop {
            let attempt = retries + 1;
            let (delay, detail, rate_limited) =
                match tokio::time::timeout(self.timeout, send()).await {
                    Err(_) => (
                        self.backoff(retries),
                        format!("timed out after {}s", self.timeout.as_secs()),
                        false,
                    ),
                    Ok(Err(e)) => (self.backoff(retries), format!("transport error: {e}"), false),
                    Ok(Ok(response)) => {
                        let status = response.status;
                        if status.is_success() || status.is_redirection() {
                            return Ok(response);
                        }
                        if status == StatusCode::TOO_MANY_REQUESTS {
                            let delay = response
                                .header("retry-after")
                                .and_then(|v| parse_retry_after(v, Utc::now()))
                                .unwrap_or(self.rate_limit_delay);
                            (delay, "rate limited (HTTP 429)".to_string(), true)
                        } else if status.is_server_error() {
                            (
                                self.backoff(retries),
                                format!("HTTP {}: {}", status.as_u16(), redact_body(&response.body)),
                                false,
                            )
                        } else {
                            return Err(ProviderError::Rejected {
                                provider,
                                operation,
                                status: status.as_u16(),
                                detail: redact_body(&response.body),
                            });
                        }
                    }
                };

            let budget = self.max_retries + u32::from(rate_limited);
            if retries >= budget {
                return Err(ProviderError::Exhausted {
                    provider,
                    operation,
                    attempts: attempt,
                    detail,
                });
            }

            warn!(
                provider = %provider,
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                reason = %detail,
                "vendor call failed, retrying"
            );
            tokio::time::sleep(delay).await;
            retries += 1;
        }
    }
}

/// Parse a `Retry-After` value: delta seconds or an HTTP date.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}
