//! Retry logic with exponential backoff and jitter.
//!
//! [`RetryingSource`] wraps any [`PriceSource`] and replays retryable
//! failures (rate limits, transient outages) according to a [`RetryConfig`].
//! Every attempt passes through the shared [`UpstreamGate`] first, so retries
//! spend the same rate budget as first attempts.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::data_source::{HistoryRequest, PriceSource, SourceError, SourceFuture};
use crate::throttling::UpstreamGate;
use crate::{PriceSeries, Ticker};

/// Backoff strategy for retrying failed requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Uses a fixed delay between retries.
    Fixed {
        /// Delay between retries.
        delay: Duration,
    },
    /// Uses an exponential delay between retries.
    ///
    /// The delay is calculated as `base * (factor ^ attempt)`.
    Exponential {
        /// The initial backoff duration.
        base: Duration,
        /// The multiplicative factor for each subsequent retry.
        factor: f64,
        /// The maximum duration to wait between retries.
        max: Duration,
        /// Whether to apply random jitter (+/- 50%) to the delay.
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_secs(1),
            factor: 2.0,
            max: Duration::from_secs(16),
            jitter: true,
        }
    }
}

impl Backoff {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let seconds = base.as_secs_f64() * factor.powi(exponent);
                let capped_seconds = seconds.min(max.as_secs_f64());

                let mut delay = Duration::from_secs_f64(capped_seconds.max(0.0));

                if jitter {
                    let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                    let jitter_ms = millis / 2;
                    let offset = fastrand::u64(0..=jitter_ms.saturating_mul(2));
                    let total_ms = (millis + offset).saturating_sub(jitter_ms);
                    delay = Duration::from_millis(total_ms);
                }

                delay
            }
        }
    }
}

/// Configuration for the automatic retry mechanism.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Enables or disables the retry mechanism.
    pub enabled: bool,
    /// Total attempts = `max_retries + 1`.
    pub max_retries: u32,
    /// The backoff strategy to use between retries.
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 4,
            backoff: Backoff::default(),
        }
    }
}

impl RetryConfig {
    /// Exponential backoff allowing `attempts` calls in total.
    pub fn with_attempts(attempts: u32) -> Self {
        Self {
            max_retries: attempts.saturating_sub(1),
            ..Self::default()
        }
    }

    pub fn fixed(delay: Duration, max_retries: u32) -> Self {
        Self {
            enabled: true,
            max_retries,
            backoff: Backoff::Fixed { delay },
        }
    }

    pub fn no_retry() -> Self {
        Self {
            enabled: false,
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }

    fn allows_retry(&self, retries_done: u32, error: &SourceError) -> bool {
        self.enabled && error.retryable() && retries_done < self.max_retries
    }
}

/// Resilient client: a [`PriceSource`] that gates and retries an inner source.
///
/// Knows nothing about cache keys or expiry; the cache treats it like any
/// other provider.
#[derive(Clone)]
pub struct RetryingSource {
    inner: Arc<dyn PriceSource>,
    gate: UpstreamGate,
    config: RetryConfig,
}

impl RetryingSource {
    pub fn new(inner: Arc<dyn PriceSource>, gate: UpstreamGate, config: RetryConfig) -> Self {
        Self {
            inner,
            gate,
            config,
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    async fn fetch_history(&self, req: HistoryRequest) -> Result<PriceSeries, SourceError> {
        let mut retries = 0_u32;
        loop {
            let result = {
                let _permit = self.gate.acquire().await?;
                self.inner.history(req.clone()).await
            };

            match result {
                Ok(series) => return Ok(series),
                Err(error) if self.config.allows_retry(retries, &error) => {
                    let delay = self.config.delay_for_attempt(retries);
                    retries += 1;
                    warn!(
                        source = self.inner.name(),
                        ticker = %req.ticker,
                        attempt = retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "history fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    debug!(
                        source = self.inner.name(),
                        ticker = %req.ticker,
                        retries,
                        code = error.code(),
                        "history fetch gave up"
                    );
                    return Err(error);
                }
            }
        }
    }

    async fn probe_ticker(&self, ticker: Ticker) -> Result<bool, SourceError> {
        let mut retries = 0_u32;
        loop {
            let result = {
                let _permit = self.gate.acquire().await?;
                self.inner.probe(ticker.clone()).await
            };

            match result {
                Err(error) if self.config.allows_retry(retries, &error) => {
                    let delay = self.config.delay_for_attempt(retries);
                    retries += 1;
                    warn!(
                        source = self.inner.name(),
                        ticker = %ticker,
                        attempt = retries,
                        error = %error,
                        "ticker probe failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

impl PriceSource for RetryingSource {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn history<'a>(&'a self, req: HistoryRequest) -> SourceFuture<'a, PriceSeries> {
        Box::pin(self.fetch_history(req))
    }

    fn probe<'a>(&'a self, ticker: Ticker) -> SourceFuture<'a, bool> {
        Box::pin(self.probe_ticker(ticker))
    }
}
