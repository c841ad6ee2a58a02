use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::retry::RetryConfig;
use crate::throttling::UpstreamGate;

/// Settings for [`PriceCache`](crate::PriceCache) and the resilient client behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// How long a fetched entry is served before it is refreshed.
    pub ttl: Duration,
    /// Overall timeout for one upstream fetch of a ticker set, retries included.
    pub request_timeout: Duration,
    /// Maximum concurrent provider calls across the process.
    pub max_concurrency: usize,
    /// Provider calls allowed per `quota_window`.
    pub quota_limit: u32,
    pub quota_window: Duration,
    pub retry: RetryConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 60 * 60),
            request_timeout: Duration::from_secs(30),
            max_concurrency: 4,
            quota_limit: 60,
            quota_window: Duration::from_secs(60),
            retry: RetryConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Defaults overridden by `FOLIO_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`CacheConfig::from_env`] with an injectable variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(secs) = read::<u64, _>(&lookup, "FOLIO_CACHE_TTL_SECS")? {
            config.ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = read::<u64, _>(&lookup, "FOLIO_REQUEST_TIMEOUT_SECS")? {
            let secs = positive("FOLIO_REQUEST_TIMEOUT_SECS", secs)?;
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(limit) = read::<usize, _>(&lookup, "FOLIO_MAX_CONCURRENCY")? {
            config.max_concurrency = positive("FOLIO_MAX_CONCURRENCY", limit)?;
        }
        if let Some(limit) = read::<u32, _>(&lookup, "FOLIO_QUOTA_LIMIT")? {
            config.quota_limit = positive("FOLIO_QUOTA_LIMIT", limit)?;
        }
        if let Some(attempts) = read::<u32, _>(&lookup, "FOLIO_RETRY_ATTEMPTS")? {
            config.retry = RetryConfig::with_attempts(positive("FOLIO_RETRY_ATTEMPTS", attempts)?);
        }

        Ok(config)
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Builds the shared gate described by these settings.
    pub fn gate(&self) -> UpstreamGate {
        UpstreamGate::new(self.max_concurrency, self.quota_window, self.quota_limit)
    }
}

fn read<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name, value: raw }),
    }
}

fn positive<T>(name: &'static str, value: T) -> Result<T, ConfigError>
where
    T: PartialEq + Default,
{
    if value == T::default() {
        return Err(ConfigError::NonPositive { name });
    }
    Ok(value)
}
