//! TTL cache in front of the price provider.
//!
//! Entries are keyed by the sorted ticker set plus the lookback window and
//! refreshed lazily on the first access after expiry. Concurrent misses on the
//! same key share one upstream fetch. When a refresh fails and an expired entry
//! is still held, the expired entry is served with `stale = true`.

use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use time::OffsetDateTime;
use tokio::sync::{OnceCell, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::data_source::{HistoryRequest, PriceSource, SourceError, SourceErrorKind};
use crate::error::CacheError;
use crate::retry::RetryingSource;
use crate::{Lookback, PriceSeries, Ticker, ValidationError};

/// Identity of a cached payload: sorted, de-duplicated tickers plus the window.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    tickers: Vec<Ticker>,
    lookback: Lookback,
}

impl CacheKey {
    pub fn new(tickers: &[Ticker], lookback: Lookback) -> Self {
        let mut tickers = tickers.to_vec();
        tickers.sort();
        tickers.dedup();
        Self { tickers, lookback }
    }

    pub fn tickers(&self) -> &[Ticker] {
        &self.tickers
    }

    pub const fn lookback(&self) -> Lookback {
        self.lookback
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (index, ticker) in self.tickers.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            f.write_str(ticker.as_str())?;
        }
        write!(f, "@{}", self.lookback)
    }
}

#[derive(Debug)]
struct CacheEntry {
    prices: Arc<BTreeMap<Ticker, PriceSeries>>,
    fetched_at: Instant,
    fetched_on: OffsetDateTime,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

/// Price series for one request, as served by the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedPrices {
    prices: Arc<BTreeMap<Ticker, PriceSeries>>,
    fetched_on: OffsetDateTime,
    stale: bool,
}

impl CachedPrices {
    fn from_entry(entry: &CacheEntry, stale: bool) -> Self {
        Self {
            prices: Arc::clone(&entry.prices),
            fetched_on: entry.fetched_on,
            stale,
        }
    }

    pub fn get(&self, ticker: &Ticker) -> Option<&PriceSeries> {
        self.prices.get(ticker)
    }

    pub fn series(&self) -> &BTreeMap<Ticker, PriceSeries> {
        &self.prices
    }

    /// True when the upstream refresh failed and an expired entry was served.
    pub const fn is_stale(&self) -> bool {
        self.stale
    }

    /// Wall-clock time the payload was fetched from the provider.
    pub const fn fetched_on(&self) -> OffsetDateTime {
        self.fetched_on
    }
}

type FetchOutcome = Result<CachedPrices, CacheError>;

/// Process-owned price cache with single-flight refresh.
pub struct PriceCache {
    source: RetryingSource,
    config: CacheConfig,
    entries: RwLock<HashMap<CacheKey, Arc<CacheEntry>>>,
    in_flight: Mutex<HashMap<CacheKey, Arc<OnceCell<FetchOutcome>>>>,
}

impl PriceCache {
    /// Wraps `source` in a retrying, gated client built from `config`.
    pub fn new(source: Arc<dyn PriceSource>, config: CacheConfig) -> Self {
        let client = RetryingSource::new(source, config.gate(), config.retry.clone());
        Self {
            source: client,
            config,
            entries: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Price series for every ticker in `tickers` over `lookback`.
    ///
    /// # Errors
    ///
    /// - [`CacheError::Validation`] when the provider does not know a ticker
    /// - [`CacheError::DataUnavailable`] when retries are exhausted and no
    ///   earlier entry exists for the key
    pub async fn fetch(&self, tickers: &[Ticker], lookback: Lookback) -> FetchOutcome {
        if tickers.is_empty() {
            return Err(ValidationError::TooFewTickers { count: 0, min: 1 }.into());
        }

        let key = CacheKey::new(tickers, lookback);
        if let Some(hit) = self.fresh(&key).await {
            debug!(key = %key, "price cache hit");
            return Ok(hit);
        }

        let cell = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(
                in_flight
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(OnceCell::new())),
            )
        };

        let outcome = cell.get_or_init(|| self.load(&key)).await.clone();

        {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            if in_flight
                .get(&key)
                .is_some_and(|current| Arc::ptr_eq(current, &cell))
            {
                in_flight.remove(&key);
            }
        }

        outcome
    }

    /// Short-range existence probe. Not cached.
    pub async fn validate(&self, ticker: &Ticker) -> Result<bool, CacheError> {
        match self.source.probe(ticker.clone()).await {
            Ok(exists) => Ok(exists),
            Err(error) if error.kind() == SourceErrorKind::NotFound => Ok(false),
            Err(error) => Err(CacheError::DataUnavailable {
                tickers: ticker.to_string(),
                reason: error.to_string(),
            }),
        }
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    async fn fresh(&self, key: &CacheKey) -> Option<CachedPrices> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.is_fresh(self.config.ttl))
            .map(|entry| CachedPrices::from_entry(entry, false))
    }

    async fn load(&self, key: &CacheKey) -> FetchOutcome {
        // A previous flight may have refreshed the entry while this one queued.
        if let Some(hit) = self.fresh(key).await {
            return Ok(hit);
        }

        let previous = self.entries.read().await.get(key).cloned();
        debug!(key = %key, expired = previous.is_some(), "price cache miss");

        let started = Instant::now();
        let upstream = tokio::time::timeout(self.config.request_timeout, self.fetch_upstream(key));
        let reason = match upstream.await {
            Ok(Ok(prices)) => {
                let entry = Arc::new(CacheEntry {
                    prices: Arc::new(prices),
                    fetched_at: Instant::now(),
                    fetched_on: OffsetDateTime::now_utc(),
                });
                self.entries
                    .write()
                    .await
                    .insert(key.clone(), Arc::clone(&entry));
                info!(
                    key = %key,
                    elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "fetched fresh prices"
                );
                return Ok(CachedPrices::from_entry(&entry, false));
            }
            Ok(Err(UpstreamFailure::UnknownTicker(ticker))) => {
                return Err(ValidationError::UnknownTicker {
                    ticker: ticker.to_string(),
                }
                .into());
            }
            Ok(Err(UpstreamFailure::Source(error))) => error.to_string(),
            Err(_) => format!(
                "upstream fetch timed out after {}s",
                self.config.request_timeout.as_secs_f64()
            ),
        };

        match previous {
            Some(entry) => {
                warn!(
                    key = %key,
                    reason = %reason,
                    "upstream refresh failed, serving stale prices"
                );
                Ok(CachedPrices::from_entry(&entry, true))
            }
            None => {
                warn!(key = %key, reason = %reason, "upstream fetch failed with nothing cached");
                Err(CacheError::DataUnavailable {
                    tickers: key
                        .tickers()
                        .iter()
                        .map(Ticker::as_str)
                        .collect::<Vec<_>>()
                        .join(", "),
                    reason,
                })
            }
        }
    }

    async fn fetch_upstream(
        &self,
        key: &CacheKey,
    ) -> Result<BTreeMap<Ticker, PriceSeries>, UpstreamFailure> {
        let mut tasks = JoinSet::new();
        for ticker in key.tickers() {
            let source = self.source.clone();
            let request = HistoryRequest::new(ticker.clone(), key.lookback());
            tasks.spawn(async move {
                let ticker = request.ticker.clone();
                (ticker, source.history(request).await)
            });
        }

        let mut prices = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            let (ticker, result) = joined.map_err(|e| {
                UpstreamFailure::Source(SourceError::internal(format!("fetch task failed: {e}")))
            })?;

            match result {
                Ok(series) if series.is_empty() => {
                    return Err(UpstreamFailure::UnknownTicker(ticker));
                }
                Ok(series) => {
                    prices.insert(ticker, series);
                }
                Err(error) if error.kind() == SourceErrorKind::NotFound => {
                    return Err(UpstreamFailure::UnknownTicker(ticker));
                }
                Err(error) => return Err(UpstreamFailure::Source(error)),
            }
        }

        Ok(prices)
    }
}

enum UpstreamFailure {
    UnknownTicker(Ticker),
    Source(SourceError),
}
