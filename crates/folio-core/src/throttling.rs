use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::data_source::SourceError;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Process-wide gate in front of the upstream provider.
///
/// Bounds the number of concurrent provider calls with a semaphore and paces
/// their start times with a governor quota. Cloning shares the same budget.
#[derive(Clone)]
pub struct UpstreamGate {
    permits: Arc<Semaphore>,
    limiter: Option<Arc<DirectRateLimiter>>,
}

/// Held for the duration of one provider call.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl UpstreamGate {
    pub fn new(max_concurrency: usize, quota_window: Duration, quota_limit: u32) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
            limiter: Some(Arc::new(RateLimiter::direct(quota_from_window(
                quota_window,
                quota_limit,
            )))),
        }
    }

    /// Gate with no rate quota and effectively no concurrency bound.
    pub fn unlimited() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(Semaphore::MAX_PERMITS)),
            limiter: None,
        }
    }

    /// Waits for a concurrency slot, then for rate budget.
    pub async fn acquire(&self) -> Result<GatePermit, SourceError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| SourceError::internal("upstream gate closed"))?;

        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        Ok(GatePermit { _permit: permit })
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

fn quota_from_window(quota_window: Duration, quota_limit: u32) -> Quota {
    let burst = NonZeroU32::new(quota_limit).unwrap_or(NonZeroU32::MIN);

    let seconds_per_cell = (quota_window.as_secs_f64() / f64::from(burst.get())).max(0.001);
    let period = Duration::from_secs_f64(seconds_per_cell);

    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn permits_are_returned_on_drop() {
        let gate = UpstreamGate::new(2, Duration::from_secs(60), 100);

        let first = gate.acquire().await.expect("slot available");
        let second = gate.acquire().await.expect("slot available");
        assert_eq!(gate.available_permits(), 0);

        drop(first);
        assert_eq!(gate.available_permits(), 1);
        drop(second);
        assert_eq!(gate.available_permits(), 2);
    }

    #[tokio::test]
    async fn clones_share_the_same_budget() {
        let gate = UpstreamGate::new(1, Duration::from_secs(60), 100);
        let clone = gate.clone();

        let _held = gate.acquire().await.expect("slot available");
        assert_eq!(clone.available_permits(), 0);
    }

    #[test]
    fn zero_quota_limit_is_clamped_to_one() {
        let quota = quota_from_window(Duration::from_secs(10), 0);
        assert_eq!(quota.burst_size().get(), 1);
    }
}
