//! Per-provider request pacing with cancellable retries
//!
//! A [`RateLimiter`] combines three things:
//! - a governor token bucket enforcing the minimum gap between request starts
//! - a semaphore bounding requests in flight
//! - a retry loop with linear, capped and jittered backoff for
//!   transient and rate-limited failures
//!
//! Every wait races the run's cancellation token.

use governor::{
    clock::QuantaClock,
    state::{InMemoryState, NotKeyed},
    Quota,
};
use rand::Rng;
use robodigest_common::config::RateLimitPolicy;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::errors::FetchError;

type Gate = governor::RateLimiter<NotKeyed, InMemoryState, QuantaClock>;

/// Slot held while a request is in flight
#[derive(Debug)]
pub struct Permit {
    _permit: OwnedSemaphorePermit,
}

pub struct RateLimiter {
    name: &'static str,
    policy: RateLimitPolicy,
    gate: Option<Gate>,
    permits: Arc<Semaphore>,
    backoff_unit: Duration,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .finish()
    }
}

impl RateLimiter {
    pub fn new(name: &'static str, policy: RateLimitPolicy) -> Self {
        // A zero interval means no pacing gate
        let gate = Quota::with_period(policy.min_interval()).map(Gate::direct);
        Self {
            name,
            policy,
            gate,
            permits: Arc::new(Semaphore::new(policy.concurrency.max(1))),
            backoff_unit: Duration::from_secs(1),
        }
    }

    /// Scale applied to [`FetchError::backoff_base`]; one second by default
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Wait for a concurrency slot and the next pacing tick.
    ///
    /// Dropping the returned permit releases the slot.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<Permit, FetchError> {
        let permit = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            permit = self.permits.clone().acquire_owned() => permit
                .map_err(|_| FetchError::Config(format!("{} limiter closed", self.name)))?,
        };

        if let Some(gate) = &self.gate {
            tokio::select! {
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = gate.until_ready() => {}
            }
        }

        let jitter = self.jitter();
        if !jitter.is_zero() {
            sleep_or_cancel(jitter, cancel).await?;
        }

        Ok(Permit { _permit: permit })
    }

    /// Run `op` under the limiter, retrying retryable failures up to
    /// `max_retries` times.
    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let max_retries = self.policy.max_retries;
        let mut attempt = 0u32;

        loop {
            let permit = self.acquire(cancel).await?;
            let result = tokio::select! {
                _ = cancel.cancelled() => Err(FetchError::Cancelled),
                result = op() => result,
            };
            drop(permit);

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < max_retries => {
                    attempt += 1;
                    let delay = self.backoff_delay(&e, attempt);
                    tracing::warn!(
                        source = self.name,
                        attempt,
                        max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Upstream request failed, retrying"
                    );
                    sleep_or_cancel(delay, cancel).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn backoff_delay(&self, error: &FetchError, attempt: u32) -> Duration {
        let base = error.backoff_base().unwrap_or(1) as u32;
        let mut delay = self.backoff_unit.saturating_mul(base.saturating_mul(attempt));
        if let FetchError::RateLimited {
            retry_after: Some(hint),
            ..
        } = error
        {
            delay = delay.max(*hint);
        }
        delay.min(Duration::from_secs(self.policy.backoff_cap_secs)) + self.jitter()
    }

    fn jitter(&self) -> Duration {
        if self.policy.jitter_ms == 0 {
            return Duration::ZERO;
        }
        let ms = rand::thread_rng().gen_range(0..=self.policy.jitter_ms);
        Duration::from_millis(ms)
    }
}

/// Sleep unless the token fires first
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> Result<(), FetchError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(FetchError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    fn limiter(min_interval_ms: u64, max_retries: u32) -> RateLimiter {
        RateLimiter::new("test", RateLimitPolicy::new(min_interval_ms, max_retries, 0, 1))
            .with_backoff_unit(Duration::from_millis(2))
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let limiter = limiter(0, 3);
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let value = limiter
            .run(&cancel, move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(FetchError::transient("test", "reset"))
                } else {
                    Ok(n)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let limiter = limiter(0, 2);
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let err = limiter
            .run(&cancel, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(FetchError::rate_limited("test"))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::RateLimited { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_fast() {
        let limiter = limiter(0, 3);
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let err = limiter
            .run(&cancel, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(FetchError::upstream("test", 404, "missing"))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Upstream { status: 404, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_min_interval_spaces_requests() {
        let limiter = limiter(50, 0);
        let cancel = CancellationToken::new();
        let started = Instant::now();

        for _ in 0..3 {
            let _permit = limiter.acquire(&cancel).await.unwrap();
        }

        // First slot is immediate, the next two wait one interval each
        assert!(started.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn test_cancelled_backoff_returns_cancelled() {
        let limiter = RateLimiter::new("test", RateLimitPolicy::new(0, 3, 0, 1));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let handle = tokio::spawn(async move {
            limiter
                .run(&cancel, || async { Err::<(), _>(FetchError::rate_limited("test")) })
                .await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();

        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(FetchError::Cancelled)));
    }

    #[test]
    fn test_backoff_is_linear_and_capped() {
        let mut policy = RateLimitPolicy::new(0, 3, 0, 1);
        policy.backoff_cap_secs = 8;
        let limiter = RateLimiter::new("test", policy);

        let transient = FetchError::transient("test", "reset");
        assert_eq!(limiter.backoff_delay(&transient, 1), Duration::from_secs(2));
        assert_eq!(limiter.backoff_delay(&transient, 3), Duration::from_secs(6));

        let limited = FetchError::rate_limited("test");
        assert_eq!(limiter.backoff_delay(&limited, 1), Duration::from_secs(5));
        assert_eq!(limiter.backoff_delay(&limited, 2), Duration::from_secs(8));
    }
}
