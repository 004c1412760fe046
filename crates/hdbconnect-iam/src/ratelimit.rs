//! Per-key token bucket rate limiting

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::observability;

/// Rate limiter settings
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimiterConfig {
    /// Sustained refill rate
    pub requests_per_minute: u32,
    /// Bucket capacity, and the allowance a new key starts with
    pub burst: u32,
    /// How often idle buckets are swept
    pub sweep_interval: Duration,
    /// Idle time after which a bucket is evicted
    pub stale_after: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            burst: 10,
            sweep_interval: Duration::from_secs(60),
            stale_after: Duration::from_secs(600),
        }
    }
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

type Buckets = Arc<Mutex<HashMap<String, TokenBucket>>>;

/// Token bucket rate limiter keyed by caller (address, user, ...)
///
/// Buckets are refilled lazily on [`allow`](Self::allow). A background task
/// evicts buckets idle for longer than `stale_after`; it runs until
/// [`stop`](Self::stop) is called or the limiter is dropped.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    buckets: Buckets,
    shutdown: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl RateLimiter {
    /// Create a limiter and spawn its eviction task
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    #[must_use]
    pub fn new(config: RateLimiterConfig) -> Self {
        let buckets: Buckets = Arc::default();
        let shutdown = CancellationToken::new();
        let sweeper = spawn_sweeper(
            Arc::clone(&buckets),
            config.sweep_interval,
            config.stale_after,
            shutdown.clone(),
        );

        Self {
            config,
            buckets,
            shutdown,
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Take one token from `key`'s bucket, if one is available
    pub fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let burst = f64::from(self.config.burst);
        let per_second = f64::from(self.config.requests_per_minute) / 60.0;

        let mut buckets = self.buckets.lock();
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket {
                tokens: burst,
                last_refill: now,
            });

        let elapsed = now.saturating_duration_since(bucket.last_refill);
        bucket.tokens = elapsed
            .as_secs_f64()
            .mul_add(per_second, bucket.tokens)
            .min(burst);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return true;
        }
        drop(buckets);

        tracing::debug!(key, "Rate limit exceeded");
        observability::record_rate_limited();
        false
    }

    /// Number of tracked keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.lock().is_empty()
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stop the eviction task and wait for it to exit
    ///
    /// Calling it again is a no-op.
    pub async fn stop(&self) {
        self.shutdown.cancel();

        let handle = self.sweeper.lock().take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            tracing::warn!(error = %e, "Rate limiter sweep task ended abnormally");
        }
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn spawn_sweeper(
    buckets: Buckets,
    interval: Duration,
    stale_after: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = evict_stale(&buckets, stale_after);
                    if evicted > 0 {
                        tracing::debug!(evicted, "Evicted idle rate limit buckets");
                    }
                }
                () = shutdown.cancelled() => {
                    tracing::debug!("Rate limiter sweep task shutting down");
                    break;
                }
            }
        }
    })
}

fn evict_stale(buckets: &Mutex<HashMap<String, TokenBucket>>, stale_after: Duration) -> usize {
    let now = Instant::now();
    let mut buckets = buckets.lock();
    let before = buckets.len();
    buckets.retain(|_, bucket| now.saturating_duration_since(bucket.last_refill) <= stale_after);
    before - buckets.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(requests_per_minute: u32, burst: u32) -> RateLimiter {
        RateLimiter::new(RateLimiterConfig {
            requests_per_minute,
            burst,
            ..RateLimiterConfig::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_reject() {
        let limiter = limiter(2, 1);
        assert!(limiter.allow("10.0.0.1"));
        assert!(!limiter.allow("10.0.0.1"));
        limiter.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let limiter = limiter(2, 1);
        assert!(limiter.allow("a"));
        assert!(limiter.allow("b"));
        assert!(!limiter.allow("a"));
        assert_eq!(limiter.len(), 2);
        limiter.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_over_time() {
        let limiter = limiter(60, 1);
        assert!(limiter.allow("k"));
        assert!(!limiter.allow("k"));

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(!limiter.allow("k"));

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(limiter.allow("k"));
        limiter.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_capped_at_burst() {
        let limiter = limiter(60, 3);
        for _ in 0..3 {
            assert!(limiter.allow("k"));
        }
        assert!(!limiter.allow("k"));

        tokio::time::advance(Duration::from_secs(3600)).await;
        for _ in 0..3 {
            assert!(limiter.allow("k"));
        }
        assert!(!limiter.allow("k"));
        limiter.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_idle_buckets() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            sweep_interval: Duration::from_secs(60),
            stale_after: Duration::from_secs(600),
            ..RateLimiterConfig::default()
        });

        limiter.allow("idle");
        tokio::time::sleep(Duration::from_secs(500)).await;
        limiter.allow("active");
        assert_eq!(limiter.len(), 2);

        tokio::time::sleep(Duration::from_secs(200)).await;
        assert_eq!(limiter.len(), 1);
        assert!(!limiter.is_empty());
        limiter.stop().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let limiter = limiter(60, 10);
        assert!(!limiter.is_stopped());

        limiter.stop().await;
        limiter.stop().await;
        assert!(limiter.is_stopped());
        assert!(limiter.sweeper.lock().is_none());

        assert!(limiter.allow("still-works"));
    }

    #[test]
    fn test_default_config() {
        let config = RateLimiterConfig::default();
        assert_eq!(config.requests_per_minute, 60);
        assert_eq!(config.burst, 10);
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.stale_after, Duration::from_secs(600));
    }
}
