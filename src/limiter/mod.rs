//! Token bucket rate limiting
//!
//! A [`RateLimiter`] refills tokens at a steady rate up to a burst
//! capacity. Callers either take tokens immediately ([`RateLimiter::allow`])
//! or reserve them and sleep until they are due ([`RateLimiter::wait`]).
//! Waiters are served in reservation order: each one pushes the bucket
//! further into debt, so later waiters sleep longer.
//!
//! One limiter can be shared through an `Arc` by any number of iterators
//! and tasks. Its state sits behind a mutex that is only held for the
//! arithmetic, never across an `.await`.

mod config;
mod decorator;

pub use config::RateLimitConfig;
pub use decorator::{rate_limit, RateLimit};

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use crate::{BatchError, Context};

/// Refill rate of a token bucket, in tokens per second.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Limit(f64);

impl Limit {
    /// No limit: every request is granted immediately.
    pub const INF: Limit = Limit(f64::INFINITY);

    /// `rate` tokens per second.
    pub fn per_second(rate: f64) -> Self {
        Limit(rate)
    }

    /// One token every `interval`; a zero interval means [`Limit::INF`].
    pub fn every(interval: Duration) -> Self {
        if interval.is_zero() {
            return Limit::INF;
        }
        Limit(1.0 / interval.as_secs_f64())
    }

    /// Tokens per second.
    pub fn as_per_second(self) -> f64 {
        self.0
    }

    /// Whether this is [`Limit::INF`].
    pub fn is_inf(self) -> bool {
        self.0 == f64::INFINITY
    }

    fn duration_from_tokens(self, tokens: f64) -> Option<Duration> {
        if tokens <= 0.0 {
            return Some(Duration::ZERO);
        }
        if self.0 <= 0.0 {
            return None;
        }
        Duration::try_from_secs_f64(tokens / self.0).ok()
    }

    fn tokens_from_duration(self, d: Duration) -> f64 {
        if self.0 <= 0.0 {
            return 0.0;
        }
        d.as_secs_f64() * self.0
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    /// When `tokens` was last brought up to date.
    last: Instant,
    /// Latest instant any outstanding reservation becomes due.
    last_event: Instant,
}

/// Tokens taken out of the bucket, due at `ready_at`.
#[derive(Debug, Clone, Copy)]
struct Reservation {
    n: usize,
    ready_at: Instant,
}

/// Shared token bucket.
#[derive(Debug)]
pub struct RateLimiter {
    limit: Limit,
    burst: usize,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Create a limiter with `burst` tokens available right away.
    pub fn new(limit: Limit, burst: usize) -> Self {
        let now = Instant::now();
        Self {
            limit,
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst as f64,
                last: now,
                last_event: now,
            }),
        }
    }

    /// One token every `interval`.
    pub fn every(interval: Duration, burst: usize) -> Self {
        Self::new(Limit::every(interval), burst)
    }

    /// Build a limiter from validated settings.
    pub fn from_config(config: &RateLimitConfig) -> Result<Self, BatchError> {
        config.validate()?;
        Ok(Self::new(Limit::per_second(config.per_second), config.burst))
    }

    /// Refill rate.
    pub fn limit(&self) -> Limit {
        self.limit
    }

    /// Bucket capacity.
    pub fn burst(&self) -> usize {
        self.burst
    }

    /// Tokens available now; negative while waiters hold reservations.
    pub fn tokens(&self) -> f64 {
        let now = Instant::now();
        let bucket = self.lock();
        self.advance(&bucket, now)
    }

    /// Take one token if available, without waiting.
    pub fn allow(&self) -> bool {
        self.allow_n(1)
    }

    /// Take `n` tokens if available, without waiting.
    pub fn allow_n(&self, n: usize) -> bool {
        self.reserve(Instant::now(), n, Some(Duration::ZERO)).is_ok()
    }

    /// Wait for one token.
    pub async fn wait(&self, ctx: &Context) -> Result<(), BatchError> {
        self.wait_n(ctx, 1).await
    }

    /// Wait until `n` tokens are available, or fail.
    ///
    /// Fails without waiting if `n` exceeds the burst, if `ctx` is already
    /// done, or if the tokens would only be due after the context deadline.
    /// If `ctx` fires while sleeping, the reserved tokens go back into the
    /// bucket and the context error is returned.
    pub async fn wait_n(&self, ctx: &Context, n: usize) -> Result<(), BatchError> {
        if n > self.burst && !self.limit.is_inf() {
            return Err(BatchError::BurstExceeded {
                n,
                burst: self.burst,
            });
        }
        if let Some(err) = ctx.err() {
            return Err(err);
        }

        let now = Instant::now();
        let max_wait = ctx
            .deadline()
            .map(|deadline| deadline.saturating_duration_since(now));
        let reservation = self.reserve(now, n, max_wait)?;

        let delay = reservation.ready_at.saturating_duration_since(now);
        if delay.is_zero() {
            return Ok(());
        }
        trace!(n, ?delay, "waiting for rate limiter");

        tokio::select! {
            biased;
            _ = tokio::time::sleep_until(reservation.ready_at) => Ok(()),
            err = ctx.done() => {
                self.cancel(reservation, Instant::now());
                Err(err)
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Bucket> {
        self.bucket.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Token count at `now`, capped at the burst.
    fn advance(&self, bucket: &Bucket, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(bucket.last);
        let refilled = bucket.tokens + self.limit.tokens_from_duration(elapsed);
        refilled.min(self.burst as f64)
    }

    fn reserve(
        &self,
        now: Instant,
        n: usize,
        max_wait: Option<Duration>,
    ) -> Result<Reservation, BatchError> {
        if self.limit.is_inf() {
            return Ok(Reservation { n, ready_at: now });
        }
        if n > self.burst {
            return Err(BatchError::BurstExceeded {
                n,
                burst: self.burst,
            });
        }

        let mut bucket = self.lock();
        let tokens = self.advance(&bucket, now) - n as f64;
        let wait = self
            .limit
            .duration_from_tokens(-tokens)
            .ok_or(BatchError::BurstExceeded {
                n,
                burst: self.burst,
            })?;
        if let Some(max_wait) = max_wait {
            if wait > max_wait {
                return Err(BatchError::WouldExceedDeadline { n });
            }
        }

        let ready_at = now + wait;
        bucket.tokens = tokens;
        bucket.last = now;
        if ready_at > bucket.last_event {
            bucket.last_event = ready_at;
        }
        Ok(Reservation { n, ready_at })
    }

    /// Give back the tokens of a reservation that will not be used.
    ///
    /// Tokens already claimed by reservations made after this one stay
    /// claimed.
    fn cancel(&self, reservation: Reservation, now: Instant) {
        if self.limit.is_inf() || reservation.ready_at <= now {
            return;
        }

        let mut bucket = self.lock();
        let later = bucket.last_event.saturating_duration_since(reservation.ready_at);
        let restore = reservation.n as f64 - self.limit.tokens_from_duration(later);
        if restore <= 0.0 {
            return;
        }

        bucket.tokens = (self.advance(&bucket, now) + restore).min(self.burst as f64);
        bucket.last = now;
        if reservation.ready_at == bucket.last_event {
            let previous = self
                .limit
                .duration_from_tokens(reservation.n as f64)
                .and_then(|d| reservation.ready_at.checked_sub(d));
            if let Some(previous) = previous.filter(|previous| *previous >= now) {
                bucket.last_event = previous;
            }
        }
        trace!(restored = restore, "returned cancelled reservation");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_conversions() {
        let limit = Limit::every(Duration::from_millis(500));
        assert!((limit.as_per_second() - 2.0).abs() < 1e-9);
        assert!(Limit::every(Duration::ZERO).is_inf());
        assert_eq!(
            limit.duration_from_tokens(1.0),
            Some(Duration::from_millis(500))
        );
        assert_eq!(Limit::per_second(0.0).duration_from_tokens(1.0), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_allow_consumes_burst() {
        let limiter = RateLimiter::every(Duration::from_secs(1), 2);
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(!limiter.allow());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.allow());
        assert!(!limiter.allow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_spaces_calls() {
        let limiter = RateLimiter::every(Duration::from_secs(1), 1);
        let ctx = Context::background();
        let start = Instant::now();

        limiter.wait(&ctx).await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
        limiter.wait(&ctx).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(1));
        limiter.wait(&ctx).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_burst_exceeded() {
        let limiter = RateLimiter::every(Duration::from_secs(1), 1);
        let err = limiter
            .wait_n(&Context::background(), 2)
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::BurstExceeded { n: 2, burst: 1 }));
    }

    #[tokio::test]
    async fn test_infinite_limit_never_waits() {
        let limiter = RateLimiter::new(Limit::INF, 0);
        let ctx = Context::background();
        for _ in 0..100 {
            limiter.wait_n(&ctx, 5).await.unwrap();
        }
        assert!(limiter.allow_n(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_too_close() {
        let limiter = RateLimiter::every(Duration::from_secs(10), 1);
        assert!(limiter.allow());

        let ctx = Context::background().with_timeout(Duration::from_secs(1));
        let err = limiter.wait(&ctx).await.unwrap_err();
        assert!(matches!(err, BatchError::WouldExceedDeadline { n: 1 }));
        // the rejected reservation must not have claimed a token
        assert!(limiter.tokens() > -0.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wait_returns_tokens() {
        let limiter = std::sync::Arc::new(RateLimiter::every(Duration::from_secs(1), 1));
        assert!(limiter.allow());

        let ctx = Context::background();
        let waiter = {
            let limiter = limiter.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move { limiter.wait(&ctx).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        ctx.cancel();

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(BatchError::Cancelled)));
        // only the 100ms of refill is gone; the cancelled token is back
        assert!(limiter.tokens() > -0.01);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_latest_rolls_back_last_event() {
        let limiter = RateLimiter::every(Duration::from_secs(1), 1);
        let now = Instant::now();
        assert!(limiter.allow());

        let first = limiter.reserve(now, 1, None).unwrap();
        let second = limiter.reserve(now, 1, None).unwrap();
        assert_eq!(first.ready_at, now + Duration::from_secs(1));
        assert_eq!(second.ready_at, now + Duration::from_secs(2));

        limiter.cancel(second, now);
        assert_eq!(limiter.lock().last_event, first.ready_at);
        assert!((limiter.tokens() + 1.0).abs() < 1e-9);

        // the first reservation is now the latest; cancelling it restores
        // exactly one more token
        limiter.cancel(first, now);
        assert_eq!(limiter.lock().last_event, now);
        assert!(limiter.tokens().abs() < 1e-9);
    }

    #[test]
    fn test_from_config_validates() {
        let err = RateLimiter::from_config(&RateLimitConfig::per_second(1.0).with_burst(0));
        assert!(matches!(err, Err(BatchError::InvalidConfig(_))));

        let limiter = RateLimiter::from_config(&RateLimitConfig::per_second(5.0).with_burst(3))
            .unwrap();
        assert_eq!(limiter.burst(), 3);
        assert!((limiter.limit().as_per_second() - 5.0).abs() < 1e-9);
    }
}
