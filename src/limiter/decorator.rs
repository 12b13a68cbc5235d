use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use crate::limiter::RateLimiter;
use crate::source::{Batch, BatchSource};
use crate::{BatchError, Context};

/// Batch source that takes a limiter token before every fetch.
///
/// The wrapped source is only invoked once a token has been granted. A
/// missing limiter or a failed wait is reported as the fetch error.
#[derive(Debug)]
pub struct RateLimit<S> {
    limiter: Option<Arc<RateLimiter>>,
    inner: S,
}

impl<S> RateLimit<S> {
    /// Gate `inner` behind `limiter`.
    pub fn new(limiter: Option<Arc<RateLimiter>>, inner: S) -> Self {
        Self { limiter, inner }
    }

    /// The shared limiter, if one was supplied.
    pub fn limiter(&self) -> Option<&Arc<RateLimiter>> {
        self.limiter.as_ref()
    }

    /// Unwrap the inner source.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

/// Wrap `source` so every fetch first waits on `limiter`.
pub fn rate_limit<S>(limiter: Option<Arc<RateLimiter>>, source: S) -> RateLimit<S> {
    RateLimit::new(limiter, source)
}

#[async_trait]
impl<T, S> BatchSource<T> for RateLimit<S>
where
    T: Send,
    S: BatchSource<T>,
{
    async fn fetch(&mut self, ctx: &Context) -> Result<Batch<T>, BatchError> {
        let limiter = self.limiter.as_ref().ok_or(BatchError::NilLimiter)?;
        limiter.wait(ctx).await?;
        trace!("rate limiter granted fetch");
        self.inner.fetch(ctx).await
    }
}
