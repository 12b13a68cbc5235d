//! # Batch Iterator
//!
//! Item-by-item iteration over data sources that deliver results in
//! batches: paginated HTTP APIs, chunked database queries, rate-limited
//! backends.
//!
//! ## Core Protocol
//!
//! 1. **Batch source**: a single async `fetch` returning a [`Batch`] of items
//!    and a flag saying whether more batches may follow
//! 2. **Iterator**: buffers one batch, advances a cursor over it and refills
//!    from the source when the buffer runs dry
//! 3. **Termination**: a fetch error latches the iterator as failed; a final
//!    batch latches it as exhausted; neither state ever fetches again
//! 4. **Decorators**: [`RateLimit`] gates every fetch behind a shared
//!    token bucket without the iterator knowing about it
//!
//! ## Usage Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use batch_iterator::{rate_limit, static_batch, BatchIterator, Context, RateLimiter};
//!
//! # async fn demo() {
//! let limiter = Arc::new(RateLimiter::every(Duration::from_secs(1), 1));
//! let source = rate_limit(Some(limiter), static_batch(vec!["a", "b", "c"]));
//! let mut iter = BatchIterator::new(source);
//!
//! let ctx = Context::background();
//! while iter.advance(&ctx).await {
//!     println!("{}", iter.current().unwrap());
//! }
//! assert!(iter.last_error().is_none());
//! # }
//! ```

#![warn(missing_docs, missing_debug_implementations)]
#![allow(clippy::new_without_default)]

pub mod context;   // Cancellation and deadlines
pub mod source;    // Batch source contract and adapters
pub mod limiter;   // Token bucket and rate-limit decorator
pub mod iterator;  // Iterator state machine

// Re-exports for convenience
pub use context::Context;
pub use iterator::{BatchIterator, IterState, IteratorConfig};
pub use limiter::{rate_limit, Limit, RateLimit, RateLimitConfig, RateLimiter};
pub use source::{
    from_fn, static_batch, Batch, BatchSource, FnSource, Offset, Page, PageCursor, Paged,
    StaticBatch,
};

use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by batch sources, the rate limiter and the iterator.
///
/// Foreign errors are held behind an `Arc` so the iterator can hand out
/// clones of a latched error without giving up its own copy.
#[derive(Error, Debug, Clone)]
pub enum BatchError {
    /// The iterator was advanced without a batch source.
    #[error("iterator has no next batch function")]
    NoSource,

    /// The rate-limit decorator was built without a limiter.
    #[error("limiter cannot be nil")]
    NilLimiter,

    /// The operation context was cancelled.
    #[error("context canceled")]
    Cancelled,

    /// The operation context passed its deadline.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// More tokens were requested at once than the bucket can ever hold.
    #[error("rate: wait(n={n}) exceeds limiter's burst {burst}")]
    BurstExceeded {
        /// Tokens requested.
        n: usize,
        /// Bucket capacity.
        burst: usize,
    },

    /// The tokens would only become available after the context deadline.
    #[error("rate: wait(n={n}) would exceed context deadline")]
    WouldExceedDeadline {
        /// Tokens requested.
        n: usize,
    },

    /// The source kept answering "maybe more" with empty batches.
    #[error("batch source returned {limit} consecutive empty batches")]
    EmptyBatchLimit {
        /// Configured limit that was reached.
        limit: usize,
    },

    /// A source or limiter was constructed with unusable settings.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A batch source reported a failure as a plain message.
    #[error("{0}")]
    Fetch(String),

    /// A batch source reported a failure from another library.
    #[error(transparent)]
    Source(Arc<dyn std::error::Error + Send + Sync + 'static>),
}

impl BatchError {
    /// Helper for constructing source-originated errors from a message.
    pub fn fetch(msg: impl Into<String>) -> Self {
        BatchError::Fetch(msg.into())
    }

    /// Wrap an arbitrary error returned by a batch source.
    pub fn source_error<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        BatchError::Source(Arc::new(err))
    }

    /// Whether the error came from the operation context rather than the source.
    pub fn is_context_error(&self) -> bool {
        matches!(self, BatchError::Cancelled | BatchError::DeadlineExceeded)
    }
}

impl From<std::io::Error> for BatchError {
    fn from(err: std::io::Error) -> Self {
        BatchError::source_error(err)
    }
}

impl From<anyhow::Error> for BatchError {
    fn from(err: anyhow::Error) -> Self {
        let boxed: Box<dyn std::error::Error + Send + Sync + 'static> = err.into();
        BatchError::Source(Arc::from(boxed))
    }
}
