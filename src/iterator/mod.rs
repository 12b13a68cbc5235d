//! Iterator state machine
//!
//! [`BatchIterator`] turns a [`BatchSource`] into an item cursor:
//!
//! ```text
//!   advance() ──► buffer has > 1 item ──► drop front ──────────────► true
//!       │
//!       ├──► last batch already seen ──► Exhausted ────────────────► false
//!       │
//!       └──► fetch ──► Err(e) ──────────► Failed(e) ───────────────► false
//!                 ├──► empty, has_more ─► fetch again
//!                 ├──► empty, last ─────► Exhausted ───────────────► false
//!                 └──► items ───────────► buffer = items ──────────► true
//! ```
//!
//! `Exhausted` and `Failed` are terminal: the source is never called again
//! and the buffer stays empty.

mod config;
mod stream;

pub use config::IteratorConfig;

use std::collections::VecDeque;
use std::fmt;

use tracing::{debug, trace, warn};

use crate::source::BatchSource;
use crate::{BatchError, Context};

/// Lifecycle of a [`BatchIterator`].
#[derive(Debug, Clone, Default)]
pub enum IterState {
    /// Items may still be delivered.
    #[default]
    Active,
    /// The source ran out of data. Not an error.
    Exhausted,
    /// Iteration stopped on an error.
    Failed(BatchError),
}

impl IterState {
    /// Whether the iterator can still produce items.
    pub fn is_active(&self) -> bool {
        matches!(self, IterState::Active)
    }
}

/// Pull-based cursor over a batched source.
///
/// Not synchronized: the iterator belongs to one consumer at a time.
pub struct BatchIterator<T: Send> {
    source: Option<Box<dyn BatchSource<T>>>,
    /// Front is the current item.
    buffer: VecDeque<T>,
    state: IterState,
    /// The last fetch reported `has_more == false`.
    last_batch: bool,
    fetches: usize,
    config: IteratorConfig,
}

impl<T: Send> BatchIterator<T> {
    /// Create an iterator pulling from `source`.
    pub fn new<S>(source: S) -> Self
    where
        S: BatchSource<T> + 'static,
    {
        let mut iter = Self::empty();
        iter.set_source(source);
        iter
    }

    /// Create an iterator with no source yet.
    ///
    /// Advancing it before [`set_source`](Self::set_source) fails with
    /// [`BatchError::NoSource`].
    pub fn empty() -> Self {
        Self {
            source: None,
            buffer: VecDeque::new(),
            state: IterState::Active,
            last_batch: false,
            fetches: 0,
            config: IteratorConfig::default(),
        }
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: IteratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Install or replace the batch source.
    ///
    /// Takes effect at the next refill; items already buffered are kept.
    pub fn set_source<S>(&mut self, source: S)
    where
        S: BatchSource<T> + 'static,
    {
        self.source = Some(Box::new(source));
    }

    /// Remove the batch source, returning it.
    pub fn clear_source(&mut self) -> Option<Box<dyn BatchSource<T>>> {
        self.source.take()
    }

    /// Whether a batch source is installed.
    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Prepare the next item for [`current`](Self::current).
    ///
    /// Returns `false` once iteration is over, either because the source is
    /// exhausted or because something failed; [`last_error`](Self::last_error)
    /// tells the two apart.
    pub async fn advance(&mut self, ctx: &Context) -> bool {
        if self.source.is_none() {
            debug!("advance called without a batch source");
            self.fail(BatchError::NoSource);
            return false;
        }
        if !self.state.is_active() {
            self.buffer.clear();
            return false;
        }
        if self.buffer.len() > 1 {
            self.buffer.pop_front();
            return true;
        }
        if self.last_batch {
            self.exhaust();
            return false;
        }

        let mut empty_batches = 0usize;
        loop {
            let Some(source) = self.source.as_mut() else {
                self.fail(BatchError::NoSource);
                return false;
            };
            let result = source.fetch(ctx).await;
            self.fetches += 1;

            let batch = match result {
                Ok(batch) => batch,
                Err(err) => {
                    debug!(error = %err, fetches = self.fetches, "batch fetch failed");
                    self.fail(err);
                    return false;
                }
            };
            self.last_batch = !batch.has_more;
            self.buffer = VecDeque::from(batch.items);

            if !self.buffer.is_empty() {
                debug!(
                    items = self.buffer.len(),
                    last = self.last_batch,
                    "fetched batch"
                );
                return true;
            }
            if self.last_batch {
                self.exhaust();
                return false;
            }

            empty_batches += 1;
            if let Some(limit) = self.config.max_empty_batches {
                if empty_batches >= limit {
                    warn!(limit, "batch source keeps returning empty batches");
                    self.fail(BatchError::EmptyBatchLimit { limit });
                    return false;
                }
            }
            // let a canceller on the same thread run before checking
            tokio::task::yield_now().await;
            if let Some(err) = ctx.err() {
                debug!(error = %err, "context done while retrying empty batch");
                self.fail(err);
                return false;
            }
            trace!(empty_batches, "empty batch with more pending, fetching again");
        }
    }

    /// The current item, if any.
    pub fn current(&self) -> Option<&T> {
        self.buffer.front()
    }

    /// The error that stopped iteration.
    ///
    /// Running out of data is not an error and reports `None`.
    pub fn last_error(&self) -> Option<&BatchError> {
        match &self.state {
            IterState::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> &IterState {
        &self.state
    }

    /// Whether the source ran out of data.
    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, IterState::Exhausted)
    }

    /// Items buffered, the current one included.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Number of times the source has been called.
    pub fn fetches(&self) -> usize {
        self.fetches
    }

    fn fail(&mut self, err: BatchError) {
        self.buffer.clear();
        self.state = IterState::Failed(err);
    }

    fn exhaust(&mut self) {
        debug!(fetches = self.fetches, "batch source exhausted");
        self.buffer.clear();
        self.state = IterState::Exhausted;
    }
}

impl<T: Send> Default for BatchIterator<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: Send + fmt::Debug> fmt::Debug for BatchIterator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchIterator")
            .field("has_source", &self.source.is_some())
            .field("buffer", &self.buffer)
            .field("state", &self.state)
            .field("last_batch", &self.last_batch)
            .field("fetches", &self.fetches)
            .field("config", &self.config)
            .finish()
    }
}
