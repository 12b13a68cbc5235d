//! Batch source contract
//!
//! Every data provider the iterator can pull from implements [`BatchSource`].
//! A fetch answers with one of three outcomes:
//!
//! - `Err(e)`: the fetch failed and iteration stops with `e`
//! - `Ok(batch)` with `has_more == false`: this batch (possibly empty) is the last
//! - `Ok(batch)` with `has_more == true`: more batches may exist, even if this
//!   one is empty ("not sure yet", e.g. a throttled or filtered response)

use std::future::Future;

use async_trait::async_trait;

use crate::{BatchError, Context};

mod paged;
mod static_batch;

pub use paged::{Offset, Page, PageCursor, Paged};
pub use static_batch::{static_batch, StaticBatch};

/// One group of items returned by a single fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch<T> {
    /// Items in delivery order.
    pub items: Vec<T>,
    /// Whether the source may produce further batches.
    pub has_more: bool,
}

impl<T> Batch<T> {
    /// Batch with explicit continuation flag.
    pub fn new(items: Vec<T>, has_more: bool) -> Self {
        Self { items, has_more }
    }

    /// Items followed by possibly more batches.
    pub fn more(items: Vec<T>) -> Self {
        Self::new(items, true)
    }

    /// Final batch.
    pub fn last(items: Vec<T>) -> Self {
        Self::new(items, false)
    }

    /// Nothing yet, but ask again.
    pub fn pending() -> Self {
        Self::new(Vec::new(), true)
    }

    /// Nothing, and nothing more to come.
    pub fn done() -> Self {
        Self::new(Vec::new(), false)
    }

    /// Number of items in the batch.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the batch carries no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Default for Batch<T> {
    fn default() -> Self {
        Self::done()
    }
}

/// Trait implemented by anything the iterator can fetch batches from.
#[async_trait]
pub trait BatchSource<T: Send>: Send {
    /// Fetch the next batch.
    ///
    /// Implementations should observe `ctx` around any waiting they do and
    /// report cancellation through the returned error.
    async fn fetch(&mut self, ctx: &Context) -> Result<Batch<T>, BatchError>;
}

#[async_trait]
impl<T, S> BatchSource<T> for Box<S>
where
    T: Send,
    S: BatchSource<T> + ?Sized,
{
    async fn fetch(&mut self, ctx: &Context) -> Result<Batch<T>, BatchError> {
        (**self).fetch(ctx).await
    }
}

/// Batch source backed by a closure returning a future.
///
/// The closure receives its own clone of the context, so the future it
/// returns does not borrow from the caller.
pub struct FnSource<F> {
    f: F,
}

impl<F> std::fmt::Debug for FnSource<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnSource").finish_non_exhaustive()
    }
}

/// Adapt a closure into a [`BatchSource`].
pub fn from_fn<T, F, Fut>(f: F) -> FnSource<F>
where
    F: FnMut(Context) -> Fut,
    Fut: Future<Output = Result<Batch<T>, BatchError>>,
{
    FnSource { f }
}

#[async_trait]
impl<T, F, Fut> BatchSource<T> for FnSource<F>
where
    T: Send + 'static,
    F: FnMut(Context) -> Fut + Send,
    Fut: Future<Output = Result<Batch<T>, BatchError>> + Send + 'static,
{
    async fn fetch(&mut self, ctx: &Context) -> Result<Batch<T>, BatchError> {
        (self.f)(ctx.clone()).await
    }
}
