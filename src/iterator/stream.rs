//! Consuming adapters over [`BatchIterator`]

use futures::stream::{self, Stream};

use super::BatchIterator;
use crate::{BatchError, Context};

impl<T> BatchIterator<T>
where
    T: Clone + Send,
{
    /// Drain every remaining item.
    ///
    /// If the source fails, the items gathered so far are dropped and the
    /// error is returned.
    pub async fn collect_all(mut self, ctx: &Context) -> Result<Vec<T>, BatchError> {
        let mut items = Vec::new();
        while self.advance(ctx).await {
            if let Some(item) = self.current() {
                items.push(item.clone());
            }
        }
        match self.last_error() {
            Some(err) => Err(err.clone()),
            None => Ok(items),
        }
    }

    /// Turn the iterator into a [`Stream`] of items.
    ///
    /// A latched error is yielded once as the final element.
    pub fn into_stream(self, ctx: Context) -> impl Stream<Item = Result<T, BatchError>> {
        stream::unfold(Some((self, ctx)), |state| async move {
            let (mut iter, ctx) = state?;
            if iter.advance(&ctx).await {
                let item = iter.current()?.clone();
                return Some((Ok(item), Some((iter, ctx))));
            }
            let err = iter.last_error()?.clone();
            Some((Err(err), None))
        })
    }
}
