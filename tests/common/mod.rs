//! Shared helpers for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use batch_iterator::{from_fn, Batch, BatchError, BatchIterator, BatchSource, Context};

/// Source that replays `steps` in order, then reports an empty final batch.
///
/// The returned counter tracks how often the source was invoked.
pub fn scripted<T>(
    steps: Vec<Result<Batch<T>, BatchError>>,
) -> (impl BatchSource<T>, Arc<AtomicUsize>)
where
    T: Clone + Send + Sync + 'static,
{
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let source = from_fn(move |_ctx| {
        let idx = counter.fetch_add(1, Ordering::SeqCst);
        let step = steps.get(idx).cloned().unwrap_or_else(|| Ok(Batch::done()));
        async move { step }
    });
    (source, calls)
}

/// Drive the iterator to the end, returning observed items and the final error.
pub async fn drain<T>(iter: &mut BatchIterator<T>) -> (Vec<T>, Option<BatchError>)
where
    T: Clone + Send,
{
    let ctx = Context::background();
    let mut items = Vec::new();
    while iter.advance(&ctx).await {
        items.push(iter.current().cloned().expect("advance returned true"));
    }
    (items, iter.last_error().cloned())
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
