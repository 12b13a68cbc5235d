//! Iterator protocol tests
//!
//! Exercises advance/current/last_error against scripted batch sources.

mod common;

use std::sync::atomic::Ordering;

use batch_iterator::{static_batch, Batch, BatchError, BatchIterator, Context};
use common::{drain, scripted, strings};
use test_case::test_case;

#[tokio::test]
async fn test_batches_are_concatenated() {
    let (source, calls) = scripted(vec![
        Ok(Batch::more(strings(&["A", "B", "C"]))),
        Ok(Batch::more(strings(&["D"]))),
        Ok(Batch::more(strings(&["E", "F"]))),
        Ok(Batch::done()),
    ]);
    let mut iter = BatchIterator::new(source);

    let (items, err) = drain(&mut iter).await;
    assert_eq!(items, strings(&["A", "B", "C", "D", "E", "F"]));
    assert!(err.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_empty_batch_gap_is_invisible() {
    let (source, calls) = scripted(vec![
        Ok(Batch::more(strings(&["A", "B", "C"]))),
        Ok(Batch::pending()),
        Ok(Batch::more(strings(&["D", "E", "F"]))),
        Ok(Batch::done()),
    ]);
    let mut iter = BatchIterator::new(source);

    let (items, err) = drain(&mut iter).await;
    assert_eq!(items, strings(&["A", "B", "C", "D", "E", "F"]));
    assert!(err.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[test_case(""; "empty")]
#[test_case("A"; "one byte")]
#[test_case("AB"; "two bytes")]
#[test_case("ABC"; "three bytes")]
#[tokio::test]
async fn test_static_bytes(input: &str) {
    let mut iter = BatchIterator::new(static_batch(input.as_bytes().to_vec()));
    let (items, err) = drain(&mut iter).await;
    assert_eq!(items, input.as_bytes());
    assert!(err.is_none());
}

#[test_case(vec![]; "on first fetch")]
#[test_case(vec![Ok(Batch::more(vec![1, 2]))]; "after a batch")]
#[test_case(vec![Ok(Batch::pending()), Ok(Batch::more(vec![7]))]; "after an empty batch")]
#[tokio::test]
async fn test_error_is_terminal(prefix: Vec<Result<Batch<i32>, BatchError>>) {
    let expected: Vec<i32> = prefix
        .iter()
        .filter_map(|step| step.as_ref().ok())
        .flat_map(|batch| batch.items.clone())
        .collect();
    let fetches_before_error = prefix.len();

    let mut steps = prefix;
    steps.push(Err(BatchError::fetch("some error")));
    steps.push(Ok(Batch::last(vec![99])));
    let (source, calls) = scripted(steps);
    let mut iter = BatchIterator::new(source);

    let (items, err) = drain(&mut iter).await;
    assert_eq!(items, expected);
    assert_eq!(err.map(|e| e.to_string()).as_deref(), Some("some error"));
    assert_eq!(calls.load(Ordering::SeqCst), fetches_before_error + 1);

    let ctx = Context::background();
    for _ in 0..3 {
        assert!(!iter.advance(&ctx).await);
        assert!(iter.current().is_none());
    }
    assert_eq!(calls.load(Ordering::SeqCst), fetches_before_error + 1);
}

#[tokio::test]
async fn test_error_on_first_fetch_returns_immediately() {
    let (source, _) = scripted::<String>(vec![Err(BatchError::fetch("some error"))]);
    let mut iter = BatchIterator::new(source);

    assert!(!iter.advance(&Context::background()).await);
    assert_eq!(
        iter.last_error().map(ToString::to_string).as_deref(),
        Some("some error")
    );
}

#[tokio::test]
async fn test_missing_source() {
    let mut iter = BatchIterator::<String>::empty();
    assert!(!iter.advance(&Context::background()).await);
    assert!(iter.current().is_none());
    assert_eq!(
        iter.last_error().map(ToString::to_string).as_deref(),
        Some("iterator has no next batch function")
    );
}

#[tokio::test]
async fn test_source_removed_in_flight() {
    let ctx = Context::background();
    let mut iter = BatchIterator::new(static_batch(strings(&["A", "B", "C"])));

    assert!(iter.advance(&ctx).await);
    assert_eq!(iter.current().map(String::as_str), Some("A"));

    assert!(iter.clear_source().is_some());
    assert!(!iter.advance(&ctx).await);
    assert!(iter.current().is_none());
    assert!(matches!(iter.last_error(), Some(BatchError::NoSource)));
}

#[tokio::test]
async fn test_source_assigned_after_construction() {
    let ctx = Context::background();
    let mut iter = BatchIterator::empty();
    assert!(!iter.has_source());

    iter.set_source(static_batch(vec!['x', 'y']));
    assert!(iter.advance(&ctx).await);
    assert_eq!(iter.current(), Some(&'x'));
}

#[tokio::test]
async fn test_source_swapped_between_refills() {
    let ctx = Context::background();
    let (first, _) = scripted(vec![Ok(Batch::more(strings(&["a", "b"])))]);
    let mut iter = BatchIterator::new(first);

    assert!(iter.advance(&ctx).await);
    assert_eq!(iter.current().map(String::as_str), Some("a"));

    // buffered items survive the swap; the next refill uses the new source
    iter.set_source(static_batch(strings(&["z"])));
    let (items, err) = drain(&mut iter).await;
    assert_eq!(items, strings(&["b", "z"]));
    assert!(err.is_none());
}

#[tokio::test]
async fn test_exhaustion_is_idempotent() {
    let ctx = Context::background();
    let (source, calls) = scripted(vec![Ok(Batch::last(strings(&["A", "B", "C"])))]);
    let mut iter = BatchIterator::new(source);

    while iter.advance(&ctx).await {}
    assert!(iter.last_error().is_none());
    assert!(iter.is_exhausted());

    for _ in 0..9 {
        assert!(iter.current().is_none());
        assert!(!iter.advance(&ctx).await);
        assert!(iter.last_error().is_none());
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_empty_final_batch_after_items() {
    let (source, calls) = scripted(vec![
        Ok(Batch::more(vec![1u64])),
        Ok(Batch::pending()),
        Ok(Batch::pending()),
        Ok(Batch::done()),
    ]);
    let mut iter = BatchIterator::new(source);

    let (items, err) = drain(&mut iter).await;
    assert_eq!(items, vec![1]);
    assert!(err.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}
