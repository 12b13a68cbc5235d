//! Iterator tuning knobs

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for [`BatchIterator`](super::BatchIterator).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IteratorConfig {
    /// Give up after this many consecutive empty batches that still claim
    /// more data may follow. `None` keeps fetching until the source either
    /// delivers, ends, fails, or the context is cancelled.
    pub max_empty_batches: Option<usize>,
}

impl IteratorConfig {
    /// Keep retrying empty batches indefinitely.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Fail with [`BatchError::EmptyBatchLimit`](crate::BatchError::EmptyBatchLimit)
    /// after `limit` consecutive empty batches (at least one).
    pub fn with_max_empty_batches(mut self, limit: usize) -> Self {
        self.max_empty_batches = Some(limit.max(1));
        self
    }
}
