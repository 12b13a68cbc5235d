use async_trait::async_trait;

use crate::source::{Batch, BatchSource};
use crate::{BatchError, Context};

/// One-shot source over a collection known up front.
///
/// The first fetch hands out every item as the final batch. Any later
/// fetch returns an empty final batch.
#[derive(Debug, Clone)]
pub struct StaticBatch<T> {
    items: Option<Vec<T>>,
}

impl<T> StaticBatch<T> {
    /// Create a source that yields `items` once.
    pub fn new(items: impl Into<Vec<T>>) -> Self {
        Self {
            items: Some(items.into()),
        }
    }

    /// Whether the items have already been handed out.
    pub fn is_consumed(&self) -> bool {
        self.items.is_none()
    }
}

/// Shorthand for [`StaticBatch::new`].
pub fn static_batch<T>(items: impl Into<Vec<T>>) -> StaticBatch<T> {
    StaticBatch::new(items)
}

#[async_trait]
impl<T: Send> BatchSource<T> for StaticBatch<T> {
    async fn fetch(&mut self, _ctx: &Context) -> Result<Batch<T>, BatchError> {
        Ok(Batch::last(self.items.take().unwrap_or_default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_single_shot() {
        let ctx = Context::background();
        let mut source = static_batch(b"AB".to_vec());
        assert!(!source.is_consumed());

        let first = source.fetch(&ctx).await.unwrap();
        assert_eq!(first, Batch::last(vec![b'A', b'B']));
        assert!(source.is_consumed());

        let second = source.fetch(&ctx).await.unwrap();
        assert_eq!(second, Batch::done());
    }

    #[tokio::test]
    async fn test_empty_input() {
        let mut source = StaticBatch::<u32>::new(Vec::new());
        let batch = source.fetch(&Context::background()).await.unwrap();
        assert!(batch.is_empty());
        assert!(!batch.has_more);
    }
}
