//! Sources that thread pagination state explicitly
//!
//! Paginated APIs and chunked queries both need a position that moves
//! forward between calls: a continuation token or a row offset. These
//! adapters own that position and pass it to the fetch closure on every
//! call, so the closure itself stays stateless.

use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use tracing::trace;

use crate::source::{Batch, BatchSource};
use crate::{BatchError, Context};

/// Where a paginated source continues after a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor<C> {
    /// More pages exist; continue from this cursor.
    Next(C),
    /// The backend could not answer yet (throttled, still indexing); ask
    /// again with the same cursor.
    Retry,
    /// This was the last page.
    End,
}

/// One page returned by a paginated backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T, C> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Continuation.
    pub next: PageCursor<C>,
}

impl<T, C> Page<T, C> {
    /// Page followed by another page at `cursor`.
    pub fn next(items: Vec<T>, cursor: C) -> Self {
        Self {
            items,
            next: PageCursor::Next(cursor),
        }
    }

    /// Final page.
    pub fn end(items: Vec<T>) -> Self {
        Self {
            items,
            next: PageCursor::End,
        }
    }

    /// Empty page asking to be fetched again.
    pub fn retry() -> Self {
        Self {
            items: Vec::new(),
            next: PageCursor::Retry,
        }
    }
}

/// Cursor-paginated source.
///
/// `fetch_page(ctx, cursor)` is called with `None` for the first page and
/// with the cursor from the previous [`PageCursor::Next`] afterwards.
pub struct Paged<C, F> {
    fetch_page: F,
    cursor: Option<C>,
    pages: usize,
}

impl<C, F> Paged<C, F> {
    /// Start from the first page.
    pub fn new<T, Fut>(fetch_page: F) -> Self
    where
        F: FnMut(Context, Option<C>) -> Fut,
        Fut: Future<Output = Result<Page<T, C>, BatchError>>,
    {
        Self {
            fetch_page,
            cursor: None,
            pages: 0,
        }
    }

    /// Resume from a cursor saved by an earlier run.
    pub fn starting_at<T, Fut>(cursor: C, fetch_page: F) -> Self
    where
        F: FnMut(Context, Option<C>) -> Fut,
        Fut: Future<Output = Result<Page<T, C>, BatchError>>,
    {
        Self {
            fetch_page,
            cursor: Some(cursor),
            pages: 0,
        }
    }

    /// Cursor the next fetch will use.
    pub fn cursor(&self) -> Option<&C> {
        self.cursor.as_ref()
    }

    /// Number of pages fetched so far, retries included.
    pub fn pages_fetched(&self) -> usize {
        self.pages
    }
}

impl<C: fmt::Debug, F> fmt::Debug for Paged<C, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Paged")
            .field("cursor", &self.cursor)
            .field("pages", &self.pages)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<T, C, F, Fut> BatchSource<T> for Paged<C, F>
where
    T: Send + 'static,
    C: Clone + Send + 'static,
    F: FnMut(Context, Option<C>) -> Fut + Send,
    Fut: Future<Output = Result<Page<T, C>, BatchError>> + Send + 'static,
{
    async fn fetch(&mut self, ctx: &Context) -> Result<Batch<T>, BatchError> {
        self.pages += 1;
        trace!(page = self.pages, "fetching page");
        let page = (self.fetch_page)(ctx.clone(), self.cursor.clone()).await?;

        Ok(match page.next {
            PageCursor::Next(cursor) => {
                self.cursor = Some(cursor);
                Batch::more(page.items)
            }
            PageCursor::Retry => Batch::more(page.items),
            PageCursor::End => Batch::last(page.items),
        })
    }
}

/// Offset/limit source for chunked queries.
///
/// `fetch_rows(ctx, offset, limit)` returns up to `limit` rows starting at
/// `offset`. A short chunk marks the end of the data.
pub struct Offset<F> {
    fetch_rows: F,
    offset: usize,
    limit: usize,
}

impl<F> Offset<F> {
    /// Create a source reading `limit` rows per fetch, starting at zero.
    pub fn new<T, Fut>(limit: usize, fetch_rows: F) -> Result<Self, BatchError>
    where
        F: FnMut(Context, usize, usize) -> Fut,
        Fut: Future<Output = Result<Vec<T>, BatchError>>,
    {
        if limit == 0 {
            return Err(BatchError::InvalidConfig(
                "offset source limit must be > 0".to_string(),
            ));
        }
        Ok(Self {
            fetch_rows,
            offset: 0,
            limit,
        })
    }

    /// Offset the next fetch will start at.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Rows requested per fetch.
    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl<F> fmt::Debug for Offset<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Offset")
            .field("offset", &self.offset)
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<T, F, Fut> BatchSource<T> for Offset<F>
where
    T: Send + 'static,
    F: FnMut(Context, usize, usize) -> Fut + Send,
    Fut: Future<Output = Result<Vec<T>, BatchError>> + Send + 'static,
{
    async fn fetch(&mut self, ctx: &Context) -> Result<Batch<T>, BatchError> {
        trace!(offset = self.offset, limit = self.limit, "fetching rows");
        let rows = (self.fetch_rows)(ctx.clone(), self.offset, self.limit).await?;
        self.offset += self.limit;
        let has_more = rows.len() == self.limit;
        Ok(Batch::new(rows, has_more))
    }
}
