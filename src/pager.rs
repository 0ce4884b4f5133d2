//! Fixed-size pagination over an ordered snapshot of items.
//!
//! `Page` is also the wire shape returned by the feed client and the watch
//! listing, so every paged surface in the system shares the same boundary
//! semantics.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PagerError {
    #[error("Page size must be greater than zero")]
    InvalidPageSize,
}

/// One page of an ordered collection, with boundary metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page_size: usize,
    pub page_number: usize,
    pub page_count: usize,
    pub has_next: bool,
    pub has_previous: bool,
}

impl<T> Page<T> {
    /// Builds a page from an already-sliced item run plus the collection
    /// total. `page_size` must be positive; storage-layer callers validate it
    /// at the config boundary.
    #[must_use]
    pub fn new(items: Vec<T>, total: usize, page_number: usize, page_size: usize) -> Self {
        debug_assert!(page_size > 0, "page_size must be positive");
        let page_count = if page_size == 0 {
            0
        } else {
            total.div_ceil(page_size)
        };
        Self {
            items,
            total,
            page_size,
            page_number,
            page_count,
            has_next: page_number + 1 < page_count,
            has_previous: page_number > 0,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Immutable pager over a snapshot of items.
///
/// Slicing is deterministic and repeatable: the same page number always
/// yields the same items. An out-of-range page number yields an empty page
/// with `has_next = false`.
#[derive(Debug, Clone)]
pub struct Pager<T> {
    items: Vec<T>,
    page_size: usize,
}

impl<T> Pager<T> {
    pub fn new(items: Vec<T>, page_size: usize) -> Result<Self, PagerError> {
        if page_size == 0 {
            return Err(PagerError::InvalidPageSize);
        }
        Ok(Self { items, page_size })
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.items.len().div_ceil(self.page_size)
    }

    /// Consumes the pager and returns a single page without cloning items.
    #[must_use]
    pub fn into_page(self, page_number: usize) -> Page<T> {
        let total = self.items.len();
        let start = page_number.saturating_mul(self.page_size);
        let items: Vec<T> = if start >= total {
            Vec::new()
        } else {
            self.items
                .into_iter()
                .skip(start)
                .take(self.page_size)
                .collect()
        };
        Page::new(items, total, page_number, self.page_size)
    }
}

impl<T: Clone> Pager<T> {
    #[must_use]
    pub fn page(&self, page_number: usize) -> Page<T> {
        let total = self.items.len();
        let start = page_number.saturating_mul(self.page_size);
        let end = start.saturating_add(self.page_size).min(total);
        let items = if start >= total {
            Vec::new()
        } else {
            self.items[start..end].to_vec()
        };
        Page::new(items, total, page_number, self.page_size)
    }
}
