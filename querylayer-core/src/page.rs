//! Pagination cursors and result pages.
//!
//! This module provides the [`PageCursor`] a caller sends with every paginated
//! read and the [`ResultPage`] it gets back, along with the arithmetic that
//! turns one into a skip/limit pair.
//!
//! # Drift correction
//!
//! Paging sessions are not globally consistent: between two requests, new rows
//! may be inserted ahead of the page the client is about to read. A client that
//! sends back the `total` it saw on its previous request as `previous_total`
//! lets the engine shift the skip forward by the number of rows that appeared
//! since, so the next page neither repeats nor skips rows. This assumes
//! insertions land at the front of the sort order and deletions are rare; it
//! is a heuristic resynchronized on every call, not a consistency guarantee.

use bson::{Document, de::deserialize_from_bson};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{config::PageLimits, error::StoreResult};

/// Position and options of a paginated read.
///
/// Pages are 1-indexed.
///
/// # Example
///
/// ```ignore
/// use querylayer::page::PageCursor;
///
/// // Second page of 50, with the total the client saw on page one.
/// let cursor = PageCursor::new(2, 50).with_previous_total(1_204);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct PageCursor {
    /// The page number (1-indexed).
    pub page: usize,
    /// Requested page size; resolved against [`PageLimits`] before use.
    pub size: usize,
    /// Whether to count matching rows and report `total`/`page_count`.
    pub compute_total: bool,
    /// The total the client saw on its previous request, or zero.
    pub previous_total: u64,
}

impl PageCursor {
    /// Creates a cursor for `page` with `size` rows, computing totals.
    pub fn new(page: usize, size: usize) -> Self {
        Self {
            page,
            size,
            compute_total: true,
            previous_total: 0,
        }
    }

    /// Sets whether totals are computed.
    pub fn with_total(mut self, compute_total: bool) -> Self {
        self.compute_total = compute_total;
        self
    }

    /// Sets the total observed on the previous request.
    pub fn with_previous_total(mut self, previous_total: u64) -> Self {
        self.previous_total = previous_total;
        self
    }

    /// Returns a copy with the page raised to at least 1 and the size clamped.
    pub fn normalized(self, limits: &PageLimits) -> Self {
        Self {
            page: self.page.max(1),
            size: limits.clamp(self.size),
            ..self
        }
    }

    /// Number of rows the store inserted ahead of this page since the client's
    /// previous request.
    ///
    /// Zero on the first page, when the client sent no previous total, or when
    /// the collection shrank.
    pub fn drift(&self, current_total: u64) -> u64 {
        if self.page > 1 && self.previous_total > 0 {
            current_total.saturating_sub(self.previous_total)
        } else {
            0
        }
    }

    /// Number of rows to skip for this page, including drift.
    pub fn skip(&self, drift: u64) -> u64 {
        (self.page.saturating_sub(1) as u64)
            .saturating_mul(self.size as u64)
            .saturating_add(drift)
    }
}

impl Default for PageCursor {
    fn default() -> Self {
        Self::new(1, 0)
    }
}

/// Number of pages needed for `total` rows at `size` rows per page.
pub fn page_count(total: u64, size: usize) -> u64 {
    match size {
        0 => 0,
        size => total.div_ceil(size as u64),
    }
}

/// A single page of results.
///
/// `total` and `page_count` are present only when the cursor asked for them.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResultPage<T = Document> {
    /// The page number that was served.
    pub page: usize,
    /// The resolved page size.
    pub size: usize,
    /// Total number of matching rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// `ceil(total / size)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u64>,
    /// The rows of this page.
    pub items: Vec<T>,
}

impl<T> ResultPage<T> {
    /// Creates a new builder for a page served with `cursor`.
    pub fn builder(cursor: &PageCursor) -> ResultPageBuilder<T> {
        ResultPageBuilder::new(cursor)
    }

    /// Applies `f` to every item.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> ResultPage<U> {
        ResultPage {
            page: self.page,
            size: self.size,
            total: self.total,
            page_count: self.page_count,
            items: self.items.into_iter().map(f).collect(),
        }
    }
}

impl ResultPage<Document> {
    /// Deserializes every item into `T`.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if any item does not match `T`.
    pub fn into_typed<T: DeserializeOwned>(self) -> StoreResult<ResultPage<T>> {
        let items = self
            .items
            .into_iter()
            .map(|item| deserialize_from_bson(item.into()))
            .collect::<Result<Vec<T>, _>>()?;

        Ok(ResultPage {
            page: self.page,
            size: self.size,
            total: self.total,
            page_count: self.page_count,
            items,
        })
    }
}

/// Builder for constructing [`ResultPage`] instances.
pub struct ResultPageBuilder<T> {
    page: usize,
    size: usize,
    total: Option<u64>,
    items: Vec<T>,
}

impl<T> ResultPageBuilder<T> {
    /// Creates a new builder for a page served with `cursor`.
    pub fn new(cursor: &PageCursor) -> Self {
        Self {
            page: cursor.page,
            size: cursor.size,
            total: None,
            items: Vec::new(),
        }
    }

    /// Sets the total number of matching rows.
    pub fn with_total(mut self, total: Option<u64>) -> Self {
        self.total = total;
        self
    }

    /// Sets the rows of this page.
    pub fn with_items(mut self, items: Vec<T>) -> Self {
        self.items = items;
        self
    }

    /// Builds the page, deriving `page_count` from the total.
    pub fn build(self) -> ResultPage<T> {
        ResultPage {
            page: self.page,
            size: self.size,
            total: self.total,
            page_count: self.total.map(|total| page_count(total, self.size)),
            items: self.items,
        }
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;
    use serde::Deserialize;

    use super::*;

    #[test]
    fn normalizes_page_and_size() {
        let limits = PageLimits::default();

        assert_eq!(PageCursor::new(0, 5000).normalized(&limits), PageCursor::new(1, 1000));
        assert_eq!(PageCursor::new(3, 0).normalized(&limits), PageCursor::new(3, 20));
    }

    #[test]
    fn page_count_rounds_up() {
        for size in 1..=7usize {
            for total in 0..=50u64 {
                let expected = (total as f64 / size as f64).ceil() as u64;
                assert_eq!(page_count(total, size), expected, "total={total} size={size}");
            }
        }
    }

    #[test]
    fn drift_counts_rows_inserted_since_previous_request() {
        let cursor = PageCursor::new(3, 10).with_previous_total(100);

        assert_eq!(cursor.drift(104), 4);
        assert_eq!(cursor.skip(cursor.drift(104)), 24);
        assert_eq!(cursor.drift(90), 0);
    }

    #[test]
    fn skip_saturates_for_huge_pages() {
        let cursor = PageCursor::new(usize::MAX, 20);

        assert_eq!(cursor.skip(0), u64::MAX);
        assert_eq!(PageCursor::new(2, 10).skip(u64::MAX), u64::MAX);
    }

    #[test]
    fn drift_is_ignored_on_first_page_or_without_history() {
        assert_eq!(PageCursor::new(1, 10).with_previous_total(100).drift(150), 0);
        assert_eq!(PageCursor::new(2, 10).drift(150), 0);
    }

    #[test]
    fn serializes_totals_only_when_present() {
        let cursor = PageCursor::new(1, 10);
        let without: ResultPage<i32> = ResultPage::builder(&cursor).with_items(vec![1]).build();
        let with: ResultPage<i32> = ResultPage::builder(&cursor)
            .with_total(Some(25))
            .with_items(vec![1])
            .build();

        assert_eq!(
            serde_json::to_value(&without).unwrap(),
            serde_json::json!({ "page": 1, "size": 10, "items": [1] })
        );
        assert_eq!(
            serde_json::to_value(&with).unwrap(),
            serde_json::json!({ "page": 1, "size": 10, "total": 25, "pageCount": 3, "items": [1] })
        );
    }

    #[test]
    fn converts_items_into_typed_rows() {
        #[derive(Deserialize, Debug, PartialEq)]
        struct Row {
            title: String,
        }

        let page = ResultPage::builder(&PageCursor::new(1, 10))
            .with_items(vec![doc! { "title": "a" }])
            .build()
            .into_typed::<Row>()
            .unwrap();

        assert_eq!(page.items, vec![Row { title: "a".to_string() }]);
    }
}
