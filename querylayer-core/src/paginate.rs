//! Count-then-fetch pagination.
//!
//! The [`PaginationEngine`] turns a [`QuerySpec`] and a [`PageCursor`] into a
//! [`ResultPage`]. It supports three read shapes:
//!
//! - **plain**: `count_documents` then `find` with projection, sort, skip and limit
//! - **unwound**: an array field is flattened into one row per element before
//!   matching, so the page counts elements rather than parent documents
//! - **joined**: a `$lookup` runs ahead of the match, and the joined field is
//!   reshaped afterwards according to the [`JoinSpec`]
//!
//! When the cursor carries the total the client observed on its previous
//! request, the skip is shifted forward by the number of rows inserted since
//! (see [`PageCursor::drift`]).
//!
//! # Example
//!
//! ```ignore
//! use querylayer::prelude::*;
//!
//! let engine = PaginationEngine::new(&handle, "posts", PageLimits::default());
//! let page = engine
//!     .fetch(&QuerySpec::builder().sort("createdAt", "desc").build(), PageCursor::new(2, 20))
//!     .await?;
//! ```

use bson::Document;
use tracing::debug;

use crate::{
    config::PageLimits,
    error::StoreResult,
    handle::{FindOptions, StoreHandle},
    join::{JoinEngine, JoinSpec},
    page::{PageCursor, ResultPage, page_count},
    pipeline::{Pipeline, read_count},
    query::QuerySpec,
};

const TOTAL_FIELD: &str = "total";

/// Paginated reads over one collection.
#[derive(Debug)]
pub struct PaginationEngine<'a, H: StoreHandle> {
    handle: &'a H,
    collection: &'a str,
    limits: PageLimits,
}

impl<'a, H: StoreHandle> PaginationEngine<'a, H> {
    /// Creates an engine reading `collection` through `handle`.
    pub fn new(handle: &'a H, collection: &'a str, limits: PageLimits) -> Self {
        Self {
            handle,
            collection,
            limits,
        }
    }

    /// Reads one page of a plain query.
    ///
    /// # Errors
    ///
    /// Propagates any store error from the count or the find.
    pub async fn fetch(&self, query: &QuerySpec, cursor: PageCursor) -> StoreResult<ResultPage> {
        let cursor = cursor.normalized(&self.limits);
        let predicate = query.predicate();

        let total = if cursor.compute_total {
            Some(
                self.handle
                    .count_documents(predicate.clone(), self.collection)
                    .await?,
            )
        } else {
            None
        };
        let skip = self.skip(&cursor, total);

        let options = FindOptions::new()
            .with_projection(query.projection())
            .with_sort(query.sort())
            .with_skip(skip)
            .with_limit(cursor.size as u64);
        let items = self
            .handle
            .find(predicate, options, self.collection)
            .await?;

        Ok(ResultPage::builder(&cursor)
            .with_total(total)
            .with_items(items)
            .build())
    }

    /// Reads one page of rows produced by unwinding `array_field`.
    ///
    /// The filter applies to the unwound rows, so it may address the array
    /// field as if it held a single element.
    ///
    /// # Errors
    ///
    /// Propagates any store error from either aggregation.
    pub async fn fetch_unwound(
        &self,
        array_field: &str,
        query: &QuerySpec,
        cursor: PageCursor,
    ) -> StoreResult<ResultPage> {
        let cursor = cursor.normalized(&self.limits);
        let head = Pipeline::new()
            .unwind(array_field)
            .filter(query.predicate());

        self.fetch_pipeline(head, query, cursor)
            .await
    }

    /// Reads one page of a query joined with another collection.
    ///
    /// # Errors
    ///
    /// Propagates any store error from either aggregation.
    pub async fn fetch_joined(
        &self,
        join: &JoinSpec,
        query: &QuerySpec,
        cursor: PageCursor,
    ) -> StoreResult<ResultPage> {
        let cursor = cursor.normalized(&self.limits);
        let head = Pipeline::new()
            .stage(JoinEngine::lookup_stage(join))
            .filter(query.predicate());

        let page = self.fetch_pipeline(head, query, cursor).await?;

        Ok(ResultPage {
            items: JoinEngine::reshape(join, page.items),
            ..page
        })
    }

    /// Reads every matching document, page by page.
    ///
    /// One count is issued first, then `ceil(total / chunk)` sequential page
    /// reads without totals. `chunk` is clamped like a page size.
    ///
    /// # Errors
    ///
    /// Propagates the first store error; rows already read are discarded.
    pub async fn fetch_all(&self, query: &QuerySpec, chunk: usize) -> StoreResult<Vec<Document>> {
        let size = self.limits.clamp(chunk);
        let total = self
            .handle
            .count_documents(query.predicate(), self.collection)
            .await?;
        let pages = page_count(total, size);

        debug!(collection = self.collection, total, pages, size, "reading all rows");

        let mut items = Vec::new();
        for page in 1..=pages as usize {
            let cursor = PageCursor::new(page, size).with_total(false);
            items.extend(self.fetch(query, cursor).await?.items);
        }

        Ok(items)
    }

    async fn fetch_pipeline(
        &self,
        head: Pipeline,
        query: &QuerySpec,
        cursor: PageCursor,
    ) -> StoreResult<ResultPage> {
        let total = if cursor.compute_total {
            let counted = head.clone().count(TOTAL_FIELD).into_stages();
            debug!(collection = self.collection, pipeline = ?counted, "counting rows");

            let rows = self
                .handle
                .aggregate(counted, self.collection)
                .await?;
            Some(rows.first().map_or(0, |row| read_count(row, TOTAL_FIELD)))
        } else {
            None
        };
        let skip = self.skip(&cursor, total);

        let pipeline = head
            .project(query.projection())
            .sort(query.sort())
            .skip(skip)
            .limit(cursor.size as u64)
            .into_stages();
        debug!(collection = self.collection, pipeline = ?pipeline, "fetching rows");

        let items = self
            .handle
            .aggregate(pipeline, self.collection)
            .await?;

        Ok(ResultPage::builder(&cursor)
            .with_total(total)
            .with_items(items)
            .build())
    }

    fn skip(&self, cursor: &PageCursor, total: Option<u64>) -> u64 {
        let drift = total.map_or(0, |total| cursor.drift(total));
        let skip = cursor.skip(drift);

        debug!(
            collection = self.collection,
            page = cursor.page,
            size = cursor.size,
            drift,
            skip,
            "resolved page offset"
        );

        skip
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bson::{Bson, doc};

    use super::*;

    /// Answers counts with a fixed total and records every read it serves.
    #[derive(Debug, Default)]
    struct Recorder {
        total: u64,
        finds: Mutex<Vec<FindOptions>>,
        pipelines: Mutex<Vec<Vec<Document>>>,
    }

    impl Recorder {
        fn with_total(total: u64) -> Self {
            Self {
                total,
                ..Self::default()
            }
        }

        fn skips(&self) -> Vec<Option<u64>> {
            self.finds
                .lock()
                .unwrap()
                .iter()
                .map(|options| options.skip)
                .collect()
        }
    }

    #[async_trait]
    impl StoreHandle for Recorder {
        async fn insert_one(&self, _document: Document, _collection: &str) -> StoreResult<Bson> {
            Ok(Bson::Null)
        }

        async fn insert_many(&self, _documents: Vec<Document>, _collection: &str) -> StoreResult<Vec<Bson>> {
            Ok(Vec::new())
        }

        async fn update_many(&self, _predicate: Document, _update: Document, _collection: &str) -> StoreResult<u64> {
            Ok(0)
        }

        async fn delete_many(&self, _predicate: Document, _collection: &str) -> StoreResult<u64> {
            Ok(0)
        }

        async fn count_documents(&self, _predicate: Document, _collection: &str) -> StoreResult<u64> {
            Ok(self.total)
        }

        async fn aggregate(&self, pipeline: Vec<Document>, _collection: &str) -> StoreResult<Vec<Document>> {
            let counting = pipeline
                .last()
                .is_some_and(|stage| stage.contains_key("$count"));
            self.pipelines.lock().unwrap().push(pipeline);

            Ok(if counting {
                vec![doc! { TOTAL_FIELD: self.total as i64 }]
            } else {
                Vec::new()
            })
        }

        async fn find(
            &self,
            _predicate: Document,
            options: FindOptions,
            _collection: &str,
        ) -> StoreResult<Vec<Document>> {
            self.finds.lock().unwrap().push(options);
            Ok(Vec::new())
        }

        async fn list_collections(&self, _name: Option<&str>) -> StoreResult<Vec<String>> {
            Ok(Vec::new())
        }

        async fn create_collection(&self, _name: &str) -> StoreResult<()> {
            Ok(())
        }
    }

    fn engine(handle: &Recorder) -> PaginationEngine<'_, Recorder> {
        PaginationEngine::new(handle, "posts", PageLimits::default())
    }

    #[tokio::test]
    async fn drift_shifts_the_skip_by_new_rows() {
        let handle = Recorder::with_total(105);
        let engine = engine(&handle);

        engine
            .fetch(&QuerySpec::new(), PageCursor::new(3, 10))
            .await
            .unwrap();
        let page = engine
            .fetch(&QuerySpec::new(), PageCursor::new(3, 10).with_previous_total(100))
            .await
            .unwrap();

        assert_eq!(handle.skips(), vec![Some(20), Some(25)]);
        assert_eq!(page.total, Some(105));
        assert_eq!(page.page_count, Some(11));
    }

    #[tokio::test]
    async fn huge_page_numbers_saturate_the_skip() {
        let handle = Recorder::with_total(40);

        engine(&handle)
            .fetch(&QuerySpec::new(), PageCursor::new(usize::MAX, 20).with_previous_total(10))
            .await
            .unwrap();

        assert_eq!(handle.skips(), vec![Some(u64::MAX)]);
    }

    #[tokio::test]
    async fn drift_never_applies_to_the_first_page_or_a_shrinking_total() {
        let handle = Recorder::with_total(90);
        let engine = engine(&handle);

        engine
            .fetch(&QuerySpec::new(), PageCursor::new(1, 10).with_previous_total(50))
            .await
            .unwrap();
        engine
            .fetch(&QuerySpec::new(), PageCursor::new(2, 10).with_previous_total(100))
            .await
            .unwrap();

        assert_eq!(handle.skips(), vec![Some(0), Some(10)]);
    }

    #[tokio::test]
    async fn fetch_all_counts_once_then_pages_without_totals() {
        let handle = Recorder::with_total(25);

        engine(&handle)
            .fetch_all(&QuerySpec::new(), 10)
            .await
            .unwrap();

        assert_eq!(handle.skips(), vec![Some(0), Some(10), Some(20)]);
    }

    #[tokio::test]
    async fn joined_reads_count_then_fetch_behind_the_lookup() {
        let handle = Recorder::with_total(7);
        let join = JoinSpec::new("authors", "authorId", "_id", "author");
        let query = QuerySpec::builder()
            .fields("title,author")
            .sort("createdAt", "desc")
            .build();

        let page = engine(&handle)
            .fetch_joined(&join, &query, PageCursor::new(2, 5))
            .await
            .unwrap();
        assert_eq!(page.total, Some(7));

        let pipelines = handle.pipelines.lock().unwrap();
        let lookup = JoinEngine::lookup_stage(&join);
        assert_eq!(
            pipelines[0],
            vec![lookup.clone(), doc! { "$match": {} }, doc! { "$count": TOTAL_FIELD }]
        );
        assert_eq!(
            pipelines[1],
            vec![
                lookup,
                doc! { "$match": {} },
                doc! { "$project": { "title": 1, "author": 1 } },
                doc! { "$sort": { "createdAt": -1 } },
                doc! { "$skip": 5_i64 },
                doc! { "$limit": 5_i64 },
            ]
        );
    }
}
