//! Collection-level data access.
//!
//! A [`Collection`] is a lightweight view over one named collection of a
//! [`QueryStore`](crate::store::QueryStore). It exposes the write operations
//! (insert, batched insert, `$set`/`$inc`/`$mul` updates, deletes), the plain
//! and unwound bulk reads, and forwards paginated reads and aggregations to the
//! [`PaginationEngine`] and [`AggregationOps`].
//!
//! Every method taking a where clause accepts anything convertible into
//! [`Where`]: a [`FilterSpec`](crate::filter::FilterSpec), a native filter
//! document, or a bare id.
//!
//! # Example
//!
//! ```ignore
//! use querylayer::prelude::*;
//! use bson::doc;
//!
//! let posts = store.collection("posts");
//! let id = posts.insert(doc! { "title": "hello", "views": 0 }).await?;
//! posts.inc(id.clone(), "views", 1).await?;
//!
//! let page = posts
//!     .page(&QuerySpec::builder().sort("createdAt", "desc").build(), PageCursor::new(1, 20))
//!     .await?;
//! ```

use bson::{Bson, Document, doc};
use tracing::debug;

use crate::{
    aggregate::{AggregationOps, Sample},
    config::EngineConfig,
    error::StoreResult,
    filter::Where,
    handle::{FindOptions, StoreHandle},
    join::JoinSpec,
    page::{PageCursor, ResultPage},
    paginate::PaginationEngine,
    pipeline::Pipeline,
    predicate::PredicateCompiler,
    projection::ProjectionSpec,
    query::QuerySpec,
};

/// A view over one named collection.
///
/// # Type Parameters
///
/// * `'a` - Lifetime of the store the view was taken from
/// * `H` - The store handle type
#[derive(Debug)]
pub struct Collection<'a, H: StoreHandle> {
    name: String,
    handle: &'a H,
    config: &'a EngineConfig,
}

impl<'a, H: StoreHandle> Collection<'a, H> {
    /// Creates a new collection view (internal use).
    pub(crate) fn new(name: String, handle: &'a H, config: &'a EngineConfig) -> Self {
        Self {
            name,
            handle,
            config,
        }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Paginated reads over this collection.
    pub fn pagination(&self) -> PaginationEngine<'_, H> {
        PaginationEngine::new(self.handle, &self.name, self.config.limits)
    }

    /// Aggregations over this collection.
    pub fn aggregation(&self) -> AggregationOps<'_, H> {
        AggregationOps::new(self.handle, &self.name, self.config.limits)
    }

    /// Inserts one document and returns its id.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](crate::error::StoreError) if the store rejects the write.
    pub async fn insert(&self, document: Document) -> StoreResult<Bson> {
        self.handle
            .insert_one(document, &self.name)
            .await
    }

    /// Inserts documents in chunks of the configured batch size, one round trip
    /// per chunk. Returns every inserted id in input order.
    ///
    /// # Errors
    ///
    /// Stops at the first failing chunk; earlier chunks stay inserted.
    pub async fn insert_batch(&self, documents: Vec<Document>) -> StoreResult<Vec<Bson>> {
        let batch_size = self.config.batch_size.max(1);
        let mut ids = Vec::with_capacity(documents.len());

        for chunk in documents.chunks(batch_size) {
            debug!(collection = %self.name, rows = chunk.len(), "inserting batch");

            ids.extend(
                self.handle
                    .insert_many(chunk.to_vec(), &self.name)
                    .await?,
            );
        }

        Ok(ids)
    }

    /// Sets the fields of `patch` on every matching document, returning the
    /// number modified.
    pub async fn edit(&self, filter: impl Into<Where>, patch: Document) -> StoreResult<u64> {
        self.update(filter.into(), doc! { "$set": patch })
            .await
    }

    /// Atomically increments `field` by `by` on every matching document.
    pub async fn inc(
        &self,
        filter: impl Into<Where>,
        field: &str,
        by: impl Into<Bson>,
    ) -> StoreResult<u64> {
        self.update(filter.into(), doc! { "$inc": { field: by.into() } })
            .await
    }

    /// Atomically multiplies `field` by `by` on every matching document.
    pub async fn mul(
        &self,
        filter: impl Into<Where>,
        field: &str,
        by: impl Into<Bson>,
    ) -> StoreResult<u64> {
        self.update(filter.into(), doc! { "$mul": { field: by.into() } })
            .await
    }

    /// Deletes every matching document, returning the number deleted.
    pub async fn delete(&self, filter: impl Into<Where>) -> StoreResult<u64> {
        self.handle
            .delete_many(PredicateCompiler::compile_where(&filter.into()), &self.name)
            .await
    }

    /// Deletes every document of the collection.
    pub async fn clear(&self) -> StoreResult<u64> {
        self.handle
            .delete_many(Document::new(), &self.name)
            .await
    }

    /// Counts matching documents.
    pub async fn count(&self, filter: impl Into<Where>) -> StoreResult<u64> {
        self.aggregation()
            .count(&filter.into())
            .await
    }

    /// The first document of `query`, if any.
    pub async fn get_one(&self, query: &QuerySpec) -> StoreResult<Option<Document>> {
        let options = FindOptions::new()
            .with_projection(query.projection())
            .with_sort(query.sort())
            .with_limit(1);

        let rows = self
            .handle
            .find(query.predicate(), options, &self.name)
            .await?;

        Ok(rows.into_iter().next())
    }

    /// Up to `limit` documents of `query` in one round trip.
    ///
    /// `limit` is clamped to the maximum page size; zero means the maximum.
    pub async fn get_all(&self, query: &QuerySpec, limit: usize) -> StoreResult<Vec<Document>> {
        let options = FindOptions::new()
            .with_projection(query.projection())
            .with_sort(query.sort())
            .with_limit(self.config.limits.clamp_limit(limit) as u64);

        self.handle
            .find(query.predicate(), options, &self.name)
            .await
    }

    /// Up to `limit` rows produced by unwinding `array_field` and then applying
    /// `query` to each element.
    pub async fn get_all_by_array(
        &self,
        array_field: &str,
        query: &QuerySpec,
        limit: usize,
    ) -> StoreResult<Vec<Document>> {
        let pipeline = Pipeline::new()
            .unwind(array_field)
            .filter(query.predicate())
            .project(query.projection())
            .sort(query.sort())
            .limit(self.config.limits.clamp_limit(limit) as u64);

        self.handle
            .aggregate(pipeline.into_stages(), &self.name)
            .await
    }

    /// Every document of `query`, read in chunks of `chunk` rows.
    pub async fn get_all_big(&self, query: &QuerySpec, chunk: usize) -> StoreResult<Vec<Document>> {
        self.pagination()
            .fetch_all(query, chunk)
            .await
    }

    /// One page of `query`.
    pub async fn page(&self, query: &QuerySpec, cursor: PageCursor) -> StoreResult<ResultPage> {
        self.pagination()
            .fetch(query, cursor)
            .await
    }

    /// One page of the rows produced by unwinding `array_field`.
    pub async fn page_by_array(
        &self,
        array_field: &str,
        query: &QuerySpec,
        cursor: PageCursor,
    ) -> StoreResult<ResultPage> {
        self.pagination()
            .fetch_unwound(array_field, query, cursor)
            .await
    }

    /// One page of `query` joined with another collection.
    pub async fn page_joined(
        &self,
        join: &JoinSpec,
        query: &QuerySpec,
        cursor: PageCursor,
    ) -> StoreResult<ResultPage> {
        self.pagination()
            .fetch_joined(join, query, cursor)
            .await
    }

    /// Draws `size` random matching documents.
    pub async fn random(
        &self,
        filter: impl Into<Where>,
        projection: impl Into<ProjectionSpec>,
        size: usize,
    ) -> StoreResult<Sample> {
        self.aggregation()
            .random(&filter.into(), &projection.into(), size)
            .await
    }

    async fn update(&self, filter: Where, update: Document) -> StoreResult<u64> {
        self.handle
            .update_many(PredicateCompiler::compile_where(&filter), update, &self.name)
            .await
    }
}
