//! The store handle abstraction.
//!
//! This module defines the contract the query engine consumes from a live
//! document store. A [`StoreHandle`] owns all I/O; the compilers and engines of
//! this crate only build native predicates and pipelines and hand them over.
//!
//! # Overview
//!
//! Every operation takes the name of the collection it targets as its last
//! argument, so a single handle (one connection) serves the whole process.
//! Implementations must be thread-safe (`Send + Sync`); the engine keeps no
//! state of its own between calls and relies entirely on the store's native
//! concurrency guarantees.
//!
//! # Examples
//!
//! ```ignore
//! use querylayer::handle::StoreHandle;
//! use bson::doc;
//!
//! let id = handle.insert_one(doc! { "title": "hello" }, "posts").await?;
//! let total = handle.count_documents(doc! {}, "posts").await?;
//! ```

use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use bson::{Bson, Document};

use crate::error::StoreResult;

/// Options of a plain find.
///
/// Each field is applied only when set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Native inclusion projection.
    pub projection: Option<Document>,
    /// Native sort document.
    pub sort: Option<Document>,
    /// Number of matching documents to skip.
    pub skip: Option<u64>,
    /// Maximum number of documents to return.
    pub limit: Option<u64>,
}

impl FindOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the projection.
    pub fn with_projection(mut self, projection: Option<Document>) -> Self {
        self.projection = projection;
        self
    }

    /// Sets the sort.
    pub fn with_sort(mut self, sort: Option<Document>) -> Self {
        self.sort = sort;
        self
    }

    /// Sets the skip.
    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Sets the limit.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A live connection to a document store.
///
/// Driver errors are returned as [`StoreError`](crate::error::StoreError)
/// values and never swallowed by implementations; the advisory paths that
/// tolerate failure do so one level up, in [`QueryStore`](crate::store::QueryStore).
#[async_trait]
pub trait StoreHandle: Send + Sync + Debug {
    /// Inserts one document, returning its `_id`.
    ///
    /// A document without `_id` gets one assigned by the store.
    async fn insert_one(&self, document: Document, collection: &str) -> StoreResult<Bson>;

    /// Inserts several documents in one round trip, returning their ids in
    /// input order.
    async fn insert_many(
        &self,
        documents: Vec<Document>,
        collection: &str,
    ) -> StoreResult<Vec<Bson>>;

    /// Applies a native update document (`$set`, `$inc`, `$mul`) to every
    /// document matching `predicate`, returning the number modified.
    async fn update_many(
        &self,
        predicate: Document,
        update: Document,
        collection: &str,
    ) -> StoreResult<u64>;

    /// Deletes every document matching `predicate`, returning the number deleted.
    async fn delete_many(&self, predicate: Document, collection: &str) -> StoreResult<u64>;

    /// Counts the documents matching `predicate`.
    async fn count_documents(&self, predicate: Document, collection: &str) -> StoreResult<u64>;

    /// Runs a native aggregation pipeline.
    async fn aggregate(
        &self,
        pipeline: Vec<Document>,
        collection: &str,
    ) -> StoreResult<Vec<Document>>;

    /// Finds documents matching `predicate`, applying `options` in the order
    /// project, sort, skip, limit.
    async fn find(
        &self,
        predicate: Document,
        options: FindOptions,
        collection: &str,
    ) -> StoreResult<Vec<Document>>;

    /// Lists collection names, optionally only the one named `name`.
    async fn list_collections(&self, name: Option<&str>) -> StoreResult<Vec<String>>;

    /// Creates an empty collection.
    ///
    /// Creating a collection that already exists is an error.
    async fn create_collection(&self, name: &str) -> StoreResult<()>;

    /// Releases the connection.
    ///
    /// The default implementation is a no-op.
    async fn shutdown(self) -> StoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<H> StoreHandle for &H
where
    H: StoreHandle,
{
    async fn insert_one(&self, document: Document, collection: &str) -> StoreResult<Bson> {
        (*self).insert_one(document, collection).await
    }

    async fn insert_many(
        &self,
        documents: Vec<Document>,
        collection: &str,
    ) -> StoreResult<Vec<Bson>> {
        (*self).insert_many(documents, collection).await
    }

    async fn update_many(
        &self,
        predicate: Document,
        update: Document,
        collection: &str,
    ) -> StoreResult<u64> {
        (*self).update_many(predicate, update, collection).await
    }

    async fn delete_many(&self, predicate: Document, collection: &str) -> StoreResult<u64> {
        (*self).delete_many(predicate, collection).await
    }

    async fn count_documents(&self, predicate: Document, collection: &str) -> StoreResult<u64> {
        (*self).count_documents(predicate, collection).await
    }

    async fn aggregate(
        &self,
        pipeline: Vec<Document>,
        collection: &str,
    ) -> StoreResult<Vec<Document>> {
        (*self).aggregate(pipeline, collection).await
    }

    async fn find(
        &self,
        predicate: Document,
        options: FindOptions,
        collection: &str,
    ) -> StoreResult<Vec<Document>> {
        (*self).find(predicate, options, collection).await
    }

    async fn list_collections(&self, name: Option<&str>) -> StoreResult<Vec<String>> {
        (*self).list_collections(name).await
    }

    async fn create_collection(&self, name: &str) -> StoreResult<()> {
        (*self).create_collection(name).await
    }
}

/// A shared handle. Shutting it down releases the connection only when this is
/// the last reference.
#[async_trait]
impl<H> StoreHandle for Arc<H>
where
    H: StoreHandle,
{
    async fn insert_one(&self, document: Document, collection: &str) -> StoreResult<Bson> {
        (**self).insert_one(document, collection).await
    }

    async fn insert_many(
        &self,
        documents: Vec<Document>,
        collection: &str,
    ) -> StoreResult<Vec<Bson>> {
        (**self).insert_many(documents, collection).await
    }

    async fn update_many(
        &self,
        predicate: Document,
        update: Document,
        collection: &str,
    ) -> StoreResult<u64> {
        (**self).update_many(predicate, update, collection).await
    }

    async fn delete_many(&self, predicate: Document, collection: &str) -> StoreResult<u64> {
        (**self).delete_many(predicate, collection).await
    }

    async fn count_documents(&self, predicate: Document, collection: &str) -> StoreResult<u64> {
        (**self).count_documents(predicate, collection).await
    }

    async fn aggregate(
        &self,
        pipeline: Vec<Document>,
        collection: &str,
    ) -> StoreResult<Vec<Document>> {
        (**self).aggregate(pipeline, collection).await
    }

    async fn find(
        &self,
        predicate: Document,
        options: FindOptions,
        collection: &str,
    ) -> StoreResult<Vec<Document>> {
        (**self).find(predicate, options, collection).await
    }

    async fn list_collections(&self, name: Option<&str>) -> StoreResult<Vec<String>> {
        (**self).list_collections(name).await
    }

    async fn create_collection(&self, name: &str) -> StoreResult<()> {
        (**self).create_collection(name).await
    }

    async fn shutdown(self) -> StoreResult<()> {
        match Arc::try_unwrap(self) {
            Ok(handle) => handle.shutdown().await,
            Err(_) => Ok(()),
        }
    }
}

/// Factory for store handles, typically connecting to a server.
#[async_trait]
pub trait StoreHandleBuilder {
    type Handle: StoreHandle;

    async fn build(self) -> StoreResult<Self::Handle>;
}
