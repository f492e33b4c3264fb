//! In-memory storage implementation of the store handle.
//!
//! Collections are kept as insertion-ordered vectors of BSON documents behind
//! an async-aware read-write lock. Predicates and pipelines are evaluated in
//! process, so the store behaves like a document store would for everything
//! the query engine compiles.

use std::sync::Arc;

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use mea::rwlock::RwLock;
use tracing::debug;

use querylayer_core::{
    error::{StoreError, StoreResult},
    handle::{FindOptions, StoreHandle, StoreHandleBuilder},
};

use crate::{
    evaluator::{PredicateEvaluator, equals},
    pipeline::{PipelineExecutor, StoreMap, project, sort_documents},
    update::apply_update,
};

/// Thread-safe in-memory document store.
///
/// This struct implements [`StoreHandle`] entirely in memory. Documents keep
/// their insertion order, which is the natural order of unsorted reads.
///
/// # Thread Safety
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing
/// it to be safely shared across async tasks. Multiple clones of the same instance
/// share the same underlying data.
///
/// # Performance
///
/// Every read scans the whole collection (no indexing). It is meant for tests,
/// development and small data sets.
///
/// # Example
///
/// ```ignore
/// use querylayer_memory::InMemoryStore;
/// use querylayer::handle::StoreHandle;
/// use bson::doc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = InMemoryStore::new();
///
///     store.insert_one(doc! { "name": "Alice", "age": 30 }, "users").await?;
///     assert_eq!(store.count_documents(doc! { "age": { "$gte": 18 } }, "users").await?, 1);
///
///     Ok(())
/// }
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// collection_name -> documents in insertion order
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self::from_collections(StoreMap::new())
    }

    /// Creates a builder for seeding an `InMemoryStore` with collections.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use querylayer_memory::InMemoryStore;
    ///
    /// let store = InMemoryStore::builder()
    ///     .with_documents("posts", vec![doc! { "title": "a" }])
    ///     .build()
    ///     .await?;
    /// ```
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    fn from_collections(collections: StoreMap) -> Self {
        Self {
            store: Arc::new(RwLock::new(collections)),
        }
    }
}

/// Gives `document` an `_id` if it has none and returns the id.
fn ensure_id(document: &mut Document) -> Bson {
    match document.get("_id") {
        Some(id) => id.clone(),
        None => {
            let id = Bson::ObjectId(ObjectId::new());
            document.insert("_id", id.clone());
            id
        }
    }
}

fn check_unique(existing: &[Document], id: &Bson, collection: &str) -> StoreResult<()> {
    if existing
        .iter()
        .any(|document| equals(document.get("_id"), id))
    {
        return Err(StoreError::InvalidDocument(format!(
            "duplicate _id {id} in collection {collection}"
        )));
    }

    Ok(())
}

#[async_trait]
impl StoreHandle for InMemoryStore {
    async fn insert_one(&self, mut document: Document, collection: &str) -> StoreResult<Bson> {
        let mut store = self.store.write().await;
        let documents = store
            .entry(collection.to_string())
            .or_default();

        let id = ensure_id(&mut document);
        check_unique(documents, &id, collection)?;
        documents.push(document);

        Ok(id)
    }

    async fn insert_many(&self, documents: Vec<Document>, collection: &str) -> StoreResult<Vec<Bson>> {
        let mut store = self.store.write().await;
        let existing = store
            .entry(collection.to_string())
            .or_default();

        let mut staged: Vec<Document> = Vec::with_capacity(documents.len());
        let mut ids = Vec::with_capacity(documents.len());
        for mut document in documents {
            let id = ensure_id(&mut document);
            check_unique(existing, &id, collection)?;
            check_unique(&staged, &id, collection)?;
            ids.push(id);
            staged.push(document);
        }

        existing.extend(staged);

        Ok(ids)
    }

    async fn update_many(&self, predicate: Document, update: Document, collection: &str) -> StoreResult<u64> {
        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(0);
        };

        let mut modified = 0;
        for document in documents.iter_mut() {
            if !PredicateEvaluator::new(document).evaluate(&predicate)? {
                continue;
            }

            let mut patched = document.clone();
            apply_update(&mut patched, &update)?;
            if patched != *document {
                *document = patched;
                modified += 1;
            }
        }

        Ok(modified)
    }

    async fn delete_many(&self, predicate: Document, collection: &str) -> StoreResult<u64> {
        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(0);
        };

        let mut doomed = Vec::new();
        for (position, document) in documents.iter().enumerate() {
            if PredicateEvaluator::new(document).evaluate(&predicate)? {
                doomed.push(position);
            }
        }

        for position in doomed.iter().rev() {
            documents.remove(*position);
        }

        Ok(doomed.len() as u64)
    }

    async fn count_documents(&self, predicate: Document, collection: &str) -> StoreResult<u64> {
        let store = self.store.read().await;
        let Some(documents) = store.get(collection) else {
            return Ok(0);
        };

        let mut count = 0;
        for document in documents {
            if PredicateEvaluator::new(document).evaluate(&predicate)? {
                count += 1;
            }
        }

        Ok(count)
    }

    async fn aggregate(&self, pipeline: Vec<Document>, collection: &str) -> StoreResult<Vec<Document>> {
        let store = self.store.read().await;
        let documents = store.get(collection).cloned().unwrap_or_default();

        debug!(collection, stages = pipeline.len(), rows = documents.len(), "running pipeline in memory");

        PipelineExecutor::new(&store).execute(documents, &pipeline)
    }

    async fn find(
        &self,
        predicate: Document,
        options: FindOptions,
        collection: &str,
    ) -> StoreResult<Vec<Document>> {
        let store = self.store.read().await;
        let Some(documents) = store.get(collection) else {
            return Ok(vec![]);
        };

        let mut matched = PredicateEvaluator::filter_documents(documents, &predicate)?;

        if let Some(sort) = &options.sort {
            sort_documents(&mut matched, sort);
        }

        let skip = options.skip.unwrap_or(0) as usize;
        let limit = options.limit.map_or(usize::MAX, |limit| limit as usize);

        Ok(matched
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|document| match &options.projection {
                Some(projection) => project(&document, projection),
                None => document,
            })
            .collect())
    }

    async fn list_collections(&self, name: Option<&str>) -> StoreResult<Vec<String>> {
        let store = self.store.read().await;

        Ok(store
            .keys()
            .filter(|existing| name.is_none_or(|name| name == existing.as_str()))
            .cloned()
            .collect())
    }

    async fn create_collection(&self, name: &str) -> StoreResult<()> {
        let mut store = self.store.write().await;

        if store.contains_key(name) {
            return Err(StoreError::Backend(format!("collection already exists: {name}")));
        }

        store.insert(name.to_string(), Vec::new());

        Ok(())
    }
}

/// Builder for constructing [`InMemoryStore`] instances, optionally seeded
/// with documents.
///
/// # Example
///
/// ```ignore
/// use querylayer_memory::InMemoryStore;
/// use querylayer::handle::StoreHandleBuilder;
///
/// #[tokio::main]
/// async fn main() {
///     let store = InMemoryStore::builder().build().await.unwrap();
/// }
/// ```
#[derive(Default, Debug)]
pub struct InMemoryStoreBuilder {
    collections: StoreMap,
}

impl InMemoryStoreBuilder {
    /// Appends documents to a collection, creating it if needed.
    pub fn with_documents(mut self, collection: &str, documents: Vec<Document>) -> Self {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .extend(documents);
        self
    }

    /// Declares an empty collection.
    pub fn with_collection(mut self, collection: &str) -> Self {
        self.collections
            .entry(collection.to_string())
            .or_default();
        self
    }
}

#[async_trait]
impl StoreHandleBuilder for InMemoryStoreBuilder {
    type Handle = InMemoryStore;

    /// Builds the store, assigning an `_id` to every seeded document without one.
    ///
    /// # Errors
    ///
    /// Returns an invalid-document error if a collection holds duplicate ids.
    async fn build(mut self) -> StoreResult<Self::Handle> {
        for (collection, documents) in self.collections.iter_mut() {
            let mut seen: Vec<Document> = Vec::with_capacity(documents.len());
            for document in documents.iter_mut() {
                let id = ensure_id(document);
                check_unique(&seen, &id, collection)?;
                seen.push(document.clone());
            }
        }

        Ok(InMemoryStore::from_collections(self.collections))
    }
}
