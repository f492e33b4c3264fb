use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection as MongoCollection, Database,
    options::{ClientOptions, FindOptions as MongoFindOptions},
};
use tracing::{debug, info};

use querylayer_core::{
    error::{StoreError, StoreResult},
    handle::{FindOptions, StoreHandle, StoreHandleBuilder},
};

/// A [`StoreHandle`] over one MongoDB database.
///
/// The handle wraps a single driver [`Client`], which pools its connections;
/// create it once and share it for the lifetime of the process.
#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    /// The name of the database this store reads and writes.
    pub fn database_name(&self) -> &str {
        &self.database
    }

    fn database(&self) -> Database {
        self.client.database(&self.database)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.database().collection(collection_name)
    }
}

fn backend_error(e: mongodb::error::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[async_trait]
impl StoreHandle for MongoDbStore {
    async fn insert_one(&self, document: Document, collection: &str) -> StoreResult<Bson> {
        Ok(self
            .get_collection(collection)
            .insert_one(document)
            .await
            .map_err(backend_error)?
            .inserted_id)
    }

    async fn insert_many(&self, documents: Vec<Document>, collection: &str) -> StoreResult<Vec<Bson>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let mut inserted = self
            .get_collection(collection)
            .insert_many(documents)
            .await
            .map_err(backend_error)?
            .inserted_ids
            .into_iter()
            .collect::<Vec<(usize, Bson)>>();
        inserted.sort_by_key(|(index, _)| *index);

        Ok(inserted
            .into_iter()
            .map(|(_, id)| id)
            .collect())
    }

    async fn update_many(&self, predicate: Document, update: Document, collection: &str) -> StoreResult<u64> {
        Ok(self
            .get_collection(collection)
            .update_many(predicate, update)
            .await
            .map_err(backend_error)?
            .modified_count)
    }

    async fn delete_many(&self, predicate: Document, collection: &str) -> StoreResult<u64> {
        Ok(self
            .get_collection(collection)
            .delete_many(predicate)
            .await
            .map_err(backend_error)?
            .deleted_count)
    }

    async fn count_documents(&self, predicate: Document, collection: &str) -> StoreResult<u64> {
        self.get_collection(collection)
            .count_documents(predicate)
            .await
            .map_err(backend_error)
    }

    async fn aggregate(&self, pipeline: Vec<Document>, collection: &str) -> StoreResult<Vec<Document>> {
        debug!(collection, ?pipeline, "running aggregation");

        self.get_collection(collection)
            .aggregate(pipeline)
            .await
            .map_err(backend_error)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(backend_error)
    }

    async fn find(
        &self,
        predicate: Document,
        options: FindOptions,
        collection: &str,
    ) -> StoreResult<Vec<Document>> {
        let mut find_options = MongoFindOptions::default();
        find_options.projection = options.projection;
        find_options.sort = options.sort;
        // The server stores skip as a signed 64-bit integer.
        find_options.skip = options.skip.map(|skip| skip.min(i64::MAX as u64));
        find_options.limit = options
            .limit
            .map(|limit| i64::try_from(limit).unwrap_or(i64::MAX));

        self.get_collection(collection)
            .find(predicate)
            .with_options(find_options)
            .await
            .map_err(backend_error)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(backend_error)
    }

    async fn list_collections(&self, name: Option<&str>) -> StoreResult<Vec<String>> {
        let database = self.database();
        let listing = database.list_collection_names();

        match name {
            Some(name) => listing.filter(doc! { "name": name }).await,
            None => listing.await,
        }
        .map_err(backend_error)
    }

    async fn create_collection(&self, name: &str) -> StoreResult<()> {
        self.database()
            .create_collection(name)
            .await
            .map_err(backend_error)
    }

    async fn shutdown(self) -> StoreResult<()> {
        info!(database = %self.database, "shutting down mongodb client");
        self.client.shutdown().await;

        Ok(())
    }
}

/// Builder connecting a [`MongoDbStore`] from a connection string.
#[derive(Debug, Clone)]
pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl StoreHandleBuilder for MongoDbStoreBuilder {
    type Handle = MongoDbStore;

    async fn build(self) -> StoreResult<Self::Handle> {
        let client = Client::with_options(
            ClientOptions::parse(&self.dsn)
                .await
                .map_err(|e| StoreError::Initialization(e.to_string()))?,
        )
        .map_err(|e| StoreError::Initialization(e.to_string()))?;

        info!(database = %self.database, "connected mongodb client");

        Ok(MongoDbStore::new(client, self.database))
    }
}
