//! The query store: the one owned entry point to a document store.
//!
//! A [`QueryStore`] owns its [`StoreHandle`] and the [`EngineConfig`] every
//! collection view reads its limits from. Create it once at process start,
//! share it by reference (or wrap the handle in an `Arc`), and tear it down
//! with [`QueryStore::shutdown`].
//!
//! # Example
//!
//! ```ignore
//! use querylayer::prelude::*;
//!
//! let store = QueryStore::new(handle);
//! if !store.exists("posts").await {
//!     store.create_if_absent("posts").await;
//! }
//! let posts = store.collection("posts");
//! # store.shutdown().await?;
//! ```

use tracing::{error, info, warn};

use crate::{
    collection::Collection,
    config::EngineConfig,
    error::StoreResult,
    handle::StoreHandle,
};

/// A document store bound to a specific handle implementation.
///
/// # Type Parameters
///
/// * `H` - The store handle type
#[derive(Debug)]
pub struct QueryStore<H: StoreHandle> {
    handle: H,
    config: EngineConfig,
}

impl<H: StoreHandle> QueryStore<H> {
    /// Creates a store with the default configuration.
    pub fn new(handle: H) -> Self {
        Self::with_config(handle, EngineConfig::default())
    }

    /// Creates a store with the given configuration.
    pub fn with_config(handle: H, config: EngineConfig) -> Self {
        Self { handle, config }
    }

    /// Gets a view over the collection named `name`.
    pub fn collection<'a>(&'a self, name: &str) -> Collection<'a, H> {
        Collection::new(name.to_string(), &self.handle, &self.config)
    }

    /// Returns the underlying handle.
    pub fn handle(&self) -> &H {
        &self.handle
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns `true` if a collection named `name` exists.
    ///
    /// Store errors are logged and reported as `false`.
    pub async fn exists(&self, name: &str) -> bool {
        match self.handle.list_collections(Some(name)).await {
            Ok(names) => names.iter().any(|existing| existing == name),
            Err(err) => {
                warn!(collection = name, error = %err, "collection existence check failed");
                false
            }
        }
    }

    /// Creates the collection named `name` unless it already exists.
    ///
    /// Returns `true` if the collection exists afterwards. A failed creation is
    /// logged with the store's error and reported as `false`.
    pub async fn create_if_absent(&self, name: &str) -> bool {
        if self.exists(name).await {
            return true;
        }

        match self.handle.create_collection(name).await {
            Ok(()) => {
                info!(collection = name, "created collection");
                true
            }
            Err(err) => {
                error!(collection = name, error = %err, "failed to create collection");
                false
            }
        }
    }

    /// Shuts down the store and releases the handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle fails to shut down.
    pub async fn shutdown(self) -> StoreResult<()> {
        self.handle.shutdown().await?;

        Ok(())
    }
}
