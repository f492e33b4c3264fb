//! Main querylayer crate providing a unified interface for querying document stores.
//!
//! This crate is the primary entry point for users of the querylayer project.
//! It re-exports the core types and functionality from the sub-crates and provides
//! convenient access to the different store backends.
//!
//! # Features
//!
//! - **Declarative filters** - Build filter trees in code or deserialize them from request bodies
//! - **Drift-corrected pagination** - Stable paging over collections that grow between requests
//! - **Joins and unwinding** - Paginate over joined collections and array elements
//! - **Aggregations** - Distinct values, sums, extrema, grouped counts and random samples
//! - **Multiple backends** - In-memory and MongoDB stores behind one handle trait
//!
//! # Quick Start
//!
//! ```ignore
//! use querylayer::{prelude::*, memory::InMemoryStore};
//! use bson::doc;
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! pub struct Post {
//!     pub title: String,
//!     pub price: i32,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = QueryStore::new(InMemoryStore::builder().build().await?);
//!     let posts = store.collection("posts");
//!
//!     posts
//!         .insert_batch(vec![
//!             doc! { "title": "cheap", "price": 5 },
//!             doc! { "title": "fair", "price": 30 },
//!         ])
//!         .await?;
//!
//!     let query = QuerySpec::builder()
//!         .filter(FilterSpec::new().between("price", 10, 50))
//!         .sort("price", "asc")
//!         .build();
//!
//!     let page = posts
//!         .page(&query, PageCursor::new(1, 20))
//!         .await?
//!         .into_typed::<Post>()?;
//!
//!     println!("{} of {:?}: {:?}", page.items.len(), page.total, page.items);
//!
//!     store.shutdown().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Filters from requests
//!
//! Filter trees deserialize from the JSON shape clients already send:
//!
//! ```ignore
//! let spec = FilterSpec::from_json(&serde_json::json!({
//!     "or": [
//!         { "status": ["in", "1,2"] },
//!         { "title": ["like", "sale"] },
//!     ]
//! }))?;
//! ```
//!
//! # Backends
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - [`mongodb`] - Persistent MongoDB backend (requires `mongodb` feature)

pub mod prelude;

pub use querylayer_core::{
    aggregate, collection, config, error, filter, handle, join, page, paginate, pipeline,
    predicate, projection, query, sort, store,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use querylayer_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use querylayer_mongodb::{MongoDbConfig, MongoDbStore, MongoDbStoreBuilder};
}
