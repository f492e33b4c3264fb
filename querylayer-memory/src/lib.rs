//! In-memory document store backend for querylayer.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreHandle` trait.
//! It evaluates the native predicates and aggregation pipelines produced by the query
//! engine in process, which makes it the backend of choice for tests and development.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Native predicates** - Equality, ordering, membership, regex and logical operators
//! - **Pipelines** - `$match`, `$unwind`, `$lookup`, `$project`, `$sort`, `$skip`,
//!   `$limit`, `$count`, `$group` and `$sample`
//! - **Atomic updates** - `$set`, `$unset`, `$inc` and `$mul`
//!
//! # Quick Start
//!
//! ```ignore
//! use querylayer::{prelude::*, memory::InMemoryStore};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = QueryStore::new(InMemoryStore::new());
//!     let posts = store.collection("posts");
//!
//!     posts.insert(doc! { "title": "hello", "status": 1 }).await?;
//!
//!     let page = posts
//!         .page(&QuerySpec::from(FilterSpec::new().eq("status", 1)), PageCursor::new(1, 20))
//!         .await?;
//!     assert_eq!(page.total, Some(1));
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as querylayer_memory;

pub mod evaluator;
mod path;
pub mod pipeline;
pub mod store;
mod update;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
