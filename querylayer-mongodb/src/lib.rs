//! MongoDB backend implementation for querylayer.
//!
//! This crate provides a MongoDB-based implementation of the `StoreHandle` trait.
//! The query engine already compiles every read into MongoDB's native predicate and
//! aggregation syntax, so this backend forwards them to the official async driver
//! unchanged.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! querylayer = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Connection
//!
//! A store is built from a connection string and a database name, either
//! directly or from a deserialized [`MongoDbConfig`]. Build it once at process
//! start and hand it to a `QueryStore`; the driver client pools connections.
//!
//! # Example
//!
//! ```ignore
//! use querylayer::{handle::StoreHandleBuilder, mongodb::MongoDbStore, prelude::*};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let handle = MongoDbStore::builder("mongodb://localhost:27017", "my_database")
//!         .build()
//!         .await?;
//!     let store = QueryStore::new(handle);
//!
//!     store.create_if_absent("posts").await;
//!     store.shutdown().await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as querylayer_mongodb;

pub mod config;
pub mod store;

pub use config::MongoDbConfig;
pub use store::{MongoDbStore, MongoDbStoreBuilder};
