//! A query-translation and pagination engine for document stores.
//!
//! This crate is the core of the querylayer project and provides:
//!
//! - **Filter model** ([`filter`]) - Declarative filter trees and the where-clause shorthand
//! - **Compilers** ([`predicate`], [`projection`], [`sort`]) - Translation into native query documents
//! - **Pipelines** ([`pipeline`]) - Native aggregation stage construction
//! - **Joins** ([`join`]) - Lookup stages and one-to-one reshaping of joined rows
//! - **Pagination** ([`paginate`], [`page`]) - Count-then-fetch paging with drift correction
//! - **Aggregations** ([`aggregate`]) - Counts, distinct values, sums, extrema, grouped totals and samples
//! - **Store handle abstraction** ([`handle`]) - The contract a document store backend implements
//! - **Collections and store** ([`collection`], [`store`]) - The high-level data access API
//! - **Configuration** ([`config`]) - Page limits and batch sizes
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use querylayer::prelude::*;
//!
//! let store = QueryStore::new(handle);
//! let posts = store.collection("posts");
//!
//! let query = QuerySpec::builder()
//!     .filter(
//!         FilterSpec::new()
//!             .with("status", Operator::In, "1,2,3")
//!             .between("price", 10, 50),
//!     )
//!     .fields("title,price")
//!     .sort("createdAt", "desc")
//!     .build();
//!
//! let first = posts.page(&query, PageCursor::new(1, 20)).await?;
//! let second = posts
//!     .page(&query, PageCursor::new(2, 20).with_previous_total(first.total.unwrap_or(0)))
//!     .await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as querylayer_core;

pub mod aggregate;
pub mod collection;
pub mod config;
pub mod error;
pub mod filter;
pub mod handle;
pub mod join;
pub mod page;
pub mod paginate;
pub mod pipeline;
pub mod predicate;
pub mod projection;
pub mod query;
pub mod sort;
pub mod store;
