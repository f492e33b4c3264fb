//! Convenient re-exports of commonly used types from querylayer.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use querylayer::prelude::*;
//! ```
//!
//! This provides access to:
//! - The store, collections and the store handle traits
//! - Filter, projection and sort construction
//! - Pagination cursors, pages and joins
//! - Configuration and error types

pub use querylayer_core::{
    aggregate::{AggregationOps, Sample},
    collection::Collection,
    config::{EngineConfig, PageLimits},
    error::{StoreError, StoreResult},
    filter::{Condition, FilterSpec, Operator, Where},
    handle::{FindOptions, StoreHandle, StoreHandleBuilder},
    join::{JoinEngine, JoinSpec},
    page::{PageCursor, ResultPage},
    paginate::PaginationEngine,
    predicate::PredicateCompiler,
    projection::{ProjectionCompiler, ProjectionSpec},
    query::{QuerySpec, QuerySpecBuilder},
    sort::{SortCompiler, SortDirection, SortSpec},
    store::QueryStore,
};
