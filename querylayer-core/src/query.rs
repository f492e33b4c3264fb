//! Query construction.
//!
//! A [`QuerySpec`] bundles the three declarative parts of a read: which
//! documents ([`Where`]), which fields ([`ProjectionSpec`]) and in which order
//! ([`SortSpec`]). Pagination engines and bulk reads take one alongside their
//! own options.
//!
//! # Example
//!
//! ```ignore
//! use querylayer::prelude::*;
//!
//! let query = QuerySpec::builder()
//!     .filter(FilterSpec::new().eq("status", 1))
//!     .fields("title,price")
//!     .sort("createdAt", "desc")
//!     .build();
//! ```

use bson::Document;

use crate::{
    filter::{FilterSpec, Where},
    predicate::PredicateCompiler,
    projection::{ProjectionCompiler, ProjectionSpec},
    sort::{SortCompiler, SortDirection, SortSpec},
};

/// The declarative description of a read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    /// Which documents to read.
    pub filter: Where,
    /// Which fields to return.
    pub projection: ProjectionSpec,
    /// In which order.
    pub sort: SortSpec,
}

impl QuerySpec {
    /// Creates a query matching every document in natural order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new query builder for fluent construction.
    pub fn builder() -> QuerySpecBuilder {
        QuerySpecBuilder::new()
    }

    /// The compiled native predicate.
    pub fn predicate(&self) -> Document {
        PredicateCompiler::compile_where(&self.filter)
    }

    /// The compiled native projection, if any.
    pub fn projection(&self) -> Option<Document> {
        ProjectionCompiler::compile(&self.projection)
    }

    /// The compiled native sort, if any.
    pub fn sort(&self) -> Option<Document> {
        SortCompiler::compile(&self.sort)
    }
}

impl From<Where> for QuerySpec {
    fn from(filter: Where) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }
}

impl From<FilterSpec> for QuerySpec {
    fn from(spec: FilterSpec) -> Self {
        QuerySpec::from(Where::Filter(spec))
    }
}

#[derive(Debug, Clone, Default)]
pub struct QuerySpecBuilder {
    query: QuerySpec,
}

impl QuerySpecBuilder {
    /// Creates a new query builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the where clause. Accepts a [`FilterSpec`] or a primary-key shorthand.
    pub fn filter(mut self, filter: impl Into<Where>) -> Self {
        self.query.filter = filter.into();
        self
    }

    /// Sets the projection.
    pub fn fields(mut self, projection: impl Into<ProjectionSpec>) -> Self {
        self.query.projection = projection.into();
        self
    }

    /// Appends a sort key.
    pub fn sort(mut self, field: impl Into<String>, direction: impl Into<SortDirection>) -> Self {
        self.query.sort = self.query.sort.by(field, direction);
        self
    }

    /// Replaces the whole sort spec.
    pub fn order_by(mut self, sort: impl Into<SortSpec>) -> Self {
        self.query.sort = sort.into();
        self
    }

    /// Builds and returns the final query.
    pub fn build(self) -> QuerySpec {
        self.query
    }
}
