//! Statistical reads: counts, distinct values, sums, extrema, grouped totals
//! and random samples.
//!
//! Every operation compiles its where clause with the [`PredicateCompiler`],
//! runs one native aggregation (or count) and post-processes the rows.
//!
//! # Zero sentinels
//!
//! [`AggregationOps::sum`], [`AggregationOps::min`] and [`AggregationOps::max`]
//! return `0` both when no row matched and when the aggregate is itself zero,
//! null or otherwise falsy. Callers that must tell the two apart use the
//! `*_checked` variants, which return `None` when there is no value.

use bson::{Bson, Document, doc};

use crate::{
    config::PageLimits,
    error::StoreResult,
    filter::Where,
    handle::StoreHandle,
    pipeline::{Pipeline, field_ref},
    predicate::PredicateCompiler,
    projection::{ProjectionCompiler, ProjectionSpec},
};

const VALUE_FIELD: &str = "value";
const TOTAL_FIELD: &str = "total";

/// Result of a random sample.
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    /// A sample of one: the drawn document, or `None` when nothing matched.
    One(Option<Document>),
    /// A sample of several documents.
    Many(Vec<Document>),
}

impl Sample {
    /// Flattens the sample into a list.
    pub fn into_vec(self) -> Vec<Document> {
        match self {
            Sample::One(document) => document.into_iter().collect(),
            Sample::Many(documents) => documents,
        }
    }
}

/// Aggregations over one collection.
#[derive(Debug)]
pub struct AggregationOps<'a, H: StoreHandle> {
    handle: &'a H,
    collection: &'a str,
    limits: PageLimits,
}

impl<'a, H: StoreHandle> AggregationOps<'a, H> {
    /// Creates aggregation operations over `collection`.
    pub fn new(handle: &'a H, collection: &'a str, limits: PageLimits) -> Self {
        Self {
            handle,
            collection,
            limits,
        }
    }

    /// Counts matching documents.
    pub async fn count(&self, filter: &Where) -> StoreResult<u64> {
        self.handle
            .count_documents(PredicateCompiler::compile_where(filter), self.collection)
            .await
    }

    /// The distinct values of `field` among matching documents.
    ///
    /// The order of the values is store-defined.
    pub async fn distinct(&self, filter: &Where, field: &str) -> StoreResult<Vec<Bson>> {
        let group = doc! { "_id": Bson::Null, VALUE_FIELD: { "$addToSet": field_ref(field) } };
        let rows = self.group(filter, group).await?;

        let values = match rows.into_iter().next() {
            Some(mut row) => match row.remove(VALUE_FIELD) {
                Some(Bson::Array(values)) => values,
                _ => Vec::new(),
            },
            None => Vec::new(),
        };

        Ok(values)
    }

    /// The number of distinct values of `field` among matching documents.
    pub async fn distinct_count(&self, filter: &Where, field: &str) -> StoreResult<usize> {
        Ok(self.distinct(filter, field).await?.len())
    }

    /// Sum of `field`, or `0` when there is no non-zero sum.
    pub async fn sum(&self, filter: &Where, field: &str) -> StoreResult<Bson> {
        Ok(or_zero(self.sum_checked(filter, field).await?))
    }

    /// Minimum of `field`, or `0` when there is no truthy minimum.
    pub async fn min(&self, filter: &Where, field: &str) -> StoreResult<Bson> {
        Ok(or_zero(self.min_checked(filter, field).await?))
    }

    /// Maximum of `field`, or `0` when there is no truthy maximum.
    pub async fn max(&self, filter: &Where, field: &str) -> StoreResult<Bson> {
        Ok(or_zero(self.max_checked(filter, field).await?))
    }

    /// Sum of `field`, or `None` when no document matched.
    pub async fn sum_checked(&self, filter: &Where, field: &str) -> StoreResult<Option<Bson>> {
        self.accumulate(filter, "$sum", field).await
    }

    /// Minimum of `field`, or `None` when no matching document carries it.
    pub async fn min_checked(&self, filter: &Where, field: &str) -> StoreResult<Option<Bson>> {
        self.accumulate(filter, "$min", field).await
    }

    /// Maximum of `field`, or `None` when no matching document carries it.
    pub async fn max_checked(&self, filter: &Where, field: &str) -> StoreResult<Option<Bson>> {
        self.accumulate(filter, "$max", field).await
    }

    /// One row per distinct value of `group_field`, holding that value under
    /// `group_field` and the sum of each of `fields`.
    pub async fn group_sum(
        &self,
        filter: &Where,
        group_field: &str,
        fields: &[&str],
    ) -> StoreResult<Vec<Document>> {
        let mut group = doc! { "_id": field_ref(group_field) };
        for field in fields {
            group.insert(*field, doc! { "$sum": field_ref(field) });
        }

        let rows = self.group(filter, group).await?;

        Ok(rows
            .into_iter()
            .map(|mut row| {
                let mut item = Document::new();
                item.insert(group_field, row.remove("_id").unwrap_or(Bson::Null));
                for field in fields {
                    item.insert(*field, row.remove(*field).unwrap_or(Bson::Null));
                }
                item
            })
            .collect())
    }

    /// Counts matching documents per value of `group_field`.
    ///
    /// The result is flat: each group is keyed `"<group_field>_<value>"`, so a
    /// `status` field with values `1` and `2` yields `{status_1: n, status_2: m}`.
    pub async fn group_count(&self, filter: &Where, group_field: &str) -> StoreResult<Document> {
        let group = doc! { "_id": field_ref(group_field), TOTAL_FIELD: { "$sum": 1 } };
        let rows = self.group(filter, group).await?;

        let mut counts = Document::new();
        for row in rows {
            let value = row.get("_id").map_or_else(|| "null".to_string(), group_key);
            let total = row.get(TOTAL_FIELD).cloned().unwrap_or(Bson::Int64(0));
            counts.insert(format!("{group_field}_{value}"), total);
        }

        Ok(counts)
    }

    /// Draws `size` random matching documents.
    ///
    /// `size` is capped at `max_size`. A sample of one yields [`Sample::One`];
    /// any other size yields [`Sample::Many`], which is empty for zero.
    pub async fn random(
        &self,
        filter: &Where,
        projection: &ProjectionSpec,
        size: usize,
    ) -> StoreResult<Sample> {
        let size = size.min(self.limits.max_size);
        if size == 0 {
            return Ok(Sample::Many(Vec::new()));
        }

        let pipeline = Pipeline::new()
            .filter(PredicateCompiler::compile_where(filter))
            .project(ProjectionCompiler::compile(projection))
            .sample(size as u64);

        let rows = self
            .handle
            .aggregate(pipeline.into_stages(), self.collection)
            .await?;

        Ok(match size {
            1 => Sample::One(rows.into_iter().next()),
            _ => Sample::Many(rows),
        })
    }

    async fn accumulate(
        &self,
        filter: &Where,
        accumulator: &str,
        field: &str,
    ) -> StoreResult<Option<Bson>> {
        let group = doc! { "_id": Bson::Null, VALUE_FIELD: { accumulator: field_ref(field) } };
        let rows = self.group(filter, group).await?;

        Ok(rows
            .into_iter()
            .next()
            .and_then(|mut row| row.remove(VALUE_FIELD))
            .filter(|value| !matches!(value, Bson::Null | Bson::Undefined)))
    }

    async fn group(&self, filter: &Where, group: Document) -> StoreResult<Vec<Document>> {
        let pipeline = Pipeline::new()
            .filter(PredicateCompiler::compile_where(filter))
            .group(group);

        self.handle
            .aggregate(pipeline.into_stages(), self.collection)
            .await
    }
}

fn or_zero(value: Option<Bson>) -> Bson {
    value
        .filter(is_truthy)
        .unwrap_or(Bson::Int32(0))
}

fn is_truthy(value: &Bson) -> bool {
    match value {
        Bson::Null | Bson::Undefined | Bson::Boolean(false) => false,
        Bson::Int32(0) | Bson::Int64(0) => false,
        Bson::Double(n) => *n != 0.0 && !n.is_nan(),
        Bson::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Renders a group value the way it reads in a flat key.
fn group_key(value: &Bson) -> String {
    match value {
        Bson::String(s) => s.clone(),
        Bson::Int32(n) => n.to_string(),
        Bson::Int64(n) => n.to_string(),
        Bson::Double(n) if n.fract() == 0.0 && n.is_finite() => format!("{n:.0}"),
        Bson::Double(n) => n.to_string(),
        Bson::Boolean(b) => b.to_string(),
        Bson::Null | Bson::Undefined => "null".to_string(),
        Bson::ObjectId(id) => id.to_hex(),
        other => other.to_string(),
    }
}
