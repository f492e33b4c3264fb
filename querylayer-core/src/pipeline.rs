//! Native aggregation pipeline construction.
//!
//! [`Pipeline`] is a thin, ordered list of stage documents. Optional stages
//! (projection, sort) are skipped when their compiled form is `None`.

use bson::{Bson, Document, doc};

/// An ordered list of native aggregation stages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    stages: Vec<Document>,
}

impl Pipeline {
    /// Creates an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a raw stage.
    pub fn stage(mut self, stage: Document) -> Self {
        self.stages.push(stage);
        self
    }

    /// Appends a raw stage if present.
    pub fn stage_opt(mut self, stage: Option<Document>) -> Self {
        self.stages.extend(stage);
        self
    }

    /// `$match` on a compiled predicate.
    pub fn filter(self, predicate: Document) -> Self {
        self.stage(doc! { "$match": predicate })
    }

    /// `$unwind` of an array field into one document per element.
    pub fn unwind(self, field: &str) -> Self {
        self.stage(doc! { "$unwind": format!("${field}") })
    }

    /// `$project` with a compiled projection, skipped when `None`.
    pub fn project(self, projection: Option<Document>) -> Self {
        self.stage_opt(projection.map(|projection| doc! { "$project": projection }))
    }

    /// `$sort` with a compiled sort, skipped when `None`.
    pub fn sort(self, sort: Option<Document>) -> Self {
        self.stage_opt(sort.map(|sort| doc! { "$sort": sort }))
    }

    /// `$skip`.
    pub fn skip(self, skip: u64) -> Self {
        self.stage(doc! { "$skip": to_i64(skip) })
    }

    /// `$limit`.
    pub fn limit(self, limit: u64) -> Self {
        self.stage(doc! { "$limit": to_i64(limit) })
    }

    /// `$count` into a field named `field`.
    pub fn count(self, field: &str) -> Self {
        self.stage(doc! { "$count": field })
    }

    /// `$group` with a fully formed group document.
    pub fn group(self, group: Document) -> Self {
        self.stage(doc! { "$group": group })
    }

    /// `$sample` of `size` random documents.
    pub fn sample(self, size: u64) -> Self {
        self.stage(doc! { "$sample": { "size": to_i64(size) } })
    }

    /// Returns the stages built so far.
    pub fn stages(&self) -> &[Document] {
        &self.stages
    }

    /// Consumes the pipeline, returning its stages.
    pub fn into_stages(self) -> Vec<Document> {
        self.stages
    }
}

impl From<Pipeline> for Vec<Document> {
    fn from(pipeline: Pipeline) -> Self {
        pipeline.into_stages()
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Reads an integer count out of a document field, whatever its numeric type.
pub fn read_count(document: &Document, field: &str) -> u64 {
    match document.get(field) {
        Some(Bson::Int32(n)) => u64::try_from(*n).unwrap_or(0),
        Some(Bson::Int64(n)) => u64::try_from(*n).unwrap_or(0),
        Some(Bson::Double(n)) if *n > 0.0 => *n as u64,
        _ => 0,
    }
}

/// Field path reference (`$field`) for use inside expressions.
pub fn field_ref(field: &str) -> String {
    format!("${field}")
}
