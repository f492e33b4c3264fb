//! In-process execution of native aggregation pipelines.
//!
//! Supports the stages the query engine emits: `$match`, `$unwind`, `$lookup`,
//! `$project`, `$sort`, `$skip`, `$limit`, `$count`, `$group` and `$sample`.
//! Any other stage is rejected with a backend error.

use std::{cmp::Ordering, collections::HashMap};

use bson::{Bson, Document, doc};
use rand::seq::SliceRandom;

use querylayer_core::error::{StoreError, StoreResult};

use crate::{
    evaluator::{Comparable, PredicateEvaluator, compare, equals},
    path::{lookup, set_path},
};

pub(crate) type StoreMap = HashMap<String, Vec<Document>>;

/// Runs pipelines against documents of one collection, resolving `$lookup`
/// against the other collections of the store.
pub(crate) struct PipelineExecutor<'a> {
    collections: &'a StoreMap,
}

impl<'a> PipelineExecutor<'a> {
    pub fn new(collections: &'a StoreMap) -> Self {
        Self { collections }
    }

    pub fn execute(&self, documents: Vec<Document>, pipeline: &[Document]) -> StoreResult<Vec<Document>> {
        pipeline
            .iter()
            .try_fold(documents, |documents, stage| self.stage(documents, stage))
    }

    fn stage(&self, documents: Vec<Document>, stage: &Document) -> StoreResult<Vec<Document>> {
        let Some((name, spec)) = stage.iter().next() else {
            return Err(StoreError::Backend("empty pipeline stage".to_string()));
        };

        match name.as_str() {
            "$match" => PredicateEvaluator::filter_documents(documents.iter(), as_document(name, spec)?),
            "$unwind" => unwind(documents, spec),
            "$lookup" => self.lookup(documents, as_document(name, spec)?),
            "$project" => {
                let projection = as_document(name, spec)?;
                Ok(documents
                    .iter()
                    .map(|document| project(document, projection))
                    .collect())
            }
            "$sort" => {
                let mut documents = documents;
                sort_documents(&mut documents, as_document(name, spec)?);
                Ok(documents)
            }
            "$skip" => Ok(documents
                .into_iter()
                .skip(as_count(name, spec)?)
                .collect()),
            "$limit" => Ok(documents
                .into_iter()
                .take(as_count(name, spec)?)
                .collect()),
            "$count" => count(documents, spec),
            "$group" => group(documents, as_document(name, spec)?),
            "$sample" => {
                let size = as_document(name, spec)?
                    .get("size")
                    .map(|size| as_count("$sample.size", size))
                    .transpose()?
                    .unwrap_or(0);
                Ok(sample(documents, size))
            }
            other => Err(StoreError::Backend(format!("unsupported pipeline stage {other}"))),
        }
    }

    fn lookup(&self, documents: Vec<Document>, spec: &Document) -> StoreResult<Vec<Document>> {
        let field = |key: &str| {
            spec.get_str(key)
                .map_err(|_| StoreError::Backend(format!("$lookup needs a string {key}")))
        };
        let (from, local_field, foreign_field, alias) = (
            field("from")?,
            field("localField")?,
            field("foreignField")?,
            field("as")?,
        );
        let foreign = self
            .collections
            .get(from)
            .map(Vec::as_slice)
            .unwrap_or_default();

        Ok(documents
            .into_iter()
            .map(|mut document| {
                let locals = match lookup(&document, local_field) {
                    Some(Bson::Array(items)) => items.clone(),
                    Some(value) => vec![value.clone()],
                    None => vec![Bson::Null],
                };
                let joined = foreign
                    .iter()
                    .filter(|candidate| {
                        let value = lookup(candidate, foreign_field);
                        locals.iter().any(|local| equals(value, local))
                    })
                    .cloned()
                    .map(Bson::Document)
                    .collect::<Vec<_>>();

                set_path(&mut document, alias, Bson::Array(joined));
                document
            })
            .collect())
    }
}

/// Applies an inclusion or exclusion projection.
///
/// `_id` is kept unless explicitly excluded.
pub(crate) fn project(document: &Document, projection: &Document) -> Document {
    let including = projection
        .iter()
        .any(|(field, flag)| field != "_id" && is_truthy(flag));

    if !including {
        let mut projected = document.clone();
        for (field, flag) in projection {
            if !is_truthy(flag) {
                projected.remove(field);
            }
        }
        return projected;
    }

    let mut projected = Document::new();
    let keep_id = projection.get("_id").is_none_or(is_truthy);
    if let Some(id) = document.get("_id").filter(|_| keep_id) {
        projected.insert("_id", id.clone());
    }

    for (field, flag) in projection {
        if field == "_id" || !is_truthy(flag) {
            continue;
        }

        if let Some(value) = lookup(document, field) {
            set_path(&mut projected, field, value.clone());
        }
    }

    projected
}

/// Stable multi-key sort. A negative order value sorts descending.
pub(crate) fn sort_documents(documents: &mut [Document], sort: &Document) {
    documents.sort_by(|a, b| {
        for (field, order) in sort {
            let left = lookup(a, field).unwrap_or(&Bson::Null);
            let right = lookup(b, field).unwrap_or(&Bson::Null);

            let ordering = if is_descending(order) {
                compare(right, left)
            } else {
                compare(left, right)
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }

        Ordering::Equal
    });
}

fn is_descending(order: &Bson) -> bool {
    match order {
        Bson::Int32(n) => *n < 0,
        Bson::Int64(n) => *n < 0,
        Bson::Double(n) => *n < 0.0,
        _ => false,
    }
}

fn unwind(documents: Vec<Document>, spec: &Bson) -> StoreResult<Vec<Document>> {
    let (path, preserve) = match spec {
        Bson::String(path) => (path.as_str(), false),
        Bson::Document(options) => (
            options
                .get_str("path")
                .map_err(|_| StoreError::Backend("$unwind needs a path".to_string()))?,
            options
                .get_bool("preserveNullAndEmptyArrays")
                .unwrap_or(false),
        ),
        other => return Err(StoreError::Backend(format!("invalid $unwind {other}"))),
    };
    let field = path
        .strip_prefix('$')
        .ok_or_else(|| StoreError::Backend(format!("$unwind path must start with $, got {path}")))?;

    let mut unwound = Vec::new();
    for document in documents {
        match lookup(&document, field).cloned() {
            Some(Bson::Array(items)) if !items.is_empty() => {
                for item in items {
                    let mut row = document.clone();
                    set_path(&mut row, field, item);
                    unwound.push(row);
                }
            }
            Some(Bson::Array(_)) | Some(Bson::Null) | None => {
                if preserve {
                    unwound.push(document);
                }
            }
            Some(_) => unwound.push(document),
        }
    }

    Ok(unwound)
}

fn count(documents: Vec<Document>, spec: &Bson) -> StoreResult<Vec<Document>> {
    let Bson::String(field) = spec else {
        return Err(StoreError::Backend("$count needs a field name".to_string()));
    };

    if documents.is_empty() {
        return Ok(Vec::new());
    }

    Ok(vec![doc! { field: int(documents.len() as i64) }])
}

fn sample(mut documents: Vec<Document>, size: usize) -> Vec<Document> {
    documents.shuffle(&mut rand::thread_rng());
    documents.truncate(size);
    documents
}

fn group(documents: Vec<Document>, spec: &Document) -> StoreResult<Vec<Document>> {
    let key_expr = spec.get("_id").cloned().unwrap_or(Bson::Null);
    let mut fields = Vec::new();
    for (field, accumulator) in spec {
        if field != "_id" {
            fields.push((field.as_str(), Accumulator::parse(field, accumulator)?));
        }
    }

    let mut groups: Vec<(Bson, Vec<Accumulator>)> = Vec::new();
    for document in &documents {
        let key = resolve(document, &key_expr);
        let position = match groups
            .iter()
            .position(|(existing, _)| Comparable::from(existing) == Comparable::from(&key))
        {
            Some(position) => position,
            None => {
                let accumulators = fields.iter().map(|(_, a)| a.clone()).collect();
                groups.push((key, accumulators));
                groups.len() - 1
            }
        };

        for ((_, template), accumulator) in fields.iter().zip(groups[position].1.iter_mut()) {
            accumulator.add(resolve(document, template.expression()));
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key, accumulators)| {
            let mut row = doc! { "_id": key };
            for ((field, _), accumulator) in fields.iter().zip(accumulators) {
                row.insert(*field, accumulator.finish());
            }
            row
        })
        .collect())
}

/// Resolves an expression against a document: `"$path"` reads a field, a
/// document resolves member-wise, anything else is a literal.
fn resolve(document: &Document, expr: &Bson) -> Bson {
    match expr {
        Bson::String(path) if path.starts_with('$') => lookup(document, &path[1..])
            .cloned()
            .unwrap_or(Bson::Null),
        Bson::Document(members) => Bson::Document(
            members
                .iter()
                .map(|(key, value)| (key.clone(), resolve(document, value)))
                .collect(),
        ),
        literal => literal.clone(),
    }
}

#[derive(Debug, Clone)]
enum Accumulator {
    Sum(Bson, NumericSum),
    Avg(Bson, NumericSum, u64),
    Min(Bson, Option<Bson>),
    Max(Bson, Option<Bson>),
    AddToSet(Bson, Vec<Bson>),
    Push(Bson, Vec<Bson>),
    First(Bson, Option<Bson>),
}

impl Accumulator {
    fn parse(field: &str, spec: &Bson) -> StoreResult<Self> {
        let Some((op, expr)) = spec.as_document().and_then(|spec| spec.iter().next()) else {
            return Err(StoreError::Backend(format!("$group field {field} needs an accumulator")));
        };
        let expr = expr.clone();

        Ok(match op.as_str() {
            "$sum" => Accumulator::Sum(expr, NumericSum::default()),
            "$avg" => Accumulator::Avg(expr, NumericSum::default(), 0),
            "$min" => Accumulator::Min(expr, None),
            "$max" => Accumulator::Max(expr, None),
            "$addToSet" => Accumulator::AddToSet(expr, Vec::new()),
            "$push" => Accumulator::Push(expr, Vec::new()),
            "$first" => Accumulator::First(expr, None),
            other => return Err(StoreError::Backend(format!("unsupported accumulator {other}"))),
        })
    }

    fn expression(&self) -> &Bson {
        match self {
            Accumulator::Sum(expr, _)
            | Accumulator::Avg(expr, _, _)
            | Accumulator::Min(expr, _)
            | Accumulator::Max(expr, _)
            | Accumulator::AddToSet(expr, _)
            | Accumulator::Push(expr, _)
            | Accumulator::First(expr, _) => expr,
        }
    }

    fn add(&mut self, value: Bson) {
        match self {
            Accumulator::Sum(_, sum) => {
                sum.add(&value);
            }
            Accumulator::Avg(_, sum, count) => {
                if sum.add(&value) {
                    *count += 1;
                }
            }
            Accumulator::Min(_, current) => keep_extreme(current, value, Ordering::Less),
            Accumulator::Max(_, current) => keep_extreme(current, value, Ordering::Greater),
            Accumulator::AddToSet(_, values) => {
                let seen = values
                    .iter()
                    .any(|existing| Comparable::from(existing) == Comparable::from(&value));
                if !seen {
                    values.push(value);
                }
            }
            Accumulator::Push(_, values) => values.push(value),
            Accumulator::First(_, first) => {
                first.get_or_insert(value);
            }
        }
    }

    fn finish(self) -> Bson {
        match self {
            Accumulator::Sum(_, sum) => sum.value(),
            Accumulator::Avg(_, sum, count) => match count {
                0 => Bson::Null,
                count => Bson::Double(sum.as_f64() / count as f64),
            },
            Accumulator::Min(_, value) | Accumulator::Max(_, value) | Accumulator::First(_, value) => {
                value.unwrap_or(Bson::Null)
            }
            Accumulator::AddToSet(_, values) | Accumulator::Push(_, values) => Bson::Array(values),
        }
    }
}

fn keep_extreme(current: &mut Option<Bson>, value: Bson, wanted: Ordering) {
    if matches!(value, Bson::Null | Bson::Undefined) {
        return;
    }

    match current {
        Some(existing) if compare(&value, existing) != wanted => {}
        _ => *current = Some(value),
    }
}

/// Running numeric sum that keeps the narrowest integer type it can.
#[derive(Debug, Clone, Default)]
struct NumericSum {
    int: i64,
    float: f64,
    wide: bool,
    double: bool,
}

impl NumericSum {
    /// Adds a value, ignoring non-numbers. Returns whether it was a number.
    fn add(&mut self, value: &Bson) -> bool {
        match value {
            Bson::Int32(n) => self.int = self.int.saturating_add(i64::from(*n)),
            Bson::Int64(n) => {
                self.int = self.int.saturating_add(*n);
                self.wide = true;
            }
            Bson::Double(n) => {
                self.float += n;
                self.double = true;
            }
            _ => return false,
        }

        true
    }

    fn as_f64(&self) -> f64 {
        self.int as f64 + self.float
    }

    fn value(&self) -> Bson {
        match (self.double, self.wide) {
            (true, _) => Bson::Double(self.as_f64()),
            (false, true) => Bson::Int64(self.int),
            (false, false) => int(self.int),
        }
    }
}

fn int(n: i64) -> Bson {
    match i32::try_from(n) {
        Ok(n) => Bson::Int32(n),
        Err(_) => Bson::Int64(n),
    }
}

fn is_truthy(flag: &Bson) -> bool {
    match flag {
        Bson::Boolean(b) => *b,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

fn as_document<'b>(stage: &str, spec: &'b Bson) -> StoreResult<&'b Document> {
    spec.as_document()
        .ok_or_else(|| StoreError::Backend(format!("{stage} needs a document, got {spec}")))
}

fn as_count(stage: &str, spec: &Bson) -> StoreResult<usize> {
    let count = match spec {
        Bson::Int32(n) => i64::from(*n),
        Bson::Int64(n) => *n,
        Bson::Double(n) if n.fract() == 0.0 => *n as i64,
        other => return Err(StoreError::Backend(format!("{stage} needs an integer, got {other}"))),
    };

    usize::try_from(count).map_err(|_| StoreError::Backend(format!("{stage} must not be negative")))
}
