//! Native predicate evaluation for in-memory document filtering.
//!
//! This module evaluates the predicate documents produced by the query
//! compilers (`{field: literal}`, `{field: {$op: operand}}`, `$and`, `$or`,
//! `$nor`) directly against BSON documents, following the document store's
//! matching rules: array fields match when any element matches, and values of
//! different types never compare as ordered.

use std::{cmp::Ordering, collections::HashMap};

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};
use regex::RegexBuilder;

use querylayer_core::error::{StoreError, StoreResult};

use crate::path::resolve;

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to `f64` so that `1`, `1_i64` and `1.0`
/// compare equal.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    /// Null, undefined or missing
    Null,
    /// Numeric value (all integers and floats normalized to f64)
    Number(f64),
    /// String value
    String(&'a str),
    /// Map/Object of comparable values
    Map(HashMap<&'a str, Comparable<'a>>),
    /// Array of comparable values
    Array(Vec<Comparable<'a>>),
    /// ObjectId value
    ObjectId(ObjectId),
    /// Boolean value
    Bool(bool),
    /// DateTime value
    DateTime(DateTime),
    /// Anything else, compared by its textual form
    Other(String),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(arr) => Comparable::Array(arr.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            other => Comparable::Other(other.to_string()),
        }
    }
}

impl<'a> Comparable<'a> {
    /// Position of the value's type in the store's cross-type sort order.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 1,
            Comparable::Number(_) => 2,
            Comparable::String(_) => 3,
            Comparable::Map(_) => 4,
            Comparable::Array(_) => 5,
            Comparable::ObjectId(_) => 7,
            Comparable::Bool(_) => 8,
            Comparable::DateTime(_) => 9,
            Comparable::Other(_) => 10,
        }
    }

    /// A total order over all values, used for sorting and extrema.
    ///
    /// Values of different types are ordered by type; maps of the same type
    /// compare as equal.
    pub(crate) fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Comparable::Array(a), Comparable::Array(b)) => a
                .iter()
                .zip(b)
                .map(|(x, y)| x.total_cmp(y))
                .find(|ordering| ordering.is_ne())
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            (Comparable::Other(a), Comparable::Other(b)) => a.cmp(b),
            _ => match self.partial_cmp(other) {
                Some(ordering) => ordering,
                None => self.rank().cmp(&other.rank()),
            },
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.bytes().partial_cmp(&b.bytes()),
            (Comparable::Map(a), Comparable::Map(b)) if a == b => Some(Ordering::Equal),
            _ => None,
        }
    }
}

/// Compares two raw values in the total order of [`Comparable::total_cmp`].
pub(crate) fn compare(left: &Bson, right: &Bson) -> Ordering {
    Comparable::from(left).total_cmp(&Comparable::from(right))
}

/// Equality as the store applies it to a query literal: a missing field equals
/// `null`, and an array field equals any of its elements.
pub(crate) fn equals(value: Option<&Bson>, target: &Bson) -> bool {
    let target = Comparable::from(target);

    match value {
        None => target == Comparable::Null,
        Some(value) => {
            Comparable::from(value) == target
                || matches!(value, Bson::Array(items) if items.iter().any(|item| Comparable::from(item) == target))
        }
    }
}

/// Evaluates predicate documents against one document.
pub(crate) struct PredicateEvaluator<'a> {
    document: &'a Document,
}

impl<'a> PredicateEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    /// Returns `true` if the document satisfies every clause of `predicate`.
    ///
    /// # Errors
    ///
    /// Returns a backend error for unknown operators, malformed logical
    /// clauses and invalid regular expressions.
    pub fn evaluate(&self, predicate: &Document) -> StoreResult<bool> {
        for (key, condition) in predicate {
            let matched = match key.as_str() {
                "$and" => self.all(clauses(key, condition)?)?,
                "$or" => self.any(clauses(key, condition)?)?,
                "$nor" => !self.any(clauses(key, condition)?)?,
                field => self.field(field, condition)?,
            };

            if !matched {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Returns clones of the documents matching `predicate`, in input order.
    pub fn filter_documents(
        documents: impl IntoIterator<Item = &'a Document>,
        predicate: &Document,
    ) -> StoreResult<Vec<Document>> {
        let mut matched = Vec::new();

        for document in documents {
            if PredicateEvaluator::new(document).evaluate(predicate)? {
                matched.push(document.clone());
            }
        }

        Ok(matched)
    }

    fn all(&self, clauses: Vec<&Document>) -> StoreResult<bool> {
        for clause in clauses {
            if !self.evaluate(clause)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn any(&self, clauses: Vec<&Document>) -> StoreResult<bool> {
        for clause in clauses {
            if self.evaluate(clause)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn field(&self, path: &str, condition: &Bson) -> StoreResult<bool> {
        let resolved = resolve(self.document, path);
        let value = resolved.as_deref();

        match condition {
            Bson::Document(ops) if is_operator_document(ops) => {
                for (op, operand) in ops {
                    if op == "$options" {
                        continue;
                    }

                    if !operator(value, op, operand, ops)? {
                        return Ok(false);
                    }
                }

                Ok(true)
            }
            Bson::RegularExpression(regex) => matches_regex(value, regex.pattern.as_str(), regex.options.as_str()),
            literal => Ok(equals(value, literal)),
        }
    }
}

fn operator(value: Option<&Bson>, op: &str, operand: &Bson, ops: &Document) -> StoreResult<bool> {
    match op {
        "$eq" => Ok(equals(value, operand)),
        "$ne" => Ok(!equals(value, operand)),
        "$gt" => Ok(ordered(value, operand, Ordering::is_gt)),
        "$gte" => Ok(ordered(value, operand, Ordering::is_ge)),
        "$lt" => Ok(ordered(value, operand, Ordering::is_lt)),
        "$lte" => Ok(ordered(value, operand, Ordering::is_le)),
        "$in" => Ok(members(op, operand)?
            .iter()
            .any(|member| equals(value, member))),
        "$nin" => Ok(!members(op, operand)?
            .iter()
            .any(|member| equals(value, member))),
        "$exists" => Ok(value.is_some() == truthy(operand)),
        "$regex" => {
            let options = ops.get_str("$options").unwrap_or_default();

            match operand {
                Bson::String(pattern) => matches_regex(value, pattern, options),
                Bson::RegularExpression(regex) => matches_regex(value, regex.pattern.as_str(), regex.options.as_str()),
                other => Err(StoreError::Backend(format!("$regex needs a string pattern, got {other}"))),
            }
        }
        other => Err(StoreError::Backend(format!("unknown query operator {other}"))),
    }
}

fn ordered(value: Option<&Bson>, operand: &Bson, accept: fn(Ordering) -> bool) -> bool {
    let Some(value) = value else {
        return false;
    };
    let operand = Comparable::from(operand);

    let accepts = |candidate: &Bson| {
        Comparable::from(candidate)
            .partial_cmp(&operand)
            .is_some_and(accept)
    };

    accepts(value) || matches!(value, Bson::Array(items) if items.iter().any(accepts))
}

fn matches_regex(value: Option<&Bson>, pattern: &str, options: &str) -> StoreResult<bool> {
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .build()
        .map_err(|e| StoreError::Backend(e.to_string()))?;

    Ok(match value {
        Some(Bson::String(s)) => regex.is_match(s),
        Some(Bson::Array(items)) => items
            .iter()
            .any(|item| matches!(item, Bson::String(s) if regex.is_match(s))),
        _ => false,
    })
}

fn members<'b>(op: &str, operand: &'b Bson) -> StoreResult<&'b [Bson]> {
    match operand {
        Bson::Array(items) => Ok(items),
        other => Err(StoreError::Backend(format!("{op} needs an array, got {other}"))),
    }
}

fn clauses<'b>(op: &str, condition: &'b Bson) -> StoreResult<Vec<&'b Document>> {
    let Bson::Array(items) = condition else {
        return Err(StoreError::Backend(format!("{op} needs an array")));
    };

    items
        .iter()
        .map(|item| match item {
            Bson::Document(clause) => Ok(clause),
            other => Err(StoreError::Backend(format!("{op} entries must be documents, got {other}"))),
        })
        .collect()
}

fn is_operator_document(document: &Document) -> bool {
    document
        .keys()
        .next()
        .is_some_and(|key| key.starts_with('$'))
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    fn matches(document: Document, predicate: Document) -> bool {
        PredicateEvaluator::new(&document)
            .evaluate(&predicate)
            .unwrap()
    }

    #[test]
    fn equality_normalizes_numbers_and_reaches_into_arrays() {
        assert!(matches(doc! { "n": 1 }, doc! { "n": 1.0 }));
        assert!(matches(doc! { "tags": ["a", "b"] }, doc! { "tags": "b" }));
        assert!(matches(doc! {}, doc! { "missing": Bson::Null }));
        assert!(!matches(doc! { "n": "1" }, doc! { "n": 1 }));
    }

    #[test]
    fn ordering_operators_respect_types() {
        let document = doc! { "price": 30 };

        assert!(matches(document.clone(), doc! { "price": { "$gte": 10, "$lte": 50 } }));
        assert!(!matches(document.clone(), doc! { "price": { "$gt": 30 } }));
        assert!(!matches(document, doc! { "price": { "$lt": "z" } }));
    }

    #[test]
    fn membership_and_negation() {
        let document = doc! { "status": 2_i64 };

        assert!(matches(document.clone(), doc! { "status": { "$in": [1, 2, 3] } }));
        assert!(!matches(document.clone(), doc! { "status": { "$nin": [1, 2, 3] } }));
        assert!(matches(document.clone(), doc! { "status": { "$ne": 5 } }));
        assert!(matches(doc! {}, doc! { "status": { "$ne": 5 } }));
    }

    #[test]
    fn regex_honours_case_insensitive_option() {
        let document = doc! { "name": "Spring Cleaning" };

        assert!(matches(document.clone(), doc! { "name": { "$regex": "clean", "$options": "i" } }));
        assert!(!matches(document, doc! { "name": { "$regex": "clean" } }));
    }

    #[test]
    fn logical_clauses() {
        let document = doc! { "a": 1, "b": 2 };

        assert!(matches(document.clone(), doc! { "$or": [{ "a": 5 }, { "b": 2 }] }));
        assert!(!matches(document.clone(), doc! { "$and": [{ "a": 1 }, { "b": 3 }] }));
        assert!(matches(document, doc! { "$nor": [{ "a": 5 }] }));
    }

    #[test]
    fn unknown_operators_are_errors() {
        let document = doc! { "a": 1 };

        assert!(PredicateEvaluator::new(&document)
            .evaluate(&doc! { "a": { "$near": 1 } })
            .is_err());
    }

    #[test]
    fn total_order_sorts_across_types() {
        assert_eq!(compare(&Bson::Null, &Bson::Int32(0)), Ordering::Less);
        assert_eq!(compare(&Bson::Int32(2), &Bson::Double(1.5)), Ordering::Greater);
        assert_eq!(compare(&Bson::Int32(9), &Bson::String("a".into())), Ordering::Less);
    }
}
