//! Declarative filter trees.
//!
//! A [`FilterSpec`] describes which documents a call should touch without
//! committing to any store's native query language. It is what application
//! code builds (or deserializes from a request) and what
//! [`PredicateCompiler`](crate::predicate::PredicateCompiler) turns into a
//! native predicate document.
//!
//! # Shape
//!
//! - A **leaf** maps field names to a [`Condition`]: a literal (implicit
//!   equality), a `[operator, value]` pair, a `[between, low, high]` range, or
//!   a list of pairs that must all hold for the same field.
//! - A **logical node** carries an `and` sub-spec and/or an `or` list.
//! - A **sequence** holds sibling specs, typically the members of an `or`.
//!
//! # Example
//!
//! ```ignore
//! use querylayer::filter::{FilterSpec, Operator};
//!
//! let spec = FilterSpec::new()
//!     .eq("status", 1)
//!     .between("price", 10, 50)
//!     .with("name", Operator::Like, "clean");
//!
//! // The same tree, as it arrives from a request body.
//! let same = FilterSpec::from_json(&serde_json::json!({
//!     "status": 1,
//!     "price": ["between", 10, 50],
//!     "name": ["like", "clean"],
//! }))?;
//! ```

use std::fmt;

use bson::{Bson, Document, oid::ObjectId, ser::serialize_to_bson};
use serde_json::Value;

use crate::error::StoreResult;

/// Comparison operators accepted in `[operator, value]` pairs.
///
/// Tokens are matched case-insensitively after trimming. Anything that is not
/// recognised is kept as [`Operator::Unknown`] so that compilation can report
/// it and carry on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    /// `=`
    Eq,
    /// `!=` or `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `like`, a case-insensitive pattern match.
    Like,
    /// `in`, membership in a list or a comma separated string.
    In,
    /// `not in`
    NotIn,
    /// Any other token.
    Unknown(String),
}

impl Operator {
    /// Parses an operator token.
    pub fn parse(token: &str) -> Self {
        match token.trim().to_lowercase().as_str() {
            "=" => Operator::Eq,
            "!=" | "<>" => Operator::Ne,
            "<" => Operator::Lt,
            "<=" => Operator::Lte,
            ">" => Operator::Gt,
            ">=" => Operator::Gte,
            "like" => Operator::Like,
            "in" => Operator::In,
            "not in" => Operator::NotIn,
            other => Operator::Unknown(other.to_string()),
        }
    }
}

impl From<&str> for Operator {
    fn from(token: &str) -> Self {
        Operator::parse(token)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Like => "like",
            Operator::In => "in",
            Operator::NotIn => "not in",
            Operator::Unknown(token) => token,
        };

        f.write_str(token)
    }
}

/// The condition attached to a single field of a leaf node.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Direct equality with a literal, stored as-is.
    Equals(Bson),
    /// Closed range, inclusive on both ends.
    Between(Bson, Bson),
    /// One or more operator pairs that must all hold.
    All(Vec<(Operator, Bson)>),
}

impl Condition {
    /// Creates a single operator condition.
    pub fn op(op: impl Into<Operator>, value: impl Into<Bson>) -> Self {
        Condition::All(vec![(op.into(), value.into())])
    }
}

impl From<&Bson> for Condition {
    fn from(value: &Bson) -> Self {
        let Bson::Array(items) = value else {
            return Condition::Equals(value.clone());
        };

        match items.first() {
            None => Condition::All(Vec::new()),
            Some(Bson::Array(_)) => Condition::All(items.iter().map(parse_pair).collect()),
            Some(Bson::String(token)) if token.trim().eq_ignore_ascii_case("between") => {
                Condition::Between(
                    items.get(1).cloned().unwrap_or(Bson::Null),
                    items.get(2).cloned().unwrap_or(Bson::Null),
                )
            }
            Some(_) => Condition::All(vec![parse_pair(value)]),
        }
    }
}

fn parse_pair(value: &Bson) -> (Operator, Bson) {
    match value {
        Bson::Array(items) => {
            let op = match items.first() {
                Some(Bson::String(token)) => Operator::parse(token),
                Some(other) => Operator::Unknown(other.to_string()),
                None => Operator::Unknown(String::new()),
            };

            (op, items.get(1).cloned().unwrap_or(Bson::Null))
        }
        other => (Operator::Unknown(other.to_string()), Bson::Null),
    }
}

fn is_defined(value: &Bson) -> bool {
    !matches!(value, Bson::Null | Bson::Undefined)
}

/// A declarative filter tree. See the [module documentation](self).
///
/// The default value is an empty leaf, which matches every document.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterSpec {
    /// Field name to condition, in insertion order.
    Fields(Vec<(String, Condition)>),
    /// Conjunction and/or disjunction of sub-specs.
    Logical {
        /// Sub-spec that must hold.
        and: Option<Box<FilterSpec>>,
        /// Sub-specs of which at least one must hold.
        or: Option<Vec<FilterSpec>>,
    },
    /// Sibling specs, compiled independently.
    Any(Vec<FilterSpec>),
}

impl Default for FilterSpec {
    fn default() -> Self {
        FilterSpec::Fields(Vec::new())
    }
}

impl FilterSpec {
    /// Creates an empty leaf that matches everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a logical node requiring `spec` to hold.
    pub fn and(spec: FilterSpec) -> Self {
        FilterSpec::Logical {
            and: Some(Box::new(spec)),
            or: None,
        }
    }

    /// Creates a logical node requiring at least one of `specs` to hold.
    pub fn or(specs: impl IntoIterator<Item = FilterSpec>) -> Self {
        FilterSpec::Logical {
            and: None,
            or: Some(specs.into_iter().collect()),
        }
    }

    /// Creates a sequence node.
    pub fn any(specs: impl IntoIterator<Item = FilterSpec>) -> Self {
        FilterSpec::Any(specs.into_iter().collect())
    }

    /// Adds a disjunction to a logical node, turning a leaf into one.
    ///
    /// Leaf keys are discarded in the process, because a node with `and`/`or`
    /// ignores its sibling leaf keys.
    pub fn or_else(self, specs: impl IntoIterator<Item = FilterSpec>) -> Self {
        let or = Some(specs.into_iter().collect());

        match self {
            FilterSpec::Logical { and, .. } => FilterSpec::Logical { and, or },
            _ => FilterSpec::Logical { and: None, or },
        }
    }

    /// Sets the condition of `field`, replacing any previous one.
    ///
    /// Only leaf nodes carry field conditions; on any other node this is a no-op.
    pub fn field(mut self, field: impl Into<String>, condition: Condition) -> Self {
        if let FilterSpec::Fields(fields) = &mut self {
            let field = field.into();

            match fields.iter_mut().find(|(name, _)| *name == field) {
                Some(entry) => entry.1 = condition,
                None => fields.push((field, condition)),
            }
        }

        self
    }

    /// Adds an operator pair to `field`.
    ///
    /// Pairs added to the same field accumulate into a compound condition.
    pub fn with(
        mut self,
        field: impl Into<String>,
        op: impl Into<Operator>,
        value: impl Into<Bson>,
    ) -> Self {
        let field = field.into();
        let pair = (op.into(), value.into());

        if let FilterSpec::Fields(fields) = &mut self {
            match fields.iter_mut().find(|(name, _)| *name == field) {
                Some((_, Condition::All(pairs))) => pairs.push(pair),
                Some(entry) => entry.1 = Condition::All(vec![pair]),
                None => fields.push((field, Condition::All(vec![pair]))),
            }
        }

        self
    }

    /// Requires `field` to equal `value`.
    pub fn eq(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.field(field, Condition::Equals(value.into()))
    }

    /// Requires `low <= field <= high`.
    pub fn between(
        self,
        field: impl Into<String>,
        low: impl Into<Bson>,
        high: impl Into<Bson>,
    ) -> Self {
        self.field(field, Condition::Between(low.into(), high.into()))
    }

    /// Builds a spec from a dynamic JSON value, e.g. a request body.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the value cannot be represented as BSON.
    pub fn from_json(value: &Value) -> StoreResult<Self> {
        Ok(FilterSpec::from(&serialize_to_bson(value)?))
    }

    /// Returns `true` if this spec places no constraint at all.
    pub fn is_empty(&self) -> bool {
        match self {
            FilterSpec::Fields(fields) => fields.is_empty(),
            FilterSpec::Logical { and, or } => and.is_none() && or.is_none(),
            FilterSpec::Any(specs) => specs.is_empty(),
        }
    }
}

impl From<&Document> for FilterSpec {
    fn from(doc: &Document) -> Self {
        let and = doc.get("and").filter(|v| is_defined(v));
        let or = doc.get("or").filter(|v| is_defined(v));

        if and.is_some() || or.is_some() {
            return FilterSpec::Logical {
                and: and.map(|spec| Box::new(FilterSpec::from(spec))),
                or: or.map(|spec| match spec {
                    Bson::Array(items) => items.iter().map(FilterSpec::from).collect(),
                    single => vec![FilterSpec::from(single)],
                }),
            };
        }

        FilterSpec::Fields(
            doc.iter()
                .map(|(field, value)| (field.clone(), Condition::from(value)))
                .collect(),
        )
    }
}

impl From<&Bson> for FilterSpec {
    fn from(value: &Bson) -> Self {
        match value {
            Bson::Document(doc) => FilterSpec::from(doc),
            Bson::Array(items) => FilterSpec::Any(items.iter().map(FilterSpec::from).collect()),
            _ => FilterSpec::default(),
        }
    }
}

impl From<Document> for FilterSpec {
    fn from(doc: Document) -> Self {
        FilterSpec::from(&doc)
    }
}

/// The `where` argument of every collection operation.
///
/// A bare primitive is shorthand for primary-key equality; anything else is a
/// full [`FilterSpec`].
#[derive(Debug, Clone, PartialEq)]
pub enum Where {
    /// Match the document whose `_id` equals this value.
    Id(Bson),
    /// Match documents satisfying a filter tree.
    Filter(FilterSpec),
}

impl Where {
    /// A where clause matching every document.
    pub fn all() -> Self {
        Where::Filter(FilterSpec::default())
    }
}

impl Default for Where {
    fn default() -> Self {
        Where::all()
    }
}

impl From<FilterSpec> for Where {
    fn from(spec: FilterSpec) -> Self {
        Where::Filter(spec)
    }
}

impl From<&str> for Where {
    fn from(id: &str) -> Self {
        Where::Id(Bson::String(id.to_string()))
    }
}

impl From<String> for Where {
    fn from(id: String) -> Self {
        Where::Id(Bson::String(id))
    }
}

impl From<i32> for Where {
    fn from(id: i32) -> Self {
        Where::Id(Bson::Int32(id))
    }
}

impl From<i64> for Where {
    fn from(id: i64) -> Self {
        Where::Id(Bson::Int64(id))
    }
}

impl From<ObjectId> for Where {
    fn from(id: ObjectId) -> Self {
        Where::Id(Bson::ObjectId(id))
    }
}

impl From<Document> for Where {
    fn from(doc: Document) -> Self {
        Where::Filter(FilterSpec::from(&doc))
    }
}

impl From<Bson> for Where {
    fn from(value: Bson) -> Self {
        match value {
            Bson::String(_) | Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::ObjectId(_) => {
                Where::Id(value)
            }
            other => Where::Filter(FilterSpec::from(&other)),
        }
    }
}
