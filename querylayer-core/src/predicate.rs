//! Compilation of [`FilterSpec`] trees into native predicate documents.
//!
//! Compilation is pure and total. Malformed input never aborts a request:
//!
//! - an unknown operator is logged and compiles to "no constraint" for its pair,
//! - a `like` with an empty operand compiles to "no constraint",
//! - a field whose pairs all compiled to "no constraint" is left out entirely.
//!
//! The fail-open policy means an invalid filter widens the result set instead
//! of being rejected. Callers must not rely on invalid filters failing.

use bson::{Bson, Document, doc};
use tracing::warn;

use crate::filter::{Condition, FilterSpec, Operator, Where};

/// Translates filter trees into native predicates.
pub struct PredicateCompiler;

impl PredicateCompiler {
    /// Compiles a filter tree into a single predicate document.
    ///
    /// A top-level sequence node is combined as a disjunction.
    pub fn compile(spec: &FilterSpec) -> Document {
        match spec {
            FilterSpec::Fields(fields) => Self::compile_fields(fields),
            FilterSpec::Logical { and, or } => Self::compile_logical(and.as_deref(), or.as_deref()),
            FilterSpec::Any(specs) => match specs.as_slice() {
                [] => Document::new(),
                specs => doc! { "$or": Self::compile_many(specs) },
            },
        }
    }

    /// Compiles each member of a sequence independently.
    ///
    /// Combining the results is left to the caller.
    pub fn compile_many(specs: &[FilterSpec]) -> Vec<Document> {
        specs.iter().map(Self::compile).collect()
    }

    /// Compiles a where clause, expanding the primary-key shorthand.
    pub fn compile_where(clause: &Where) -> Document {
        match clause {
            Where::Id(id) => doc! { "_id": id.clone() },
            Where::Filter(spec) => Self::compile(spec),
        }
    }

    fn compile_logical(and: Option<&FilterSpec>, or: Option<&[FilterSpec]>) -> Document {
        let mut predicate = Document::new();

        if let Some(and) = and {
            let conjuncts = match and {
                FilterSpec::Any(specs) => Self::compile_many(specs),
                spec => vec![Self::compile(spec)],
            };
            if !conjuncts.is_empty() {
                predicate.insert("$and", conjuncts);
            }
        }

        if let Some(or) = or.filter(|or| !or.is_empty()) {
            predicate.insert("$or", Self::compile_many(or));
        }

        predicate
    }

    fn compile_fields(fields: &[(String, Condition)]) -> Document {
        let mut predicate = Document::new();

        for (field, condition) in fields {
            if let Some(compiled) = Self::compile_condition(condition) {
                predicate.insert(field.clone(), compiled);
            }
        }

        predicate
    }

    /// Compiles the condition of one field, or `None` if it places no constraint.
    pub fn compile_condition(condition: &Condition) -> Option<Bson> {
        match condition {
            Condition::Equals(value) => Some(value.clone()),
            Condition::Between(low, high) => Some(Bson::Document(doc! {
                "$gte": low.clone(),
                "$lte": high.clone(),
            })),
            Condition::All(pairs) => {
                let mut merged = Document::new();

                for (op, value) in pairs {
                    for (key, compiled) in Self::compile_pair(op, value) {
                        merged.insert(key, compiled);
                    }
                }

                (!merged.is_empty()).then_some(Bson::Document(merged))
            }
        }
    }

    /// Compiles one `[operator, value]` pair into native operator keys.
    ///
    /// An empty document means the pair places no constraint.
    pub fn compile_pair(op: &Operator, value: &Bson) -> Document {
        match op {
            Operator::Eq => doc! { "$eq": value.clone() },
            Operator::Ne => doc! { "$ne": value.clone() },
            Operator::Lt => doc! { "$lt": value.clone() },
            Operator::Lte => doc! { "$lte": value.clone() },
            Operator::Gt => doc! { "$gt": value.clone() },
            Operator::Gte => doc! { "$gte": value.clone() },
            Operator::Like => match like_pattern(value) {
                Some(pattern) => doc! { "$regex": pattern, "$options": "i" },
                None => Document::new(),
            },
            Operator::In => doc! { "$in": parse_members(value) },
            Operator::NotIn => doc! { "$nin": parse_members(value) },
            Operator::Unknown(token) => {
                warn!(operator = %token, "unknown filter operator, pair ignored");
                Document::new()
            }
        }
    }
}

/// Returns the regex source for a `like` operand, or `None` for falsy operands.
fn like_pattern(value: &Bson) -> Option<String> {
    match value {
        Bson::Null | Bson::Undefined | Bson::Boolean(false) => None,
        Bson::String(s) if s.is_empty() => None,
        Bson::Int32(0) | Bson::Int64(0) => None,
        Bson::Double(d) if *d == 0.0 || d.is_nan() => None,
        Bson::String(s) => Some(s.clone()),
        Bson::Int32(n) => Some(n.to_string()),
        Bson::Int64(n) => Some(n.to_string()),
        Bson::Double(d) => Some(d.to_string()),
        other => Some(other.to_string()),
    }
}

/// Resolves an `in` operand into a list of members.
///
/// Strings are split on ASCII and full-width commas; numeric tokens become numbers.
pub fn parse_members(value: &Bson) -> Vec<Bson> {
    match value {
        Bson::Array(items) => items.clone(),
        Bson::String(s) => s
            .replace('，', ",")
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(parse_token)
            .collect(),
        Bson::Null | Bson::Undefined => Vec::new(),
        other => vec![other.clone()],
    }
}

fn parse_token(token: &str) -> Bson {
    if let Ok(n) = token.parse::<i64>() {
        return Bson::Int64(n);
    }

    match token.parse::<f64>() {
        Ok(n) if n.is_finite() => Bson::Double(n),
        _ => Bson::String(token.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use bson::bson;

    use super::*;

    fn compile(value: Bson) -> Document {
        PredicateCompiler::compile(&FilterSpec::from(&value))
    }

    #[test]
    fn literals_compile_to_plain_equality() {
        assert_eq!(
            compile(bson!({ "status": 1, "tags": { "a": 1 } })),
            doc! { "status": 1, "tags": { "a": 1 } }
        );
    }

    #[test]
    fn between_compiles_to_closed_range() {
        assert_eq!(
            compile(bson!({ "price": ["between", 10, 50] })),
            doc! { "price": { "$gte": 10, "$lte": 50 } }
        );
    }

    #[test]
    fn in_parses_delimited_strings() {
        assert_eq!(
            compile(bson!({ "status": ["in", "1,2,3"] })),
            doc! { "status": { "$in": [1_i64, 2_i64, 3_i64] } }
        );
        assert_eq!(
            compile(bson!({ "city": ["not in", "Paris， Rome,,"] })),
            doc! { "city": { "$nin": ["Paris", "Rome"] } }
        );
        assert_eq!(
            compile(bson!({ "status": ["in", [1, "x"]] })),
            doc! { "status": { "$in": [1, "x"] } }
        );
    }

    #[test]
    fn compound_pairs_merge_into_one_condition() {
        assert_eq!(
            compile(bson!({ "age": [[">=", 18], ["<", 65], ["!=", 30]] })),
            doc! { "age": { "$gte": 18, "$lt": 65, "$ne": 30 } }
        );
    }

    #[test]
    fn empty_like_places_no_constraint() {
        assert_eq!(compile(bson!({ "name": ["like", ""], "status": 1 })), doc! { "status": 1 });
        assert_eq!(compile(bson!({ "name": ["like", null] })), doc! {});
        assert_eq!(
            compile(bson!({ "name": ["LIKE", "ann"] })),
            doc! { "name": { "$regex": "ann", "$options": "i" } }
        );
    }

    #[test]
    fn empty_logical_branches_place_no_constraint() {
        assert_eq!(compile(bson!({ "and": [] })), doc! {});
        assert_eq!(compile(bson!({ "and": [], "or": [] })), doc! {});
        assert_eq!(
            compile(bson!({ "and": [], "or": [{ "status": 1 }] })),
            doc! { "$or": [{ "status": 1 }] }
        );
    }

    #[test]
    fn unknown_operators_fail_open() {
        assert_eq!(compile(bson!({ "name": ["~=", "ann"] })), doc! {});
        assert_eq!(
            compile(bson!({ "age": [["~", 1], [">", 3]] })),
            doc! { "age": { "$gt": 3 } }
        );
    }

    #[test]
    fn logical_nodes_wrap_their_branches() {
        assert_eq!(
            compile(bson!({ "and": { "a": 1 }, "or": [{ "b": 2 }, { "c": ["<", 3] }] })),
            doc! {
                "$and": [{ "a": 1 }],
                "$or": [{ "b": 2 }, { "c": { "$lt": 3 } }],
            }
        );
        assert_eq!(compile(bson!({ "or": { "b": 2 } })), doc! { "$or": [{ "b": 2 }] });
    }

    #[test]
    fn sequences_compile_member_by_member() {
        let spec = FilterSpec::from(&bson!([{ "a": 1 }, { "b": ["=", 2] }]));
        let FilterSpec::Any(members) = &spec else {
            panic!("expected a sequence");
        };

        assert_eq!(
            PredicateCompiler::compile_many(members),
            vec![doc! { "a": 1 }, doc! { "b": { "$eq": 2 } }]
        );
        assert_eq!(
            PredicateCompiler::compile(&spec),
            doc! { "$or": [{ "a": 1 }, { "b": { "$eq": 2 } }] }
        );
    }

    #[test]
    fn compilation_is_idempotent() {
        let spec = FilterSpec::from(&bson!({
            "or": [{ "a": ["in", "1,2"] }, { "b": ["between", 1, 2] }],
            "and": { "c": [["like", "x"], [">", 1]] },
        }));

        assert_eq!(PredicateCompiler::compile(&spec), PredicateCompiler::compile(&spec));
    }

    #[test]
    fn where_shorthand_targets_primary_key() {
        assert_eq!(
            PredicateCompiler::compile_where(&Where::from("abc")),
            doc! { "_id": "abc" }
        );
    }
}
