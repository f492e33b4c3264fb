//! Cross-collection joins.
//!
//! A [`JoinSpec`] becomes a native `$lookup` stage that attaches the matching
//! documents of another collection as an array field. When the join is meant
//! to be one-to-one, [`JoinEngine::reshape`] collapses that array afterwards.

use bson::{Bson, Document, doc};
use serde::{Deserialize, Serialize};

/// Description of a lookup into another collection.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JoinSpec {
    /// The collection to join.
    pub from: String,
    /// Field of the queried collection.
    pub local_field: String,
    /// Field of the joined collection.
    pub foreign_field: String,
    /// Name of the field receiving the joined documents.
    #[serde(rename = "as")]
    pub alias: String,
    /// Collapse the joined array to its first element (or `{}`) after fetching.
    #[serde(default = "flatten_by_default")]
    pub flatten_to_one: bool,
}

fn flatten_by_default() -> bool {
    true
}

impl JoinSpec {
    /// Creates a one-to-one join.
    pub fn new(
        from: impl Into<String>,
        local_field: impl Into<String>,
        foreign_field: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            local_field: local_field.into(),
            foreign_field: foreign_field.into(),
            alias: alias.into(),
            flatten_to_one: true,
        }
    }

    /// Keeps the joined array intact for one-to-many consumption.
    pub fn one_to_many(mut self) -> Self {
        self.flatten_to_one = false;
        self
    }
}

/// Builds lookup stages and reshapes joined results.
pub struct JoinEngine;

impl JoinEngine {
    /// The native `$lookup` stage for a join.
    pub fn lookup_stage(join: &JoinSpec) -> Document {
        doc! {
            "$lookup": {
                "from": join.from.as_str(),
                "localField": join.local_field.as_str(),
                "foreignField": join.foreign_field.as_str(),
                "as": join.alias.as_str(),
            }
        }
    }

    /// Applies the join's cardinality to fetched rows.
    pub fn reshape(join: &JoinSpec, mut items: Vec<Document>) -> Vec<Document> {
        if join.flatten_to_one {
            for item in &mut items {
                Self::flatten(item, &join.alias);
            }
        }

        items
    }

    /// Replaces `alias` with its first element, or `{}` when there is none.
    ///
    /// Rows without the field, or with a null one, are left untouched.
    pub fn flatten(item: &mut Document, alias: &str) {
        let flattened = match item.get(alias) {
            None | Some(Bson::Null) => return,
            Some(Bson::Array(joined)) => joined
                .first()
                .cloned()
                .unwrap_or_else(|| Bson::Document(Document::new())),
            Some(_) => Bson::Document(Document::new()),
        };

        item.insert(alias, flattened);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_lookup_stage() {
        let join = JoinSpec::new("users", "userId", "_id", "user");

        assert_eq!(
            JoinEngine::lookup_stage(&join),
            doc! {
                "$lookup": { "from": "users", "localField": "userId", "foreignField": "_id", "as": "user" }
            }
        );
    }

    #[test]
    fn flattens_to_first_element_or_empty_object() {
        let join = JoinSpec::new("users", "userId", "_id", "user");
        let rows = JoinEngine::reshape(
            &join,
            vec![
                doc! { "id": 1, "user": [{ "name": "a" }, { "name": "b" }] },
                doc! { "id": 2, "user": [] },
                doc! { "id": 3 },
            ],
        );

        assert_eq!(
            rows,
            vec![
                doc! { "id": 1, "user": { "name": "a" } },
                doc! { "id": 2, "user": {} },
                doc! { "id": 3 },
            ]
        );
    }

    #[test]
    fn one_to_many_keeps_arrays() {
        let join = JoinSpec::new("users", "userId", "_id", "user").one_to_many();
        let rows = vec![doc! { "user": [{ "name": "a" }, { "name": "b" }] }];

        assert_eq!(JoinEngine::reshape(&join, rows.clone()), rows);
    }

    #[test]
    fn deserializes_native_field_names() {
        let join: JoinSpec = serde_json::from_value(serde_json::json!({
            "from": "users",
            "localField": "userId",
            "foreignField": "_id",
            "as": "user",
        }))
        .unwrap();

        assert_eq!(join, JoinSpec::new("users", "userId", "_id", "user"));
    }
}
