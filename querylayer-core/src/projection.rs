//! Field selection.

use bson::{Document, doc};

/// Which fields a read should return.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ProjectionSpec {
    /// Every field; no projection stage is emitted.
    #[default]
    All,
    /// A comma separated field list, e.g. `"title, price"`.
    Fields(String),
    /// A document already in native inclusion form, passed through unchanged.
    Native(Document),
}

impl ProjectionSpec {
    /// Creates a projection including the given field names.
    pub fn include<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut projection = Document::new();
        for field in fields {
            projection.insert(field.into(), 1);
        }

        ProjectionSpec::Native(projection)
    }
}

impl From<&str> for ProjectionSpec {
    fn from(fields: &str) -> Self {
        match fields.trim() {
            "*" => ProjectionSpec::All,
            _ => ProjectionSpec::Fields(fields.to_string()),
        }
    }
}

impl From<String> for ProjectionSpec {
    fn from(fields: String) -> Self {
        ProjectionSpec::from(fields.as_str())
    }
}

impl From<Document> for ProjectionSpec {
    fn from(projection: Document) -> Self {
        ProjectionSpec::Native(projection)
    }
}

/// Translates projection specs into native projection documents.
pub struct ProjectionCompiler;

impl ProjectionCompiler {
    /// Compiles a projection, or returns `None` when no projection stage is needed.
    ///
    /// A field list that contains no usable names is treated like "all fields".
    pub fn compile(spec: &ProjectionSpec) -> Option<Document> {
        match spec {
            ProjectionSpec::All => None,
            ProjectionSpec::Fields(fields) => {
                let mut projection = Document::new();

                for field in fields.replace('，', ",").split(',').map(str::trim) {
                    if !field.is_empty() {
                        projection.insert(field, 1);
                    }
                }

                (!projection.is_empty()).then_some(projection)
            }
            ProjectionSpec::Native(projection) if projection.is_empty() => None,
            ProjectionSpec::Native(projection) => Some(projection.clone()),
        }
    }

    /// Returns the `$project` stage for a projection, if any.
    pub fn stage(spec: &ProjectionSpec) -> Option<Document> {
        Self::compile(spec).map(|projection| doc! { "$project": projection })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_emits_no_projection() {
        assert_eq!(ProjectionCompiler::compile(&"*".into()), None);
        assert_eq!(ProjectionCompiler::compile(&ProjectionSpec::All), None);
    }

    #[test]
    fn splits_field_lists_on_both_commas() {
        assert_eq!(
            ProjectionCompiler::compile(&" title，price , ,status".into()),
            Some(doc! { "title": 1, "price": 1, "status": 1 })
        );
        assert_eq!(ProjectionCompiler::compile(&" , ".into()), None);
    }

    #[test]
    fn native_projections_pass_through() {
        let native = doc! { "title": 1, "_id": 0 };

        assert_eq!(
            ProjectionCompiler::compile(&native.clone().into()),
            Some(native)
        );
        assert_eq!(
            ProjectionCompiler::compile(&ProjectionSpec::include(["a", "b"])),
            Some(doc! { "a": 1, "b": 1 })
        );
    }
}
