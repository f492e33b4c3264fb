//! Result ordering.

use bson::{Bson, Document, doc};

/// Direction of one sort key.
#[derive(Debug, Clone, PartialEq)]
pub enum SortDirection {
    /// A textual direction such as `"asc"` or `"desc"`.
    ///
    /// Only a case-insensitive `"asc"` sorts ascending; every other token,
    /// recognised or not, sorts descending.
    Token(String),
    /// A native order value passed through unchanged, typically `1` or `-1`.
    Native(Bson),
}

impl SortDirection {
    /// Ascending order.
    pub fn asc() -> Self {
        SortDirection::Token("asc".to_string())
    }

    /// Descending order.
    pub fn desc() -> Self {
        SortDirection::Token("desc".to_string())
    }

    /// Resolves this direction into its native order value.
    pub fn to_native(&self) -> Bson {
        match self {
            SortDirection::Token(token) if token.to_lowercase() == "asc" => Bson::Int32(1),
            SortDirection::Token(_) => Bson::Int32(-1),
            SortDirection::Native(value) => value.clone(),
        }
    }
}

impl From<&str> for SortDirection {
    fn from(token: &str) -> Self {
        SortDirection::Token(token.to_string())
    }
}

impl From<i32> for SortDirection {
    fn from(order: i32) -> Self {
        SortDirection::Native(Bson::Int32(order))
    }
}

impl From<&Bson> for SortDirection {
    fn from(value: &Bson) -> Self {
        match value {
            Bson::String(token) => SortDirection::Token(token.clone()),
            other => SortDirection::Native(other.clone()),
        }
    }
}

/// Ordered mapping of field name to direction.
///
/// # Example
///
/// ```ignore
/// use querylayer::sort::SortSpec;
///
/// let sort = SortSpec::new().by("createdAt", "desc").by("title", "asc");
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SortSpec {
    keys: Vec<(String, SortDirection)>,
}

impl SortSpec {
    /// Creates an empty sort spec (natural order).
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sort key.
    pub fn by(mut self, field: impl Into<String>, direction: impl Into<SortDirection>) -> Self {
        self.keys.push((field.into(), direction.into()));
        self
    }

    /// Returns the sort keys in order.
    pub fn keys(&self) -> &[(String, SortDirection)] {
        &self.keys
    }

    /// Returns `true` if no sort key is set.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl From<&Document> for SortSpec {
    fn from(doc: &Document) -> Self {
        Self {
            keys: doc
                .iter()
                .map(|(field, direction)| (field.clone(), SortDirection::from(direction)))
                .collect(),
        }
    }
}

impl From<Document> for SortSpec {
    fn from(doc: Document) -> Self {
        SortSpec::from(&doc)
    }
}

/// Translates sort specs into native sort documents.
pub struct SortCompiler;

impl SortCompiler {
    /// Compiles a sort spec, or returns `None` for natural order.
    pub fn compile(spec: &SortSpec) -> Option<Document> {
        if spec.is_empty() {
            return None;
        }

        let mut sort = Document::new();
        for (field, direction) in spec.keys() {
            sort.insert(field.clone(), direction.to_native());
        }

        Some(sort)
    }

    /// Returns the `$sort` stage for a sort spec, if any.
    pub fn stage(spec: &SortSpec) -> Option<Document> {
        Self::compile(spec).map(|sort| doc! { "$sort": sort })
    }
}
