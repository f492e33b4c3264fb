//! Dotted field path access.

use std::borrow::Cow;

use bson::{Bson, Document};

/// Resolves a dotted path such as `author.name` or `tags.0`.
pub(crate) fn lookup<'d>(document: &'d Document, path: &str) -> Option<&'d Bson> {
    let mut parts = path.split('.');
    let mut current = document.get(parts.next()?)?;

    for part in parts {
        current = match current {
            Bson::Document(inner) => inner.get(part)?,
            Bson::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Resolves a dotted path for matching, descending into arrays of documents.
///
/// `author.name` over `{author: [{name: "a"}, {name: "b"}]}` yields `["a", "b"]`.
pub(crate) fn resolve<'d>(document: &'d Document, path: &str) -> Option<Cow<'d, Bson>> {
    if let Some(value) = lookup(document, path) {
        return Some(Cow::Borrowed(value));
    }

    let (head, rest) = path.split_once('.')?;
    match document.get(head)? {
        Bson::Document(inner) => resolve(inner, rest),
        Bson::Array(items) => {
            let values: Vec<Bson> = items
                .iter()
                .filter_map(|item| match item {
                    Bson::Document(inner) => resolve(inner, rest).map(Cow::into_owned),
                    _ => None,
                })
                .collect();

            (!values.is_empty()).then_some(Cow::Owned(Bson::Array(values)))
        }
        _ => None,
    }
}

/// Sets the value at a dotted path, creating intermediate documents.
///
/// A non-document value in the way is replaced.
pub(crate) fn set_path(document: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
        }
        Some((head, rest)) => {
            if !matches!(document.get(head), Some(Bson::Document(_))) {
                document.insert(head, Document::new());
            }

            if let Some(Bson::Document(inner)) = document.get_mut(head) {
                set_path(inner, rest, value);
            }
        }
    }
}
