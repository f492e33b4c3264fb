//! Update operators applied in place: `$set`, `$unset`, `$inc` and `$mul`.

use bson::{Bson, Document};

use querylayer_core::error::{StoreError, StoreResult};

use crate::path::{lookup, set_path};

/// Applies a native update document to `document`.
///
/// # Errors
///
/// Returns an invalid-document error for replacement documents, unknown
/// operators and arithmetic on non-numeric fields.
pub(crate) fn apply_update(document: &mut Document, update: &Document) -> StoreResult<()> {
    for (op, fields) in update {
        let Bson::Document(fields) = fields else {
            return Err(StoreError::InvalidDocument(format!("{op} needs a document of fields")));
        };

        for (path, operand) in fields {
            if path == "_id" {
                return Err(StoreError::InvalidDocument("_id is immutable".to_string()));
            }

            match op.as_str() {
                "$set" => set_path(document, path, operand.clone()),
                "$unset" => unset_path(document, path),
                "$inc" => {
                    let current = lookup(document, path).cloned().unwrap_or(Bson::Int32(0));
                    set_path(document, path, arithmetic(op, &current, operand, Arithmetic::Add)?);
                }
                "$mul" => {
                    let current = lookup(document, path).cloned().unwrap_or(Bson::Int32(0));
                    set_path(document, path, arithmetic(op, &current, operand, Arithmetic::Mul)?);
                }
                other => {
                    return Err(StoreError::InvalidDocument(format!("unsupported update operator {other}")));
                }
            }
        }
    }

    Ok(())
}

fn unset_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(inner)) = document.get_mut(head) {
                unset_path(inner, rest);
            }
        }
    }
}

#[derive(Clone, Copy)]
enum Arithmetic {
    Add,
    Mul,
}

fn arithmetic(op: &str, current: &Bson, operand: &Bson, arithmetic: Arithmetic) -> StoreResult<Bson> {
    let checked = |a: i64, b: i64| match arithmetic {
        Arithmetic::Add => a.checked_add(b),
        Arithmetic::Mul => a.checked_mul(b),
    };
    let float = |a: f64, b: f64| match arithmetic {
        Arithmetic::Add => a + b,
        Arithmetic::Mul => a * b,
    };

    Ok(match (current, operand) {
        (Bson::Int32(a), Bson::Int32(b)) => match checked(i64::from(*a), i64::from(*b)) {
            Some(n) => i32::try_from(n).map_or(Bson::Int64(n), Bson::Int32),
            None => return Err(overflow(op)),
        },
        (Bson::Int32(_) | Bson::Int64(_), Bson::Int32(_) | Bson::Int64(_)) => {
            match checked(as_i64(current), as_i64(operand)) {
                Some(n) => Bson::Int64(n),
                None => return Err(overflow(op)),
            }
        }
        (Bson::Double(a), b) if is_number(b) => Bson::Double(float(*a, as_f64(b))),
        (a, Bson::Double(b)) if is_number(a) => Bson::Double(float(as_f64(a), *b)),
        _ => {
            return Err(StoreError::InvalidDocument(format!(
                "cannot apply {op} with {operand} to {current}"
            )));
        }
    })
}

fn overflow(op: &str) -> StoreError {
    StoreError::InvalidDocument(format!("{op} overflowed a 64-bit integer"))
}

fn is_number(value: &Bson) -> bool {
    matches!(value, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_))
}

fn as_i64(value: &Bson) -> i64 {
    match value {
        Bson::Int32(n) => i64::from(*n),
        Bson::Int64(n) => *n,
        _ => 0,
    }
}

fn as_f64(value: &Bson) -> f64 {
    match value {
        Bson::Int32(n) => f64::from(*n),
        Bson::Int64(n) => *n as f64,
        Bson::Double(n) => *n,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    fn updated(mut document: Document, update: Document) -> Document {
        apply_update(&mut document, &update).unwrap();
        document
    }

    #[test]
    fn sets_and_unsets_fields() {
        assert_eq!(
            updated(doc! { "a": 1, "b": 2 }, doc! { "$set": { "a": "x", "c.d": true }, "$unset": { "b": "" } }),
            doc! { "a": "x", "c": { "d": true } }
        );
    }

    #[test]
    fn increments_and_multiplies_numbers() {
        assert_eq!(updated(doc! { "n": 1 }, doc! { "$inc": { "n": 2 } }), doc! { "n": 3 });
        assert_eq!(updated(doc! { "n": 2 }, doc! { "$mul": { "n": 1.5 } }), doc! { "n": 3.0 });
        assert_eq!(updated(doc! {}, doc! { "$inc": { "n": 5_i64 } }), doc! { "n": 5_i64 });
        assert_eq!(updated(doc! {}, doc! { "$mul": { "n": 4 } }), doc! { "n": 0 });
    }

    #[test]
    fn rejects_arithmetic_on_strings() {
        let mut document = doc! { "n": "one" };

        assert!(apply_update(&mut document, &doc! { "$inc": { "n": 1 } }).is_err());
    }
}
