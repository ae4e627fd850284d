use crate::FirestoreDocument;
use gcloud_sdk::google::firestore::v1::{value, Value};
use std::collections::HashMap;

/// Retrieves a field's value from a Firestore document using a dot-separated path.
///
/// Backticks (`) around a segment are removed, so quoted segments such as
/// `` `my.field` `` are not supported beyond stripping the quotes.
///
/// # Examples
/// ```rust
/// use firestore_watch::{firestore_doc_get_field_by_path, FirestoreDocument, FirestoreValue};
/// use std::collections::HashMap;
///
/// let doc = FirestoreDocument {
///     name: "projects/p/databases/d/documents/c/doc1".to_string(),
///     fields: HashMap::from([(
///         "user".to_string(),
///         FirestoreValue::from_map([("name", "Alice".into())]).value,
///     )]),
///     create_time: None,
///     update_time: None,
/// };
///
/// assert!(firestore_doc_get_field_by_path(&doc, "user.name").is_some());
/// assert!(firestore_doc_get_field_by_path(&doc, "user.age").is_none());
/// ```
pub fn firestore_doc_get_field_by_path<'d>(
    doc: &'d FirestoreDocument,
    field_path: &str,
) -> Option<&'d Value> {
    firestore_fields_get_by_path(&doc.fields, field_path)
}

pub fn firestore_fields_get_by_path<'d>(
    fields: &'d HashMap<String, Value>,
    field_path: &str,
) -> Option<&'d Value> {
    let segments: Vec<String> = field_path
        .split('.')
        .map(|s| s.replace('`', ""))
        .collect();
    fields_get_by_segments(fields, &segments)
}

fn fields_get_by_segments<'d>(
    fields: &'d HashMap<String, Value>,
    segments: &[String],
) -> Option<&'d Value> {
    let (first, rest) = segments.split_first()?;
    let field_value = fields.get(first)?;
    if rest.is_empty() {
        Some(field_value)
    } else {
        match field_value.value_type {
            Some(value::ValueType::MapValue(ref map_value)) => {
                fields_get_by_segments(&map_value.fields, rest)
            }
            _ => None,
        }
    }
}

/// The last segment of a document path, i.e. the document id.
pub fn firestore_document_id(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FirestoreValue;

    fn fv<T: Into<FirestoreValue>>(v: T) -> Value {
        let v: FirestoreValue = v.into();
        v.value
    }

    #[test]
    fn test_nested_field_lookup() {
        let doc = FirestoreDocument {
            name: "projects/p/databases/(default)/documents/c/d".to_string(),
            fields: HashMap::from([
                (
                    "a".to_string(),
                    FirestoreValue::from_map([("b", 5_i64.into())]).value,
                ),
                ("c".to_string(), fv("x")),
            ]),
            create_time: None,
            update_time: None,
        };

        assert_eq!(
            firestore_doc_get_field_by_path(&doc, "a.b"),
            Some(&fv(5_i64))
        );
        assert_eq!(
            firestore_doc_get_field_by_path(&doc, "`c`"),
            Some(&fv("x"))
        );
        assert_eq!(firestore_doc_get_field_by_path(&doc, "c.d"), None);
        assert_eq!(firestore_doc_get_field_by_path(&doc, "z"), None);
    }

    #[test]
    fn test_document_id() {
        assert_eq!(firestore_document_id("col/doc1"), "doc1");
        assert_eq!(firestore_document_id("doc1"), "doc1");
    }
}
