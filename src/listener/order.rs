use crate::errors::*;
use crate::{firestore_fields_get_by_path, FirestoreResult};
use gcloud_sdk::google::firestore::v1::{structured_query, value, Value};
use rsb_derive::Builder;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Pseudo field referring to the document path in `order_by` clauses.
pub const FIRESTORE_DOCUMENT_NAME_FIELD: &str = "__name__";

#[derive(Debug, Eq, PartialEq, Clone, Copy, Hash)]
pub enum FirestoreQueryDirection {
    Ascending,
    Descending,
}

impl FirestoreQueryDirection {
    #[inline]
    pub fn apply(&self, ordering: Ordering) -> Ordering {
        match self {
            FirestoreQueryDirection::Ascending => ordering,
            FirestoreQueryDirection::Descending => ordering.reverse(),
        }
    }
}

#[derive(Debug, Eq, PartialEq, Clone, Builder)]
pub struct FirestoreQueryOrder {
    /// The path to the field to order by (e.g., "name", "address.city").
    pub field_name: String,
    pub direction: FirestoreQueryDirection,
}

impl<S> From<(S, FirestoreQueryDirection)> for FirestoreQueryOrder
where
    S: AsRef<str>,
{
    fn from(field_order: (S, FirestoreQueryDirection)) -> Self {
        FirestoreQueryOrder::new(field_order.0.as_ref().to_string(), field_order.1)
    }
}

impl From<FirestoreQueryOrder> for structured_query::Order {
    fn from(order: FirestoreQueryOrder) -> Self {
        structured_query::Order {
            field: Some(structured_query::FieldReference {
                field_path: order.field_name,
            }),
            direction: match order.direction {
                FirestoreQueryDirection::Ascending => structured_query::Direction::Ascending.into(),
                FirestoreQueryDirection::Descending => {
                    structured_query::Direction::Descending.into()
                }
            },
        }
    }
}

impl TryFrom<&structured_query::Order> for FirestoreQueryOrder {
    type Error = FirestoreError;

    fn try_from(order: &structured_query::Order) -> FirestoreResult<Self> {
        let field_name = order
            .field
            .as_ref()
            .map(|field| field.field_path.clone())
            .ok_or_else(|| {
                FirestoreError::InvalidParametersError(FirestoreInvalidParametersError::new(
                    FirestoreInvalidParametersPublicDetails::new(
                        "order_by".to_string(),
                        "Order clause without a field reference".to_string(),
                    ),
                ))
            })?;

        let direction = match structured_query::Direction::try_from(order.direction) {
            Ok(structured_query::Direction::Descending) => FirestoreQueryDirection::Descending,
            _ => FirestoreQueryDirection::Ascending,
        };

        Ok(FirestoreQueryOrder::new(field_name, direction))
    }
}

// Precedence of value kinds in the canonical Firestore ordering.
#[derive(Debug, Eq, PartialEq, Ord, PartialOrd, Clone, Copy)]
enum FirestoreValueTypeOrder {
    Null,
    Boolean,
    NaN,
    Number,
    Timestamp,
    String,
    Bytes,
    Reference,
    GeoPoint,
    Array,
    Map,
}

fn type_order(value: &Value) -> FirestoreResult<FirestoreValueTypeOrder> {
    match value.value_type {
        Some(value::ValueType::NullValue(_)) => Ok(FirestoreValueTypeOrder::Null),
        Some(value::ValueType::BooleanValue(_)) => Ok(FirestoreValueTypeOrder::Boolean),
        Some(value::ValueType::DoubleValue(d)) if d.is_nan() => Ok(FirestoreValueTypeOrder::NaN),
        Some(value::ValueType::DoubleValue(_)) | Some(value::ValueType::IntegerValue(_)) => {
            Ok(FirestoreValueTypeOrder::Number)
        }
        Some(value::ValueType::TimestampValue(_)) => Ok(FirestoreValueTypeOrder::Timestamp),
        Some(value::ValueType::StringValue(_)) => Ok(FirestoreValueTypeOrder::String),
        Some(value::ValueType::BytesValue(_)) => Ok(FirestoreValueTypeOrder::Bytes),
        Some(value::ValueType::ReferenceValue(_)) => Ok(FirestoreValueTypeOrder::Reference),
        Some(value::ValueType::GeoPointValue(_)) => Ok(FirestoreValueTypeOrder::GeoPoint),
        Some(value::ValueType::ArrayValue(_)) => Ok(FirestoreValueTypeOrder::Array),
        Some(value::ValueType::MapValue(_)) => Ok(FirestoreValueTypeOrder::Map),
        #[allow(unreachable_patterns)]
        _ => Err(FirestoreError::InvalidParametersError(
            FirestoreInvalidParametersError::new(FirestoreInvalidParametersPublicDetails::new(
                "value".to_string(),
                format!("Can't determine field type for {:?}", value),
            )),
        )),
    }
}

/// Checks that a value, including nested array and map entries, can be ordered.
pub fn ensure_comparable(value: &Value) -> FirestoreResult<()> {
    type_order(value)?;
    match value.value_type {
        Some(value::ValueType::ArrayValue(ref array)) => {
            array.values.iter().try_for_each(ensure_comparable)
        }
        Some(value::ValueType::MapValue(ref map)) => map.fields.values().try_for_each(ensure_comparable),
        _ => Ok(()),
    }
}

/// Three-way comparison of two values following the Firestore cross-type ordering:
/// null < boolean < NaN < number < timestamp < string < bytes < reference < geo point < array < map.
pub fn compare_values(a: &Value, b: &Value) -> FirestoreResult<Ordering> {
    let (a_type, b_type) = (type_order(a)?, type_order(b)?);
    if a_type != b_type {
        return Ok(a_type.cmp(&b_type));
    }

    match (&a.value_type, &b.value_type) {
        (
            Some(value::ValueType::BooleanValue(a_val)),
            Some(value::ValueType::BooleanValue(b_val)),
        ) => Ok(a_val.cmp(b_val)),
        (
            Some(value::ValueType::IntegerValue(a_val)),
            Some(value::ValueType::IntegerValue(b_val)),
        ) => Ok(a_val.cmp(b_val)),
        (Some(value::ValueType::DoubleValue(a_val)), Some(value::ValueType::DoubleValue(b_val))) => {
            Ok(compare_doubles(*a_val, *b_val))
        }
        (
            Some(value::ValueType::IntegerValue(a_val)),
            Some(value::ValueType::DoubleValue(b_val)),
        ) => Ok(compare_integer_with_double(*a_val, *b_val)),
        (
            Some(value::ValueType::DoubleValue(a_val)),
            Some(value::ValueType::IntegerValue(b_val)),
        ) => Ok(compare_integer_with_double(*b_val, *a_val).reverse()),
        (
            Some(value::ValueType::TimestampValue(a_val)),
            Some(value::ValueType::TimestampValue(b_val)),
        ) => Ok((a_val.seconds, a_val.nanos).cmp(&(b_val.seconds, b_val.nanos))),
        (Some(value::ValueType::StringValue(a_val)), Some(value::ValueType::StringValue(b_val))) => {
            Ok(a_val.as_bytes().cmp(b_val.as_bytes()))
        }
        (Some(value::ValueType::BytesValue(a_val)), Some(value::ValueType::BytesValue(b_val))) => {
            Ok(a_val.as_slice().cmp(b_val.as_slice()))
        }
        (
            Some(value::ValueType::ReferenceValue(a_val)),
            Some(value::ValueType::ReferenceValue(b_val)),
        ) => Ok(compare_paths(a_val, b_val)),
        (
            Some(value::ValueType::GeoPointValue(a_val)),
            Some(value::ValueType::GeoPointValue(b_val)),
        ) => Ok(compare_doubles(a_val.latitude, b_val.latitude)
            .then_with(|| compare_doubles(a_val.longitude, b_val.longitude))),
        (Some(value::ValueType::ArrayValue(a_val)), Some(value::ValueType::ArrayValue(b_val))) => {
            for (a_item, b_item) in a_val.values.iter().zip(b_val.values.iter()) {
                let ordering = compare_values(a_item, b_item)?;
                if ordering != Ordering::Equal {
                    return Ok(ordering);
                }
            }
            Ok(a_val.values.len().cmp(&b_val.values.len()))
        }
        (Some(value::ValueType::MapValue(a_val)), Some(value::ValueType::MapValue(b_val))) => {
            compare_maps(&a_val.fields, &b_val.fields)
        }
        // Null vs null and NaN vs NaN
        _ => Ok(Ordering::Equal),
    }
}

fn compare_maps(a: &HashMap<String, Value>, b: &HashMap<String, Value>) -> FirestoreResult<Ordering> {
    let mut a_keys: Vec<&String> = a.keys().collect();
    let mut b_keys: Vec<&String> = b.keys().collect();
    a_keys.sort();
    b_keys.sort();

    for (a_key, b_key) in a_keys.iter().zip(b_keys.iter()) {
        let key_ordering = a_key.as_bytes().cmp(b_key.as_bytes());
        if key_ordering != Ordering::Equal {
            return Ok(key_ordering);
        }
        let value_ordering = compare_values(&a[*a_key], &b[*b_key])?;
        if value_ordering != Ordering::Equal {
            return Ok(value_ordering);
        }
    }
    Ok(a_keys.len().cmp(&b_keys.len()))
}

// NaN has its own slot in the type order, so here it only shows up inside geo points.
fn compare_doubles(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

fn compare_integer_with_double(i: i64, d: f64) -> Ordering {
    // 2^63, the first double outside of the i64 range
    const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;
    if d < -I64_BOUND {
        return Ordering::Greater;
    }
    if d >= I64_BOUND {
        return Ordering::Less;
    }
    let d_trunc = d.trunc();
    match i.cmp(&(d_trunc as i64)) {
        Ordering::Equal => 0.0_f64
            .partial_cmp(&(d - d_trunc))
            .unwrap_or(Ordering::Equal),
        ordering => ordering,
    }
}

/// Compares document paths segment by segment, so `a/b` < `a/b/c` < `a/c`.
pub fn compare_paths(a: &str, b: &str) -> Ordering {
    a.split('/').cmp(b.split('/'))
}

/// The query specific total order over documents: `order_by` clauses first,
/// then the document path in the direction of the last clause.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FirestoreQueryOrdering {
    order_by: Vec<FirestoreQueryOrder>,
}

impl FirestoreQueryOrdering {
    pub fn new(order_by: Vec<FirestoreQueryOrder>) -> Self {
        Self { order_by }
    }

    /// Orders documents only by their paths, as used for document targets.
    pub fn by_path() -> Self {
        Self::default()
    }

    pub fn order_by(&self) -> &[FirestoreQueryOrder] {
        &self.order_by
    }

    fn path_direction(&self) -> FirestoreQueryDirection {
        self.order_by
            .last()
            .map(|order| order.direction)
            .unwrap_or(FirestoreQueryDirection::Ascending)
    }

    /// Extracts the values a document is sorted by, one per `order_by` clause.
    /// Missing fields sort as null.
    pub fn sort_values(
        &self,
        path: &str,
        fields: &HashMap<String, Value>,
    ) -> FirestoreResult<Vec<Value>> {
        self.order_by
            .iter()
            .map(|order| {
                let value = if order.field_name == FIRESTORE_DOCUMENT_NAME_FIELD {
                    Value {
                        value_type: Some(value::ValueType::ReferenceValue(path.to_string())),
                    }
                } else {
                    firestore_fields_get_by_path(fields, &order.field_name)
                        .cloned()
                        .unwrap_or(Value {
                            value_type: Some(value::ValueType::NullValue(0)),
                        })
                };
                ensure_comparable(&value)?;
                Ok(value)
            })
            .collect()
    }

    /// Compares values previously produced by [`FirestoreQueryOrdering::sort_values`].
    pub fn compare_sort_values(
        &self,
        (a_path, a_values): (&str, &[Value]),
        (b_path, b_values): (&str, &[Value]),
    ) -> Ordering {
        for ((order, a_value), b_value) in self.order_by.iter().zip(a_values).zip(b_values) {
            let ordering = order
                .direction
                .apply(compare_values(a_value, b_value).unwrap_or(Ordering::Equal));
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        self.path_direction().apply(compare_paths(a_path, b_path))
    }

    pub fn compare_documents(
        &self,
        (a_path, a_fields): (&str, &HashMap<String, Value>),
        (b_path, b_fields): (&str, &HashMap<String, Value>),
    ) -> FirestoreResult<Ordering> {
        let a_values = self.sort_values(a_path, a_fields)?;
        let b_values = self.sort_values(b_path, b_fields)?;
        Ok(self.compare_sort_values((a_path, &a_values), (b_path, &b_values)))
    }
}
