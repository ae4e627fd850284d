use crate::timestamp_utils::to_timestamp;
use chrono::prelude::*;
use gcloud_sdk::google::firestore::v1::{value, ArrayValue, MapValue, Value};
use std::collections::HashMap;

/// Represents a Firestore value, wrapping the underlying gRPC `Value` type.
///
/// Listener snapshots expose raw gRPC values; this wrapper is the convenient way
/// to build them (for example to assemble documents in tests or to compare a
/// field against a known value using the canonical Firestore ordering).
///
/// # Examples
///
/// ```rust
/// use firestore_watch::FirestoreValue;
///
/// let fv_map = FirestoreValue::from_map(vec![
///     ("name", "Alice".into()),
///     ("age", 30_i64.into()),
/// ]);
/// ```
#[derive(Debug, PartialEq, Clone)]
pub struct FirestoreValue {
    /// The underlying gRPC `Value` protobuf message.
    pub value: Value,
}

impl FirestoreValue {
    /// Creates a `FirestoreValue` directly from a `gcloud_sdk::google::firestore::v1::Value`.
    pub fn from(value: Value) -> Self {
        Self { value }
    }

    fn from_type(value_type: value::ValueType) -> Self {
        Self::from(Value {
            value_type: Some(value_type),
        })
    }

    pub fn null() -> Self {
        Self::from_type(value::ValueType::NullValue(0))
    }

    pub fn from_bytes<B: Into<Vec<u8>>>(bytes: B) -> Self {
        Self::from_type(value::ValueType::BytesValue(bytes.into()))
    }

    /// A reference value; `path` is a full document resource name.
    pub fn from_reference<S: AsRef<str>>(path: S) -> Self {
        Self::from_type(value::ValueType::ReferenceValue(path.as_ref().to_string()))
    }

    pub fn from_geo_point(latitude: f64, longitude: f64) -> Self {
        Self::from_type(value::ValueType::GeoPointValue(
            gcloud_sdk::google::r#type::LatLng {
                latitude,
                longitude,
            },
        ))
    }

    pub fn from_array<I>(values: I) -> Self
    where
        I: IntoIterator<Item = FirestoreValue>,
    {
        Self::from_type(value::ValueType::ArrayValue(ArrayValue {
            values: values.into_iter().map(|v| v.value).collect(),
        }))
    }

    /// Creates a `FirestoreValue` representing a Firestore map from an iterator of key-value pairs.
    pub fn from_map<I, IS>(fields: I) -> Self
    where
        I: IntoIterator<Item = (IS, FirestoreValue)>,
        IS: AsRef<str>,
    {
        let fields: HashMap<String, Value> = fields
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.value))
            .collect();
        Self::from_type(value::ValueType::MapValue(MapValue { fields }))
    }
}

impl From<bool> for FirestoreValue {
    fn from(value: bool) -> Self {
        Self::from_type(value::ValueType::BooleanValue(value))
    }
}

impl From<i64> for FirestoreValue {
    fn from(value: i64) -> Self {
        Self::from_type(value::ValueType::IntegerValue(value))
    }
}

impl From<i32> for FirestoreValue {
    fn from(value: i32) -> Self {
        Self::from_type(value::ValueType::IntegerValue(value.into()))
    }
}

impl From<f64> for FirestoreValue {
    fn from(value: f64) -> Self {
        Self::from_type(value::ValueType::DoubleValue(value))
    }
}

impl From<&str> for FirestoreValue {
    fn from(value: &str) -> Self {
        Self::from_type(value::ValueType::StringValue(value.to_string()))
    }
}

impl From<String> for FirestoreValue {
    fn from(value: String) -> Self {
        Self::from_type(value::ValueType::StringValue(value))
    }
}

impl From<DateTime<Utc>> for FirestoreValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::from_type(value::ValueType::TimestampValue(to_timestamp(value)))
    }
}

impl<T> From<Option<T>> for FirestoreValue
where
    T: Into<FirestoreValue>,
{
    fn from(value: Option<T>) -> Self {
        value.map(|v| v.into()).unwrap_or_else(FirestoreValue::null)
    }
}
