//! Tweet record payload
//!
//! Maps one loosely-typed input object onto the fixed five-field record that
//! goes on the wire.

use crate::error::{json_type_name, PublisherError};
use serde::Serialize;
use serde_json::{Map, Value};

/// Record published for each input tweet
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TweetRecord {
    pub lang: String,
    pub id: String,
    pub tweet: String,
    pub created_at: String,
    pub sentiment: i32,
}

impl TweetRecord {
    /// Build a record from one element of the input array
    ///
    /// Absent and `null` fields take their defaults (`""` / `0`). A field of
    /// the wrong type fails the record instead of being coerced.
    pub fn from_value(index: usize, value: &Value) -> Result<Self, PublisherError> {
        let object = value.as_object().ok_or(PublisherError::NotAnObject {
            index,
            found: json_type_name(value),
        })?;

        Ok(Self {
            lang: string_field(object, "lang")?,
            id: string_field(object, "id")?,
            tweet: string_field(object, "tweet")?,
            created_at: string_field(object, "createdAt")?,
            sentiment: int_field(object, "sentiment")?,
        })
    }

    /// Serialize to the JSON payload bytes
    pub fn to_payload(&self) -> Result<Vec<u8>, PublisherError> {
        serde_json::to_vec(self).map_err(PublisherError::SerializationFailed)
    }
}

fn string_field(object: &Map<String, Value>, field: &'static str) -> Result<String, PublisherError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(PublisherError::InvalidField {
            field,
            expected: "string",
            found: json_type_name(other).to_string(),
        }),
    }
}

fn int_field(object: &Map<String, Value>, field: &'static str) -> Result<i32, PublisherError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(|| PublisherError::InvalidField {
                field,
                expected: "32-bit integer",
                found: n.to_string(),
            }),
        Some(other) => Err(PublisherError::InvalidField {
            field,
            expected: "integer",
            found: json_type_name(other).to_string(),
        }),
    }
}

/// Tweet id to report for an element, even when the record can't be built
///
/// A present id is shown as given, whatever its type; `None` only when the id
/// is absent or `null`.
pub fn reported_id(value: &Value) -> String {
    match value.get("id") {
        None | Some(Value::Null) => "None".to_string(),
        Some(Value::String(id)) => id.clone(),
        Some(other) => other.to_string(),
    }
}
