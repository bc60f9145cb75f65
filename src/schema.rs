//! Record schema registration
//!
//! The schema is an Avro-style JSON record definition. Its canonical compact
//! form is stored as stream metadata and compared on every bind.

use serde_json::{json, Value};

/// Schema name, also sent as the `Schema-Name` message header
pub const SCHEMA_NAME: &str = "TweetData";

/// Stream metadata key holding the registered schema
pub const SCHEMA_METADATA_KEY: &str = "tweet-publisher.schema";

/// Schema definition for `TweetRecord`
pub fn tweet_schema() -> Value {
    json!({
        "type": "record",
        "name": SCHEMA_NAME,
        "fields": [
            { "name": "lang", "type": "string" },
            { "name": "id", "type": "string" },
            { "name": "tweet", "type": "string" },
            { "name": "createdAt", "type": "string" },
            { "name": "sentiment", "type": "int" },
        ],
    })
}

/// Canonical string form used for registration and comparison
pub fn canonical_schema() -> String {
    // Value maps are ordered by key, so this is stable across runs.
    tweet_schema().to_string()
}

/// What bind should do given the schema already registered on the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaDecision {
    /// No schema registered yet
    Register,
    /// Same schema already registered
    Matches,
    /// A different schema is registered
    Conflict { registered: String },
}

/// Compare a registered schema against ours
///
/// Registered schemas are compared structurally, so whitespace or key order
/// differences from another writer don't count as a conflict.
pub fn decide(registered: Option<&str>, ours: &str) -> SchemaDecision {
    let Some(registered) = registered else {
        return SchemaDecision::Register;
    };

    let same = match (
        serde_json::from_str::<Value>(registered),
        serde_json::from_str::<Value>(ours),
    ) {
        (Ok(theirs), Ok(mine)) => theirs == mine,
        _ => registered == ours,
    };

    if same {
        SchemaDecision::Matches
    } else {
        SchemaDecision::Conflict {
            registered: registered.to_string(),
        }
    }
}
