//! Domain error types for the tweet publisher
//!
//! main.rs is the ONLY module allowed to use anyhow::Result (process boundary).
//! All application code returns Result<T, PublisherError>.
//!
//! Two tiers share this enum. Config, connection, bind and input variants are
//! fatal and reach `main`. Record, serialization and publish variants are
//! caught at the item boundary and only logged.

use std::path::PathBuf;
use thiserror::Error;

/// Publisher domain errors
///
/// Every variant carries structured context fields for diagnostics.
/// Example log output:
/// ```text
/// PublisherError::InvalidField { field: "sentiment", expected: "integer", found: "string" }
/// → "field 'sentiment' must be integer, found string"
/// ```
#[derive(Error, Debug)]
pub enum PublisherError {
    /// Configuration error (missing or invalid option)
    #[error("configuration error: {0}")]
    Config(String),

    /// NATS connection failed (unreachable server or rejected token)
    #[error("NATS connection failed")]
    ConnectionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// JetStream refused to create, look up or update the topic stream
    #[error("stream '{stream}' setup failed")]
    StreamSetupFailed {
        stream: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Stream already carries a different record schema
    #[error("schema rejected: stream '{stream}' already registers schema {registered}")]
    SchemaRejected { stream: String, registered: String },

    /// Input file missing or unreadable
    #[error("failed to read input file {}", path.display())]
    InputRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Input file is not valid JSON
    #[error("failed to parse input file {}", path.display())]
    InputParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Input file parsed but its top-level value is not an array
    #[error("input file {} must contain a JSON array, found {found}", path.display())]
    InputNotArray { path: PathBuf, found: &'static str },

    /// Array element is not a JSON object
    #[error("element {index} is not a JSON object, found {found}")]
    NotAnObject { index: usize, found: &'static str },

    /// Record field present with the wrong JSON type
    #[error("field '{field}' must be {expected}, found {found}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
        found: String,
    },

    /// Record serialization failed
    #[error("record serialization failed: {0}")]
    SerializationFailed(#[source] serde_json::Error),

    /// Publish or acknowledgement failed for the topic subject
    #[error("NATS publish failed for subject '{subject}': {source}")]
    PublishFailed {
        subject: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl PublisherError {
    /// Returns a static label used as the `error_type` log field.
    pub fn error_type_label(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::ConnectionFailed(_) => "nats_connection",
            Self::StreamSetupFailed { .. } => "stream_setup",
            Self::SchemaRejected { .. } => "schema_rejected",
            Self::InputRead { .. } => "input_read",
            Self::InputParse { .. } => "input_parse",
            Self::InputNotArray { .. } => "input_not_array",
            Self::NotAnObject { .. } => "not_an_object",
            Self::InvalidField { .. } => "invalid_field",
            Self::SerializationFailed(_) => "serialization",
            Self::PublishFailed { .. } => "nats_publish",
        }
    }

    /// Whether this error aborts the run rather than a single record.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::NotAnObject { .. }
                | Self::InvalidField { .. }
                | Self::SerializationFailed(_)
                | Self::PublishFailed { .. }
        )
    }
}

/// Name of a JSON value's type, as used in error messages.
pub fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
