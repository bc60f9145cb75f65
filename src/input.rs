//! Input file loading

use crate::error::{json_type_name, PublisherError};
use serde_json::Value;
use std::path::Path;
use tracing::debug;

/// Read the whole input file and return the elements of its top-level array
///
/// Elements stay loosely typed; each one is checked when its record is built.
pub fn load_tweets(path: &Path) -> Result<Vec<Value>, PublisherError> {
    let content = std::fs::read(path).map_err(|source| PublisherError::InputRead {
        path: path.to_path_buf(),
        source,
    })?;

    let value: Value =
        serde_json::from_slice(&content).map_err(|source| PublisherError::InputParse {
            path: path.to_path_buf(),
            source,
        })?;

    match value {
        Value::Array(items) => {
            debug!(path = %path.display(), count = items.len(), "Loaded input file");
            Ok(items)
        }
        other => Err(PublisherError::InputNotArray {
            path: path.to_path_buf(),
            found: json_type_name(&other),
        }),
    }
}
