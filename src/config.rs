//! Publisher configuration module
//!
//! Loads configuration from built-in defaults, an optional config file named
//! by `PUBLISHER_CONFIG`, and `PUBLISHER_*` environment variables (in that
//! order of precedence, lowest first). A `.env` file is honoured.

use crate::error::PublisherError;
use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_SERVICE_URL: &str = "nats://localhost:4222";
pub const DEFAULT_TOPIC: &str = "tweets-topic";
pub const DEFAULT_INPUT_PATH: &str = "data.json";

/// Environment variable prefix for every option
const ENV_PREFIX: &str = "PUBLISHER";

/// Environment variable naming an optional config file
const CONFIG_FILE_VAR: &str = "PUBLISHER_CONFIG";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Raw option set as deserialized from all sources
///
/// Defaults live here rather than in the builder so that a camelCase key from
/// a config file never collides with a default under the snake_case name.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_service_url", alias = "serviceUrl", alias = "serviceurl")]
    service_url: String,
    #[serde(default = "default_topic")]
    topic: String,
    #[serde(default)]
    stream: Option<String>,
    #[serde(default, alias = "authToken", alias = "authtoken")]
    auth_token: Option<String>,
    #[serde(default = "default_input_path", alias = "inputPath", alias = "inputpath")]
    input_path: PathBuf,
    #[serde(default = "default_log_level", alias = "logLevel", alias = "loglevel")]
    log_level: String,
    #[serde(default = "default_log_format", alias = "logFormat", alias = "logformat")]
    log_format: LogFormat,
}

fn default_service_url() -> String {
    DEFAULT_SERVICE_URL.to_string()
}

fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}

fn default_input_path() -> PathBuf {
    PathBuf::from(DEFAULT_INPUT_PATH)
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

/// Publisher configuration
#[derive(Clone)]
pub struct PublisherConfig {
    /// NATS server URL(s), comma-separated for multiple servers
    pub service_url: String,

    /// Subject records are published to
    pub topic: String,

    /// JetStream stream capturing the topic
    pub stream: String,

    /// Token presented to the NATS server
    pub auth_token: String,

    /// JSON file holding the tweet array
    pub input_path: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    pub log_format: LogFormat,
}

impl PublisherConfig {
    /// Load configuration from the environment and optional config file
    pub fn from_env() -> Result<Self, PublisherError> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();
        if let Ok(path) = env::var(CONFIG_FILE_VAR) {
            builder = builder.add_source(File::with_name(&path));
        }
        let builder = builder.add_source(Environment::with_prefix(ENV_PREFIX));

        Self::from_builder(builder)
    }

    /// Resolve and validate the final option set
    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, PublisherError> {
        let raw: RawConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| PublisherError::Config(e.to_string()))?;

        validate_subject(&raw.topic)?;

        let auth_token = raw
            .auth_token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                PublisherError::Config("PUBLISHER_AUTH_TOKEN (auth_token) must be set".to_string())
            })?;

        let stream = match raw.stream {
            Some(stream) => {
                if stream.is_empty() || stream.contains(is_illegal_stream_char) {
                    return Err(PublisherError::Config(format!(
                        "stream name '{stream}' contains characters not allowed by JetStream"
                    )));
                }
                stream
            }
            None => stream_name_for(&raw.topic),
        };

        Ok(Self {
            service_url: raw.service_url,
            topic: raw.topic,
            stream,
            auth_token,
            input_path: raw.input_path,
            log_level: raw.log_level,
            log_format: raw.log_format,
        })
    }
}

impl fmt::Debug for PublisherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublisherConfig")
            .field("service_url", &self.service_url)
            .field("topic", &self.topic)
            .field("stream", &self.stream)
            .field("auth_token", &"<redacted>")
            .field("input_path", &self.input_path)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .finish()
    }
}

fn is_illegal_stream_char(c: char) -> bool {
    matches!(c, '.' | '*' | '>' | '/' | '\\') || c.is_whitespace()
}

/// Derive a JetStream stream name from a topic subject
///
/// `tweets.en` → `TWEETS_EN`
pub fn stream_name_for(topic: &str) -> String {
    topic
        .chars()
        .map(|c| if is_illegal_stream_char(c) { '_' } else { c.to_ascii_uppercase() })
        .collect()
}

/// Check that a topic is a concrete NATS subject we can publish to
fn validate_subject(topic: &str) -> Result<(), PublisherError> {
    if topic.is_empty() {
        return Err(PublisherError::Config("topic must not be empty".to_string()));
    }
    if topic.chars().any(char::is_whitespace) {
        return Err(PublisherError::Config(format!(
            "topic '{topic}' must not contain whitespace"
        )));
    }
    for token in topic.split('.') {
        match token {
            "" => {
                return Err(PublisherError::Config(format!(
                    "topic '{topic}' contains an empty token"
                )))
            }
            "*" | ">" => {
                return Err(PublisherError::Config(format!(
                    "topic '{topic}' must not contain wildcards"
                )))
            }
            _ => {}
        }
    }
    Ok(())
}
