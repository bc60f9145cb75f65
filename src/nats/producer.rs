//! NATS record producer
//!
//! Connects with token auth, binds the topic stream with the tweet schema,
//! and publishes records one at a time.

use crate::config::PublisherConfig;
use crate::error::PublisherError;
use crate::publisher::RecordSink;
use crate::record::TweetRecord;
use crate::schema::{self, SchemaDecision, SCHEMA_METADATA_KEY, SCHEMA_NAME};
use async_nats::jetstream::{self, stream, Context as JsContext};
use async_nats::{Client, ConnectOptions, HeaderMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Client name reported to the NATS server
const CLIENT_NAME: &str = "tweet-publisher";

/// Producer bound to one topic and the tweet schema
pub struct NatsProducer {
    client: Client,
    jetstream: JsContext,
    subject: String,
    stream: String,
    messages_published: AtomicU64,
    publish_failures: AtomicU64,
}

impl NatsProducer {
    /// Connect to the NATS server(s) using the configured token
    pub async fn connect(config: &PublisherConfig) -> Result<Self, PublisherError> {
        info!(servers = %config.service_url, "Connecting to NATS");

        let client = ConnectOptions::with_token(config.auth_token.clone())
            .name(CLIENT_NAME)
            .connect(config.service_url.as_str())
            .await
            .map_err(|e| PublisherError::ConnectionFailed(Box::new(e)))?;

        let jetstream = jetstream::new(client.clone());

        info!("Connected to NATS JetStream");

        Ok(Self {
            client,
            jetstream,
            subject: config.topic.clone(),
            stream: config.stream.clone(),
            messages_published: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
        })
    }

    /// Ensure the topic stream exists and carries our schema
    ///
    /// Registers the schema on a stream that has none; refuses to continue
    /// if a different schema is already registered.
    pub async fn bind(&self) -> Result<(), PublisherError> {
        let ours = schema::canonical_schema();

        let stream = self
            .jetstream
            .get_or_create_stream(stream_config(&self.stream, &self.subject, &ours))
            .await
            .map_err(|e| self.setup_failed(e))?;

        let info = stream.cached_info();
        let registered = info.config.metadata.get(SCHEMA_METADATA_KEY);

        match schema::decide(registered.map(String::as_str), &ours) {
            SchemaDecision::Matches => {
                debug!(stream = %self.stream, "Schema already registered");
            }
            SchemaDecision::Register => {
                let mut updated = info.config.clone();
                updated
                    .metadata
                    .insert(SCHEMA_METADATA_KEY.to_string(), ours);
                self.jetstream
                    .update_stream(updated)
                    .await
                    .map_err(|e| self.setup_failed(e))?;
                info!(stream = %self.stream, schema = SCHEMA_NAME, "Registered schema on stream");
            }
            SchemaDecision::Conflict { registered } => {
                return Err(PublisherError::SchemaRejected {
                    stream: self.stream.clone(),
                    registered,
                });
            }
        }

        if !info.config.subjects.iter().any(|s| s == &self.subject) {
            warn!(
                stream = %self.stream,
                subject = %self.subject,
                subjects = ?info.config.subjects,
                "Existing stream does not list the topic subject"
            );
        }

        info!(stream = %self.stream, subject = %self.subject, "Producer bound");
        Ok(())
    }

    fn setup_failed<E>(&self, e: E) -> PublisherError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        PublisherError::StreamSetupFailed {
            stream: self.stream.clone(),
            source: Box::new(e),
        }
    }

    /// Publish one record and wait for its acknowledgement
    async fn publish_record(&self, record: &TweetRecord) -> Result<(), PublisherError> {
        let payload = record.to_payload()?;

        debug!(subject = %self.subject, tweet_id = %record.id, "Publishing record");

        let ack = self
            .jetstream
            .publish_with_headers(self.subject.clone(), record_headers(), payload.into())
            .await
            .map_err(|e| self.publish_failed(e))?
            .await
            .map_err(|e| self.publish_failed(e))?;

        debug!(
            subject = %self.subject,
            stream = %ack.stream,
            seq = ack.sequence,
            "Record published"
        );
        Ok(())
    }

    fn publish_failed<E>(&self, e: E) -> PublisherError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        PublisherError::PublishFailed {
            subject: self.subject.clone(),
            source: Box::new(e),
        }
    }

    /// Get total messages published
    pub fn messages_published(&self) -> u64 {
        self.messages_published.load(Ordering::Relaxed)
    }

    /// Get total publish failures
    pub fn publish_failures(&self) -> u64 {
        self.publish_failures.load(Ordering::Relaxed)
    }
}

impl RecordSink for NatsProducer {
    async fn send(&self, record: &TweetRecord) -> Result<(), PublisherError> {
        match self.publish_record(record).await {
            Ok(()) => {
                self.messages_published.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.publish_failures.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Flush pending traffic and release the connection
    async fn close(self) {
        info!(
            published = self.messages_published(),
            failures = self.publish_failures(),
            "Closing NATS connection"
        );

        if let Err(e) = self.client.flush().await {
            warn!(error = %e, "Failed to flush NATS connection on close");
        }
        // Connection tasks stop once the last client handle is dropped
        drop(self.jetstream);
        drop(self.client);
    }
}

/// Stream definition used when the topic stream doesn't exist yet
fn stream_config(name: &str, subject: &str, schema: &str) -> stream::Config {
    stream::Config {
        name: name.to_string(),
        subjects: vec![subject.to_string()],
        retention: stream::RetentionPolicy::Limits,
        storage: stream::StorageType::File,
        metadata: [(SCHEMA_METADATA_KEY.to_string(), schema.to_string())]
            .into_iter()
            .collect(),
        ..Default::default()
    }
}

/// Headers attached to every record
fn record_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("Content-Type", "application/json");
    headers.insert("Schema-Name", SCHEMA_NAME);
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_config_captures_topic() {
        let config = stream_config("TWEETS", "tweets-topic", "{}");

        assert_eq!(config.name, "TWEETS");
        assert_eq!(config.subjects, vec!["tweets-topic".to_string()]);
        assert_eq!(config.retention, stream::RetentionPolicy::Limits);
        assert_eq!(config.storage, stream::StorageType::File);
    }

    #[test]
    fn test_new_stream_registers_schema() {
        let ours = schema::canonical_schema();
        let config = stream_config("TWEETS", "tweets-topic", &ours);

        let registered = config.metadata.get(SCHEMA_METADATA_KEY).map(String::as_str);
        assert_eq!(schema::decide(registered, &ours), SchemaDecision::Matches);
    }

    #[test]
    fn test_record_headers() {
        let headers = record_headers();

        assert_eq!(
            headers.get("Content-Type").map(|v| v.as_str()),
            Some("application/json")
        );
        assert_eq!(headers.get("Schema-Name").map(|v| v.as_str()), Some(SCHEMA_NAME));
    }
}
