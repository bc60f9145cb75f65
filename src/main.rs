//! Tweet Publisher - one-shot JSON to NATS JetStream producer
//!
//! Reads a JSON array of tweets and publishes each element as a
//! schema-typed `TweetRecord`:
//! - Connects to NATS with token authentication
//! - Binds the topic stream and registers the record schema
//! - Sends records in input order, one acknowledged publish at a time
//! - Logs the outcome of every record; a failed record never stops the run

use anyhow::Result;
use tracing::{error, info, info_span, Instrument};

mod config;
pub mod error;
mod input;
mod nats;
mod publisher;
mod record;
mod schema;

use config::{LogFormat, PublisherConfig};
use error::PublisherError;
use nats::NatsProducer;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first to get log level
    let publisher_config = PublisherConfig::from_env()?;

    init_tracing(&publisher_config)?;

    let run_id = uuid::Uuid::new_v4();
    let span = info_span!("run", %run_id);
    if let Err(e) = run(publisher_config).instrument(span.clone()).await {
        span.in_scope(|| {
            error!(
                error = %e,
                error_type = e.error_type_label(),
                fatal = e.is_fatal(),
                "Publisher aborted"
            )
        });
        return Err(e.into());
    }
    Ok(())
}

/// Initialize tracing with the configured log level and format
fn init_tracing(config: &PublisherConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("tweet_publisher={}", config.log_level).parse()?)
        .add_directive("async_nats=warn".parse()?);

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match config.log_format {
        LogFormat::Json => subscriber.json().init(),
        // Console lines read as plain sentences, prefixed only by the run span
        LogFormat::Text => subscriber
            .without_time()
            .with_target(false)
            .with_level(false)
            .init(),
    }
    Ok(())
}

async fn run(config: PublisherConfig) -> Result<(), PublisherError> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        topic = %config.topic,
        input = %config.input_path.display(),
        "Starting Tweet Publisher"
    );

    let producer = NatsProducer::connect(&config).await?;
    producer.bind().await?;

    // Per-record failures are only logged; the exit code stays 0.
    publisher::produce(producer, &config.input_path).await?;
    Ok(())
}
