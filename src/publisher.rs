//! Per-record publish loop
//!
//! Sends every input element in array order, one at a time. A failure is
//! turned into a `SendOutcome::Failed` at the item boundary and never stops
//! the loop.

use crate::error::PublisherError;
use crate::input;
use crate::record::{reported_id, TweetRecord};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

/// Logged once every record has been attempted and the sink is closed
pub const COMPLETION_LINE: &str = "All JSON messages produced successfully.";

/// Destination for built records
///
/// `NatsProducer` is the real sink; tests use an in-memory one.
#[allow(async_fn_in_trait)]
pub trait RecordSink {
    /// Send one record, returning once the broker has answered
    async fn send(&self, record: &TweetRecord) -> Result<(), PublisherError>;

    /// Release the sink after the last record was attempted
    async fn close(self);
}

/// Result of one element of the input array
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent { tweet_id: String },
    Failed { tweet_id: String, error: String },
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }
}

impl fmt::Display for SendOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sent { tweet_id } => {
                write!(f, "Message sent successfully for tweet ID: {tweet_id}")
            }
            Self::Failed { tweet_id, error } => write!(
                f,
                "Failed to send message for tweet ID: {tweet_id} due to error: {error}"
            ),
        }
    }
}

/// Outcomes of one run, in input order
#[derive(Debug, Default)]
pub struct PublishSummary {
    outcomes: Vec<SendOutcome>,
}

impl PublishSummary {
    pub fn outcomes(&self) -> &[SendOutcome] {
        &self.outcomes
    }

    pub fn sent(&self) -> usize {
        self.outcomes().iter().filter(|o| o.is_sent()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.sent()
    }
}

/// Build and send a record for every element, in order
pub async fn publish_all<S: RecordSink>(sink: &S, items: &[Value]) -> PublishSummary {
    let mut summary = PublishSummary {
        outcomes: Vec::with_capacity(items.len()),
    };

    for (index, item) in items.iter().enumerate() {
        let outcome = match send_one(sink, index, item).await {
            Ok(tweet_id) => {
                let outcome = SendOutcome::Sent { tweet_id };
                info!("{outcome}");
                outcome
            }
            Err(e) => {
                let outcome = SendOutcome::Failed {
                    tweet_id: reported_id(item),
                    error: e.to_string(),
                };
                warn!("{outcome}");
                outcome
            }
        };
        summary.outcomes.push(outcome);
    }

    summary
}

/// Load the input file, send every record, close the sink, report completion
///
/// An input error returns before any send and without closing the sink. The
/// completion line is reported even when individual records failed.
pub async fn produce<S: RecordSink>(
    sink: S,
    input_path: &Path,
) -> Result<PublishSummary, PublisherError> {
    let tweets = input::load_tweets(input_path)?;
    info!(count = tweets.len(), "Publishing records");

    let summary = publish_all(&sink, &tweets).await;

    sink.close().await;

    info!(sent = summary.sent(), failed = summary.failed(), "Publish summary");
    info!("{COMPLETION_LINE}");
    Ok(summary)
}

async fn send_one<S: RecordSink>(
    sink: &S,
    index: usize,
    item: &Value,
) -> Result<String, PublisherError> {
    let record = TweetRecord::from_value(index, item)?;
    sink.send(&record).await?;
    Ok(record.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::NamedTempFile;

    /// Records every send; fails the ones whose id is listed
    #[derive(Clone, Default)]
    struct MemorySink {
        sent: Arc<Mutex<Vec<TweetRecord>>>,
        closes: Arc<AtomicUsize>,
        fail_ids: Vec<&'static str>,
    }

    impl MemorySink {
        fn failing(fail_ids: Vec<&'static str>) -> Self {
            Self {
                fail_ids,
                ..Default::default()
            }
        }

        fn attempts(&self) -> Vec<TweetRecord> {
            self.sent.lock().unwrap().clone()
        }

        fn closes(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    impl RecordSink for MemorySink {
        async fn send(&self, record: &TweetRecord) -> Result<(), PublisherError> {
            self.sent.lock().unwrap().push(record.clone());
            if self.fail_ids.contains(&record.id.as_str()) {
                return Err(PublisherError::PublishFailed {
                    subject: "tweets-topic".to_string(),
                    source: Box::new(std::io::Error::other("no responders")),
                });
            }
            Ok(())
        }

        async fn close(self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
            info!("Sink closed");
        }
    }

    /// Log output collected in memory
    #[derive(Clone, Default)]
    struct LogCapture(Arc<Mutex<Vec<u8>>>);

    impl Write for LogCapture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Run `f` with a bare text subscriber and return its log lines
    fn with_captured_logs<T>(f: impl FnOnce() -> T) -> (T, Vec<String>) {
        let capture = LogCapture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .without_time()
            .with_target(false)
            .with_level(false)
            .finish();

        let out = tracing::subscriber::with_default(subscriber, f);
        let bytes = capture.0.lock().unwrap().clone();
        let lines = String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        (out, lines)
    }

    fn input_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content.as_bytes()).expect("Failed to write temp file");
        file.flush().expect("Failed to flush");
        file
    }

    fn position(lines: &[String], line: &str) -> usize {
        lines
            .iter()
            .position(|l| l.trim() == line)
            .unwrap_or_else(|| panic!("missing log line {line:?} in {lines:#?}"))
    }

    #[tokio::test]
    async fn sends_every_element_in_order() {
        let items: Vec<Value> = (0..5).map(|i| json!({"id": i.to_string()})).collect();
        let sink = MemorySink::default();

        let summary = publish_all(&sink, &items).await;

        let ids: Vec<_> = sink.attempts().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, ["0", "1", "2", "3", "4"]);
        assert_eq!(summary.sent(), 5);
        assert_eq!(summary.failed(), 0);
    }

    #[tokio::test]
    async fn example_input_yields_two_records() {
        let items = vec![
            json!({"lang":"en","id":"1","tweet":"hi","createdAt":"t1","sentiment":1}),
            json!({"id":"2"}),
        ];
        let sink = MemorySink::default();

        publish_all(&sink, &items).await;

        let sent = sink.attempts();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].lang, "en");
        assert_eq!(sent[0].tweet, "hi");
        assert_eq!(sent[0].created_at, "t1");
        assert_eq!(sent[0].sentiment, 1);
        assert_eq!(
            sent[1],
            TweetRecord {
                lang: String::new(),
                id: "2".to_string(),
                tweet: String::new(),
                created_at: String::new(),
                sentiment: 0,
            }
        );
    }

    #[test]
    fn failed_send_does_not_stop_the_loop() {
        let items = vec![json!({"id": "1"}), json!({"id": "2"}), json!({"id": "3"})];
        let sink = MemorySink::failing(vec!["2"]);

        let summary = tokio_test::block_on(publish_all(&sink, &items));

        assert_eq!(sink.attempts().len(), 3, "send 3 is still attempted");
        let lines: Vec<String> = summary.outcomes().iter().map(ToString::to_string).collect();
        assert_eq!(lines[0], "Message sent successfully for tweet ID: 1");
        assert!(lines[1].starts_with("Failed to send message for tweet ID: 2 due to error: "));
        assert!(lines[1].contains("no responders"));
        assert_eq!(lines[2], "Message sent successfully for tweet ID: 3");
        assert_eq!(summary.failed(), 1);
    }

    #[test]
    fn bad_record_fails_without_a_send() {
        let items = vec![
            json!({"id": "1", "sentiment": "high"}),
            json!(42),
            json!({"id": "3"}),
        ];
        let sink = MemorySink::default();

        let summary = tokio_test::block_on(publish_all(&sink, &items));

        assert_eq!(sink.attempts().len(), 1);
        assert_eq!(
            summary.outcomes()[0],
            SendOutcome::Failed {
                tweet_id: "1".to_string(),
                error: "field 'sentiment' must be integer, found string".to_string(),
            }
        );
        assert!(matches!(
            &summary.outcomes()[1],
            SendOutcome::Failed { tweet_id, .. } if tweet_id == "None"
        ));
        assert!(summary.outcomes()[2].is_sent());
    }

    #[test]
    fn non_string_id_is_reported_as_given() {
        let sink = MemorySink::default();

        let summary = tokio_test::block_on(publish_all(&sink, &[json!({"id": 7, "tweet": "x"})]));

        assert!(sink.attempts().is_empty());
        assert_eq!(
            summary.outcomes()[0].to_string(),
            "Failed to send message for tweet ID: 7 due to error: field 'id' must be string, found number"
        );
    }

    #[test]
    fn all_failures_still_produce_a_summary() {
        let items = vec![json!({"id": "1"}), json!({"id": "2"})];
        let sink = MemorySink::failing(vec!["1", "2"]);

        let summary = tokio_test::block_on(publish_all(&sink, &items));

        assert_eq!(summary.sent(), 0);
        assert_eq!(summary.failed(), 2);
    }

    #[tokio::test]
    async fn empty_input_sends_nothing() {
        let sink = MemorySink::default();
        let summary = publish_all(&sink, &[]).await;

        assert!(sink.attempts().is_empty());
        assert!(summary.outcomes().is_empty());
    }

    #[test]
    fn completion_is_logged_once_after_close_even_with_failures() {
        let file = input_file(r#"[{"id":"1"}, {"id":"2"}, {"id":"3"}]"#);
        let sink = MemorySink::failing(vec!["2"]);

        let (result, lines) = with_captured_logs(|| {
            tokio_test::block_on(produce(sink.clone(), file.path()))
        });

        let summary = result.unwrap();
        assert_eq!(summary.failed(), 1);
        assert_eq!(sink.attempts().len(), 3);
        assert_eq!(sink.closes(), 1);

        let first = position(&lines, "Message sent successfully for tweet ID: 1");
        let failed = position(
            &lines,
            "Failed to send message for tweet ID: 2 due to error: \
             NATS publish failed for subject 'tweets-topic': no responders",
        );
        let last = position(&lines, "Message sent successfully for tweet ID: 3");
        let closed = position(&lines, "Sink closed");
        let completion = position(&lines, COMPLETION_LINE);

        assert!(first < failed && failed < last, "outcomes follow input order");
        assert!(last < closed, "close comes after the last send attempt");
        assert!(closed < completion, "completion comes after close");
        assert_eq!(completion, lines.len() - 1, "completion is the final line");
        assert_eq!(lines.iter().filter(|l| l.trim() == COMPLETION_LINE).count(), 1);
    }

    #[test]
    fn non_array_input_sends_nothing_and_skips_completion() {
        let file = input_file(r#"{"id":"1"}"#);
        let sink = MemorySink::default();

        let (result, lines) = with_captured_logs(|| {
            tokio_test::block_on(produce(sink.clone(), file.path()))
        });

        let err = result.unwrap_err();
        assert!(matches!(err, PublisherError::InputNotArray { .. }));
        assert!(sink.attempts().is_empty(), "no send is attempted");
        assert_eq!(sink.closes(), 0);
        assert!(!lines.iter().any(|l| l.trim() == COMPLETION_LINE));
    }

    #[tokio::test]
    async fn empty_array_still_closes_and_completes() {
        let file = input_file("[]");
        let sink = MemorySink::default();

        let summary = produce(sink.clone(), file.path()).await.unwrap();

        assert!(summary.outcomes().is_empty());
        assert_eq!(sink.closes(), 1);
    }
}
