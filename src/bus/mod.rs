//! Event bus client.
//!
//! Thin wrapper around rdkafka with the pipeline's commit discipline baked
//! in: auto-commit is off, offsets are committed explicitly after the durable
//! side-effect, and fresh consumer groups start from the earliest record.

use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};

use crate::config::BrokerConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::events::SCHEMA_VERSION;

/// Header carrying the wire schema version on every published record.
pub const SCHEMA_VERSION_HEADER: &str = "schema_version";

// =============================================================================
// Consumer
// =============================================================================

/// Consumer-group session over one or more topics.
///
/// Processing is one message at a time per partition; per-partition order is
/// what the pipeline's ordering guarantees rest on.
pub struct BusConsumer {
    inner: StreamConsumer,
}

impl BusConsumer {
    /// Connects a consumer-group session and subscribes to `topics`.
    pub fn connect(config: &BrokerConfig, group_id: &str, topics: &[&str]) -> PipelineResult<Self> {
        let inner: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set(
                "session.timeout.ms",
                config.session_timeout.as_millis().to_string(),
            )
            .create()
            .map_err(|e| PipelineError::Unavailable(format!("event bus: {}", e)))?;

        inner.subscribe(topics)?;
        log::info!("Consumer group '{}' subscribed to {:?}", group_id, topics);

        Ok(Self { inner })
    }

    /// Awaits the next message. Cancel-safe: dropping the future leaves the
    /// stream usable, so callers park this under `tokio::select!` with the
    /// shutdown branch.
    pub async fn recv(&self) -> Result<BorrowedMessage<'_>, KafkaError> {
        self.inner.recv().await
    }

    /// Commits the offset of a fully processed message. Only called after the
    /// durable side-effect succeeded.
    pub fn commit(&self, message: &BorrowedMessage<'_>) -> PipelineResult<()> {
        self.inner.commit_message(message, CommitMode::Async)?;
        Ok(())
    }
}

// =============================================================================
// Producer
// =============================================================================

/// Shared, thread-safe producer for all pipeline topics.
#[derive(Clone)]
pub struct BusProducer {
    inner: FutureProducer,
    write_timeout: Duration,
    dead_letter_topic: Option<String>,
}

impl BusProducer {
    /// Connects a producer against the configured broker list.
    pub fn connect(config: &BrokerConfig) -> PipelineResult<Self> {
        let inner: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set(
                "message.timeout.ms",
                config.write_timeout.as_millis().to_string(),
            )
            .create()
            .map_err(|e| PipelineError::Unavailable(format!("event bus: {}", e)))?;

        Ok(Self {
            inner,
            write_timeout: config.write_timeout,
            dead_letter_topic: config.dead_letter_topic.clone(),
        })
    }

    /// Publishes one record and awaits broker acknowledgement.
    ///
    /// The schema version rides in a header so consumers can reject unknown
    /// payloads without parsing them.
    pub async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> PipelineResult<()> {
        let version = SCHEMA_VERSION.to_string();
        let record = FutureRecord::to(topic)
            .key(key)
            .payload(payload)
            .headers(OwnedHeaders::new().insert(Header {
                key: SCHEMA_VERSION_HEADER,
                value: Some(version.as_bytes()),
            }));

        self.inner
            .send(record, self.write_timeout)
            .await
            .map_err(|(e, _)| PipelineError::Bus(e))?;

        Ok(())
    }

    /// Routes a poison payload to the dead-letter topic, if one is configured.
    /// Returns whether the payload was preserved anywhere.
    pub async fn dead_letter(&self, origin: &str, key: &str, payload: &[u8]) -> bool {
        let Some(topic) = self.dead_letter_topic.clone() else {
            return false;
        };

        match self.publish(&topic, key, payload).await {
            Ok(()) => {
                log::warn!(
                    "Dead-lettered poison message from '{}' (key '{}') to '{}'",
                    origin,
                    key,
                    topic
                );
                true
            }
            Err(e) => {
                log::error!(
                    "Failed to dead-letter poison message from '{}' (key '{}'): {}",
                    origin,
                    key,
                    e
                );
                false
            }
        }
    }
}

/// Extracts the message key as UTF-8, with a placeholder for keyless records.
pub fn message_key(message: &BorrowedMessage<'_>) -> String {
    use rdkafka::Message;
    message
        .key()
        .map(|k| String::from_utf8_lossy(k).into_owned())
        .unwrap_or_else(|| "<none>".to_string())
}

/// Extracts the payload bytes, treating an empty record as poison.
pub fn message_payload<'a>(message: &'a BorrowedMessage<'_>) -> PipelineResult<&'a [u8]> {
    use rdkafka::Message;
    message
        .payload()
        .ok_or_else(|| PipelineError::Poison("empty payload".to_string()))
}
