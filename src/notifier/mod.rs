//! Idempotent notifier: matched events in, at most one notification out.
//!
//! The uniqueness constraint on `(tenant_id, alert_id)` converts the bus's
//! at-least-once delivery into exactly-once notification creation. A ready
//! event is published only on the attempt that actually created the row.
//!
//! Known window, accepted for this contract: a crash after the insert but
//! before the ready publish leaves the row in `received` with no ready event
//! (the redelivered message sees "already exists" and publishes nothing). A
//! transactional outbox would close it; recovery today is a manual re-drive
//! of `received` rows.

use crate::bus::{message_key, message_payload, BusConsumer, BusProducer};
use crate::config::{BrokerConfig, TopicsConfig};
use crate::db::DbPool;
use crate::error::PipelineResult;
use crate::events::{MatchedEvent, ReadyEvent, SCHEMA_VERSION};
use crate::models::NewNotification;
use crate::retry::{self, RetryPolicy};
use crate::shutdown::Shutdown;
use crate::store::NotificationStore;

/// The C6 consume/insert/publish process.
pub struct NotifierRunner {
    pool: DbPool,
    producer: BusProducer,
    broker: BrokerConfig,
    topics: TopicsConfig,
    retry: RetryPolicy,
    shutdown: Shutdown,
}

impl NotifierRunner {
    pub fn new(
        pool: DbPool,
        producer: BusProducer,
        broker: BrokerConfig,
        topics: TopicsConfig,
        retry: RetryPolicy,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            pool,
            producer,
            broker,
            topics,
            retry,
            shutdown,
        }
    }

    /// Runs until shutdown or an exhausted retry budget; the caller restarts
    /// the loop with a fresh session so uncommitted events replay.
    pub async fn run(self) -> PipelineResult<()> {
        let group_id = format!("{}-notifier", self.broker.group_id);
        let consumer = BusConsumer::connect(&self.broker, &group_id, &[&self.topics.matched])?;
        let mut shutdown = self.shutdown.clone();

        loop {
            let message = tokio::select! {
                _ = shutdown.triggered() => break,
                received = consumer.recv() => received,
            };

            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    log::warn!("Matched-event consume error: {}", e);
                    tokio::time::sleep(self.retry.delay_for(0)).await;
                    continue;
                }
            };

            let event = match message_payload(&message).and_then(MatchedEvent::decode) {
                Ok(event) => event,
                Err(e) => {
                    log::error!(
                        "Dropping malformed matched event (key '{}'): {}",
                        message_key(&message),
                        e
                    );
                    if let Ok(payload) = message_payload(&message) {
                        self.producer
                            .dead_letter(&self.topics.matched, &message_key(&message), payload)
                            .await;
                    }
                    consumer.commit(&message)?;
                    continue;
                }
            };

            // Insert, publish on first creation, then commit. Any error here
            // exits without committing; redelivery is safe.
            self.handle_matched(&event).await?;
            consumer.commit(&message)?;
        }

        log::info!("Notifier drained");
        Ok(())
    }

    /// One matched event: insert-or-skip, ready event only on insert.
    async fn handle_matched(&self, event: &MatchedEvent) -> PipelineResult<()> {
        let input = NewNotification {
            tenant_id: event.tenant_id.clone(),
            alert_id: event.alert_id.clone(),
            severity: event.severity.clone(),
            source: event.source.clone(),
            name: event.name.clone(),
            context: serde_json::to_value(&event.context)
                .unwrap_or_else(|_| serde_json::json!({})),
            rule_ids: event.rule_ids.clone(),
        };

        let created = retry::with_backoff(
            &self.retry,
            "notification insert",
            || NotificationStore::insert_if_absent(&self.pool, &input),
            |e| e.is_transient(),
        )
        .await?;

        let Some(notification_id) = created else {
            log::debug!(
                "Notification for (tenant '{}', alert '{}') already exists, skipping",
                event.tenant_id,
                event.alert_id
            );
            return Ok(());
        };

        let ready = ReadyEvent {
            notification_id,
            tenant_id: event.tenant_id.clone(),
            alert_id: event.alert_id.clone(),
            schema_version: SCHEMA_VERSION,
        };
        let payload = ready.encode()?;
        let key = notification_id.to_string();

        retry::with_backoff(
            &self.retry,
            "ready event publish",
            || self.producer.publish(&self.topics.ready, &key, &payload),
            |e| e.is_transient(),
        )
        .await?;

        log::info!(
            "Created notification {} for (tenant '{}', alert '{}')",
            notification_id,
            event.tenant_id,
            event.alert_id
        );
        Ok(())
    }
}
