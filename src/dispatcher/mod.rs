//! Dispatcher: ready events in, channel deliveries out.
//!
//! Per notification: resolve the endpoint set across all matched rules,
//! deduplicate on `(type, value)` so an address backing several rules gets
//! one send, deliver each endpoint under its own bounded retry, then record
//! the terminal status. The offset is committed only once the status update
//! is durable, so a crash mid-dispatch redelivers and the SENT shortcut
//! keeps the retry harmless.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::join_all;

use crate::bus::{message_key, message_payload, BusConsumer, BusProducer};
use crate::channels::{ChannelRegistry, NotificationPayload, SendError};
use crate::config::{BrokerConfig, TopicsConfig};
use crate::db::DbPool;
use crate::error::PipelineResult;
use crate::events::ReadyEvent;
use crate::models::{Endpoint, EndpointType, NotificationStatus};
use crate::retry::{self, RetryPolicy};
use crate::shutdown::Shutdown;
use crate::store::{EndpointStore, NotificationStore};

/// Deduplicates endpoints on `(type, value)`, keeping first-seen order.
/// The same address attached to two matched rules must be sent once.
pub fn dedupe_endpoints(endpoints: &[Endpoint]) -> Vec<(EndpointType, String)> {
    let mut seen: HashSet<(EndpointType, String)> = HashSet::new();
    let mut unique = Vec::new();
    for endpoint in endpoints {
        let key = (endpoint.endpoint_type, endpoint.value.clone());
        if seen.insert(key) {
            unique.push((endpoint.endpoint_type, endpoint.value.clone()));
        }
    }
    unique
}

/// The C7 consume/deliver/record process.
pub struct DispatcherRunner {
    pool: DbPool,
    producer: BusProducer,
    registry: Arc<ChannelRegistry>,
    broker: BrokerConfig,
    topics: TopicsConfig,
    retry: RetryPolicy,
    shutdown: Shutdown,
}

impl DispatcherRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: DbPool,
        producer: BusProducer,
        registry: Arc<ChannelRegistry>,
        broker: BrokerConfig,
        topics: TopicsConfig,
        retry: RetryPolicy,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            pool,
            producer,
            registry,
            broker,
            topics,
            retry,
            shutdown,
        }
    }

    /// Runs until shutdown or an exhausted retry budget; the caller restarts
    /// the loop with a fresh session so uncommitted events replay.
    pub async fn run(self) -> PipelineResult<()> {
        let group_id = format!("{}-dispatcher", self.broker.group_id);
        let consumer = BusConsumer::connect(&self.broker, &group_id, &[&self.topics.ready])?;
        let mut shutdown = self.shutdown.clone();

        loop {
            let message = tokio::select! {
                _ = shutdown.triggered() => break,
                received = consumer.recv() => received,
            };

            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    log::warn!("Ready-event consume error: {}", e);
                    tokio::time::sleep(self.retry.delay_for(0)).await;
                    continue;
                }
            };

            let event = match message_payload(&message).and_then(ReadyEvent::decode) {
                Ok(event) => event,
                Err(e) => {
                    log::error!(
                        "Dropping malformed ready event (key '{}'): {}",
                        message_key(&message),
                        e
                    );
                    if let Ok(payload) = message_payload(&message) {
                        self.producer
                            .dead_letter(&self.topics.ready, &message_key(&message), payload)
                            .await;
                    }
                    consumer.commit(&message)?;
                    continue;
                }
            };

            // Deliver and record, then commit. Errors exit without
            // committing; redelivery hits the SENT shortcut where needed.
            self.dispatch(&event).await?;
            consumer.commit(&message)?;
        }

        log::info!("Dispatcher drained");
        Ok(())
    }

    /// One ready event end to end.
    async fn dispatch(&self, event: &ReadyEvent) -> PipelineResult<()> {
        let notification = retry::with_backoff(
            &self.retry,
            "notification fetch",
            || NotificationStore::get_by_id(&self.pool, event.notification_id),
            |e| e.is_transient(),
        )
        .await?;

        let Some(notification) = notification else {
            // A ready event for a row we cannot see is permanent; skip it.
            log::error!(
                "Ready event for unknown notification {}, skipping",
                event.notification_id
            );
            return Ok(());
        };

        if notification.status == NotificationStatus::Sent {
            log::debug!(
                "Notification {} already sent, skipping redelivery",
                notification.notification_id
            );
            return Ok(());
        }

        let endpoints = retry::with_backoff(
            &self.retry,
            "endpoint fetch",
            || EndpointStore::enabled_for_rules(&self.pool, &notification.rule_ids),
            |e| e.is_transient(),
        )
        .await?;

        let targets = dedupe_endpoints(&endpoints);
        if targets.is_empty() {
            // No enabled endpoint anywhere in the matched rules: terminal
            // failure rather than a silent parked row.
            log::warn!(
                "Notification {} has no enabled endpoints, marking failed",
                notification.notification_id
            );
            self.record_status(&notification.notification_id, NotificationStatus::Failed)
                .await?;
            return Ok(());
        }

        let payload = NotificationPayload::from(&notification);
        let sends = targets
            .iter()
            .map(|(endpoint_type, value)| self.send_one(*endpoint_type, value, &payload));
        let outcomes = join_all(sends).await;

        let delivered = outcomes.iter().filter(|ok| **ok).count();
        let status = if delivered > 0 {
            NotificationStatus::Sent
        } else {
            NotificationStatus::Failed
        };

        log::info!(
            "Notification {}: {}/{} endpoint deliveries succeeded, status {}",
            notification.notification_id,
            delivered,
            targets.len(),
            status
        );

        self.record_status(&notification.notification_id, status)
            .await
    }

    /// Delivers to one endpoint under the bounded retry budget. A slow or
    /// dead endpoint costs only its own budget, never the whole batch.
    async fn send_one(
        &self,
        endpoint_type: EndpointType,
        value: &str,
        payload: &NotificationPayload,
    ) -> bool {
        let Some(sender) = self.registry.get(endpoint_type) else {
            log::error!(
                "No sender registered for endpoint type '{}' ({})",
                endpoint_type,
                value
            );
            return false;
        };

        let result = retry::with_backoff(
            &self.retry,
            "channel send",
            || sender.send(value, payload),
            SendError::is_transient,
        )
        .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                log::warn!(
                    "Delivery to {} endpoint '{}' failed for notification {}: {}",
                    endpoint_type,
                    value,
                    payload.notification_id,
                    e
                );
                false
            }
        }
    }

    async fn record_status(
        &self,
        notification_id: &uuid::Uuid,
        status: NotificationStatus,
    ) -> PipelineResult<()> {
        retry::with_backoff(
            &self.retry,
            "notification status update",
            || NotificationStore::set_status(&self.pool, *notification_id, status),
            |e| e.is_transient(),
        )
        .await
    }
}
