//! Matcher consume loop: alerts in, matched events out.
//!
//! For every alert the current index is loaded once, so a hot reload mid-
//! stream never yields a partial result. The input offset is committed only
//! after every produced matched event is acknowledged; a partial publish
//! leaves the offset alone and the alert is redelivered, which is safe
//! because the downstream insert is idempotent.

use crate::bus::{message_key, message_payload, BusConsumer, BusProducer};
use crate::config::{BrokerConfig, TopicsConfig};
use crate::error::PipelineResult;
use crate::events::{AlertEvent, MatchedEvent, SCHEMA_VERSION};
use crate::matcher::reload::IndexHandle;
use crate::retry::{self, RetryPolicy};
use crate::shutdown::Shutdown;

/// The C5 consume/match/publish process.
pub struct MatcherRunner {
    handle: IndexHandle,
    producer: BusProducer,
    broker: BrokerConfig,
    topics: TopicsConfig,
    retry: RetryPolicy,
    shutdown: Shutdown,
}

impl MatcherRunner {
    pub fn new(
        handle: IndexHandle,
        producer: BusProducer,
        broker: BrokerConfig,
        topics: TopicsConfig,
        retry: RetryPolicy,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            handle,
            producer,
            broker,
            topics,
            retry,
            shutdown,
        }
    }

    /// Runs until shutdown or an unrecoverable publish failure; the caller
    /// restarts the loop with a fresh session so uncommitted alerts replay.
    pub async fn run(self) -> PipelineResult<()> {
        let group_id = format!("{}-matcher", self.broker.group_id);
        let consumer = BusConsumer::connect(&self.broker, &group_id, &[&self.topics.alerts])?;
        let mut shutdown = self.shutdown.clone();

        loop {
            let message = tokio::select! {
                _ = shutdown.triggered() => break,
                received = consumer.recv() => received,
            };

            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    log::warn!("Alert consume error: {}", e);
                    tokio::time::sleep(self.retry.delay_for(0)).await;
                    continue;
                }
            };

            let alert = match message_payload(&message).and_then(AlertEvent::decode) {
                Ok(alert) => alert,
                Err(e) => {
                    log::error!(
                        "Dropping malformed alert (key '{}'): {}",
                        message_key(&message),
                        e
                    );
                    if let Ok(payload) = message_payload(&message) {
                        self.producer
                            .dead_letter(&self.topics.alerts, &message_key(&message), payload)
                            .await;
                    }
                    consumer.commit(&message)?;
                    continue;
                }
            };

            // All-or-nothing: every tenant's event must be acknowledged
            // before the input offset moves.
            self.emit_matches(&alert).await?;
            consumer.commit(&message)?;
        }

        log::info!("Matcher drained");
        Ok(())
    }

    /// Matches one alert and publishes one event per matching tenant.
    async fn emit_matches(&self, alert: &AlertEvent) -> PipelineResult<()> {
        let index = self.handle.load();
        let matched = index.match_alert(&alert.severity, &alert.source, &alert.name);

        if matched.is_empty() {
            log::debug!("Alert '{}' matched no tenants", alert.alert_id);
            return Ok(());
        }

        for (tenant_id, rule_ids) in matched {
            let rule_count = rule_ids.len();
            let event = MatchedEvent {
                alert_id: alert.alert_id.clone(),
                tenant_id: tenant_id.clone(),
                rule_ids,
                severity: alert.severity.clone(),
                source: alert.source.clone(),
                name: alert.name.clone(),
                context: alert.context.clone(),
                event_ts: alert.event_ts,
                schema_version: SCHEMA_VERSION,
            };
            let payload = event.encode()?;

            retry::with_backoff(
                &self.retry,
                "matched event publish",
                || self.producer.publish(&self.topics.matched, &tenant_id, &payload),
                |e| e.is_transient(),
            )
            .await?;

            log::debug!(
                "Alert '{}' matched tenant '{}' ({} rules)",
                alert.alert_id,
                tenant_id,
                rule_count
            );
        }

        Ok(())
    }
}
